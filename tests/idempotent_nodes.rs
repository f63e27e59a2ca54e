use std::fs;
use std::io;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use file_claim::lock::{IdempotentLock, MarkerFileLock};
use file_claim::{
    Begin, CancelToken, CommitAction, Expression, FileIdempotentRepository, FileOperations, FileRef,
    FileStat, IdempotentRepository, LocalFileOperations, MemoryIdempotentRepository,
    ProcessStrategy, ReadLock, SkipReason,
};
use tempfile::tempdir;

/// Local filesystem, counting marker creations.
#[derive(Debug, Default)]
struct CountingOps {
    local: LocalFileOperations,
    creates: AtomicUsize,
}

impl FileOperations for CountingOps {
    fn exists(&self, path: &Path) -> bool {
        self.local.exists(path)
    }

    fn stat(&self, path: &Path) -> io::Result<FileStat> {
        self.local.stat(path)
    }

    fn create_new(&self, path: &Path) -> io::Result<()> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        self.local.create_new(path)
    }

    fn delete_file(&self, path: &Path) -> io::Result<()> {
        self.local.delete_file(path)
    }

    fn rename_file(&self, from: &Path, to: &Path) -> io::Result<()> {
        self.local.rename_file(from, to)
    }

    fn build_directory(&self, dir: &Path) -> io::Result<()> {
        self.local.build_directory(dir)
    }
}

fn node(repository: Arc<dyn IdempotentRepository>, ops: Arc<CountingOps>) -> ProcessStrategy {
    ProcessStrategy::new(ReadLock::Idempotent(IdempotentLock::new(
        repository,
        ReadLock::MarkerFile(MarkerFileLock::new()),
    )))
    .with_operations(ops)
    .with_commit_action(CommitAction::Leave)
}

fn incoming(root: &Path) -> FileRef {
    fs::write(root.join("a.txt"), b"payload").unwrap();
    FileRef::from_path(root, Path::new("a.txt")).unwrap()
}

fn second_node_is_turned_away(
    repo_a: Arc<dyn IdempotentRepository>,
    repo_b: Arc<dyn IdempotentRepository>,
) {
    let td = tempdir().unwrap();
    let file = incoming(td.path());
    let key = file.absolute_path().to_string_lossy().into_owned();
    let ops = Arc::new(CountingOps::default());
    let node_a = node(Arc::clone(&repo_a), Arc::clone(&ops));
    let node_b = node(Arc::clone(&repo_b), Arc::clone(&ops));
    let cancel = CancelToken::new();

    let Begin::Locked(tx) = node_a.begin(file.clone(), &cancel).unwrap() else {
        panic!("node A should claim the file");
    };
    assert!(repo_b.contains(&key).unwrap());

    assert!(matches!(
        node_b.begin(file.clone(), &cancel).unwrap(),
        Begin::Skipped(SkipReason::Held)
    ));
    // Node B never reached its marker.
    assert_eq!(ops.creates.load(Ordering::SeqCst), 1);

    // Commit keeps the key: the file stays consumed for every node.
    tx.commit().unwrap();
    assert!(repo_a.contains(&key).unwrap());
    assert!(matches!(
        node_b.begin(file, &cancel).unwrap(),
        Begin::Skipped(SkipReason::Held)
    ));
}

#[test]
fn shared_memory_repository_admits_one_node() {
    let repo: Arc<dyn IdempotentRepository> = Arc::new(MemoryIdempotentRepository::default());
    second_node_is_turned_away(Arc::clone(&repo), repo);
}

#[test]
fn file_repository_is_shared_across_instances() {
    let td = tempdir().unwrap();
    let store = td.path().join("keys/claimed.tsv");
    let repo_a: Arc<dyn IdempotentRepository> =
        Arc::new(FileIdempotentRepository::open(&store, 100).unwrap());
    let repo_b: Arc<dyn IdempotentRepository> =
        Arc::new(FileIdempotentRepository::open(&store, 100).unwrap());
    second_node_is_turned_away(repo_a, repo_b);
}

#[test]
fn rollback_frees_the_key_for_another_node() {
    let td = tempdir().unwrap();
    let file = incoming(td.path());
    let key = file.absolute_path().to_string_lossy().into_owned();
    let repo: Arc<dyn IdempotentRepository> = Arc::new(MemoryIdempotentRepository::default());
    let ops = Arc::new(CountingOps::default());
    let node_a = node(Arc::clone(&repo), Arc::clone(&ops));
    let node_b = node(Arc::clone(&repo), Arc::clone(&ops));
    let cancel = CancelToken::new();

    let Begin::Locked(tx) = node_a.begin(file.clone(), &cancel).unwrap() else {
        panic!("node A should claim the file");
    };
    tx.rollback().unwrap();
    assert!(!repo.contains(&key).unwrap());

    let Begin::Locked(tx) = node_b.begin(file, &cancel).unwrap() else {
        panic!("node B should claim the file after rollback");
    };
    tx.abort().unwrap();
    assert!(!repo.contains(&key).unwrap());
}

#[test]
fn key_expression_and_delayed_release() {
    let td = tempdir().unwrap();
    let file = incoming(td.path());
    let repo = Arc::new(MemoryIdempotentRepository::default());
    let lock = IdempotentLock::new(repo.clone(), ReadLock::None)
        .with_key_expression(Expression::parse("${file:onlyname}").unwrap())
        .with_remove_on_commit(true)
        .with_release_delay(Duration::from_millis(150), true);
    let strategy =
        ProcessStrategy::new(ReadLock::Idempotent(lock)).with_commit_action(CommitAction::Leave);
    let cancel = CancelToken::new();

    let Begin::Locked(tx) = strategy.begin(file, &cancel).unwrap() else {
        panic!("expected a claim");
    };
    assert!(repo.contains("a.txt").unwrap());
    tx.commit().unwrap();

    // Released on a background thread after the delay.
    assert!(repo.contains("a.txt").unwrap());
    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    while repo.contains("a.txt").unwrap() && std::time::Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(20));
    }
    assert!(!repo.contains("a.txt").unwrap());
}

#[test]
fn key_is_released_when_the_inner_lock_is_held() {
    let td = tempdir().unwrap();
    let file = incoming(td.path());
    fs::write(td.path().join("a.txt.lock"), b"").unwrap();
    let key = file.absolute_path().to_string_lossy().into_owned();
    let repo: Arc<dyn IdempotentRepository> = Arc::new(MemoryIdempotentRepository::default());
    let strategy = node(Arc::clone(&repo), Arc::new(CountingOps::default()));

    assert!(matches!(
        strategy.begin(file, &CancelToken::new()).unwrap(),
        Begin::Skipped(SkipReason::Held)
    ));
    // Another consumer may retry once the marker is gone.
    assert!(!repo.contains(&key).unwrap());
    assert!(td.path().join("a.txt.lock").exists());
}

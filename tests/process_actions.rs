use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, SystemTime};

use file_claim::lock::MarkerFileLock;
use file_claim::platform::TargetOs;
use file_claim::process::Thresholds;
use file_claim::{
    Begin, CancelToken, ClaimError, CommitAction, Disposition, FileOperations, FileRef, FileStat,
    ProcessStrategy, ReadLock, Renamer, SkipReason, TxState,
};
use tempfile::tempdir;

fn canonical_tempdir() -> (tempfile::TempDir, PathBuf) {
    let td = tempdir().unwrap();
    let root = fs::canonicalize(td.path()).unwrap();
    (td, root)
}

fn write(root: &Path, name: &str) -> FileRef {
    fs::write(root.join(name), b"payload").unwrap();
    FileRef::from_path(root, Path::new(name)).unwrap()
}

fn marker_strategy() -> ProcessStrategy {
    ProcessStrategy::new(ReadLock::MarkerFile(MarkerFileLock::new()))
}

fn locked<'a>(begin: Result<Begin<'a>, ClaimError>) -> file_claim::Transaction<'a> {
    match begin.unwrap() {
        Begin::Locked(tx) => tx,
        Begin::Skipped(reason) => panic!("file was skipped: {reason}"),
    }
}

#[test]
fn commit_moves_into_done_by_default() {
    let (_td, root) = canonical_tempdir();
    let file = write(&root, "a.txt");
    let strategy = marker_strategy();
    let cancel = CancelToken::new();

    let tx = locked(strategy.begin(file, &cancel));
    assert_eq!(tx.state(), TxState::Locked);
    assert!(root.join("a.txt.lock").exists());

    let disposition = tx.commit().unwrap();
    let Disposition::Moved(moved) = disposition else {
        panic!("expected a move, got {disposition:?}");
    };
    assert_eq!(moved.absolute_path(), root.join(".done/a.txt"));
    assert_eq!(fs::read(root.join(".done/a.txt")).unwrap(), b"payload");
    assert!(!root.join("a.txt").exists());
    assert!(!root.join("a.txt.lock").exists());
}

#[test]
fn commit_replaces_an_existing_destination() {
    let (_td, root) = canonical_tempdir();
    fs::create_dir_all(root.join("out")).unwrap();
    fs::write(root.join("out/a.txt"), b"old").unwrap();
    let file = write(&root, "a.txt");
    let strategy = marker_strategy().with_commit_action(CommitAction::Move(
        Renamer::from_move_option("out", TargetOs::current()).unwrap(),
    ));

    let tx = locked(strategy.begin(file, &CancelToken::new()));
    tx.commit().unwrap();
    assert_eq!(fs::read(root.join("out/a.txt")).unwrap(), b"payload");
}

#[test]
fn second_consumer_skips_a_held_file() {
    let (_td, root) = canonical_tempdir();
    let file = write(&root, "a.txt");
    let a = marker_strategy();
    let b = marker_strategy();
    let cancel = CancelToken::new();

    let tx = locked(a.begin(file.clone(), &cancel));
    assert!(matches!(
        b.begin(file, &cancel).unwrap(),
        Begin::Skipped(SkipReason::Held)
    ));
    tx.abort().unwrap();
    assert!(root.join("a.txt").exists());
    assert!(!root.join("a.txt.lock").exists());
}

#[test]
fn pre_move_keeps_the_original_marker_until_release() {
    let (_td, root) = canonical_tempdir();
    let file = write(&root, "a.txt");
    let strategy = marker_strategy()
        .with_pre_move(Some(Renamer::from_move_option("inprogress", TargetOs::current()).unwrap()))
        .with_commit_action(CommitAction::Leave);

    let tx = locked(strategy.begin(file, &CancelToken::new()));
    assert_eq!(tx.file().absolute_path(), root.join("inprogress/a.txt"));
    assert_eq!(tx.file().copied_from(), Some(root.join("a.txt").as_path()));
    assert!(root.join("a.txt.lock").exists());
    assert!(!root.join("inprogress/a.txt.lock").exists());

    let disposition = tx.commit().unwrap();
    assert!(matches!(disposition, Disposition::Left(_)));
    assert!(root.join("inprogress/a.txt").exists());
    assert!(!root.join("a.txt.lock").exists());
}

#[test]
fn rollback_moves_failed_files_aside() {
    let (_td, root) = canonical_tempdir();
    let file = write(&root, "a.txt");
    let strategy = marker_strategy().with_failure_move(Some(
        Renamer::from_move_option(".failed", TargetOs::current()).unwrap(),
    ));

    let tx = locked(strategy.begin(file, &CancelToken::new()));
    let disposition = tx.rollback().unwrap();

    let Disposition::Moved(moved) = disposition else {
        panic!("expected a move, got {disposition:?}");
    };
    assert_eq!(moved.absolute_path(), root.join(".failed/a.txt"));
    assert!(root.join(".failed/a.txt").exists());
    assert!(!root.join("a.txt.lock").exists());
}

#[test]
fn rollback_without_failure_move_leaves_the_file() {
    let (_td, root) = canonical_tempdir();
    let file = write(&root, "a.txt");
    let strategy = marker_strategy();

    let tx = locked(strategy.begin(file, &CancelToken::new()));
    assert!(matches!(tx.rollback().unwrap(), Disposition::Left(_)));
    assert!(root.join("a.txt").exists());
    assert!(!root.join("a.txt.lock").exists());
}

#[test]
fn dropping_a_transaction_releases_its_marker() {
    let (_td, root) = canonical_tempdir();
    let file = write(&root, "a.txt");
    let strategy = marker_strategy();

    {
        let _tx = locked(strategy.begin(file, &CancelToken::new()));
        assert!(root.join("a.txt.lock").exists());
    }
    assert!(!root.join("a.txt.lock").exists());
}

#[test]
fn thresholds_skip_before_locking() {
    let (_td, root) = canonical_tempdir();
    let file = write(&root, "a.txt");
    let cancel = CancelToken::new();

    let small = marker_strategy().with_thresholds(Thresholds {
        min_age: Duration::ZERO,
        min_length: 1024,
    });
    assert!(matches!(
        small.begin(file.clone(), &cancel).unwrap(),
        Begin::Skipped(SkipReason::TooSmall)
    ));

    let young = marker_strategy().with_thresholds(Thresholds {
        min_age: Duration::from_secs(3600),
        min_length: 0,
    });
    assert!(matches!(
        young.begin(file, &cancel).unwrap(),
        Begin::Skipped(SkipReason::TooYoung)
    ));
    assert!(!root.join("a.txt.lock").exists());
}

/// Delete fails `failures` times, then succeeds. The file always "exists".
#[derive(Debug)]
struct FlakyDelete {
    failures: usize,
    calls: AtomicUsize,
}

impl FlakyDelete {
    fn new(failures: usize) -> Self {
        Self {
            failures,
            calls: AtomicUsize::new(0),
        }
    }
}

impl FileOperations for FlakyDelete {
    fn exists(&self, _path: &Path) -> bool {
        true
    }

    fn stat(&self, _path: &Path) -> io::Result<FileStat> {
        Ok(FileStat {
            len: 7,
            modified: SystemTime::now(),
        })
    }

    fn create_new(&self, _path: &Path) -> io::Result<()> {
        Ok(())
    }

    fn delete_file(&self, _path: &Path) -> io::Result<()> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if n < self.failures {
            Err(io::Error::other("file is busy"))
        } else {
            Ok(())
        }
    }

    fn rename_file(&self, _from: &Path, _to: &Path) -> io::Result<()> {
        Ok(())
    }

    fn build_directory(&self, _dir: &Path) -> io::Result<()> {
        Ok(())
    }
}

fn delete_strategy(ops: Arc<FlakyDelete>) -> ProcessStrategy {
    ProcessStrategy::new(ReadLock::None)
        .with_operations(ops)
        .with_commit_action(CommitAction::Delete)
        .with_delete_retry(3, Duration::ZERO)
}

fn phantom() -> FileRef {
    FileRef::new(
        "/in",
        "/in/a.txt",
        FileStat {
            len: 7,
            modified: SystemTime::now(),
        },
    )
}

#[test]
fn delete_succeeds_within_the_retry_bound() {
    let ops = Arc::new(FlakyDelete::new(2));
    let strategy = delete_strategy(Arc::clone(&ops));

    let tx = locked(strategy.begin(phantom(), &CancelToken::new()));
    assert_eq!(tx.commit().unwrap(), Disposition::Deleted);
    assert_eq!(ops.calls.load(Ordering::SeqCst), 3);
}

#[test]
fn delete_gives_up_after_the_retry_bound() {
    let ops = Arc::new(FlakyDelete::new(usize::MAX));
    let strategy = delete_strategy(Arc::clone(&ops));

    let tx = locked(strategy.begin(phantom(), &CancelToken::new()));
    let err = tx.commit().unwrap_err();
    assert!(matches!(err, ClaimError::OperationFailed { .. }), "got {err:?}");
    assert_eq!(ops.calls.load(Ordering::SeqCst), 3);
}

#[test]
fn pre_cancelled_polling_lock_is_skipped() {
    let (_td, root) = canonical_tempdir();
    let file = write(&root, "a.txt");
    let strategy = ProcessStrategy::new(ReadLock::RenameProbe(
        file_claim::lock::RenameProbeLock::new(file_claim::RetryBudget::bounded(
            Duration::from_secs(5),
            Duration::from_millis(50),
        )),
    ));
    let cancel = CancelToken::new();
    cancel.cancel();

    assert!(matches!(
        strategy.begin(file, &cancel).unwrap(),
        Begin::Skipped(SkipReason::Cancelled)
    ));
}

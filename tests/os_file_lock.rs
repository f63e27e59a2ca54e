use std::fs::{self, OpenOptions};
use std::path::Path;
use std::time::{Duration, Instant};

use file_claim::lock::{LockContext, OsFileLock};
use file_claim::platform::TargetOs;
use file_claim::{
    CancelToken, FileRef, LocalFileOperations, LockOutcome, ReadLock, RetryBudget, SkipReason,
};
use fs2::FileExt;
use serial_test::serial;
use tempfile::tempdir;

const TIMEOUT: Duration = Duration::from_millis(400);
const POLL: Duration = Duration::from_millis(200);

fn run(lock: &ReadLock, file: &FileRef, cancel: &CancelToken) -> LockOutcome {
    let ops = LocalFileOperations::new();
    let ctx = LockContext {
        ops: &ops,
        cancel,
        os: TargetOs::current(),
    };
    lock.acquire(file, &ctx).unwrap()
}

#[test]
#[serial]
fn free_file_is_acquired_at_once() {
    let td = tempdir().unwrap();
    fs::write(td.path().join("a.bin"), b"abc").unwrap();
    let file = FileRef::from_path(td.path(), Path::new("a.bin")).unwrap();
    let lock = ReadLock::OsFileLock(OsFileLock::new(RetryBudget::bounded(TIMEOUT, POLL)));

    let started = Instant::now();
    assert!(run(&lock, &file, &CancelToken::new()).is_acquired());
    assert!(started.elapsed() < POLL);
}

#[test]
#[serial]
fn held_file_times_out_within_one_poll_of_the_deadline() {
    let td = tempdir().unwrap();
    let path = td.path().join("a.bin");
    fs::write(&path, b"abc").unwrap();
    let file = FileRef::from_path(td.path(), Path::new("a.bin")).unwrap();

    // A writer keeps its own exclusive lock for the whole attempt.
    let writer = OpenOptions::new().read(true).write(true).open(&path).unwrap();
    writer.lock_exclusive().unwrap();

    let lock = ReadLock::OsFileLock(OsFileLock::new(RetryBudget::bounded(TIMEOUT, POLL)));
    let started = Instant::now();
    let outcome = run(&lock, &file, &CancelToken::new());
    let waited = started.elapsed();

    assert!(matches!(outcome, LockOutcome::NotAcquired(SkipReason::TimedOut)));
    assert!(waited >= TIMEOUT, "gave up too early: {waited:?}");
    assert!(waited < TIMEOUT + POLL, "gave up too late: {waited:?}");

    writer.unlock().unwrap();
    assert!(run(&lock, &file, &CancelToken::new()).is_acquired());
}

#[test]
#[serial]
fn cancelled_wait_is_not_an_error() {
    let td = tempdir().unwrap();
    let path = td.path().join("a.bin");
    fs::write(&path, b"abc").unwrap();
    let file = FileRef::from_path(td.path(), Path::new("a.bin")).unwrap();
    let writer = OpenOptions::new().read(true).write(true).open(&path).unwrap();
    writer.lock_exclusive().unwrap();

    let cancel = CancelToken::new();
    let trigger = cancel.clone();
    let canceller = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(100));
        trigger.cancel();
    });

    let lock = ReadLock::OsFileLock(OsFileLock::new(RetryBudget::bounded(
        Duration::from_secs(30),
        POLL,
    )));
    let started = Instant::now();
    let outcome = run(&lock, &file, &cancel);
    canceller.join().unwrap();

    assert!(matches!(outcome, LockOutcome::NotAcquired(SkipReason::Cancelled)));
    assert!(started.elapsed() < Duration::from_secs(5));
}

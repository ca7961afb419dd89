//! Integration tests for namespace lock exclusion between processes

use actionmap::auth::Credentials;
use actionmap::dispatcher::{Request, RequestContext};
use actionmap::error::{DispatchError, ErrorKind, LockError};
use actionmap::interaction::NonInteractive;
use actionmap::lock::{release_held_locks, ExecutionLock};
use nix::unistd::getpid;
use std::fs;
use std::process::{Child, Command};
use std::sync::Mutex;
use std::time::Duration;

use crate::integration::{argv, Sandbox};

// release_held_locks drains a process-wide list.
static LOCK_TEST_MUTEX: Mutex<()> = Mutex::new(());

fn holder() -> Child {
    Command::new("sleep").arg("30").spawn().unwrap()
}

fn create(name: &str) -> Request {
    Request::Cli(argv(&["actionmap", "widget", "create", name, "-c", "red"]))
}

#[test]
fn test_live_holder_blocks_until_timeout() {
    let _guard = LOCK_TEST_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    let sandbox = Sandbox::new();
    let dispatcher = sandbox.cli_dispatcher();
    let lock_path = sandbox.paths.runtime_dir.join("demo.lock");
    fs::create_dir_all(&sandbox.paths.runtime_dir).unwrap();

    let mut child = holder();
    fs::write(&lock_path, format!("{}\n", child.id())).unwrap();

    let ctx = RequestContext::new(&NonInteractive)
        .with_credentials(Credentials::Password("demo".to_string()))
        .with_lock_timeout(Some(Duration::from_millis(50)));
    let err = dispatcher.process(create("bolt"), &ctx).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::LockTimeout);
    assert_eq!(err.http_status(), 503);
    assert!(matches!(
        err,
        DispatchError::Lock(LockError::InstanceAlreadyRunning { holder, .. }) if holder == child.id() as i32
    ));
    assert!(sandbox.store.is_empty());

    // Unlocked actions are not affected.
    dispatcher
        .process(
            Request::Cli(argv(&["actionmap", "widget", "list"])),
            &RequestContext::new(&NonInteractive),
        )
        .unwrap();

    child.kill().unwrap();
    child.wait().unwrap();

    // The holder is gone: its lock is stale and gets replaced.
    dispatcher.process(create("bolt"), &ctx).unwrap();
    assert_eq!(sandbox.store.len(), 1);
    assert!(!lock_path.exists());
}

#[test]
fn test_lock_held_by_this_process_is_reentrant() {
    let _guard = LOCK_TEST_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    let sandbox = Sandbox::new();
    let lock = ExecutionLock::new(&sandbox.paths.runtime_dir, "demo")
        .with_poll_interval(Duration::from_millis(10));

    let outer = lock.acquire(Some(Duration::ZERO)).unwrap();
    assert!(!outer.is_reentrant());
    assert_eq!(
        fs::read_to_string(lock.path()).unwrap().trim(),
        getpid().to_string()
    );

    let inner = lock.acquire(Some(Duration::ZERO)).unwrap();
    assert!(inner.is_reentrant());
    drop(inner);
    assert!(lock.path().exists(), "a reentrant guard must not release");

    drop(outer);
    assert!(!lock.path().exists());
}

#[test]
fn test_release_held_locks_clears_files() {
    let _guard = LOCK_TEST_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    let sandbox = Sandbox::new();
    let first = ExecutionLock::new(&sandbox.paths.runtime_dir, "demo");
    let second = ExecutionLock::new(&sandbox.paths.runtime_dir, "ops");

    let first_guard = first.acquire(None).unwrap();
    let second_guard = second.acquire(None).unwrap();
    assert_eq!(first_guard.namespace(), "demo");

    assert!(release_held_locks() >= 2);
    assert!(!first.path().exists());
    assert!(!second.path().exists());

    // Dropping after release is harmless.
    drop(first_guard);
    drop(second_guard);
}

#[test]
fn test_waiter_gets_the_lock_once_released() {
    let _guard = LOCK_TEST_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    let sandbox = Sandbox::new();
    let lock = ExecutionLock::new(&sandbox.paths.runtime_dir, "demo")
        .with_poll_interval(Duration::from_millis(10));
    fs::create_dir_all(&sandbox.paths.runtime_dir).unwrap();

    let mut child = holder();
    fs::write(lock.path(), format!("{}\n", child.id())).unwrap();
    let path = lock.path().to_path_buf();
    let releaser = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(100));
        fs::remove_file(path).unwrap();
    });

    let guard = lock.acquire(Some(Duration::from_secs(5))).unwrap();
    assert!(!guard.is_reentrant());
    releaser.join().unwrap();
    child.kill().unwrap();
    child.wait().unwrap();
}

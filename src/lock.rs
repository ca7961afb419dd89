//! Execution lock, one per namespace.
//!
//! The lock file lives at `<runtime_dir>/<namespace>.lock` and holds newline separated
//! PIDs, the first being the holder. Threads of one process queue on an in-process
//! claim before touching the file, so a namespace has one holder at a time even when
//! requests run in parallel. A process whose ancestor is listed already runs under the
//! lock and gets a reentrant guard, as does a thread acquiring a lock it already holds.

use crate::error::LockError;
use nix::errno::Errno;
use nix::sys::signal::kill;
use nix::unistd::{getpid, Pid};
use parking_lot::{Condvar, Mutex};
use std::collections::BTreeMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// In-process holders by lock path.
static CLAIMS: Mutex<BTreeMap<PathBuf, Claim>> = parking_lot::const_mutex(BTreeMap::new());
static CLAIM_RELEASED: Condvar = Condvar::new();
static NEXT_TICKET: AtomicU64 = AtomicU64::new(1);

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug)]
struct Claim {
    thread: ThreadId,
    ticket: u64,
    /// Set once this process created the lock file
    owns_file: bool,
}

#[derive(Debug, Clone)]
pub struct ExecutionLock {
    namespace: String,
    path: PathBuf,
    poll_interval: Duration,
}

impl ExecutionLock {
    pub fn new(runtime_dir: impl AsRef<Path>, namespace: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            path: runtime_dir.as_ref().join(format!("{}.lock", namespace)),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Wait for the lock. `None` waits forever.
    pub fn acquire(&self, timeout: Option<Duration>) -> Result<LockGuard, LockError> {
        let started = Instant::now();
        let Some(ticket) = self.claim(timeout.map(|limit| started + limit))? else {
            debug!(namespace = %self.namespace, "Lock already held by this thread");
            return Ok(self.guard(Hold::Nested));
        };
        match self.acquire_file(started, timeout) {
            Ok(true) => {
                if let Some(claim) = CLAIMS.lock().get_mut(&self.path) {
                    if claim.ticket == ticket {
                        claim.owns_file = true;
                    }
                }
                info!(namespace = %self.namespace, "Lock acquired");
                Ok(self.guard(Hold::File { ticket }))
            }
            Ok(false) => {
                debug!(namespace = %self.namespace, "Lock already held by this process tree");
                Ok(self.guard(Hold::Ancestor { ticket }))
            }
            Err(e) => {
                release_claim(&self.path, ticket);
                Err(e)
            }
        }
    }

    fn guard(&self, hold: Hold) -> LockGuard {
        LockGuard {
            namespace: self.namespace.clone(),
            path: self.path.clone(),
            hold,
        }
    }

    /// Wait until no other thread of this process holds the namespace.
    /// `None` when the calling thread already holds it.
    fn claim(&self, deadline: Option<Instant>) -> Result<Option<u64>, LockError> {
        let thread = thread::current().id();
        let mut claims = CLAIMS.lock();
        loop {
            match claims.get(&self.path).map(|claim| claim.thread) {
                None => {
                    let ticket = NEXT_TICKET.fetch_add(1, Ordering::Relaxed);
                    claims.insert(
                        self.path.clone(),
                        Claim {
                            thread,
                            ticket,
                            owns_file: false,
                        },
                    );
                    return Ok(Some(ticket));
                }
                Some(holder) if holder == thread => return Ok(None),
                Some(_) => {
                    debug!(namespace = %self.namespace, "Waiting for another request of this process");
                    match deadline {
                        Some(deadline) => {
                            if Instant::now() >= deadline {
                                return Err(LockError::InstanceAlreadyRunning {
                                    namespace: self.namespace.clone(),
                                    holder: getpid().as_raw(),
                                });
                            }
                            CLAIM_RELEASED.wait_until(&mut claims, deadline);
                        }
                        None => CLAIM_RELEASED.wait(&mut claims),
                    }
                }
            }
        }
    }

    /// `Ok(true)` once this process created the file, `Ok(false)` when an ancestor holds it.
    fn acquire_file(&self, started: Instant, timeout: Option<Duration>) -> Result<bool, LockError> {
        let own_pid = getpid().as_raw();
        let ancestors = process_ancestors();
        let mut stale_checked = false;

        loop {
            match self.read_holders()? {
                None => {
                    if self.try_create()? {
                        return Ok(true);
                    }
                    // Lost the race to another process; look again.
                    continue;
                }
                Some(holders) => {
                    if holders.iter().any(|pid| ancestors.contains(pid)) {
                        return Ok(false);
                    }

                    if let Some(&holder) = holders.first() {
                        if !stale_checked {
                            stale_checked = true;
                            // Our own PID without a claim is left over from a released lock.
                            if holder == own_pid || !is_alive(holder) {
                                warn!(
                                    namespace = %self.namespace,
                                    holder,
                                    "Removing stale lock left by a dead process"
                                );
                                self.remove_stale()?;
                                continue;
                            }
                        }

                        let expired = timeout
                            .map(|limit| started.elapsed() >= limit)
                            .unwrap_or(false);
                        if expired {
                            return Err(LockError::InstanceAlreadyRunning {
                                namespace: self.namespace.clone(),
                                holder,
                            });
                        }
                        debug!(namespace = %self.namespace, holder, "Waiting for lock");
                    } else if timeout.map(|limit| started.elapsed() >= limit).unwrap_or(false) {
                        // The creator has not written its PID yet.
                        return Err(LockError::InstanceAlreadyRunning {
                            namespace: self.namespace.clone(),
                            holder: 0,
                        });
                    }
                    thread::sleep(self.poll_interval);
                }
            }
        }
    }

    fn read_holders(&self) -> Result<Option<Vec<i32>>, LockError> {
        match fs::read_to_string(&self.path) {
            Ok(content) => Ok(Some(
                content
                    .lines()
                    .filter_map(|line| line.trim().parse::<i32>().ok())
                    .collect(),
            )),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(self.map_io(e)),
        }
    }

    /// `Ok(false)` when the file appeared in the meantime.
    fn try_create(&self) -> Result<bool, LockError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| self.map_io(e))?;
        }
        let mut file = match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.path)
        {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => return Ok(false),
            Err(e) => return Err(self.map_io(e)),
        };
        writeln!(file, "{}", getpid()).map_err(|e| self.map_io(e))?;
        Ok(true)
    }

    fn remove_stale(&self) -> Result<(), LockError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(self.map_io(e)),
        }
    }

    fn map_io(&self, err: std::io::Error) -> LockError {
        if err.kind() == ErrorKind::PermissionDenied {
            LockError::PermissionDenied(self.path.clone())
        } else {
            LockError::IoError(err)
        }
    }
}

/// Drop the in-process claim if `ticket` still holds it. Wakes every waiter.
fn release_claim(path: &Path, ticket: u64) -> bool {
    let mut claims = CLAIMS.lock();
    let held = claims.get(path).map(|c| c.ticket == ticket).unwrap_or(false);
    if held {
        claims.remove(path);
        CLAIM_RELEASED.notify_all();
    }
    held
}

#[derive(Debug)]
enum Hold {
    /// The same thread already holds the namespace
    Nested,
    /// An ancestor process holds the file
    Ancestor { ticket: u64 },
    /// This process created the file
    File { ticket: u64 },
}

/// Releases the lock on drop. Only the guard that created the file removes it.
#[derive(Debug)]
pub struct LockGuard {
    namespace: String,
    path: PathBuf,
    hold: Hold,
}

impl LockGuard {
    pub fn is_reentrant(&self) -> bool {
        !matches!(self.hold, Hold::File { .. })
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        match self.hold {
            Hold::Nested => {}
            Hold::Ancestor { ticket } => {
                release_claim(&self.path, ticket);
            }
            Hold::File { ticket } => {
                // Remove the file before waking the next in-process waiter.
                let mut claims = CLAIMS.lock();
                let holder = claims.get(&self.path).map(|claim| claim.ticket);
                let ours = match holder {
                    Some(current) => current == ticket,
                    // Claims were drained by release_held_locks; the file may still be ours.
                    None => first_holder(&self.path) == Some(getpid().as_raw()),
                };
                if ours {
                    match fs::remove_file(&self.path) {
                        Ok(()) => debug!(namespace = %self.namespace, "Lock released"),
                        Err(e) if e.kind() == ErrorKind::NotFound => {}
                        Err(e) => {
                            warn!(namespace = %self.namespace, error = %e, "Failed to release lock")
                        }
                    }
                    claims.remove(&self.path);
                    CLAIM_RELEASED.notify_all();
                }
            }
        }
    }
}

fn first_holder(path: &Path) -> Option<i32> {
    fs::read_to_string(path)
        .ok()?
        .lines()
        .next()?
        .trim()
        .parse()
        .ok()
}

/// Remove every lock file this process still holds. Meant for signal handlers.
pub fn release_held_locks() -> usize {
    let mut claims = CLAIMS.lock();
    let mut released = 0;
    for (path, claim) in std::mem::take(&mut *claims) {
        if claim.owns_file && fs::remove_file(&path).is_ok() {
            released += 1;
        }
    }
    CLAIM_RELEASED.notify_all();
    released
}

fn is_alive(pid: i32) -> bool {
    if pid <= 0 {
        return false;
    }
    // EPERM still means the process exists.
    !matches!(kill(Pid::from_raw(pid), None), Err(Errno::ESRCH))
}

/// Ancestors of this process, nearest first.
fn process_ancestors() -> Vec<i32> {
    let own = getpid().as_raw();
    let mut ancestors = Vec::new();
    let mut current = own;
    while let Some(parent) = parent_pid(current) {
        if parent <= 1 || parent == own || ancestors.contains(&parent) {
            break;
        }
        ancestors.push(parent);
        current = parent;
    }
    ancestors
}

fn parent_pid(pid: i32) -> Option<i32> {
    let stat = fs::read_to_string(format!("/proc/{}/stat", pid)).ok()?;
    // The command name may contain spaces and parentheses; fields resume after the last ')'.
    let rest = &stat[stat.rfind(')')? + 1..];
    rest.split_whitespace().nth(1)?.parse().ok()
}

//! Bounded-wait wrapper around a [`FileSystem`].
//!
//! cgroup files are kernel-backed and normally answer instantly, but a read
//! can stall under kernel-side contention. `TimeoutFs` runs every call on a
//! helper thread and gives up after the configured timeout with
//! `io::ErrorKind::TimedOut`. Idle helpers go back to a shared pool.
//!
//! A helper whose call timed out is abandoned and exits once the call
//! returns. Until then its path counts as stuck: further calls on that path
//! fail at once, and once [`MAX_STUCK_CALLS`] helpers are stuck every call
//! fails at once. The number of blocked threads therefore stays bounded
//! while a mount hangs.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use tracing::{debug, warn};

use crate::collector::traits::{DirEntry, FileSystem};

/// Default bound on a single file read or directory listing.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(2);
/// Upper bound on abandoned helper threads.
pub const MAX_STUCK_CALLS: usize = 16;

type Job = Box<dyn FnOnce() + Send + 'static>;

const RUNNING: u8 = 0;
const DONE: u8 = 1;
const ABANDONED: u8 = 2;

struct Helper {
    jobs: Sender<Job>,
}

impl Helper {
    fn spawn() -> io::Result<Self> {
        let (tx, rx) = mpsc::channel::<Job>();
        thread::Builder::new()
            .name("cgtrace-io".into())
            .spawn(move || {
                while let Ok(job) = rx.recv() {
                    job();
                }
            })?;
        Ok(Self { jobs: tx })
    }
}

/// Abandoned calls per path.
#[derive(Default)]
struct Stuck {
    paths: HashMap<PathBuf, usize>,
    total: usize,
}

impl Stuck {
    fn add(&mut self, path: &Path) {
        *self.paths.entry(path.to_path_buf()).or_insert(0) += 1;
        self.total += 1;
    }

    fn remove(&mut self, path: &Path) {
        if let Some(count) = self.paths.get_mut(path) {
            *count -= 1;
            if *count == 0 {
                self.paths.remove(path);
            }
            self.total -= 1;
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

fn timed_out(what: &Path, timeout: Duration) -> io::Error {
    io::Error::new(
        io::ErrorKind::TimedOut,
        format!("{} timed out after {:?}", what.display(), timeout),
    )
}

pub struct TimeoutFs<F> {
    inner: Arc<F>,
    timeout: Duration,
    idle: Mutex<Vec<Helper>>,
    stuck: Arc<Mutex<Stuck>>,
}

impl<F: FileSystem + 'static> TimeoutFs<F> {
    pub fn new(inner: F, timeout: Duration) -> Self {
        Self {
            inner: Arc::new(inner),
            timeout,
            idle: Mutex::new(Vec::new()),
            stuck: Arc::new(Mutex::new(Stuck::default())),
        }
    }

    fn take_helper(&self) -> io::Result<Helper> {
        match lock(&self.idle).pop() {
            Some(helper) => Ok(helper),
            None => Helper::spawn(),
        }
    }

    fn run<T, Op>(&self, what: &Path, op: Op) -> io::Result<T>
    where
        T: Send + 'static,
        Op: FnOnce(&F) -> io::Result<T> + Send + 'static,
    {
        {
            let stuck = lock(&self.stuck);
            if stuck.paths.contains_key(what) || stuck.total >= MAX_STUCK_CALLS {
                return Err(timed_out(what, self.timeout));
            }
        }

        let helper = self.take_helper()?;
        let (tx, rx) = mpsc::sync_channel(1);
        let inner = Arc::clone(&self.inner);
        let state = Arc::new(AtomicU8::new(RUNNING));
        let job_state = Arc::clone(&state);
        let job_stuck = Arc::clone(&self.stuck);
        let job_path = what.to_path_buf();
        let job: Job = Box::new(move || {
            // The receiver is gone if the caller already timed out.
            let _ = tx.send(op(inner.as_ref()));
            if job_state.swap(DONE, Ordering::AcqRel) == ABANDONED {
                lock(&job_stuck).remove(&job_path);
            }
        });

        if helper.jobs.send(job).is_err() {
            return Err(io::Error::other("I/O helper thread exited"));
        }

        match rx.recv_timeout(self.timeout) {
            Ok(result) => {
                lock(&self.idle).push(helper);
                result
            }
            Err(RecvTimeoutError::Timeout) => {
                // Registered before the swap so a late finish always finds
                // its entry.
                lock(&self.stuck).add(what);
                if state.swap(ABANDONED, Ordering::AcqRel) == DONE {
                    lock(&self.stuck).remove(what);
                    if let Ok(result) = rx.try_recv() {
                        lock(&self.idle).push(helper);
                        return result;
                    }
                }
                warn!("{} did not answer within {:?}", what.display(), self.timeout);
                Err(timed_out(what, self.timeout))
            }
            Err(RecvTimeoutError::Disconnected) => {
                debug!("I/O helper for {} died", what.display());
                Err(io::Error::other("I/O helper thread panicked"))
            }
        }
    }
}

impl<F: FileSystem + 'static> FileSystem for TimeoutFs<F> {
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        let owned = path.to_path_buf();
        self.run(path, move |fs: &F| fs.read_to_string(&owned))
    }

    fn exists(&self, path: &Path) -> bool {
        let owned = path.to_path_buf();
        self.run(path, move |fs: &F| Ok(fs.exists(&owned)))
            .unwrap_or(false)
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<DirEntry>> {
        let owned: PathBuf = path.to_path_buf();
        self.run(path, move |fs: &F| fs.read_dir(&owned))
    }

    fn read_mounts(&self) -> io::Result<String> {
        self.run(Path::new("mount table"), |fs: &F| fs.read_mounts())
    }
}

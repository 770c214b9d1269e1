use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

pub const LOCK_FILE: &str = ".lock";

/// How long a writer waits for another `tt` process before giving up
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

const FIRST_BACKOFF: Duration = Duration::from_millis(2);
const MAX_BACKOFF: Duration = Duration::from_millis(50);

/// Error type for lock operations
#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("could not open lock file at {path}: {source}")]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("timed out waiting for {path}{}", holder_suffix(.holder))]
    Timeout { path: PathBuf, holder: Option<u32> },
}

fn holder_suffix(holder: &Option<u32>) -> String {
    match holder {
        Some(pid) => format!(" (held by pid {pid})"),
        None => String::new(),
    }
}

/// Run `f` while holding the exclusive advisory lock of `project_dir`.
///
/// The whole read-check-write cycle of a store transaction runs inside `f`,
/// so no other process can commit between the revision check and the write.
/// The lock file itself is left in place; unlinking it would let a waiter and
/// a newcomer lock two different inodes.
pub fn with_lock<T, E>(
    project_dir: &Path,
    timeout: Duration,
    f: impl FnOnce() -> Result<T, E>,
) -> Result<T, E>
where
    E: From<LockError>,
{
    let _held = Held::acquire(&project_dir.join(LOCK_FILE), timeout)?;
    f()
}

/// An exclusive flock on the open lock file; released when the descriptor closes.
struct Held {
    _file: File,
}

impl Held {
    fn acquire(path: &Path, timeout: Duration) -> Result<Self, LockError> {
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(path)
            .map_err(|source| LockError::Open {
                path: path.to_path_buf(),
                source,
            })?;

        let deadline = Instant::now() + timeout;
        let mut backoff = FIRST_BACKOFF;
        while !try_lock(&file) {
            let now = Instant::now();
            if now >= deadline {
                return Err(LockError::Timeout {
                    path: path.to_path_buf(),
                    holder: read_holder(&mut file),
                });
            }
            std::thread::sleep(backoff.min(deadline - now));
            backoff = (backoff * 2).min(MAX_BACKOFF);
        }

        // Best effort: a missing pid only weakens the timeout message
        if let Err(e) = write_holder(&mut file) {
            tracing::debug!(error = %e, "could not record lock holder");
        }
        Ok(Held { _file: file })
    }
}

fn write_holder(file: &mut File) -> std::io::Result<()> {
    file.set_len(0)?;
    file.seek(SeekFrom::Start(0))?;
    write!(file, "{}", std::process::id())?;
    file.flush()
}

fn read_holder(file: &mut File) -> Option<u32> {
    let mut text = String::new();
    file.seek(SeekFrom::Start(0)).ok()?;
    file.read_to_string(&mut text).ok()?;
    text.trim().parse().ok()
}

#[cfg(unix)]
fn try_lock(file: &File) -> bool {
    use std::os::unix::io::AsRawFd;
    unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) == 0 }
}

#[cfg(not(unix))]
fn try_lock(_file: &File) -> bool {
    true
}

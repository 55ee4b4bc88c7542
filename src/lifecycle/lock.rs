use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{Error, Result};

/// Exclusive advisory lock on a container name, released on drop.
///
/// Serialises mutating invocations that target the same name. The lock file
/// itself is left in place; only the `flock` matters.
#[derive(Debug)]
pub struct NameLock {
    _file: File,
    path: PathBuf,
}

impl NameLock {
    /// Block until the lock for `name` is held.
    pub fn acquire(dir: &Path, name: &str) -> Result<Self> {
        let (file, path) = open(dir, name)?;
        match try_lock(&file) {
            Ok(true) => {}
            Ok(false) => {
                info!(container = name, path = %path.display(), "waiting for another gpuctl to finish");
                lock_blocking(&file).map_err(|source| Error::Lock {
                    path: path.clone(),
                    source,
                })?;
            }
            Err(source) => return Err(Error::Lock { path, source }),
        }
        debug!(container = name, path = %path.display(), "lock acquired");
        Ok(Self { _file: file, path })
    }

    /// Take the lock only if nobody else holds it.
    pub fn try_acquire(dir: &Path, name: &str) -> Result<Option<Self>> {
        let (file, path) = open(dir, name)?;
        match try_lock(&file) {
            Ok(true) => Ok(Some(Self { _file: file, path })),
            Ok(false) => Ok(None),
            Err(source) => Err(Error::Lock { path, source }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn open(dir: &Path, name: &str) -> Result<(File, PathBuf)> {
    let safe: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' { c } else { '_' })
        .collect();
    let path = dir.join(format!("gpuctl-{safe}.lock"));
    let file = std::fs::create_dir_all(dir)
        .and_then(|_| {
            OpenOptions::new()
                .create(true)
                .truncate(false)
                .write(true)
                .open(&path)
        })
        .map_err(|source| Error::Lock {
            path: path.clone(),
            source,
        })?;
    Ok((file, path))
}

#[cfg(unix)]
fn try_lock(file: &File) -> io::Result<bool> {
    use std::os::unix::io::AsRawFd;

    // SAFETY: the descriptor belongs to `file`, which outlives the call.
    let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
    if rc == 0 {
        return Ok(true);
    }
    let err = io::Error::last_os_error();
    if err.raw_os_error() == Some(libc::EWOULDBLOCK) {
        Ok(false)
    } else {
        Err(err)
    }
}

#[cfg(unix)]
fn lock_blocking(file: &File) -> io::Result<()> {
    use std::os::unix::io::AsRawFd;

    loop {
        // SAFETY: as in `try_lock`.
        let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX) };
        if rc == 0 {
            return Ok(());
        }
        let err = io::Error::last_os_error();
        if err.kind() != io::ErrorKind::Interrupted {
            return Err(err);
        }
    }
}

#[cfg(not(unix))]
fn try_lock(_file: &File) -> io::Result<bool> {
    Ok(true)
}

#[cfg(not(unix))]
fn lock_blocking(_file: &File) -> io::Result<()> {
    Ok(())
}

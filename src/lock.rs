// Copyright 2024 FastLabs Developers
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Cross-process mutual exclusion around record emission.
//!
//! The lock is advisory and best effort: only other lock-aware processes
//! respect it, and a caller that cannot obtain it immediately writes without
//! it rather than blocking. The lock file is a plain empty marker whose path
//! is derived from the placeholder-free stem of the filename pattern, so it
//! stays put while the log files rotate.

use std::fs::File;
use std::fs::OpenOptions;
use std::path::PathBuf;

use crate::Error;
use crate::ErrorKind;

#[derive(Debug)]
pub(crate) struct LockFile {
    path: PathBuf,
}

impl LockFile {
    pub(crate) fn new(path: PathBuf) -> LockFile {
        LockFile { path }
    }

    /// Try to take the exclusive advisory lock without blocking.
    ///
    /// The lock is released when the returned guard drops, even when the
    /// caller bails out of emission early.
    pub(crate) fn acquire(&self) -> Result<LockGuard, Error> {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .open(&self.path)
            .map_err(|err| {
                Error::new(ErrorKind::LockUnavailable, "failed to open lock file")
                    .with_source(err)
                    .with_context("path", self.path.display())
            })?;
        sys::try_lock_exclusive(&file).map_err(|err| {
            Error::new(ErrorKind::LockUnavailable, "failed to take exclusive lock")
                .with_source(err)
                .with_context("path", self.path.display())
        })?;
        Ok(LockGuard { file })
    }
}

#[derive(Debug)]
pub(crate) struct LockGuard {
    file: File,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        // The fd close releases the lock anyway; the explicit unlock keeps
        // the window tight when the guard is held through a slow drop.
        let _ = sys::unlock(&self.file);
    }
}

#[cfg(unix)]
mod sys {
    use std::fs::File;
    use std::io;
    use std::os::fd::AsRawFd;

    pub(super) fn try_lock_exclusive(file: &File) -> io::Result<()> {
        let result = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
        if result < 0 {
            Err(io::Error::last_os_error())
        } else {
            Ok(())
        }
    }

    pub(super) fn unlock(file: &File) -> io::Result<()> {
        let result = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_UN) };
        if result < 0 {
            Err(io::Error::last_os_error())
        } else {
            Ok(())
        }
    }
}

// Platforms without flock(2) get marker files but no mutual exclusion.
#[cfg(not(unix))]
mod sys {
    use std::fs::File;
    use std::io;

    pub(super) fn try_lock_exclusive(_file: &File) -> io::Result<()> {
        Ok(())
    }

    pub(super) fn unlock(_file: &File) -> io::Result<()> {
        Ok(())
    }
}

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

use std::fs;
use std::fs::File;
use std::fs::OpenOptions;
use std::io;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;

use jiff::Zoned;

use crate::Error;
use crate::ErrorKind;
use crate::clock::Clock;
use crate::lock::LockFile;
use crate::pattern::FilenamePattern;
use crate::trap::DefaultTrap;
use crate::trap::Trap;

/// A writer that routes bytes into files named after the current instant.
///
/// On every record the writer formats its pattern for "now"; when the result
/// differs from the file currently open, the stream is switched and, if
/// retention is configured, outdated files are swept away.
#[derive(Debug)]
pub struct DateFileWriter {
    state: State,
    writer: Option<File>,
}

impl DateFileWriter {
    /// Creates a new [`DateFileWriterBuilder`].
    #[must_use]
    pub fn builder(pattern: impl Into<String>) -> DateFileWriterBuilder {
        DateFileWriterBuilder::new(pattern)
    }

    /// The compiled filename pattern this writer rolls on.
    pub fn pattern(&self) -> &FilenamePattern {
        &self.state.pattern
    }

    /// The path of the currently active log file, if any switch happened yet.
    pub fn current_path(&self) -> Option<&Path> {
        self.state.current_filename.as_deref()
    }

    /// Write one rendered record and flush it to the active log file.
    ///
    /// Performs the whole emission sequence: take the advisory cross-process
    /// lock (best effort), roll over if the pattern now names a different
    /// file, re-open the stream when a previous switch failed, then write
    /// and flush.
    pub fn write_record(&mut self, bytes: &[u8]) -> Result<(), Error> {
        let now = self.state.clock.now();
        // Lock contention or failure degrades to an unsynchronized write.
        let _guard = match &self.state.lock {
            Some(lock) => lock.acquire().ok(),
            None => None,
        };

        if self.writer.is_none() || self.state.should_rollover(&now)? {
            self.refresh_writer(&now)?;
        }

        match self.writer.as_mut() {
            Some(file) => {
                file.write_all(bytes).map_err(|err| {
                    Error::new(ErrorKind::FileOpenFailed, "failed to write log record")
                        .with_source(err)
                })?;
                file.flush().map_err(|err| {
                    Error::new(ErrorKind::FileOpenFailed, "failed to flush log record")
                        .with_source(err)
                })
            }
            None => Err(Error::new(ErrorKind::FileOpenFailed, "no active log file")),
        }
    }

    /// Flush the active stream, if one is open.
    pub fn flush(&mut self) -> Result<(), Error> {
        match self.writer.as_mut() {
            Some(file) => file.flush().map_err(|err| {
                Error::new(ErrorKind::FileOpenFailed, "failed to flush log stream")
                    .with_source(err)
            }),
            None => Ok(()),
        }
    }

    /// Close the active stream.
    ///
    /// Safe to call more than once. A later write reopens the file named by
    /// the pattern for that instant.
    pub fn close(&mut self) -> Result<(), Error> {
        self.close_stream()
    }

    pub(crate) fn report(&self, err: &Error) {
        self.state.trap.trap(err);
    }

    fn refresh_writer(&mut self, now: &Zoned) -> Result<(), Error> {
        let target = self.state.pattern.format(now)?;
        // Closing must never block the next record: a flush failure on the
        // outgoing stream is reported and forgotten.
        if let Err(err) = self.close_stream() {
            self.state.trap.trap(&err);
        }
        self.state.current_filename = Some(target.clone());
        let file = self.state.open_log_file(&target)?;
        self.writer = Some(file);
        if self.state.backup_count > 0 {
            self.state.delete_old_logs(&target);
        }
        Ok(())
    }

    fn close_stream(&mut self) -> Result<(), Error> {
        match self.writer.take() {
            Some(mut file) => file.flush().map_err(|err| {
                Error::new(ErrorKind::FileOpenFailed, "failed to flush log stream on close")
                    .with_source(err)
            }),
            None => Ok(()),
        }
    }
}

impl Drop for DateFileWriter {
    fn drop(&mut self) {
        if let Err(err) = self.flush() {
            self.state.trap.trap(&err);
        }
    }
}

/// A builder for configuring [`DateFileWriter`].
#[derive(Debug)]
pub struct DateFileWriterBuilder {
    // required
    pattern: String,

    // has default
    backup_count: usize,
    truncate: bool,
    delay: bool,
    cross_process_lock: bool,
    clock: Clock,
    trap: Box<dyn Trap>,
}

impl DateFileWriterBuilder {
    /// Creates a new [`DateFileWriterBuilder`] for a filename pattern like
    /// `"logs/app-%Y-%m-%d.log"`.
    #[must_use]
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            backup_count: 0,
            truncate: false,
            delay: false,
            cross_process_lock: false,
            clock: Clock::DefaultClock,
            trap: Box::new(DefaultTrap::default()),
        }
    }

    /// Set how many historical log files to keep next to the active one.
    ///
    /// Zero, the default, keeps everything: no file is ever deleted.
    #[must_use]
    pub fn max_backups(mut self, n: usize) -> Self {
        self.backup_count = n;
        self
    }

    /// Truncate instead of appending when a log file is opened.
    #[must_use]
    pub fn truncate(mut self) -> Self {
        self.truncate = true;
        self
    }

    /// Defer opening the first log file until the first record is written.
    #[must_use]
    pub fn delay(mut self) -> Self {
        self.delay = true;
        self
    }

    /// Guard every write with an exclusive advisory file lock, so multiple
    /// processes logging through the same pattern do not interleave partial
    /// records.
    ///
    /// Best effort: when the lock is held elsewhere or unsupported, the
    /// write proceeds without it rather than blocking.
    #[must_use]
    pub fn cross_process_lock(mut self, enabled: bool) -> Self {
        self.cross_process_lock = enabled;
        self
    }

    /// Set the trap for errors swallowed during emission.
    pub fn trap(mut self, trap: impl Into<Box<dyn Trap>>) -> Self {
        self.trap = trap.into();
        self
    }

    #[cfg(test)]
    fn clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Builds the [`DateFileWriter`].
    ///
    /// # Errors
    ///
    /// Return an error if the pattern cannot be compiled, or if the initial
    /// log file cannot be opened (unless [`delay`](Self::delay) was set).
    pub fn build(self) -> Result<DateFileWriter, Error> {
        let Self {
            pattern,
            backup_count,
            truncate,
            delay,
            cross_process_lock,
            clock,
            trap,
        } = self;

        let pattern = FilenamePattern::new(pattern)?;
        let lock = if cross_process_lock {
            Some(LockFile::new(pattern.lock_path().to_path_buf()))
        } else {
            None
        };

        let state = State {
            pattern,
            current_filename: None,
            backup_count,
            truncate,
            lock,
            clock,
            trap,
        };
        let mut writer = DateFileWriter {
            state,
            writer: None,
        };

        if !delay {
            let now = writer.state.clock.now();
            writer.refresh_writer(&now)?;
        }

        Ok(writer)
    }
}

#[derive(Debug)]
struct State {
    pattern: FilenamePattern,
    current_filename: Option<PathBuf>,
    backup_count: usize,
    truncate: bool,
    lock: Option<LockFile>,
    clock: Clock,
    trap: Box<dyn Trap>,
}

impl State {
    fn should_rollover(&self, now: &Zoned) -> Result<bool, Error> {
        let target = self.pattern.format(now)?;
        Ok(self.current_filename.as_deref() != Some(target.as_path()))
    }

    fn open_log_file(&self, path: &Path) -> Result<File, Error> {
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() {
                fs::create_dir_all(dir).map_err(|err| {
                    Error::new(ErrorKind::FileOpenFailed, "failed to create log directory")
                        .with_source(err)
                        .with_context("dir", dir.display())
                })?;
            }
        }

        let mut options = OpenOptions::new();
        if self.truncate {
            options.write(true).truncate(true);
        } else {
            options.append(true);
        }
        options.create(true).open(path).map_err(|err| {
            Error::new(ErrorKind::FileOpenFailed, "failed to open log file")
                .with_source(err)
                .with_context("path", path.display())
        })
    }

    fn delete_old_logs(&self, current: &Path) {
        if let Err(err) = self.try_delete_old_logs(current) {
            self.trap.trap(&err);
        }
    }

    fn try_delete_old_logs(&self, current: &Path) -> Result<(), Error> {
        let log_dir = match current.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        let read_dir = fs::read_dir(log_dir).map_err(|err| {
            Error::new(ErrorKind::CleanupFailed, "failed to read log directory")
                .with_source(err)
                .with_context("dir", log_dir.display())
        })?;

        let mut files = read_dir
            .filter_map(|entry| {
                let entry = entry.ok()?;
                let metadata = entry.metadata().ok()?;
                // The writer only creates regular files, so directories and
                // symlinks are never deletion candidates.
                if !metadata.is_file() {
                    return None;
                }
                let file_name = entry.file_name();
                // If the filename is not a UTF-8 string, skip it.
                let file_name = file_name.to_str()?;
                if !self.pattern.matches(file_name) {
                    return None;
                }
                let modified = metadata.modified().ok()?;
                Some((entry.path(), modified))
            })
            .collect::<Vec<_>>();

        // Newest first. Entries sharing a modification time stay in whatever
        // order the directory listing produced.
        files.sort_by(|a, b| b.1.cmp(&a.1));

        // One slot past backup_count is reserved for the file that was just
        // opened.
        for (path, _) in files.iter().skip(self.backup_count + 1) {
            if path.file_name() == current.file_name() {
                continue;
            }
            if let Err(err) = fs::remove_file(path) {
                // Vanishing between listing and deletion is not a failure.
                if err.kind() == io::ErrorKind::NotFound {
                    continue;
                }
                self.trap.trap(
                    &Error::new(ErrorKind::CleanupFailed, "failed to remove old log file")
                        .with_source(err)
                        .with_context("path", path.display()),
                );
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::fs::File;
    use std::path::Path;
    use std::str::FromStr;
    use std::time::Duration;
    use std::time::SystemTime;

    use jiff::Zoned;
    use tempfile::TempDir;

    use crate::ErrorKind;
    use crate::clock::Clock;
    use crate::clock::ManualClock;
    use crate::rolling::DateFileWriter;

    fn start_time() -> Zoned {
        Zoned::from_str("2024-08-10T14:00:00[UTC]").unwrap()
    }

    fn writer_at(dir: &Path, pattern: &str, start: Zoned) -> DateFileWriter {
        let pattern = dir.join(pattern);
        DateFileWriter::builder(pattern.to_str().unwrap())
            .clock(Clock::ManualClock(ManualClock::new(start)))
            .build()
            .unwrap()
    }

    fn list_names(dir: &Path) -> Vec<String> {
        let mut names = fs::read_dir(dir)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_str().unwrap().to_string())
            .collect::<Vec<_>>();
        names.sort();
        names
    }

    #[test]
    fn test_no_rollover_within_one_bucket() {
        let temp_dir = TempDir::new().unwrap();
        let mut writer = writer_at(temp_dir.path(), "app-%Y-%m-%d_%H.log", start_time());

        writer.write_record(b"first\n").unwrap();
        writer.state.clock.set_now(start_time() + jiff::Span::new().minutes(42));
        writer.write_record(b"second\n").unwrap();

        assert_eq!(list_names(temp_dir.path()), vec!["app-2024-08-10_14.log"]);
        let content = fs::read_to_string(temp_dir.path().join("app-2024-08-10_14.log")).unwrap();
        assert_eq!(content, "first\nsecond\n");
    }

    #[test]
    fn test_rollover_on_bucket_change() {
        let temp_dir = TempDir::new().unwrap();
        let mut writer = writer_at(temp_dir.path(), "logs/app-%Y-%m-%d_%H.log", start_time());

        writer.write_record(b"first\n").unwrap();
        writer.state.clock.set_now(start_time() + jiff::Span::new().hours(1));
        writer.write_record(b"second\n").unwrap();

        let log_dir = temp_dir.path().join("logs");
        assert_eq!(
            list_names(&log_dir),
            vec!["app-2024-08-10_14.log", "app-2024-08-10_15.log"]
        );
        let first = fs::read_to_string(log_dir.join("app-2024-08-10_14.log")).unwrap();
        let second = fs::read_to_string(log_dir.join("app-2024-08-10_15.log")).unwrap();
        assert_eq!(first, "first\n");
        assert_eq!(second, "second\n");
    }

    fn plant_stale_files(dir: &Path, names: &[&str]) {
        // Oldest first, one minute apart, all older than the active file.
        let base = SystemTime::now() - Duration::from_secs(3600);
        for (i, name) in names.iter().enumerate() {
            let path = dir.join(name);
            fs::write(&path, name).unwrap();
            let mtime = base + Duration::from_secs(i as u64 * 60);
            File::options()
                .write(true)
                .open(&path)
                .unwrap()
                .set_modified(mtime)
                .unwrap();
        }
    }

    #[test]
    fn test_sweep_keeps_backups_plus_active() {
        let temp_dir = TempDir::new().unwrap();
        let stale = [
            "app-2024-08-01.log",
            "app-2024-08-02.log",
            "app-2024-08-03.log",
            "app-2024-08-04.log",
            "app-2024-08-05.log",
        ];
        plant_stale_files(temp_dir.path(), &stale);
        let strangers = [
            "app-2024-8-06.log",
            "application-2024-08-06.log",
            "app-2024-08-06.txt",
        ];
        for name in strangers {
            fs::write(temp_dir.path().join(name), name).unwrap();
        }

        let mut writer = DateFileWriter::builder(
            temp_dir.path().join("app-%Y-%m-%d.log").to_str().unwrap(),
        )
        .max_backups(2)
        .clock(Clock::ManualClock(ManualClock::new(start_time())))
        .build()
        .unwrap();
        writer.write_record(b"fresh\n").unwrap();

        // Two newest stale files plus the active one; strangers untouched.
        assert_eq!(
            list_names(temp_dir.path()),
            vec![
                "app-2024-08-04.log",
                "app-2024-08-05.log",
                "app-2024-08-06.txt",
                "app-2024-08-10.log",
                "app-2024-8-06.log",
                "application-2024-08-06.log",
            ]
        );
    }

    #[test]
    fn test_sweep_disabled_by_default() {
        let temp_dir = TempDir::new().unwrap();
        let stale = [
            "app-2024-08-01.log",
            "app-2024-08-02.log",
            "app-2024-08-03.log",
            "app-2024-08-04.log",
            "app-2024-08-05.log",
        ];
        plant_stale_files(temp_dir.path(), &stale);

        let mut writer = writer_at(temp_dir.path(), "app-%Y-%m-%d.log", start_time());
        writer.write_record(b"fresh\n").unwrap();

        assert_eq!(list_names(temp_dir.path()).len(), stale.len() + 1);
    }

    #[test]
    fn test_close_is_idempotent_and_reopens_on_write() {
        let temp_dir = TempDir::new().unwrap();
        let mut writer = writer_at(temp_dir.path(), "app-%Y-%m-%d.log", start_time());

        writer.write_record(b"one\n").unwrap();
        writer.close().unwrap();
        writer.close().unwrap();

        writer.write_record(b"two\n").unwrap();
        let content = fs::read_to_string(temp_dir.path().join("app-2024-08-10.log")).unwrap();
        assert_eq!(content, "one\ntwo\n");
    }

    #[test]
    fn test_truncate_mode_discards_previous_content() {
        let temp_dir = TempDir::new().unwrap();
        let pattern = temp_dir.path().join("app-%Y-%m-%d.log");
        let mut writer = DateFileWriter::builder(pattern.to_str().unwrap())
            .truncate()
            .clock(Clock::ManualClock(ManualClock::new(start_time())))
            .build()
            .unwrap();

        writer.write_record(b"one\n").unwrap();
        writer.close().unwrap();
        writer.write_record(b"two\n").unwrap();

        let content = fs::read_to_string(temp_dir.path().join("app-2024-08-10.log")).unwrap();
        assert_eq!(content, "two\n");
    }

    #[test]
    fn test_failed_open_is_recoverable() {
        let temp_dir = TempDir::new().unwrap();
        // A plain file where the log directory should be makes every open
        // fail until it is removed.
        let blocker = temp_dir.path().join("blocked");
        fs::write(&blocker, b"").unwrap();

        let pattern = temp_dir.path().join("blocked/app-%Y.log");
        let mut writer = DateFileWriter::builder(pattern.to_str().unwrap())
            .delay()
            .clock(Clock::ManualClock(ManualClock::new(start_time())))
            .build()
            .unwrap();

        let err = writer.write_record(b"lost\n").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FileOpenFailed);

        fs::remove_file(&blocker).unwrap();
        writer.write_record(b"kept\n").unwrap();
        let content =
            fs::read_to_string(temp_dir.path().join("blocked").join("app-2024.log")).unwrap();
        assert_eq!(content, "kept\n");
    }

    #[test]
    fn test_contended_lock_still_writes() {
        let temp_dir = TempDir::new().unwrap();
        let pattern = temp_dir.path().join("app-%Y-%m-%d.log");
        let mut writer = DateFileWriter::builder(pattern.to_str().unwrap())
            .cross_process_lock(true)
            .clock(Clock::ManualClock(ManualClock::new(start_time())))
            .build()
            .unwrap();

        // Hold the lock through a second open description, as a foreign
        // process would.
        let lock = crate::lock::LockFile::new(writer.pattern().lock_path().to_path_buf());
        let _held = lock.acquire().unwrap();

        writer.write_record(b"degraded\n").unwrap();
        let content = fs::read_to_string(temp_dir.path().join("app-2024-08-10.log")).unwrap();
        assert_eq!(content, "degraded\n");
    }
}

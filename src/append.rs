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

use std::sync::Mutex;
use std::sync::MutexGuard;

use log::Metadata;
use log::Record;

use crate::Error;
use crate::layout::Layout;
use crate::layout::PlainTextLayout;
use crate::rolling::DateFileWriter;
use crate::rolling::DateFileWriterBuilder;
use crate::trap::Trap;

/// A builder to configure and create a [`DateFile`] appender.
#[derive(Debug)]
pub struct DateFileBuilder {
    builder: DateFileWriterBuilder,
    layout: Box<dyn Layout>,
}

impl DateFileBuilder {
    /// Create a new date file appender builder for a filename pattern like
    /// `"logs/app-%Y-%m-%d.log"`.
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            builder: DateFileWriterBuilder::new(pattern),
            layout: Box::new(PlainTextLayout::default()),
        }
    }

    /// Set the layout for the logs.
    ///
    /// Default to [`PlainTextLayout`].
    pub fn layout(mut self, layout: impl Into<Box<dyn Layout>>) -> Self {
        self.layout = layout.into();
        self
    }

    /// Set the trap for handling errors during logging.
    ///
    /// Default to [`DefaultTrap`](crate::trap::DefaultTrap).
    pub fn trap(mut self, trap: impl Into<Box<dyn Trap>>) -> Self {
        self.builder = self.builder.trap(trap);
        self
    }

    /// Set how many historical log files to keep next to the active one.
    ///
    /// Zero, the default, keeps everything: no file is ever deleted.
    pub fn max_backups(mut self, n: usize) -> Self {
        self.builder = self.builder.max_backups(n);
        self
    }

    /// Truncate instead of appending when a log file is opened.
    pub fn truncate(mut self) -> Self {
        self.builder = self.builder.truncate();
        self
    }

    /// Defer opening the first log file until the first record is emitted.
    pub fn delay(mut self) -> Self {
        self.builder = self.builder.delay();
        self
    }

    /// Guard every emission with an exclusive advisory file lock shared by
    /// all processes logging through the same pattern.
    ///
    /// Best effort: a held or unsupported lock degrades to an
    /// unsynchronized write instead of blocking or failing.
    pub fn cross_process_lock(mut self, enabled: bool) -> Self {
        self.builder = self.builder.cross_process_lock(enabled);
        self
    }

    /// Build the [`DateFile`] appender.
    ///
    /// # Errors
    ///
    /// Return an error if either:
    ///
    /// * The filename pattern cannot be compiled.
    /// * The initial log file cannot be opened, unless
    ///   [`delay`](Self::delay) was set.
    pub fn build(self) -> Result<DateFile, Error> {
        let DateFileBuilder { builder, layout } = self;
        let writer = builder.build()?;
        Ok(DateFile::new(writer, layout))
    }
}

/// An appender that writes log records to files named after the current
/// instant.
///
/// `DateFile` implements [`log::Log`]: emission never returns an error to
/// the application. Failures while switching, sweeping, or writing are
/// routed to the configured [`Trap`] and the affected record is dropped;
/// the next record retries from scratch.
#[derive(Debug)]
pub struct DateFile {
    writer: Mutex<DateFileWriter>,
    layout: Box<dyn Layout>,
}

impl DateFile {
    fn new(writer: DateFileWriter, layout: Box<dyn Layout>) -> Self {
        let writer = Mutex::new(writer);
        Self { writer, layout }
    }

    fn writer(&self) -> MutexGuard<'_, DateFileWriter> {
        self.writer.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Close the active log file.
    ///
    /// Idempotent. Emitting after close simply reopens the file named by the
    /// pattern at that instant.
    pub fn close(&self) {
        let mut writer = self.writer();
        if let Err(err) = writer.close() {
            writer.report(&err);
        }
    }
}

impl log::Log for DateFile {
    fn enabled(&self, _metadata: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        let mut bytes = match self.layout.format(record) {
            Ok(bytes) => bytes,
            Err(err) => {
                self.writer().report(&err);
                return;
            }
        };
        bytes.push(b'\n');

        // The log facade does not serialize calls into one sink, so the
        // whole emit sequence runs under the appender's own mutex.
        let mut writer = self.writer();
        if let Err(err) = writer.write_record(&bytes) {
            writer.report(&err);
        }
    }

    fn flush(&self) {
        let mut writer = self.writer();
        if let Err(err) = writer.flush() {
            writer.report(&err);
        }
    }
}

impl Drop for DateFile {
    fn drop(&mut self) {
        let writer = self.writer.get_mut().unwrap_or_else(|e| e.into_inner());
        let _ = writer.flush();
    }
}

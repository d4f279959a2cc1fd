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

//! Logdate is a file appender for the [`log`] crate that derives filenames
//! from the current timestamp.
//!
//! # Overview
//!
//! An appender is configured with a strftime-style filename pattern such as
//! `"logs/app-%Y-%m-%d.log"`. Every record is written to the file the
//! pattern names at that instant; when the name changes, the appender rolls
//! over to the new file, and files beyond the configured backup count are
//! pruned. Records are lost rather than thrown: failures during emission go
//! to a caller-supplied [`Trap`] so logging can never crash its host.
//!
//! # Examples
//!
//! ```no_run
//! use logdate::DateFileBuilder;
//!
//! let appender = DateFileBuilder::new("logs/app-%Y-%m-%d.log")
//!     .max_backups(7) // keep one week
//!     .build()
//!     .unwrap();
//!
//! log::set_boxed_logger(Box::new(appender)).unwrap();
//! log::set_max_level(log::LevelFilter::Info);
//!
//! log::info!("This record lands in today's file.");
//! ```
//!
//! Several processes may share one pattern by opting into the advisory
//! cross-process lock:
//!
//! ```no_run
//! use logdate::DateFileBuilder;
//!
//! let appender = DateFileBuilder::new("logs/worker-%Y-%m-%d_%H.log")
//!     .cross_process_lock(true)
//!     .build()
//!     .unwrap();
//! ```

#![cfg_attr(docsrs, feature(doc_auto_cfg))]

pub mod layout;
pub mod trap;

mod append;
mod clock;
mod error;
mod lock;
mod pattern;
mod rolling;

pub use self::append::DateFile;
pub use self::append::DateFileBuilder;
pub use self::error::Error;
pub use self::error::ErrorKind;
pub use self::layout::Layout;
pub use self::pattern::FilenamePattern;
pub use self::rolling::DateFileWriter;
pub use self::rolling::DateFileWriterBuilder;
pub use self::trap::Trap;

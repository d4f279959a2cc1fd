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

use std::fmt::Write;

use jiff::Zoned;

use crate::Error;
use crate::ErrorKind;
use crate::layout::Layout;

/// A layout that formats log record as plain text.
///
/// Output format:
///
/// ```text
/// 2024-08-11T22:44:57.172105+08:00 ERROR my_app: src/main.rs:24 Hello error!
/// 2024-08-11T22:44:57.172219+08:00  WARN my_app: src/main.rs:25 Hello warn!
/// 2024-08-11T22:44:57.172276+08:00  INFO my_app: src/main.rs:26 Hello info!
/// ```
#[derive(Debug, Clone, Default)]
#[non_exhaustive]
pub struct PlainTextLayout {}

impl Layout for PlainTextLayout {
    fn format(&self, record: &log::Record) -> Result<Vec<u8>, Error> {
        let mut text = String::new();

        let time = Zoned::now().strftime("%Y-%m-%dT%H:%M:%S.%6f%:z");
        let level = record.level();
        let target = record.target();
        let file = record.file().unwrap_or_default();
        let line = record.line().unwrap_or_default();
        let message = record.args();
        write!(
            &mut text,
            "{time} {level:>5} {target}: {file}:{line} {message}"
        )
        .map_err(|err| {
            Error::new(ErrorKind::FormatFailed, "failed to format log record").with_source(err)
        })?;

        Ok(text.into_bytes())
    }
}

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

use std::path::Path;
use std::path::PathBuf;

use jiff::Zoned;
use jiff::fmt::strtime;
use regex::Regex;

use crate::Error;
use crate::ErrorKind;

/// A compiled filename pattern.
///
/// A pattern is literal text interleaved with strftime-style placeholders,
/// e.g. `"logs/app-%Y-%m-%d.log"`. Compiling it yields two artifacts: a
/// formatter that produces the concrete filename for an instant, and a
/// matcher that tests whether a directory entry could have been produced by
/// this pattern at some past instant.
///
/// Recognized placeholders:
///
/// | placeholder | meaning | matched as |
/// |---|---|---|
/// | `%Y` / `%y` | year with/without century | 4/2 digits |
/// | `%m` `%d` `%H` `%I` `%M` `%S` | month, day, hour (24h/12h), minute, second | 2 digits |
/// | `%j` | day of year | 3 digits |
/// | `%U` / `%W` | week of year (Sunday/Monday based) | 2 digits |
/// | `%a` / `%A` | weekday name, abbreviated/full | 3 letters / letters |
/// | `%b` / `%B` | month name, abbreviated/full | 3 letters / letters |
/// | `%p` | AM/PM marker | `AM` or `PM` |
///
/// Any other `%x` sequence is not expanded: it stays verbatim in the
/// generated filename and must appear verbatim in a filename for the matcher
/// to accept it.
#[derive(Debug)]
pub struct FilenamePattern {
    pattern: String,
    strftime: String,
    matcher: Regex,
    lock_path: PathBuf,
}

enum Token<'a> {
    Literal(&'a str),
    Placeholder(char),
}

fn placeholder_fragment(spec: char) -> Option<&'static str> {
    Some(match spec {
        'Y' => r"\d{4}",
        'y' | 'm' | 'd' | 'H' | 'I' | 'M' | 'S' | 'U' | 'W' => r"\d{2}",
        'j' => r"\d{3}",
        'a' | 'b' => r"\w{3}",
        'A' | 'B' => r"\w+",
        'p' => "(AM|PM)",
        _ => return None,
    })
}

// Literal runs keep unrecognized '%' sequences, so escaping for the matcher
// and doubling '%' for the formatter both happen per token, never on text
// that already went through the other substitution.
fn tokenize(input: &str) -> Vec<Token<'_>> {
    let mut tokens = Vec::new();
    let mut literal_start = 0;
    let mut chars = input.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        if c != '%' {
            continue;
        }
        if let Some(&(_, spec)) = chars.peek() {
            if placeholder_fragment(spec).is_some() {
                if literal_start < i {
                    tokens.push(Token::Literal(&input[literal_start..i]));
                }
                tokens.push(Token::Placeholder(spec));
                chars.next();
                literal_start = i + '%'.len_utf8() + spec.len_utf8();
            }
        }
    }
    if literal_start < input.len() {
        tokens.push(Token::Literal(&input[literal_start..]));
    }
    tokens
}

impl FilenamePattern {
    /// Compile a filename pattern.
    ///
    /// # Errors
    ///
    /// Return an error if the pattern is empty or has no file name component.
    /// A pattern without any recognized placeholder is allowed: it names one
    /// eternal file that never rolls over.
    pub fn new(pattern: impl Into<String>) -> Result<FilenamePattern, Error> {
        let pattern = pattern.into();
        if pattern.is_empty() {
            return Err(Error::new(
                ErrorKind::InvalidPattern,
                "filename pattern must not be empty",
            ));
        }

        let name = match pattern.rfind('/') {
            Some(i) => &pattern[i + 1..],
            None => pattern.as_str(),
        };
        if name.is_empty() {
            return Err(Error::new(
                ErrorKind::InvalidPattern,
                "filename pattern must have a file name component",
            )
            .with_context("pattern", &pattern));
        }

        let mut strftime = String::with_capacity(pattern.len());
        for token in tokenize(&pattern) {
            match token {
                Token::Literal(text) => strftime.push_str(&text.replace('%', "%%")),
                Token::Placeholder(spec) => {
                    strftime.push('%');
                    strftime.push(spec);
                }
            }
        }

        // The matcher covers the file name component only: it is applied to
        // bare directory entry names during retention sweeps.
        let mut expr = String::from("^");
        for token in tokenize(name) {
            match token {
                Token::Literal(text) => expr.push_str(&regex::escape(text)),
                Token::Placeholder(spec) => {
                    let fragment = placeholder_fragment(spec)
                        .expect("tokenizer yields only recognized placeholders");
                    expr.push_str(fragment);
                }
            }
        }
        expr.push('$');
        let matcher = Regex::new(&expr).map_err(|err| {
            Error::new(ErrorKind::InvalidPattern, "failed to compile filename matcher")
                .with_source(err)
                .with_context("pattern", &pattern)
        })?;

        let lock_path = derive_lock_path(&pattern, name);

        Ok(FilenamePattern {
            pattern,
            strftime,
            matcher,
            lock_path,
        })
    }

    /// Return the pattern text this was compiled from.
    pub fn as_str(&self) -> &str {
        &self.pattern
    }

    /// Produce the concrete filename for the given instant.
    pub fn format(&self, now: &Zoned) -> Result<PathBuf, Error> {
        strtime::format(&self.strftime, now)
            .map(PathBuf::from)
            .map_err(|err| {
                Error::new(ErrorKind::FormatFailed, "failed to format filename pattern")
                    .with_source(err)
                    .with_context("pattern", &self.pattern)
            })
    }

    /// Test whether a directory entry name could have been produced by this
    /// pattern at some instant.
    pub fn matches(&self, file_name: &str) -> bool {
        self.matcher.is_match(file_name)
    }

    /// The fixed path of the lock file guarding cross-process emission.
    ///
    /// Derived from the placeholder-free stem of the pattern, so all instants
    /// of the same pattern share one lock that never rotates with the log
    /// file itself.
    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }
}

fn derive_lock_path(pattern: &str, name: &str) -> PathBuf {
    // Only the static directory prefix is usable: a dated directory portion
    // would rotate the lock away from other processes.
    let static_prefix = &pattern[..pattern.find('%').unwrap_or(pattern.len())];
    let dir = match static_prefix.rfind('/') {
        Some(i) => &pattern[..i],
        None => "",
    };

    let stem = match name.find('%') {
        Some(i) => &name[..i],
        None => Path::new(name)
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or(name),
    };
    let stem = stem.trim_end_matches(['-', '_', '.']);
    let stem = if stem.is_empty() { "log" } else { stem };

    let file_name = format!("{stem}.lock");
    if dir.is_empty() {
        PathBuf::from(file_name)
    } else {
        Path::new(dir).join(file_name)
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use jiff::Zoned;

    use super::FilenamePattern;

    fn instant() -> Zoned {
        Zoned::from_str("2024-01-15T14:30:45[UTC]").unwrap()
    }

    #[test]
    fn test_format_daily_pattern() {
        let pattern = FilenamePattern::new("app-%Y-%m-%d.log").unwrap();
        let name = pattern.format(&instant()).unwrap();
        assert_eq!(name.to_str().unwrap(), "app-2024-01-15.log");
    }

    #[test]
    fn test_format_keeps_directory_portion() {
        let pattern = FilenamePattern::new("logs/%Y/app-%m-%d_%H.log").unwrap();
        let name = pattern.format(&instant()).unwrap();
        assert_eq!(name.to_str().unwrap(), "logs/2024/app-01-15_14.log");
    }

    #[test]
    fn test_matcher_accepts_and_rejects() {
        let pattern = FilenamePattern::new("app-%Y-%m-%d.log").unwrap();
        assert!(pattern.matches("app-2024-01-15.log"));
        assert!(!pattern.matches("app-2024-1-15.log"));
        assert!(!pattern.matches("application-2024-01-15.log"));
        assert!(!pattern.matches("app-2024-01-15.txt"));
        assert!(!pattern.matches("app-2024-01-15.log.gz"));
    }

    #[test]
    fn test_matcher_ignores_directory_portion() {
        let pattern = FilenamePattern::new("logs/app-%Y-%m-%d.log").unwrap();
        assert!(pattern.matches("app-2024-01-15.log"));
        assert!(!pattern.matches("logs/app-2024-01-15.log"));
    }

    #[test]
    fn test_format_round_trips_through_matcher() {
        for text in [
            "app-%Y-%m-%d.log",
            "%Y%m%d-%H%M%S.log",
            "week-%U-day-%j.log",
            "%A-%d-%B-%p.log",
            "hour-%I%p-%a-%b.log",
        ] {
            let pattern = FilenamePattern::new(text).unwrap();
            let name = pattern.format(&instant()).unwrap();
            let name = name.file_name().unwrap().to_str().unwrap();
            assert!(pattern.matches(name), "{name:?} should match {text:?}");
        }
    }

    #[test]
    fn test_unrecognized_placeholder_passes_through() {
        let pattern = FilenamePattern::new("app-%Q-%Y.log").unwrap();
        let name = pattern.format(&instant()).unwrap();
        assert_eq!(name.to_str().unwrap(), "app-%Q-2024.log");
        assert!(pattern.matches("app-%Q-2024.log"));
        assert!(!pattern.matches("app-X-2024.log"));
    }

    #[test]
    fn test_constant_pattern_names_one_eternal_file() {
        let pattern = FilenamePattern::new("app.log").unwrap();
        assert_eq!(pattern.format(&instant()).unwrap().to_str().unwrap(), "app.log");
        assert!(pattern.matches("app.log"));
        assert!(!pattern.matches("app2.log"));
    }

    #[test]
    fn test_empty_pattern_is_rejected() {
        let err = FilenamePattern::new("").unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::InvalidPattern);

        let err = FilenamePattern::new("logs/").unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::InvalidPattern);
    }

    #[test]
    fn test_literal_dot_is_not_a_wildcard() {
        let pattern = FilenamePattern::new("app.%Y.log").unwrap();
        assert!(pattern.matches("app.2024.log"));
        assert!(!pattern.matches("appx2024xlog"));
    }

    #[test]
    fn test_lock_path_is_stable_and_placeholder_free() {
        let pattern = FilenamePattern::new("app-%Y-%m-%d.log").unwrap();
        assert_eq!(pattern.lock_path().to_str().unwrap(), "app.lock");

        let pattern = FilenamePattern::new("logs/app-%Y.log").unwrap();
        assert_eq!(pattern.lock_path().to_str().unwrap(), "logs/app.lock");

        let pattern = FilenamePattern::new("%Y-%m-%d.log").unwrap();
        assert_eq!(pattern.lock_path().to_str().unwrap(), "log.lock");

        let pattern = FilenamePattern::new("app.log").unwrap();
        assert_eq!(pattern.lock_path().to_str().unwrap(), "app.lock");
    }
}

//! Persistence for administrator overrides.
//!
//! Overrides live in a plain `key=value` file so operators can inspect and
//! edit them with nothing but a text editor:
//!
//! ```text
//! # lines starting with `#` or `!` are comments
//! web.port=9090
//! web.motd=first line
//! \tsecond line
//! ```
//!
//! Values keep everything after the first `=` (leading whitespace trimmed).
//! A line starting with a tab continues the previous value; one tab is
//! stripped and the remainder joins with a newline. Writes go through a
//! temp-file rename so a crash never leaves a half-written file, and a
//! sibling `.lock` directory serializes concurrent writers.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{io_err, ResolveError};

/// Retry schedule for lock acquisition, in milliseconds.
const LOCK_BACKOFF_MS: [u64; 6] = [100, 200, 300, 500, 700, 1000];

/// Loads the overrides file at `path`.
///
/// A missing file is an empty override set, not an error.
pub fn load(path: &Path) -> Result<BTreeMap<String, String>, ResolveError> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
        Err(e) => return Err(io_err(path, e)),
    };
    parse(&contents, path)
}

/// Writes the full override set to `path`, replacing whatever was there.
pub fn save(path: &Path, entries: &BTreeMap<String, String>) -> Result<(), ResolveError> {
    let mut out = String::new();
    for (key, value) in entries {
        for (i, segment) in value.split('\n').enumerate() {
            if i == 0 {
                out.push_str(key);
                out.push('=');
            } else {
                out.push('\t');
            }
            out.push_str(segment);
            out.push('\n');
        }
    }
    write_atomic(path, &out)?;
    tracing::debug!("saved {} overrides to {}", entries.len(), path.display());
    Ok(())
}

fn parse(contents: &str, path: &Path) -> Result<BTreeMap<String, String>, ResolveError> {
    let mut entries: BTreeMap<String, String> = BTreeMap::new();
    let mut current: Option<String> = None;

    for (idx, line) in contents.lines().enumerate() {
        if let Some(rest) = line.strip_prefix('\t') {
            match current.as_ref() {
                Some(key) => {
                    if let Some(value) = entries.get_mut(key) {
                        value.push('\n');
                        value.push_str(rest);
                    }
                    continue;
                }
                None => {
                    return Err(ResolveError::Parse {
                        path: path.to_path_buf(),
                        line: idx + 1,
                        reason: "continuation line without a preceding entry".into(),
                    });
                }
            }
        }

        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with('!') {
            current = None;
            continue;
        }

        match line.split_once('=') {
            Some((raw_key, raw_value)) => {
                let key = raw_key.trim();
                if key.is_empty() {
                    return Err(ResolveError::Parse {
                        path: path.to_path_buf(),
                        line: idx + 1,
                        reason: "missing key before `=`".into(),
                    });
                }
                entries.insert(key.to_owned(), raw_value.trim_start().to_owned());
                current = Some(key.to_owned());
            }
            None => {
                return Err(ResolveError::Parse {
                    path: path.to_path_buf(),
                    line: idx + 1,
                    reason: "expected `key=value`".into(),
                });
            }
        }
    }
    Ok(entries)
}

/// Writes `contents` to a `.tmp` sibling, then renames over `path`.
fn write_atomic(path: &Path, contents: &str) -> Result<(), ResolveError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
    }
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, contents).map_err(|e| io_err(&tmp, e))?;
    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(io_err(path, e));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Advisory lock
// ---------------------------------------------------------------------------

/// Held while one process reads, edits, and rewrites the overrides file.
///
/// The lock is a sibling `.lock` directory; `create_dir` is atomic on every
/// platform we run on, so whoever creates it owns the file until drop.
#[derive(Debug)]
pub struct FileLock {
    path: PathBuf,
}

impl FileLock {
    /// Acquires the lock for `target`, retrying with backoff before giving
    /// up with [`ResolveError::Locked`].
    pub fn acquire(target: &Path) -> Result<Self, ResolveError> {
        Self::acquire_with_backoff(target, &LOCK_BACKOFF_MS)
    }

    fn acquire_with_backoff(target: &Path, backoff_ms: &[u64]) -> Result<Self, ResolveError> {
        let lock_path = target.with_extension("lock");
        if let Some(parent) = lock_path.parent() {
            fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
        }
        let mut delays = backoff_ms.iter();
        loop {
            match fs::create_dir(&lock_path) {
                Ok(()) => return Ok(Self { path: lock_path }),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => match delays.next() {
                    Some(ms) => std::thread::sleep(Duration::from_millis(*ms)),
                    None => {
                        return Err(ResolveError::Locked {
                            path: target.to_path_buf(),
                        });
                    }
                },
                Err(e) => return Err(io_err(&lock_path, e)),
            }
        }
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        let _ = fs::remove_dir(&self.path);
    }
}

//! Filesystem driver.
//!
//! One file per key at `path/<group>/.../<prefix><key>`, holding the absolute
//! expiry timestamp on the first line (0 = never) and the payload after it.
//! Writes take an exclusive advisory lock, reads a shared one. Expired files
//! are treated as misses and left in place until a delete, clear or sweep.
//!
//! Groups map to directories, so `clear_group` unlinks the matching files
//! instead of bumping a generation token. There is no atomic read-modify-write
//! on plain files: `increment`/`decrement` are unsupported.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;
use walkdir::WalkDir;

use crate::cache::base::{
    decode_value, encode_value, GroupToken, HandlerBase, PATH_BREAKING_CHARACTERS,
};
use crate::cache::entry::{current_timestamp, expiry_from_ttl};
use crate::cache::handler::{Capabilities, CacheHandler, HandlerInfo};
use crate::config::{CacheConfig, FileConfig};
use crate::error::{CacheError, Result};

const DRIVER: &str = "file";

pub struct FileHandler {
    base: HandlerBase,
    options: FileConfig,
}

impl FileHandler {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            base: HandlerBase::new(DRIVER, config).with_reserved(PATH_BREAKING_CHARACTERS),
            options: config.file.clone(),
        }
    }

    fn entry_path(&self, key: &str) -> Result<PathBuf> {
        let sanitized = self.base.sanitize_key(key)?;
        let mut path = self.options.path.clone();
        for group in self.base.groups() {
            path.push(group);
        }
        path.push(format!("{}{}", self.base.prefix(), sanitized));
        Ok(path)
    }

    /// With `serialize` off only strings are accepted, written verbatim, so
    /// every payload reads back as the string it was.
    fn encode(&self, value: &Value) -> Result<String> {
        if self.options.serialize {
            return encode_value(value);
        }
        match value {
            Value::String(text) => Ok(text.clone()),
            other => Err(CacheError::Validation(format!(
                "file cache stores only strings when serialize is off, got {other}"
            ))),
        }
    }

    fn decode(&self, payload: &str) -> Result<Value> {
        if self.options.serialize {
            decode_value(payload)
        } else {
            Ok(Value::String(payload.to_string()))
        }
    }

    async fn read_live(&self, path: PathBuf) -> Result<Option<String>> {
        let lock = self.options.lock;
        let shown = path.display().to_string();
        let record = blocking(move || read_record(&path, lock)).await?;
        match record {
            Some(record) if record.is_expired_at(current_timestamp()) => {
                debug!(path = %shown, "cache file expired");
                Ok(None)
            }
            Some(record) => Ok(Some(record.payload)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl CacheHandler for FileHandler {
    fn base(&self) -> &HandlerBase {
        &self.base
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            prefix_scan: true,
            ..Capabilities::default()
        }
    }

    /// Supported when the cache directory exists and is writable, or can be
    /// created under a writable ancestor.
    fn is_supported(&self) -> bool {
        let mut candidate = Some(self.options.path.as_path());
        while let Some(dir) = candidate {
            match fs::metadata(dir) {
                Ok(meta) => return meta.is_dir() && !meta.permissions().readonly(),
                Err(_) => candidate = dir.parent(),
            }
        }
        false
    }

    async fn init(&mut self) -> Result<()> {
        let root = self.options.path.clone();
        blocking(move || fs::create_dir_all(&root))
            .await
            .map_err(|e| CacheError::Config(format!("cannot prepare cache directory: {e}")))
    }

    async fn get(&self, key: &str) -> Result<Option<Value>> {
        let path = self.entry_path(key)?;
        match self.read_live(path).await? {
            Some(payload) => Ok(Some(self.decode(&payload)?)),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &Value, ttl: Option<Duration>) -> Result<bool> {
        let path = self.entry_path(key)?;
        let expires_at = expiry_from_ttl(self.base.resolve_ttl(ttl)).unwrap_or(0);
        let contents = format!("{expires_at}\n{}\n", self.encode(value)?);
        let (lock, mask) = (self.options.lock, self.options.mask);

        blocking(move || write_record(&path, contents.as_bytes(), lock, mask)).await?;
        Ok(true)
    }

    async fn increment(&self, _key: &str, _offset: i64) -> Result<Option<i64>> {
        Err(CacheError::Unsupported {
            driver: DRIVER,
            operation: "increment",
        })
    }

    async fn decrement(&self, _key: &str, _offset: i64) -> Result<Option<i64>> {
        Err(CacheError::Unsupported {
            driver: DRIVER,
            operation: "decrement",
        })
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let path = self.entry_path(key)?;
        blocking(move || match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        })
        .await
    }

    async fn clear(&self) -> Result<bool> {
        let root = self.options.path.clone();
        blocking(move || empty_directory(&root)).await?;
        Ok(true)
    }

    async fn clear_group(&self, group: &str) -> Result<bool> {
        let group = self.base.sanitize_group(group)?;
        if !self.base.is_group(&group) {
            debug!(group = %group, "not a configured group, nothing to clear");
            return Ok(false);
        }
        let root = self.options.path.clone();
        let prefix = self.base.prefix().to_string();

        let removed = blocking(move || {
            remove_files(&root, |relative, name| {
                name.starts_with(&prefix)
                    && relative
                        .parent()
                        .is_some_and(|dirs| dirs.iter().any(|segment| segment == group.as_str()))
            })
        })
        .await?;
        debug!(removed, driver = DRIVER, "cache group cleared");
        Ok(true)
    }

    async fn groups(&self) -> Result<Vec<GroupToken>> {
        Ok(self
            .base
            .groups()
            .iter()
            .map(|group| GroupToken::new(group.clone(), 0))
            .collect())
    }

    async fn info(&self) -> Result<HandlerInfo> {
        let root = self.options.path.clone();
        let (files, bytes) = blocking(move || {
            let mut files = 0usize;
            let mut bytes = 0u64;
            for entry in WalkDir::new(&root).into_iter().filter_map(|e| e.ok()) {
                if entry.file_type().is_file() {
                    files += 1;
                    bytes += entry.metadata().map(|m| m.len()).unwrap_or(0);
                }
            }
            Ok((files, bytes))
        })
        .await?;

        let mut info = HandlerInfo::new(self.name(), self.capabilities());
        info.entries = Some(files);
        info.details
            .insert("path".to_string(), self.options.path.display().to_string());
        info.details.insert("bytes".to_string(), bytes.to_string());
        info.details
            .insert("lock".to_string(), self.options.lock.to_string());
        Ok(info)
    }

    async fn purge_expired(&self) -> Result<usize> {
        let root = self.options.path.clone();
        let prefix = self.base.prefix().to_string();
        let lock = self.options.lock;
        let now = current_timestamp();

        let walk_root = root.clone();
        blocking(move || {
            remove_files(&walk_root, |relative, name| {
                name.starts_with(&prefix)
                    && read_record(&root.join(relative), lock)
                        .ok()
                        .flatten()
                        .is_some_and(|record| record.is_expired_at(now))
            })
        })
        .await
    }
}

// == Blocking Helpers ==

async fn blocking<T, F>(work: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> io::Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| CacheError::backend(DRIVER, e))?
        .map_err(|e| CacheError::backend(DRIVER, e))
}

/// Parsed cache file.
#[derive(Debug)]
struct Record {
    expires_at: i64,
    payload: String,
}

impl Record {
    fn is_expired_at(&self, now: i64) -> bool {
        self.expires_at != 0 && self.expires_at <= now
    }
}

/// `None` for missing or unreadable-format files.
fn read_record(path: &Path, lock: bool) -> io::Result<Option<Record>> {
    let mut file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };

    if lock {
        file.lock_shared()?;
    }
    let mut raw = String::new();
    let read = file.read_to_string(&mut raw);
    if lock {
        file.unlock()?;
    }
    read?;

    let Some((header, body)) = raw.split_once('\n') else {
        return Ok(None);
    };
    let Ok(expires_at) = header.trim().parse::<i64>() else {
        return Ok(None);
    };
    Ok(Some(Record {
        expires_at,
        payload: body.strip_suffix('\n').unwrap_or(body).to_string(),
    }))
}

fn write_record(path: &Path, contents: &[u8], lock: bool, mask: u32) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    // Truncate only once the lock is held.
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)?;
    if lock {
        file.lock()?;
    }
    let written = (|| {
        file.set_len(0)?;
        file.write_all(contents)?;
        file.flush()
    })();
    if lock {
        file.unlock()?;
    }
    written?;

    apply_mask(path, mask)
}

#[cfg(unix)]
fn apply_mask(path: &Path, mask: u32) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mask))
}

#[cfg(not(unix))]
fn apply_mask(_path: &Path, _mask: u32) -> io::Result<()> {
    Ok(())
}

/// Removes everything inside `root`, keeping `root` itself.
fn empty_directory(root: &Path) -> io::Result<()> {
    let entries = match fs::read_dir(root) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e),
    };
    for entry in entries {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            fs::remove_dir_all(entry.path())?;
        } else {
            fs::remove_file(entry.path())?;
        }
    }
    Ok(())
}

/// Unlinks every file under `root` accepted by `matches(relative_path, file_name)`.
fn remove_files<F>(root: &Path, mut matches: F) -> io::Result<usize>
where
    F: FnMut(&Path, &str) -> bool,
{
    let mut removed = 0;
    for entry in WalkDir::new(root).min_depth(1).into_iter().filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(relative) = entry.path().strip_prefix(root) else {
            continue;
        };
        let name = entry.file_name().to_string_lossy();
        if matches(relative, &name) {
            match fs::remove_file(entry.path()) {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e),
            }
        }
    }
    Ok(removed)
}

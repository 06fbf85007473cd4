//! Directory-backed store with one JSON file per entry.
//!
//! Entries live at `<dir>/<key>.json`. Writes go to a temporary file in the
//! same directory and are renamed into place, so processes sharing the
//! directory never see a partially written entry. Files whose names are not
//! cache keys are ignored.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use toolcache_common::{CacheKey, Timestamp};
use tracing::{debug, warn};

use super::Store;
use crate::entry::{CacheEntry, EntryMeta, StoredRecord};
use crate::error::CacheError;

const ENTRY_EXTENSION: &str = "json";

/// A [`Store`] that keeps entries as files in a shared directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

enum Loaded<T> {
    Found(T),
    Missing,
    /// Present, but reading it failed.
    Unreadable(CacheError),
    Corrupt(CacheError),
}

impl FileStore {
    /// Creates a store rooted at `dir`. The directory is created on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Returns the backing directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns the file path for the entry with the given key.
    pub fn entry_path(&self, key: &CacheKey) -> PathBuf {
        self.dir.join(format!("{key}.{ENTRY_EXTENSION}"))
    }

    /// Lists `(key, path)` for every entry file. A missing directory is empty.
    /// Directory entries that cannot be read are yielded as errors.
    fn entry_files(
        &self,
    ) -> Result<impl Iterator<Item = Result<(CacheKey, PathBuf), CacheError>>, CacheError> {
        let read_dir = match fs::read_dir(&self.dir) {
            Ok(read_dir) => Some(read_dir),
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(source) => {
                return Err(CacheError::Io {
                    path: self.dir.clone(),
                    source,
                })
            }
        };
        let dir = self.dir.clone();
        Ok(read_dir
            .into_iter()
            .flatten()
            .filter_map(move |dirent| match dirent {
                Ok(dirent) => {
                    let path = dirent.path();
                    key_from_path(&path).map(|key| Ok((key, path)))
                }
                Err(source) => Some(Err(CacheError::Io {
                    path: dir.clone(),
                    source,
                })),
            }))
    }

    /// Entry files that could be listed; listing failures are logged.
    fn listed_files(&self) -> Result<impl Iterator<Item = (CacheKey, PathBuf)>, CacheError> {
        Ok(self.entry_files()?.filter_map(|file| {
            file.map_err(|e| warn!(error = %e, "cannot list cache entry"))
                .ok()
        }))
    }

    fn heal(&self, path: &Path, error: &CacheError) {
        warn!(error = %error, "removing corrupt cache entry");
        if let Err(e) = remove_file(path) {
            debug!(error = %e, "corrupt entry could not be removed");
        }
    }
}

impl Store for FileStore {
    fn get(&self, key: &CacheKey, now: Timestamp) -> Option<CacheEntry> {
        let path = self.entry_path(key);
        match load::<CacheEntry>(&path, key) {
            Loaded::Found(entry) if entry.is_expired(now) => {
                if let Err(e) = remove_file(&path) {
                    debug!(error = %e, "expired entry could not be removed");
                }
                None
            }
            Loaded::Found(entry) => Some(entry),
            Loaded::Missing => None,
            Loaded::Unreadable(e) => {
                warn!(error = %e, "cannot read cache entry");
                None
            }
            Loaded::Corrupt(e) => {
                self.heal(&path, &e);
                None
            }
        }
    }

    fn put(&self, entry: &CacheEntry) -> Result<(), CacheError> {
        fs::create_dir_all(&self.dir).map_err(|e| CacheError::Io {
            path: self.dir.clone(),
            source: e,
        })?;
        let json = serde_json::to_vec(entry).map_err(|e| CacheError::Serialization {
            reason: e.to_string(),
        })?;

        let mut tmp = tempfile::Builder::new()
            .prefix(".toolcache-")
            .suffix(".tmp")
            .tempfile_in(&self.dir)
            .map_err(|e| CacheError::Io {
                path: self.dir.clone(),
                source: e,
            })?;
        tmp.write_all(&json).map_err(|e| CacheError::Io {
            path: tmp.path().to_path_buf(),
            source: e,
        })?;

        let path = self.entry_path(&entry.key);
        tmp.persist(&path).map_err(|e| CacheError::Io {
            path,
            source: e.error,
        })?;
        Ok(())
    }

    fn remove(&self, key: &CacheKey) -> Result<bool, CacheError> {
        remove_file(&self.entry_path(key))
    }

    fn delete_where(&self, predicate: &dyn Fn(&EntryMeta) -> bool) -> Result<usize, CacheError> {
        let mut removed = 0;
        let mut listing_error = None;
        for file in self.entry_files()? {
            let (key, path) = match file {
                Ok(file) => file,
                Err(e) => {
                    listing_error.get_or_insert(e);
                    continue;
                }
            };
            let matched = match load::<EntryMeta>(&path, &key) {
                Loaded::Found(meta) => predicate(&meta),
                Loaded::Missing => false,
                // An entry that cannot be inspected cannot be ruled out.
                Loaded::Unreadable(e) => {
                    warn!(error = %e, "cannot inspect cache entry; removing it");
                    true
                }
                Loaded::Corrupt(e) => {
                    self.heal(&path, &e);
                    false
                }
            };
            if matched {
                match remove_file(&path) {
                    Ok(true) => removed += 1,
                    Ok(false) => {}
                    Err(e) => warn!(error = %e, "cannot remove cache entry"),
                }
            }
        }
        match listing_error {
            Some(e) => Err(e),
            None => Ok(removed),
        }
    }

    fn enumerate(&self) -> Box<dyn Iterator<Item = EntryMeta> + '_> {
        match self.listed_files() {
            Ok(files) => Box::new(files.filter_map(|(key, path)| {
                match load::<EntryMeta>(&path, &key) {
                    Loaded::Found(meta) => Some(meta),
                    Loaded::Missing => None,
                    Loaded::Unreadable(e) => {
                        warn!(error = %e, "skipping unreadable cache entry");
                        None
                    }
                    Loaded::Corrupt(e) => {
                        debug!(error = %e, "skipping corrupt cache entry");
                        None
                    }
                }
            })),
            Err(e) => {
                warn!(error = %e, "cannot list cache directory");
                Box::new(std::iter::empty())
            }
        }
    }

    fn keys(&self) -> Box<dyn Iterator<Item = CacheKey> + '_> {
        match self.listed_files() {
            Ok(files) => Box::new(files.map(|(key, _)| key)),
            Err(e) => {
                warn!(error = %e, "cannot list cache directory");
                Box::new(std::iter::empty())
            }
        }
    }

    fn meta(&self, key: &CacheKey) -> Option<EntryMeta> {
        let path = self.entry_path(key);
        match load::<EntryMeta>(&path, key) {
            Loaded::Found(meta) => Some(meta),
            Loaded::Missing => None,
            Loaded::Unreadable(e) => {
                warn!(error = %e, "cannot read cache entry");
                None
            }
            Loaded::Corrupt(e) => {
                self.heal(&path, &e);
                None
            }
        }
    }

    /// Removes every entry file, including unreadable ones.
    fn clear(&self) -> Result<usize, CacheError> {
        let mut removed = 0;
        for (_, path) in self.listed_files()? {
            match remove_file(&path) {
                Ok(true) => removed += 1,
                Ok(false) => {}
                Err(e) => warn!(error = %e, "cannot remove cache entry"),
            }
        }
        Ok(removed)
    }

    fn describe(&self) -> String {
        self.dir.display().to_string()
    }
}

fn key_from_path(path: &Path) -> Option<CacheKey> {
    if path.extension()? != ENTRY_EXTENSION {
        return None;
    }
    path.file_stem()?.to_str()?.parse().ok()
}

fn load<T: StoredRecord>(path: &Path, key: &CacheKey) -> Loaded<T> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Loaded::Missing,
        Err(source) => {
            return Loaded::Unreadable(CacheError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    let reason = match serde_json::from_slice::<T>(&bytes) {
        Ok(record) => match record.inconsistency(key) {
            None => return Loaded::Found(record),
            Some(reason) => reason,
        },
        Err(e) => e.to_string(),
    };
    Loaded::Corrupt(CacheError::Corrupt {
        path: path.to_path_buf(),
        reason,
    })
}

/// Removes `path`, treating an already-missing file as nothing removed.
fn remove_file(path: &Path) -> Result<bool, CacheError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(CacheError::Io {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

//! Global company index.
//!
//! A single JSON object keyed by normalized company code. Every write reads
//! the whole store, changes it in memory, and replaces the file atomically
//! while holding an exclusive lock, so concurrent summarizer runs never lose
//! each other's entries.

use crate::company::normalize_key;
use crate::error::{KbError, Result};
use crate::fsutil::write_atomically;
use crate::models::IndexEntry;
use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Storage under the index.
pub trait IndexBackend {
    /// Current store contents, or `None` if the store does not exist yet.
    fn read(&self) -> io::Result<Option<Vec<u8>>>;

    /// Replace the store contents in one step.
    fn replace(&self, bytes: &[u8]) -> io::Result<()>;

    /// Run `f` while holding the store's exclusive write lock.
    fn locked(&self, f: &mut dyn FnMut() -> Result<()>) -> Result<()>;

    /// Where the store lives, for diagnostics.
    fn location(&self) -> PathBuf;
}

/// Index file on local disk with a `.lock` sidecar.
#[derive(Debug, Clone)]
pub struct FileBackend {
    path: PathBuf,
}

impl FileBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Sidecar lock file, e.g. `company_index.json.lock`.
    pub fn lock_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "company_index.json".into());
        name.push(".lock");
        self.path.with_file_name(name)
    }
}

impl IndexBackend for FileBackend {
    fn read(&self) -> io::Result<Option<Vec<u8>>> {
        match std::fs::read(&self.path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn replace(&self, bytes: &[u8]) -> io::Result<()> {
        write_atomically(&self.path, bytes)
    }

    fn locked(&self, f: &mut dyn FnMut() -> Result<()>) -> Result<()> {
        let lock_path = self.lock_path();
        let index_write = |source: io::Error| KbError::IndexWrite {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = lock_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(index_write)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&lock_path)
            .map_err(index_write)?;

        let mut lock = fd_lock::RwLock::new(file);
        let _guard = lock.write().map_err(index_write)?;
        debug!("Acquired index lock {}", lock_path.display());

        f()
    }

    fn location(&self) -> PathBuf {
        self.path.clone()
    }
}

/// Entries in index order. Iterate as often as needed.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    entries: Vec<IndexEntry>,
}

impl Snapshot {
    pub fn iter(&self) -> std::slice::Iter<'_, IndexEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<'a> IntoIterator for &'a Snapshot {
    type Item = &'a IndexEntry;
    type IntoIter = std::slice::Iter<'a, IndexEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

impl IntoIterator for Snapshot {
    type Item = IndexEntry;
    type IntoIter = std::vec::IntoIter<IndexEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

/// The company index over some backend.
pub struct IndexStore<B: IndexBackend = FileBackend> {
    backend: B,
}

impl IndexStore<FileBackend> {
    /// Index stored at `path`. Nothing is created until the first upsert.
    pub fn open(path: impl AsRef<Path>) -> Self {
        Self::with_backend(FileBackend::new(path.as_ref()))
    }
}

impl<B: IndexBackend> IndexStore<B> {
    pub fn with_backend(backend: B) -> Self {
        Self { backend }
    }

    pub fn location(&self) -> PathBuf {
        self.backend.location()
    }

    /// Insert or replace the entry for `entry.company_code`.
    pub fn upsert(&self, entry: IndexEntry) -> Result<()> {
        let key = entry.key();
        if key.is_empty() {
            return Err(KbError::InvalidArgument(format!(
                "company code '{}' normalizes to an empty key",
                entry.company_code
            )));
        }

        let location = self.backend.location();
        self.backend.locked(&mut || {
            let mut entries = self.load()?;
            entries.insert(key.clone(), entry.clone());

            let mut json = serde_json::to_string_pretty(&entries)?;
            json.push('\n');
            self.backend
                .replace(json.as_bytes())
                .map_err(|source| KbError::IndexWrite {
                    path: location.clone(),
                    source,
                })?;

            debug!("Index now holds {} companies", entries.len());
            Ok(())
        })
    }

    /// Every entry, oldest analysis first; ties by key.
    pub fn all(&self) -> Result<Snapshot> {
        let mut entries: Vec<(String, IndexEntry)> = self.load()?.into_iter().collect();
        entries.sort_by(|(ka, a), (kb, b)| a.analysis_date.cmp(&b.analysis_date).then(ka.cmp(kb)));

        Ok(Snapshot {
            entries: entries.into_iter().map(|(_, e)| e).collect(),
        })
    }

    /// Look up one company by any spelling of its code.
    pub fn get(&self, company_code: &str) -> Result<Option<IndexEntry>> {
        let key = normalize_key(company_code);
        if key.is_empty() {
            return Ok(None);
        }
        Ok(self.load()?.remove(&key))
    }

    /// Case-insensitive substring search over code and name, newest first.
    pub fn find(&self, keyword: &str) -> Result<Vec<IndexEntry>> {
        let needle = keyword.trim().to_lowercase();
        if needle.is_empty() {
            return Ok(Vec::new());
        }

        let mut matches: Vec<IndexEntry> = self
            .all()?
            .into_iter()
            .filter(|e| {
                e.company_code.to_lowercase().contains(&needle)
                    || e.company_name.to_lowercase().contains(&needle)
            })
            .collect();
        matches.reverse();
        Ok(matches)
    }

    fn load(&self) -> Result<BTreeMap<String, IndexEntry>> {
        let location = self.backend.location();
        let bytes = match self.backend.read() {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return Ok(BTreeMap::new()),
            Err(e) => {
                return Err(KbError::IndexRead {
                    path: location,
                    reason: e.to_string(),
                })
            }
        };

        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(BTreeMap::new());
        }

        serde_json::from_slice(&bytes).map_err(|e| KbError::IndexRead {
            path: location,
            reason: e.to_string(),
        })
    }
}

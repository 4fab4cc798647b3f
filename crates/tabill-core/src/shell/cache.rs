//! Named cache buckets holding request to response associations.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use super::message::{ShellRequest, ShellResponse};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedData<T> {
    pub data: T,
    pub cached_at: DateTime<Utc>,
}

impl<T> CachedData<T> {
    pub fn new(data: T) -> Self {
        Self {
            data,
            cached_at: Utc::now(),
        }
    }

    pub fn age_minutes(&self) -> i64 {
        (Utc::now() - self.cached_at).num_minutes()
    }

    pub fn age_display(&self) -> String {
        let minutes = self.age_minutes();
        if minutes < 1 {
            // Also covers clock skew
            "just now".to_string()
        } else if minutes < 60 {
            format!("{}m ago", minutes)
        } else if minutes < 1440 {
            format!("{}h ago", minutes / 60)
        } else {
            format!("{}d ago", minutes / 1440)
        }
    }
}

/// Summary of one stored entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryInfo {
    pub key: String,
    pub status: u16,
    pub cached_at: DateTime<Utc>,
}

impl EntryInfo {
    pub fn age_display(&self) -> String {
        CachedData {
            data: (),
            cached_at: self.cached_at,
        }
        .age_display()
    }
}

/// Storage for named cache buckets.
///
/// `put` replaces any existing entry for the same request key. Buckets are
/// only ever removed whole.
pub trait CacheStorage: Send + Sync {
    /// Create the bucket if it does not exist.
    fn open(&self, bucket: &str) -> Result<()>;
    fn has(&self, bucket: &str) -> Result<bool>;
    /// Returns whether a bucket was removed.
    fn delete(&self, bucket: &str) -> Result<bool>;
    /// Names of all buckets.
    fn keys(&self) -> Result<Vec<String>>;
    fn match_request(&self, bucket: &str, request: &ShellRequest) -> Result<Option<ShellResponse>>;
    fn put(&self, bucket: &str, request: &ShellRequest, response: &ShellResponse) -> Result<()>;
    fn entries(&self, bucket: &str) -> Result<Vec<EntryInfo>>;
}

impl<T: CacheStorage + ?Sized> CacheStorage for Arc<T> {
    fn open(&self, bucket: &str) -> Result<()> {
        (**self).open(bucket)
    }

    fn has(&self, bucket: &str) -> Result<bool> {
        (**self).has(bucket)
    }

    fn delete(&self, bucket: &str) -> Result<bool> {
        (**self).delete(bucket)
    }

    fn keys(&self) -> Result<Vec<String>> {
        (**self).keys()
    }

    fn match_request(&self, bucket: &str, request: &ShellRequest) -> Result<Option<ShellResponse>> {
        (**self).match_request(bucket, request)
    }

    fn put(&self, bucket: &str, request: &ShellRequest, response: &ShellResponse) -> Result<()> {
        (**self).put(bucket, request, response)
    }

    fn entries(&self, bucket: &str) -> Result<Vec<EntryInfo>> {
        (**self).entries(bucket)
    }
}

// ============================================================================
// In-memory storage
// ============================================================================

type Bucket = HashMap<String, CachedData<ShellResponse>>;

#[derive(Debug, Default)]
pub struct MemoryCacheStorage {
    buckets: Mutex<BTreeMap<String, Bucket>>,
}

impl MemoryCacheStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_buckets<R>(&self, f: impl FnOnce(&mut BTreeMap<String, Bucket>) -> R) -> Result<R> {
        let mut buckets = self
            .buckets
            .lock()
            .map_err(|_| anyhow::anyhow!("Cache storage lock poisoned"))?;
        Ok(f(&mut buckets))
    }
}

impl CacheStorage for MemoryCacheStorage {
    fn open(&self, bucket: &str) -> Result<()> {
        self.with_buckets(|b| {
            b.entry(bucket.to_string()).or_default();
        })
    }

    fn has(&self, bucket: &str) -> Result<bool> {
        self.with_buckets(|b| b.contains_key(bucket))
    }

    fn delete(&self, bucket: &str) -> Result<bool> {
        self.with_buckets(|b| b.remove(bucket).is_some())
    }

    fn keys(&self) -> Result<Vec<String>> {
        self.with_buckets(|b| b.keys().cloned().collect())
    }

    fn match_request(&self, bucket: &str, request: &ShellRequest) -> Result<Option<ShellResponse>> {
        let key = request.cache_key();
        self.with_buckets(|b| {
            b.get(bucket)
                .and_then(|entries| entries.get(&key))
                .map(|cached| cached.data.clone())
        })
    }

    fn put(&self, bucket: &str, request: &ShellRequest, response: &ShellResponse) -> Result<()> {
        let key = request.cache_key();
        self.with_buckets(|b| {
            b.entry(bucket.to_string())
                .or_default()
                .insert(key, CachedData::new(response.clone()));
        })
    }

    fn entries(&self, bucket: &str) -> Result<Vec<EntryInfo>> {
        self.with_buckets(|b| {
            let mut entries: Vec<EntryInfo> = b
                .get(bucket)
                .map(|entries| {
                    entries
                        .iter()
                        .map(|(key, cached)| EntryInfo {
                            key: key.clone(),
                            status: cached.data.status,
                            cached_at: cached.cached_at,
                        })
                        .collect()
                })
                .unwrap_or_default();
            entries.sort_by(|a, b| a.key.cmp(&b.key));
            entries
        })
    }
}

// ============================================================================
// Disk storage
// ============================================================================

/// Metadata file of a stored entry; the body sits next to it.
#[derive(Debug, Serialize, Deserialize)]
struct StoredEntry {
    key: String,
    response: ShellResponse,
}

/// Buckets stored as directories, one metadata file and one body file per
/// entry, named by the SHA-256 of the request key.
pub struct DiskCacheStorage {
    root: PathBuf,
}

impl DiskCacheStorage {
    pub fn new(root: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    fn is_bucket_name(name: &str) -> bool {
        !name.is_empty()
            && !name.starts_with('.')
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    }

    fn bucket_dir(&self, bucket: &str) -> Result<PathBuf> {
        if !Self::is_bucket_name(bucket) {
            anyhow::bail!("Invalid cache bucket name: {:?}", bucket);
        }
        Ok(self.root.join(bucket))
    }

    fn entry_hash(key: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(key.as_bytes());
        hex::encode(hasher.finalize())
    }

    fn entry_paths(dir: &Path, key: &str) -> (PathBuf, PathBuf) {
        let hash = Self::entry_hash(key);
        (
            dir.join(format!("{}.json", hash)),
            dir.join(format!("{}.body", hash)),
        )
    }

    fn load_meta(path: &Path) -> Result<CachedData<StoredEntry>> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read cache entry: {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse cache entry: {}", path.display()))
    }
}

impl CacheStorage for DiskCacheStorage {
    fn open(&self, bucket: &str) -> Result<()> {
        std::fs::create_dir_all(self.bucket_dir(bucket)?)?;
        Ok(())
    }

    fn has(&self, bucket: &str) -> Result<bool> {
        Ok(self.bucket_dir(bucket)?.is_dir())
    }

    fn delete(&self, bucket: &str) -> Result<bool> {
        let dir = self.bucket_dir(bucket)?;
        if !dir.is_dir() {
            return Ok(false);
        }
        std::fs::remove_dir_all(&dir)
            .with_context(|| format!("Failed to delete cache bucket: {}", bucket))?;
        Ok(true)
    }

    fn keys(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in std::fs::read_dir(&self.root)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            // Directories we did not create (e.g. `.Trash`) are not buckets
            if entry.file_type()?.is_dir() && Self::is_bucket_name(&name) {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }

    fn match_request(&self, bucket: &str, request: &ShellRequest) -> Result<Option<ShellResponse>> {
        let dir = self.bucket_dir(bucket)?;
        let key = request.cache_key();
        let (meta_path, body_path) = Self::entry_paths(&dir, &key);
        if !meta_path.exists() {
            return Ok(None);
        }

        let meta = Self::load_meta(&meta_path)?;
        if meta.data.key != key {
            debug!(key = %key, stored = %meta.data.key, "Cache entry hash collision");
            return Ok(None);
        }

        let mut response = meta.data.response;
        response.body = std::fs::read(&body_path)
            .with_context(|| format!("Failed to read cached body for {}", key))?;
        Ok(Some(response))
    }

    fn put(&self, bucket: &str, request: &ShellRequest, response: &ShellResponse) -> Result<()> {
        let dir = self.bucket_dir(bucket)?;
        std::fs::create_dir_all(&dir)?;
        let key = request.cache_key();
        let (meta_path, body_path) = Self::entry_paths(&dir, &key);

        // Body first so a metadata file never points at a missing body
        std::fs::write(&body_path, &response.body)?;
        let meta = CachedData::new(StoredEntry {
            key,
            response: response.clone(),
        });
        std::fs::write(&meta_path, serde_json::to_string_pretty(&meta)?)?;
        Ok(())
    }

    fn entries(&self, bucket: &str) -> Result<Vec<EntryInfo>> {
        let dir = self.bucket_dir(bucket)?;
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut entries = Vec::new();
        for entry in std::fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let meta = Self::load_meta(&path)?;
            entries.push(EntryInfo {
                key: meta.data.key,
                status: meta.data.response.status,
                cached_at: meta.cached_at,
            });
        }
        entries.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(entries)
    }
}

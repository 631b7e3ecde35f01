//! Persistent binary asset cache for downloaded model files.
//!
//! One blob file per key under a cache directory, with a JSON sidecar
//! recording size and fetch time. A blob only ever appears through a
//! completed download (temp file + rename), so readers never observe a
//! truncated entry. Concurrent fetches of the same key are collapsed into
//! one download by a per-key lock.

mod download;

pub use download::{DownloadProgress, Fetcher, UreqFetcher};

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::registry::ModelRegistry;

#[derive(Error, Debug)]
pub enum AssetDownloadError {
    #[error("{url}: unexpected status {status}")]
    Status { url: String, status: u16 },
    #[error("{url}: {message}")]
    Network { url: String, message: String },
    #[error("download cancelled")]
    Cancelled,
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl AssetDownloadError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Status { .. } | Self::Network { .. } => {
                "Could not download the sign model. Check your internet connection and try again."
            }
            Self::Cancelled => "The download was cancelled.",
            Self::Io(_) => {
                "The app could not read or write its local files. Check disk space and permissions."
            }
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct EntryMeta {
    size_bytes: u64,
    cached_at_ms: i64,
}

/// Per-entry status line for the cache management surface.
#[derive(Clone, Debug, Serialize)]
pub struct CacheEntryStatus {
    pub key: String,
    pub display_name: String,
    pub cached: bool,
    pub size_bytes: Option<u64>,
}

pub struct AssetCache {
    root: PathBuf,
    // Per-key locks: concurrent get_or_fetch calls for one key serialize
    // here, so the second caller finds the entry cached and issues no
    // network request.
    inflight: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl AssetCache {
    pub fn open(root: impl Into<PathBuf>) -> io::Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            inflight: Mutex::new(HashMap::new()),
        })
    }

    /// Opens the cache under the platform cache directory.
    pub fn open_default() -> io::Result<Self> {
        let base = dirs_next::cache_dir()
            .or_else(|| std::env::var_os("HOME").map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from("."));
        Self::open(base.join("sign-sense").join("models"))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn blob_path(&self, key: &str) -> PathBuf {
        self.root.join(format!("{}.bin", encode_key(key)))
    }

    fn meta_path(&self, key: &str) -> PathBuf {
        self.root.join(format!("{}.json", encode_key(key)))
    }

    /// Existence check. Never fetches.
    pub fn has(&self, key: &str) -> bool {
        self.blob_path(key).is_file()
    }

    /// Cached bytes only. Never performs network I/O.
    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        fs::read(self.blob_path(key)).ok()
    }

    /// Downloads `url` in streamed chunks, reporting progress per chunk,
    /// and stores the fully assembled bytes under `key`. A failed or
    /// aborted download leaves any previously cached value untouched:
    /// nothing is written until the stream has completed.
    pub fn fetch_and_store(
        &self,
        fetcher: &dyn Fetcher,
        key: &str,
        url: &str,
        mut on_progress: impl FnMut(&DownloadProgress),
    ) -> Result<Vec<u8>, AssetDownloadError> {
        log::info!("Downloading asset {key} from {url}");
        let mut bytes = Vec::new();
        fetcher.fetch(url, &mut |chunk, total| {
            bytes.extend_from_slice(chunk);
            on_progress(&DownloadProgress::new(bytes.len() as u64, total));
        })?;

        self.store(key, &bytes)?;
        log::info!("Cached asset {key} ({} bytes)", bytes.len());
        Ok(bytes)
    }

    fn store(&self, key: &str, bytes: &[u8]) -> io::Result<()> {
        let blob = self.blob_path(key);
        let tmp = blob.with_extension("download");
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, &blob)?;

        let meta = EntryMeta {
            size_bytes: bytes.len() as u64,
            cached_at_ms: crate::unix_time_ms(),
        };
        let encoded = serde_json::to_vec(&meta).map_err(io::Error::other)?;
        fs::write(self.meta_path(key), encoded)
    }

    /// The primary consumer entry point: cached bytes, falling back to a
    /// download on miss. Already-cached keys never touch the network.
    pub fn get_or_fetch(
        &self,
        fetcher: &dyn Fetcher,
        key: &str,
        url: &str,
        on_progress: impl FnMut(&DownloadProgress),
    ) -> Result<Vec<u8>, AssetDownloadError> {
        if let Some(bytes) = self.get(key) {
            return Ok(bytes);
        }

        let lock = self.key_lock(key);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        // Re-check under the lock: another caller may have just finished
        // downloading this key.
        if let Some(bytes) = self.get(key) {
            log::debug!("Asset {key} arrived while waiting on the in-flight download");
            return Ok(bytes);
        }

        self.fetch_and_store(fetcher, key, url, on_progress)
    }

    fn key_lock(&self, key: &str) -> Arc<Mutex<()>> {
        let mut inflight = self
            .inflight
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        inflight
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Evicts one entry. Missing entries are not an error.
    pub fn remove(&self, key: &str) -> io::Result<()> {
        for path in [self.blob_path(key), self.meta_path(key)] {
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }

    /// Evicts everything.
    pub fn clear(&self) -> io::Result<()> {
        fs::remove_dir_all(&self.root)?;
        fs::create_dir_all(&self.root)
    }

    pub fn entry_size(&self, key: &str) -> Option<u64> {
        if let Ok(raw) = fs::read(self.meta_path(key)) {
            if let Ok(meta) = serde_json::from_slice::<EntryMeta>(&raw) {
                return Some(meta.size_bytes);
            }
        }
        fs::metadata(self.blob_path(key)).ok().map(|m| m.len())
    }

    /// One status line per registry entry, for the cache management UI.
    pub fn status(&self, registry: &ModelRegistry) -> Vec<CacheEntryStatus> {
        registry
            .entries()
            .map(|entry| {
                let cached = self.has(&entry.key);
                CacheEntryStatus {
                    key: entry.key.clone(),
                    display_name: entry.display_name.clone(),
                    cached,
                    size_bytes: if cached { self.entry_size(&entry.key) } else { None },
                }
            })
            .collect()
    }

    /// Total bytes held by the cache, custom models included.
    pub fn total_size(&self) -> u64 {
        let Ok(entries) = fs::read_dir(&self.root) else {
            return 0;
        };
        entries
            .flatten()
            .filter(|e| e.path().extension().and_then(|x| x.to_str()) == Some("bin"))
            .filter_map(|e| e.metadata().ok())
            .map(|m| m.len())
            .sum()
    }

    /// Downloads every registry entry not yet cached, invoking
    /// `on_model_complete(key, index, total)` as each finishes. Checks the
    /// cancellation flag between models.
    pub fn prefetch_all(
        &self,
        fetcher: &dyn Fetcher,
        registry: &ModelRegistry,
        mut on_progress: impl FnMut(&str, &DownloadProgress),
        mut on_model_complete: impl FnMut(&str, usize, usize),
        cancel: &AtomicBool,
    ) -> Result<(), AssetDownloadError> {
        let total = registry.len();
        for (index, entry) in registry.entries().enumerate() {
            if cancel.load(Ordering::Relaxed) {
                log::info!("Prefetch cancelled after {index}/{total} models");
                return Err(AssetDownloadError::Cancelled);
            }
            if !self.has(&entry.key) {
                self.get_or_fetch(fetcher, &entry.key, &entry.url, |progress| {
                    on_progress(&entry.key, progress)
                })?;
            }
            on_model_complete(&entry.key, index + 1, total);
        }
        Ok(())
    }
}

fn encode_key(key: &str) -> String {
    urlencoding::encode(key).into_owned()
}

/// Formats a byte count for the cache management surface.
pub fn format_bytes(bytes: u64) -> String {
    if bytes == 0 {
        return "0 B".to_string();
    }
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    let rounded = (value * 10.0).round() / 10.0;
    if rounded.fract() == 0.0 {
        format!("{} {}", rounded as u64, UNITS[unit])
    } else {
        format!("{:.1} {}", rounded, UNITS[unit])
    }
}

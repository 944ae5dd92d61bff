use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result, anyhow};
use reqwest::StatusCode;
use reqwest::blocking::Client;
use reqwest::header::{ETAG, IF_MODIFIED_SINCE, IF_NONE_MATCH, LAST_MODIFIED};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

const CACHE_VERSION: u32 = 1;
const CACHE_DIR: &str = "wr_features";
const INDEX_FILE: &str = "http_cache.json";
const MAX_ATTEMPTS: u32 = 4;
// play-by-play assets run to tens of megabytes per season
const REQUEST_TIMEOUT: Duration = Duration::from_secs(180);
const USER_AGENT: &str = concat!("wr-features/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct CacheIndex {
    version: u32,
    entries: HashMap<String, CacheEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheEntry {
    url: String,
    file: String,
    etag: Option<String>,
    last_modified: Option<String>,
    fetched_at: u64,
}

/// Downloaded assets on disk, revalidated against the origin on every fetch.
#[derive(Debug)]
pub struct FileCache {
    dir: PathBuf,
    client: Client,
    index: Mutex<CacheIndex>,
}

impl FileCache {
    pub fn open(dir: Option<PathBuf>) -> Result<Self> {
        let dir = dir
            .or_else(default_cache_dir)
            .ok_or_else(|| anyhow!("no cache directory: set WRF_CACHE_DIR or HOME"))?;
        fs::create_dir_all(&dir).with_context(|| format!("create {}", dir.display()))?;
        let index = load_index(&dir.join(INDEX_FILE));
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("failed to build http client")?;
        Ok(Self {
            dir,
            client,
            index: Mutex::new(index),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns a local path holding the body of `url`.
    pub fn fetch(&self, url: &str) -> Result<PathBuf> {
        let key = cache_key(url);
        let cached = self.lock()?.entries.get(&key).cloned();
        let mut last_err: Option<anyhow::Error> = None;
        for attempt in 1..=MAX_ATTEMPTS {
            match self.try_fetch(url, &key, cached.as_ref()) {
                Ok(path) => return Ok(path),
                Err(err) => {
                    warn!(url, attempt, error = %format!("{err:#}"), "download failed");
                    last_err = Some(err);
                    if attempt < MAX_ATTEMPTS {
                        let sleep_ms = 500_u64.saturating_mul(attempt as u64);
                        thread::sleep(Duration::from_millis(sleep_ms));
                    }
                }
            }
        }
        Err(last_err.unwrap_or_else(|| anyhow!("download failed for {url}")))
    }

    fn try_fetch(
        &self,
        url: &str,
        key: &str,
        cached: Option<&CacheEntry>,
    ) -> Result<PathBuf> {
        let cached = cached.filter(|entry| self.dir.join(&entry.file).exists());
        let mut req = self.client.get(url);
        if let Some(entry) = cached {
            if let Some(etag) = entry.etag.as_ref() {
                req = req.header(IF_NONE_MATCH, etag);
            }
            if let Some(last_modified) = entry.last_modified.as_ref() {
                req = req.header(IF_MODIFIED_SINCE, last_modified);
            }
        }

        let resp = req.send().with_context(|| format!("request {url}"))?;
        let status = resp.status();
        if status == StatusCode::NOT_MODIFIED {
            return match cached {
                Some(entry) => {
                    debug!(url, "cache still fresh");
                    Ok(self.dir.join(&entry.file))
                }
                None => Err(anyhow!("received 304 without a cached body for {url}")),
            };
        }
        if !status.is_success() {
            return Err(anyhow!("http {status} for {url}"));
        }

        let headers = resp.headers().clone();
        let bytes = resp.bytes().with_context(|| format!("read body {url}"))?;
        let file = format!("{key}.{}", extension(url));
        let path = self.dir.join(&file);
        let tmp = path.with_extension("part");
        fs::write(&tmp, &bytes).with_context(|| format!("write {}", tmp.display()))?;
        fs::rename(&tmp, &path).with_context(|| format!("swap {}", path.display()))?;
        info!(url, bytes = bytes.len(), "downloaded");

        let entry = CacheEntry {
            url: url.to_string(),
            file,
            etag: header_string(&headers, ETAG),
            last_modified: header_string(&headers, LAST_MODIFIED),
            fetched_at: system_time_to_secs(SystemTime::now()).unwrap_or_default(),
        };
        let mut index = self.lock()?;
        index.version = CACHE_VERSION;
        index.entries.insert(key.to_string(), entry);
        if let Err(err) = save_index(&self.dir.join(INDEX_FILE), &index) {
            warn!(error = %format!("{err:#}"), "http cache index not saved");
        }
        Ok(path)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, CacheIndex>> {
        self.index
            .lock()
            .map_err(|_| anyhow!("http cache lock poisoned"))
    }
}

pub fn cache_key(url: &str) -> String {
    let digest = Sha256::digest(url.as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

fn extension(url: &str) -> &str {
    let name = url.rsplit('/').next().unwrap_or(url);
    match name.rsplit_once('.') {
        Some((_, ext)) if !ext.is_empty() && ext.len() <= 8 => ext,
        _ => "bin",
    }
}

fn header_string(headers: &reqwest::header::HeaderMap, name: reqwest::header::HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string())
}

fn load_index(path: &Path) -> CacheIndex {
    let Ok(raw) = fs::read_to_string(path) else {
        return CacheIndex::default();
    };
    let index = serde_json::from_str::<CacheIndex>(&raw).unwrap_or_default();
    if index.version != CACHE_VERSION {
        return CacheIndex::default();
    }
    index
}

fn save_index(path: &Path, index: &CacheIndex) -> Result<()> {
    let tmp = path.with_extension("json.tmp");
    let json = serde_json::to_string(index).context("serialize http cache")?;
    fs::write(&tmp, json).context("write http cache")?;
    fs::rename(&tmp, path).context("swap http cache")?;
    Ok(())
}

fn default_cache_dir() -> Option<PathBuf> {
    if let Ok(base) = std::env::var("XDG_CACHE_HOME")
        && !base.trim().is_empty()
    {
        return Some(PathBuf::from(base).join(CACHE_DIR));
    }
    let home = std::env::var("HOME").ok()?;
    if home.trim().is_empty() {
        return None;
    }
    Some(PathBuf::from(home).join(".cache").join(CACHE_DIR))
}

fn system_time_to_secs(time: SystemTime) -> Option<u64> {
    time.duration_since(UNIX_EPOCH).ok().map(|d| d.as_secs())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_stable_hex() {
        let key = cache_key("https://example.com/a.csv");
        assert_eq!(key.len(), 64);
        assert_eq!(key, cache_key("https://example.com/a.csv"));
        assert_ne!(key, cache_key("https://example.com/b.csv"));
    }

    #[test]
    fn extension_comes_from_last_segment() {
        assert_eq!(extension("https://x.org/pbp/play_by_play_2023.parquet"), "parquet");
        assert_eq!(extension("http://www.habitatring.com/games.csv"), "csv");
        assert_eq!(extension("https://x.org/v1.2/latest"), "bin");
    }

    #[test]
    fn index_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileCache::open(Some(dir.path().to_path_buf())).unwrap();
        {
            let mut index = cache.lock().unwrap();
            index.version = CACHE_VERSION;
            index.entries.insert(
                "k".to_string(),
                CacheEntry {
                    url: "u".to_string(),
                    file: "k.csv".to_string(),
                    etag: Some("\"abc\"".to_string()),
                    last_modified: None,
                    fetched_at: 1,
                },
            );
            save_index(&cache.dir().join(INDEX_FILE), &index).unwrap();
        }
        let reopened = FileCache::open(Some(dir.path().to_path_buf())).unwrap();
        let index = reopened.lock().unwrap();
        assert_eq!(index.entries["k"].etag.as_deref(), Some("\"abc\""));
    }
}

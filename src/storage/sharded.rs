//! Sharded filesystem storage engine
//!
//! Pages live in per-URL directories keyed by the md5 of the URL path,
//! split into 8 four-character segments to bound per-directory fanout,
//! e.g. `eb0f/7e9d/1d52/1863/ca6d/afe0/effe/5da3`. Each directory holds a
//! `page.json` metadata file plus raw `body` and `headers` files, so
//! binary content never round-trips through the JSON encoder.
//!
//! The engine also checkpoints pending links: a mutex-guarded in-memory
//! set is flushed to a uniquely named batch file under `_links` once it
//! reaches the configured threshold. `load_links` drains the set first
//! and falls back to consuming one batch file, which is what feeds the
//! durable queue bridge's refill after a crash.

use crate::config::BucketEntry;
use crate::page::{Page, PageMeta};
use crate::storage::traits::{Storage, StorageError, StorageResult};
use regex::Regex;
use std::collections::HashSet;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};
use url::Url;

const META_FILE: &str = "page.json";
const BODY_FILE: &str = "body";
const HEADERS_FILE: &str = "headers";
const UNFETCHED_DIR: &str = "_links";
const FETCHED_DIR: &str = "_pages";

pub struct ShardedStore {
    root: PathBuf,
    unfetched_dir: PathBuf,
    fetched_dir: PathBuf,
    buckets: Vec<(Regex, String)>,
    batch_size: usize,
    sets: Mutex<LinkSets>,
}

#[derive(Default)]
struct LinkSets {
    unfetched: HashSet<String>,
    fetched: HashSet<String>,
}

impl ShardedStore {
    /// Opens (creating if necessary) a sharded store rooted at `root`.
    ///
    /// `batch_size` is the pending-link count at which a checkpoint batch
    /// file is flushed; `buckets` routes matching URL paths under an
    /// alternate prefix so operators can physically segregate sub-crawls.
    pub fn open(
        root: impl Into<PathBuf>,
        batch_size: usize,
        buckets: &[BucketEntry],
    ) -> StorageResult<Self> {
        let root = root.into();
        let unfetched_dir = root.join(UNFETCHED_DIR);
        let fetched_dir = root.join(FETCHED_DIR);

        for dir in [&root, &unfetched_dir, &fetched_dir] {
            fs::create_dir_all(dir)?;
        }

        let buckets = buckets
            .iter()
            .map(|entry| Ok((Regex::new(&entry.pattern)?, entry.prefix.clone())))
            .collect::<StorageResult<Vec<_>>>()?;

        Ok(Self {
            root,
            unfetched_dir,
            fetched_dir,
            buckets,
            batch_size,
            sets: Mutex::new(LinkSets::default()),
        })
    }

    /// The storage directory for `url`: optional bucket prefix, then the
    /// md5 of the URL path as 8 four-character segments. A pure function
    /// of the path, so repeated calls always resolve to the same
    /// location. `None` when `url` does not parse.
    pub fn shard_path(&self, url: &str) -> Option<PathBuf> {
        let parsed = Url::parse(url).ok()?;
        let path = parsed.path();

        let mut location = self.root.clone();
        if let Some(prefix) = self.bucket_for(path) {
            location.push(prefix);
        }

        let digest = format!("{:x}", md5::compute(path.as_bytes()));
        for segment in 0..8 {
            location.push(&digest[segment * 4..segment * 4 + 4]);
        }

        Some(location)
    }

    fn bucket_for(&self, path: &str) -> Option<&str> {
        self.buckets
            .iter()
            .find(|(pattern, _)| pattern.is_match(path))
            .map(|(_, prefix)| prefix.as_str())
    }

    /// Classifies `url` into the checkpoint sets, flushing whichever set
    /// crossed the batch threshold. Fetched URLs leave the unfetched set
    /// for good.
    fn record_link(&self, url: &str, fetched: bool) -> StorageResult<()> {
        let mut sets = self.sets.lock().unwrap();

        if fetched {
            sets.unfetched.remove(url);
            sets.fetched.insert(url.to_string());
            if sets.fetched.len() >= self.batch_size {
                Self::flush_set(&mut sets.fetched, &self.fetched_dir)?;
            }
        } else {
            sets.unfetched.insert(url.to_string());
            if sets.unfetched.len() >= self.batch_size {
                Self::flush_set(&mut sets.unfetched, &self.unfetched_dir)?;
            }
        }

        Ok(())
    }

    /// Serializes `set` to a uniquely named newline-delimited batch file
    /// and clears it. The name is a hash of the flush instant.
    fn flush_set(set: &mut HashSet<String>, dir: &Path) -> StorageResult<()> {
        if set.is_empty() {
            return Ok(());
        }

        let stamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos()
            .to_string();
        let name = format!("{:x}", md5::compute(stamp.as_bytes()));

        let mut contents = String::new();
        for link in set.iter() {
            contents.push_str(link);
            contents.push('\n');
        }

        fs::write(dir.join(name), contents)?;
        set.clear();
        Ok(())
    }

    fn write_record(&self, dir: &Path, page: &Page) -> StorageResult<()> {
        fs::create_dir_all(dir)?;
        fs::write(dir.join(META_FILE), serde_json::to_vec_pretty(&page.meta())?)?;

        if let Some(body) = &page.body {
            fs::write(dir.join(BODY_FILE), body.as_bytes())?;
        }
        if !page.headers.is_empty() {
            fs::write(dir.join(HEADERS_FILE), page.headers_blob())?;
        }

        Ok(())
    }

    fn read_record(&self, dir: &Path, url: &str) -> StorageResult<Option<Page>> {
        let raw = match fs::read(dir.join(META_FILE)) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let meta: PageMeta = serde_json::from_slice(&raw)?;

        let body = read_optional(&dir.join(BODY_FILE))?;
        let headers = read_optional(&dir.join(HEADERS_FILE))?;

        let page = Page::from_parts(meta, headers, body).map_err(|e| StorageError::Corrupt {
            url: url.to_string(),
            message: e.to_string(),
        })?;
        Ok(Some(page))
    }
}

fn read_optional(path: &Path) -> StorageResult<Option<Vec<u8>>> {
    match fs::read(path) {
        Ok(raw) => Ok(Some(raw)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

impl Storage for ShardedStore {
    fn get(&self, url: &str) -> StorageResult<Option<Page>> {
        match self.shard_path(url) {
            Some(dir) => self.read_record(&dir, url),
            None => Ok(None),
        }
    }

    fn put(&self, url: &str, page: &Page) -> StorageResult<()> {
        let dir = self.shard_path(url).ok_or_else(|| StorageError::Corrupt {
            url: url.to_string(),
            message: "unparseable URL key".to_string(),
        })?;

        self.record_link(url, page.fetched)?;
        self.write_record(&dir, page)
    }

    fn delete(&self, url: &str) -> StorageResult<Option<Page>> {
        let Some(dir) = self.shard_path(url) else {
            return Ok(None);
        };

        let page = self.read_record(&dir, url)?;
        if page.is_some() {
            fs::remove_dir_all(&dir)?;
        }
        Ok(page)
    }

    fn has(&self, url: &str) -> StorageResult<bool> {
        match self.shard_path(url) {
            Some(dir) => Ok(dir.join(META_FILE).exists()),
            None => Ok(false),
        }
    }

    fn mark_pending(&self, url: &str) -> StorageResult<bool> {
        let Some(dir) = self.shard_path(url) else {
            return Ok(false);
        };
        let Ok(parsed) = Url::parse(url) else {
            return Ok(false);
        };

        // The existence check and the placeholder write happen under the
        // engine mutex; concurrent discoverers of the same URL see
        // exactly one winner.
        let mut sets = self.sets.lock().unwrap();
        if dir.join(META_FILE).exists() {
            return Ok(false);
        }

        fs::create_dir_all(&dir)?;
        fs::write(
            dir.join(META_FILE),
            serde_json::to_vec_pretty(&Page::pending(parsed).meta())?,
        )?;

        sets.unfetched.insert(url.to_string());
        if sets.unfetched.len() >= self.batch_size {
            Self::flush_set(&mut sets.unfetched, &self.unfetched_dir)?;
        }

        Ok(true)
    }

    fn load_links(&self, limit: usize) -> StorageResult<Option<Vec<String>>> {
        let mut sets = self.sets.lock().unwrap();

        if !sets.unfetched.is_empty() {
            let mut links: Vec<String> = sets.unfetched.drain().collect();
            if links.len() > limit {
                let rest = links.split_off(limit);
                sets.unfetched.extend(rest);
            }
            return Ok(Some(links));
        }

        // Consume one persisted batch file. Another process may have
        // grabbed the same file between listing and reading; a vanished
        // file is treated as already drained.
        for entry in fs::read_dir(&self.unfetched_dir)? {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }

            let contents = match fs::read_to_string(&path) {
                Ok(contents) => contents,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            fs::remove_file(&path).or_else(ignore_not_found)?;

            let mut links: Vec<String> = contents
                .lines()
                .filter(|line| !line.is_empty())
                .map(str::to_string)
                .collect();
            if links.is_empty() {
                continue;
            }

            if links.len() > limit {
                let rest = links.split_off(limit);
                sets.unfetched.extend(rest);
            }
            return Ok(Some(links));
        }

        Ok(None)
    }

    fn close(&self) -> StorageResult<()> {
        let mut sets = self.sets.lock().unwrap();
        Self::flush_set(&mut sets.fetched, &self.fetched_dir)?;
        Self::flush_set(&mut sets.unfetched, &self.unfetched_dir)?;
        Ok(())
    }
}

fn ignore_not_found(e: std::io::Error) -> std::io::Result<()> {
    if e.kind() == ErrorKind::NotFound {
        Ok(())
    } else {
        Err(e)
    }
}

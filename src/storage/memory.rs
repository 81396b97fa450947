//! In-memory storage backend
//!
//! The default engine when no storage root is configured. Unlike the
//! sharded filesystem backend it supports enumeration, at the cost of
//! holding every page in memory and surviving nothing across restarts.

use crate::page::Page;
use crate::storage::traits::{Storage, StorageResult};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use url::Url;

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    pages: HashMap<String, Page>,
    unfetched: HashSet<String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Storage for MemoryStore {
    fn get(&self, url: &str) -> StorageResult<Option<Page>> {
        Ok(self.inner.lock().unwrap().pages.get(url).cloned())
    }

    fn put(&self, url: &str, page: &Page) -> StorageResult<()> {
        let mut inner = self.inner.lock().unwrap();
        if page.fetched {
            inner.unfetched.remove(url);
        } else {
            inner.unfetched.insert(url.to_string());
        }
        inner.pages.insert(url.to_string(), page.clone());
        Ok(())
    }

    fn delete(&self, url: &str) -> StorageResult<Option<Page>> {
        let mut inner = self.inner.lock().unwrap();
        inner.unfetched.remove(url);
        Ok(inner.pages.remove(url))
    }

    fn has(&self, url: &str) -> StorageResult<bool> {
        Ok(self.inner.lock().unwrap().pages.contains_key(url))
    }

    fn mark_pending(&self, url: &str) -> StorageResult<bool> {
        let Ok(parsed) = Url::parse(url) else {
            return Ok(false);
        };

        let mut inner = self.inner.lock().unwrap();
        if inner.pages.contains_key(url) {
            return Ok(false);
        }

        inner.pages.insert(url.to_string(), Page::pending(parsed));
        inner.unfetched.insert(url.to_string());
        Ok(true)
    }

    fn load_links(&self, limit: usize) -> StorageResult<Option<Vec<String>>> {
        let mut inner = self.inner.lock().unwrap();
        if inner.unfetched.is_empty() {
            return Ok(None);
        }

        let mut links: Vec<String> = inner.unfetched.drain().collect();
        if links.len() > limit {
            let rest = links.split_off(limit);
            inner.unfetched.extend(rest);
        }
        Ok(Some(links))
    }

    fn close(&self) -> StorageResult<()> {
        Ok(())
    }

    fn len(&self) -> StorageResult<usize> {
        Ok(self.inner.lock().unwrap().pages.len())
    }

    fn keys(&self) -> StorageResult<Vec<String>> {
        Ok(self.inner.lock().unwrap().pages.keys().cloned().collect())
    }
}

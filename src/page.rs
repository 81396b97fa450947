//! Page and link-job data model
//!
//! A [`LinkJob`] is the unit carried by every queue: the URL to fetch,
//! the referring page, and the distance from the seed set. A [`Page`] is
//! the result of fetching one URL; once the orchestrator dequeues it, the
//! only permitted mutation is [`Page::discard_body`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

/// A unit of frontier work.
///
/// Seed URLs enter at depth 0; a link discovered on a page at depth `d`
/// is enqueued at depth `d + 1`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkJob {
    pub url: String,
    pub referer: Option<String>,
    pub depth: u32,
}

impl LinkJob {
    pub fn new(url: impl Into<String>, referer: Option<String>, depth: u32) -> Self {
        Self {
            url: url.into(),
            referer,
            depth,
        }
    }

    /// A job with no referer at depth 0. Used for seeds and for links
    /// recovered from checkpoint batches, which store bare URLs.
    pub fn seed(url: impl Into<String>) -> Self {
        Self::new(url, None, 0)
    }

    /// Encodes the job in the durable-queue wire format:
    /// `[url, referer|null, depth]`.
    pub fn encode(&self) -> String {
        serde_json::json!([self.url, self.referer, self.depth]).to_string()
    }

    /// Decodes a durable-queue payload.
    ///
    /// Accepts the bare array form or an `{"data": [...]}` envelope.
    /// Returns `None` for anything malformed; consumers skip such
    /// payloads rather than failing the pop.
    pub fn decode(raw: &str) -> Option<Self> {
        let value: Value = serde_json::from_str(raw).ok()?;
        let items = match &value {
            Value::Object(map) => map.get("data")?.as_array()?,
            Value::Array(items) => items,
            _ => return None,
        };

        let url = items.first()?.as_str()?.to_string();
        let referer = match items.get(1) {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s.clone()),
            Some(_) => return None,
        };
        let depth = match items.get(2) {
            None => 0,
            Some(v) => u32::try_from(v.as_u64()?).ok()?,
        };

        Some(Self {
            url,
            referer,
            depth,
        })
    }
}

/// The result of fetching one URL.
///
/// Fetch failures are carried as pages with `error` set rather than
/// raised across the queue boundary, so the orchestrator always receives
/// a well-formed value. A fetch that followed redirects produces one page
/// per hop.
#[derive(Debug, Clone)]
pub struct Page {
    pub url: Url,
    pub referer: Option<String>,
    pub depth: u32,
    /// HTTP status code; absent when the request never got a response.
    pub code: Option<u16>,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
    /// Outbound links extracted from the body.
    pub links: Vec<Url>,
    /// True once an HTTP response was received for this URL.
    pub fetched: bool,
    pub error: Option<String>,
    pub fetched_at: Option<DateTime<Utc>>,
}

impl Page {
    /// Lightweight placeholder recorded when a URL is enqueued but not
    /// yet fetched. Its presence in the page store is what suppresses
    /// re-enqueueing.
    pub fn pending(url: Url) -> Self {
        Self {
            url,
            referer: None,
            depth: 0,
            code: None,
            headers: Vec::new(),
            body: None,
            links: Vec::new(),
            fetched: false,
            error: None,
            fetched_at: None,
        }
    }

    /// A page built from an HTTP response.
    pub fn from_response(
        url: Url,
        referer: Option<String>,
        depth: u32,
        code: u16,
        headers: Vec<(String, String)>,
        body: Option<String>,
        links: Vec<Url>,
    ) -> Self {
        Self {
            url,
            referer,
            depth,
            code: Some(code),
            headers,
            body,
            links,
            fetched: true,
            error: None,
            fetched_at: Some(Utc::now()),
        }
    }

    /// A page representing a failed fetch (no response received).
    pub fn failed(url: Url, referer: Option<String>, depth: u32, error: String) -> Self {
        Self {
            url,
            referer,
            depth,
            code: None,
            headers: Vec::new(),
            body: None,
            links: Vec::new(),
            fetched: false,
            error: Some(error),
            fetched_at: Some(Utc::now()),
        }
    }

    /// True for 3xx responses; such pages record intermediate redirect
    /// hops and carry no outbound links of their own.
    pub fn is_redirect(&self) -> bool {
        matches!(self.code, Some(code) if (300..400).contains(&code))
    }

    /// Drops the body to bound memory once page callbacks have run. The
    /// one permitted mutation after the page leaves the queue.
    pub fn discard_body(&mut self) {
        self.body = None;
    }

    /// First header value matching `name`, case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub(crate) fn meta(&self) -> PageMeta {
        PageMeta {
            url: self.url.to_string(),
            referer: self.referer.clone(),
            depth: self.depth,
            code: self.code,
            links: self.links.iter().map(Url::to_string).collect(),
            fetched: self.fetched,
            error: self.error.clone(),
            fetched_at: self.fetched_at,
        }
    }

    pub(crate) fn from_parts(
        meta: PageMeta,
        headers: Option<Vec<u8>>,
        body: Option<Vec<u8>>,
    ) -> Result<Self, url::ParseError> {
        let url = Url::parse(&meta.url)?;
        let links = meta
            .links
            .iter()
            .filter_map(|link| Url::parse(link).ok())
            .collect();

        Ok(Self {
            url,
            referer: meta.referer,
            depth: meta.depth,
            code: meta.code,
            headers: headers
                .map(|raw| headers_from_blob(&raw))
                .unwrap_or_default(),
            body: body.map(|raw| String::from_utf8_lossy(&raw).into_owned()),
            links,
            fetched: meta.fetched,
            error: meta.error,
            fetched_at: meta.fetched_at,
        })
    }

    /// Headers rendered as raw `name: value` lines for the storage
    /// engine's binary-field file.
    pub(crate) fn headers_blob(&self) -> Vec<u8> {
        let mut blob = Vec::new();
        for (name, value) in &self.headers {
            blob.extend_from_slice(name.as_bytes());
            blob.extend_from_slice(b": ");
            blob.extend_from_slice(value.as_bytes());
            blob.push(b'\n');
        }
        blob
    }
}

/// The structured-metadata portion of a stored page. Body and headers are
/// written as separate raw files and never pass through this encoder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct PageMeta {
    pub url: String,
    pub referer: Option<String>,
    pub depth: u32,
    pub code: Option<u16>,
    pub links: Vec<String>,
    pub fetched: bool,
    pub error: Option<String>,
    pub fetched_at: Option<DateTime<Utc>>,
}

pub(crate) fn headers_from_blob(raw: &[u8]) -> Vec<(String, String)> {
    String::from_utf8_lossy(raw)
        .lines()
        .filter_map(|line| {
            let (name, value) = line.split_once(": ")?;
            Some((name.to_string(), value.to_string()))
        })
        .collect()
}

//! Limit/offset pagination.
//!
//! `limit` falls back to the configured default when missing or not a
//! positive integer and is capped at the configured maximum. `offset` falls
//! back to zero. Links are absolute URLs that carry every other query
//! parameter of the original request.

use axum::http::{header::HOST, HeaderMap};
use serde::Serialize;
use url::Url;

use libris_kernel::settings::PaginationSettings;

use crate::query::QueryParams;

pub const LIMIT_PARAM: &str = "limit";
pub const OFFSET_PARAM: &str = "offset";

const FALLBACK_ORIGIN: &str = "http://localhost";

/// One page of results.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    pub count: usize,
    pub next: Option<String>,
    pub previous: Option<String>,
    pub results: Vec<T>,
}

/// Resolved window for a list request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimitOffset {
    pub limit: usize,
    pub offset: usize,
}

impl LimitOffset {
    pub fn from_query(query: &QueryParams, settings: &PaginationSettings) -> Self {
        let limit = query
            .get(LIMIT_PARAM)
            .and_then(|raw| raw.trim().parse::<i64>().ok())
            .filter(|limit| *limit > 0)
            .map(|limit| usize::try_from(limit).unwrap_or(usize::MAX))
            .unwrap_or(settings.default_limit)
            .min(settings.max_limit);

        let offset = query
            .get(OFFSET_PARAM)
            .and_then(|raw| raw.trim().parse::<i64>().ok())
            .and_then(|offset| usize::try_from(offset).ok())
            .unwrap_or(0);

        Self { limit, offset }
    }

    pub fn next_offset(&self, count: usize) -> Option<usize> {
        let next = self.offset.saturating_add(self.limit);
        (next < count).then_some(next)
    }

    /// Offset of the previous page; `Some(0)` means the first page.
    pub fn previous_offset(&self) -> Option<usize> {
        (self.offset > 0).then(|| self.offset.saturating_sub(self.limit))
    }

    /// Wrap already-windowed `results` into a page with navigation links.
    pub fn into_page<T>(self, count: usize, results: Vec<T>, links: &PageLinks) -> Page<T> {
        Page {
            count,
            next: self
                .next_offset(count)
                .map(|offset| links.to(self.limit, offset)),
            previous: self
                .previous_offset()
                .map(|offset| links.to(self.limit, offset)),
            results,
        }
    }
}

/// Builds navigation links for a list request.
#[derive(Debug, Clone)]
pub struct PageLinks {
    base: Url,
    query: QueryParams,
}

impl PageLinks {
    /// `origin` is scheme + authority plus an optional mount path such as
    /// `https://host/libris`; `path` is the request path appended to it.
    pub fn new(origin: &str, path: &str, query: QueryParams) -> Result<Self, url::ParseError> {
        let mut base = Url::parse(origin)?;
        if base.cannot_be_a_base() {
            return Err(url::ParseError::RelativeUrlWithCannotBeABaseBase);
        }

        let mount = base.path().trim_end_matches('/').to_string();
        base.set_path(&format!("{mount}/{}", path.trim_start_matches('/')));
        base.set_query(None);
        base.set_fragment(None);
        Ok(Self { base, query })
    }

    /// Links for an incoming request. The origin is the configured public URL,
    /// else the `Host` header, else `http://localhost`; an origin that does not
    /// parse is replaced by the fallback.
    pub fn for_request(
        public_url: Option<&str>,
        headers: &HeaderMap,
        path: &str,
        query: QueryParams,
    ) -> Result<Self, url::ParseError> {
        let origin = request_origin(public_url, headers);
        match Self::new(&origin, path, query.clone()) {
            Ok(links) => Ok(links),
            Err(err) => {
                tracing::debug!(%origin, error = %err, "unusable link origin; using fallback");
                Self::new(FALLBACK_ORIGIN, path, query)
            }
        }
    }

    /// Link to the page at `offset`; a zero offset is left out of the URL.
    pub fn to(&self, limit: usize, offset: usize) -> String {
        let mut url = self.base.clone();
        url.set_query(None);
        {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in self.query.pairs() {
                if key != LIMIT_PARAM && key != OFFSET_PARAM {
                    pairs.append_pair(key, value);
                }
            }
            pairs.append_pair(LIMIT_PARAM, &limit.to_string());
            if offset > 0 {
                pairs.append_pair(OFFSET_PARAM, &offset.to_string());
            }
        }
        url.into()
    }
}

fn request_origin(public_url: Option<&str>, headers: &HeaderMap) -> String {
    if let Some(public_url) = public_url {
        return public_url.trim_end_matches('/').to_string();
    }
    headers
        .get(HOST)
        .and_then(|host| host.to_str().ok())
        .filter(|host| !host.is_empty())
        .map(|host| format!("http://{}", host))
        .unwrap_or_else(|| FALLBACK_ORIGIN.to_string())
}

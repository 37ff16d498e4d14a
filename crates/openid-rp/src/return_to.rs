//! Allocation of `openid.return_to` URLs.

use std::sync::Arc;

use serde::Deserialize;

use crate::transport::HttpTransport;
use crate::{Error, Result};

/// Query parameter that carries the request id inside `return_to`.
pub const REQUEST_ID_PARAM: &str = "request_id";

/// Produces the URL the OP redirects back to for a given request id.
pub trait ReturnToAllocator: Send + Sync {
    /// Return a URL embedding `request_id`.
    fn allocate(&self, request_id: &str) -> Result<String>;
}

/// Set `request_id=<id>` on `base`, keeping the rest of its query.
///
/// A `request_id` already present in `base` is dropped.
pub fn with_request_id(base: &str, request_id: &str) -> Result<String> {
    let mut url = url::Url::parse(base).map_err(|e| Error::invalid_url(base, e))?;
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .into_owned()
        .filter(|(key, _)| key != REQUEST_ID_PARAM)
        .collect();
    url.query_pairs_mut()
        .clear()
        .extend_pairs(kept)
        .append_pair(REQUEST_ID_PARAM, request_id);
    Ok(url.into())
}

/// A first-party callback endpoint.
#[derive(Debug, Clone)]
pub struct FixedReturnTo {
    base: String,
}

impl FixedReturnTo {
    /// Use `base` for every request.
    pub fn new(base: impl Into<String>) -> Self {
        Self { base: base.into() }
    }
}

impl ReturnToAllocator for FixedReturnTo {
    fn allocate(&self, request_id: &str) -> Result<String> {
        with_request_id(&self.base, request_id)
    }
}

#[derive(Debug, Deserialize)]
struct BinReply {
    name: Option<String>,
}

/// Throwaway callback endpoints from a request-bin style service.
///
/// Lets a developer see what the OP sends back without running a web server.
/// Not for production use.
pub struct RequestBinAllocator {
    api_url: String,
    public_base: String,
    transport: Arc<dyn HttpTransport>,
}

impl RequestBinAllocator {
    /// Bin creation endpoint.
    pub const DEFAULT_API_URL: &'static str = "https://requestb.in/api/v1/bins";
    /// Base under which created bins are reachable.
    pub const DEFAULT_PUBLIC_BASE: &'static str = "https://requestb.in";

    /// Allocator against the default service.
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        Self::with_endpoints(Self::DEFAULT_API_URL, Self::DEFAULT_PUBLIC_BASE, transport)
    }

    /// Allocator against a self-hosted service.
    pub fn with_endpoints(
        api_url: impl Into<String>,
        public_base: impl Into<String>,
        transport: Arc<dyn HttpTransport>,
    ) -> Self {
        Self {
            api_url: api_url.into(),
            public_base: public_base.into(),
            transport,
        }
    }
}

impl ReturnToAllocator for RequestBinAllocator {
    fn allocate(&self, request_id: &str) -> Result<String> {
        let reply = self
            .transport
            .post_form(&self.api_url, "private=false".to_string())?;
        if !reply.is_success() {
            return Err(Error::Protocol(format!(
                "bin creation at {} failed: HTTP {}",
                self.api_url, reply.status
            )));
        }

        let bin: BinReply = serde_json::from_str(&reply.body)?;
        let name = bin
            .name
            .filter(|n| !n.is_empty())
            .ok_or_else(|| Error::Protocol("bin creation reply missing name".to_string()))?;

        let base = format!("{}/{name}", self.public_base.trim_end_matches('/'));
        tracing::debug!(%base, request_id, "allocated request bin");
        with_request_id(&base, request_id)
    }
}

impl std::fmt::Debug for RequestBinAllocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestBinAllocator")
            .field("api_url", &self.api_url)
            .field("public_base", &self.public_base)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{MockTransport, ok};

    #[test]
    fn fixed_base_gets_request_id() {
        let alloc = FixedReturnTo::new("http://localhost:8000/");
        assert_eq!(
            alloc.allocate("abc").unwrap(),
            "http://localhost:8000/?request_id=abc"
        );

        let alloc = FixedReturnTo::new("https://rp.example/cb?tenant=t1");
        assert_eq!(
            alloc.allocate("abc").unwrap(),
            "https://rp.example/cb?tenant=t1&request_id=abc"
        );
    }

    #[test]
    fn existing_request_id_is_replaced() {
        let url = with_request_id("https://rp.example/cb?request_id=stale&tenant=t1", "fresh")
            .unwrap();
        assert_eq!(url, "https://rp.example/cb?tenant=t1&request_id=fresh");

        let parsed = crate::assertion::UrlParts::parse(&url).unwrap();
        assert_eq!(parsed.query().all(REQUEST_ID_PARAM), ["fresh".to_string()]);
    }

    #[test]
    fn fixed_base_must_parse() {
        let alloc = FixedReturnTo::new("localhost");
        assert!(matches!(alloc.allocate("abc"), Err(Error::InvalidUrl { .. })));
    }

    #[test]
    fn request_bin_url() {
        let transport = Arc::new(MockTransport::new(vec![(
            "/api/v1/bins",
            ok(r#"{"name": "1e7ing31", "private": false}"#),
        )]));
        let alloc = RequestBinAllocator::new(transport.clone());

        let url = alloc.allocate("07c52d8b").unwrap();
        assert_eq!(url, "https://requestb.in/1e7ing31?request_id=07c52d8b");

        let requests = transport.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].method, "POST");
        assert_eq!(requests[0].body.as_deref(), Some("private=false"));
    }

    #[test]
    fn request_bin_without_name() {
        let transport = Arc::new(MockTransport::answering("{}"));
        let alloc = RequestBinAllocator::new(transport);
        assert!(matches!(alloc.allocate("x"), Err(Error::Protocol(_))));
    }

    #[test]
    fn request_bin_http_failure() {
        let mut reply = ok("");
        reply.status = 503;
        let transport = Arc::new(MockTransport::new(vec![("", reply)]));
        let alloc = RequestBinAllocator::new(transport);
        assert!(matches!(alloc.allocate("x"), Err(Error::Protocol(_))));
    }
}

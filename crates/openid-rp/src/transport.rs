//! Outbound HTTP.
//!
//! Both protocol requests are issued with redirects disabled: the
//! authentication request needs the OP's `Location` header itself, and direct
//! verification must talk to `openid.op_endpoint` and nothing else.

use crate::Result;

#[cfg(feature = "transport-reqwest")]
use std::time::Duration;

/// Content type of direct verification requests.
pub const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Response to an outbound request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HttpReply {
    /// HTTP status code.
    pub status: u16,
    /// `Location` header, if any.
    pub location: Option<String>,
    /// Response body as text.
    pub body: String,
}

impl HttpReply {
    /// True for 3xx statuses.
    pub fn is_redirect(&self) -> bool {
        (300..400).contains(&self.status)
    }

    /// True for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Blocking HTTP client that never follows redirects.
pub trait HttpTransport: Send + Sync {
    /// GET `url`.
    fn get(&self, url: &str) -> Result<HttpReply>;

    /// POST an `application/x-www-form-urlencoded` `body` to `url`.
    fn post_form(&self, url: &str, body: String) -> Result<HttpReply>;
}

/// [`HttpTransport`] backed by `reqwest::blocking`.
///
/// Must not be used from inside an async runtime.
#[cfg(feature = "transport-reqwest")]
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::blocking::Client,
}

#[cfg(feature = "transport-reqwest")]
impl ReqwestTransport {
    /// Default request timeout.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

    /// Transport with [`Self::DEFAULT_TIMEOUT`].
    pub fn new() -> Result<Self> {
        Self::with_timeout(Self::DEFAULT_TIMEOUT)
    }

    /// Transport with a custom per-request timeout.
    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(timeout)
            .user_agent(concat!("openid-rp/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }

    fn reply(resp: reqwest::blocking::Response) -> Result<HttpReply> {
        let status = resp.status().as_u16();
        let location = resp
            .headers()
            .get(reqwest::header::LOCATION)
            .and_then(|h| h.to_str().ok())
            .map(str::to_string);
        let body = resp.text()?;
        Ok(HttpReply {
            status,
            location,
            body,
        })
    }
}

#[cfg(feature = "transport-reqwest")]
impl HttpTransport for ReqwestTransport {
    fn get(&self, url: &str) -> Result<HttpReply> {
        let resp = self.client.get(url).send()?;
        Self::reply(resp)
    }

    fn post_form(&self, url: &str, body: String) -> Result<HttpReply> {
        let resp = self
            .client
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, FORM_CONTENT_TYPE)
            .body(body)
            .send()?;
        Self::reply(resp)
    }
}

/// The transport used when the caller does not inject one.
#[cfg(feature = "transport-reqwest")]
pub(crate) fn default_transport() -> Result<std::sync::Arc<dyn HttpTransport>> {
    Ok(std::sync::Arc::new(ReqwestTransport::new()?))
}

#[cfg(not(feature = "transport-reqwest"))]
pub(crate) fn default_transport() -> Result<std::sync::Arc<dyn HttpTransport>> {
    Ok(std::sync::Arc::new(NoTransport))
}

/// Placeholder that fails every request when no HTTP backend is compiled in.
#[cfg(not(feature = "transport-reqwest"))]
#[derive(Debug)]
struct NoTransport;

#[cfg(not(feature = "transport-reqwest"))]
impl HttpTransport for NoTransport {
    fn get(&self, url: &str) -> Result<HttpReply> {
        Err(crate::Error::Transport(format!(
            "GET {url}: no transport configured (enable transport-reqwest or inject one)"
        )))
    }

    fn post_form(&self, url: &str, _body: String) -> Result<HttpReply> {
        Err(crate::Error::Transport(format!(
            "POST {url}: no transport configured (enable transport-reqwest or inject one)"
        )))
    }
}

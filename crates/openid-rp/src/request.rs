//! Authentication requests (`checkid_setup`).

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::Serialize;
use url::form_urlencoded;

use crate::assertion::{CLAIMED_ID, IDENTITY, MODE, NS, RETURN_TO};
use crate::return_to::{ReturnToAllocator, with_request_id};
use crate::transport::HttpTransport;
use crate::{Error, Result};

/// Mode sent by this relying party.
pub const CHECKID_SETUP: &str = "checkid_setup";
/// OpenID 2.0 namespace.
pub const OPENID_NS: &str = "http://specs.openid.net/auth/2.0";
/// Lets the OP choose the identifier.
pub const IDENTIFIER_SELECT: &str = "http://specs.openid.net/auth/2.0/identifier_select";

/// An authentication request ready to be sent to an OP.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticationRequest {
    mode: &'static str,
    namespace: &'static str,
    identity: &'static str,
    claimed_id: &'static str,
    return_to: String,
    request_id: String,
}

/// Audit record of a sent request.
#[derive(Debug, Clone, Serialize)]
pub struct Evidence {
    /// The `openid.*` pairs, in send order.
    pub payload: Vec<(String, String)>,
    /// Correlation id embedded in `return_to`.
    pub request_id: String,
    /// Seconds since the unix epoch.
    pub timestamp: u64,
    /// `timestamp` as an HTTP date.
    pub http_date: String,
}

impl AuthenticationRequest {
    /// Start building a request.
    pub fn builder() -> AuthenticationRequestBuilder {
        AuthenticationRequestBuilder::default()
    }

    /// `openid.mode`
    pub fn mode(&self) -> &str {
        self.mode
    }

    /// `openid.ns`
    pub fn namespace(&self) -> &str {
        self.namespace
    }

    /// `openid.identity`
    pub fn identity(&self) -> &str {
        self.identity
    }

    /// `openid.claimed_id`
    pub fn claimed_id(&self) -> &str {
        self.claimed_id
    }

    /// `openid.return_to`
    pub fn return_to(&self) -> &str {
        &self.return_to
    }

    /// Correlation id embedded in `return_to`.
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// The five `openid.*` pairs in send order.
    pub fn payload(&self) -> [(&'static str, &str); 5] {
        [
            (MODE, self.mode),
            (NS, self.namespace),
            (IDENTITY, self.identity),
            (CLAIMED_ID, self.claimed_id),
            (RETURN_TO, self.return_to.as_str()),
        ]
    }

    /// Query-string encode `payload`.
    pub fn encode<'a, I>(payload: I) -> String
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        form_urlencoded::Serializer::new(String::new())
            .extend_pairs(payload)
            .finish()
    }

    /// Full URL to send the user agent to.
    pub fn destination(&self, op_endpoint: &str) -> String {
        format!("{op_endpoint}?{}", Self::encode(self.payload()))
    }

    /// Send the request to `op_endpoint` and return the OP's login URL.
    ///
    /// The OP is expected to answer with a redirect; its `Location` header is
    /// where the user agent must go next.
    pub fn authenticate(&self, op_endpoint: &str, transport: &dyn HttpTransport) -> Result<String> {
        url::Url::parse(op_endpoint).map_err(|e| Error::invalid_url(op_endpoint, e))?;

        let reply = transport.get(&self.destination(op_endpoint))?;
        match reply.location {
            Some(location) if !location.is_empty() => {
                tracing::info!(
                    request_id = %self.request_id,
                    op_endpoint,
                    status = reply.status,
                    "OP accepted authentication request"
                );
                Ok(location)
            }
            _ => Err(Error::Protocol(format!(
                "OP at {op_endpoint} did not redirect (HTTP {})",
                reply.status
            ))),
        }
    }

    /// Record of what is sent, stamped with the current time.
    pub fn evidence(&self) -> Evidence {
        let now = SystemTime::now();
        let timestamp = now
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::from_secs(0))
            .as_secs();
        Evidence {
            payload: self
                .payload()
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
            request_id: self.request_id.clone(),
            timestamp,
            http_date: httpdate::fmt_http_date(now),
        }
    }
}

/// Builder for [`AuthenticationRequest`].
#[derive(Default)]
pub struct AuthenticationRequestBuilder {
    request_id: Option<String>,
    return_to_base: Option<String>,
    allocator: Option<Arc<dyn ReturnToAllocator>>,
}

impl AuthenticationRequestBuilder {
    /// Use a caller-chosen correlation id instead of a random one.
    #[must_use]
    pub fn request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    /// Callback URL; the request id is appended as `request_id`.
    #[must_use]
    pub fn return_to(mut self, base: impl Into<String>) -> Self {
        self.return_to_base = Some(base.into());
        self
    }

    /// Allocator consulted when no `return_to` base is set.
    #[must_use]
    pub fn allocator(mut self, allocator: Arc<dyn ReturnToAllocator>) -> Self {
        self.allocator = Some(allocator);
        self
    }

    /// Fill in defaults and produce the request.
    ///
    /// Without a `return_to` base or an allocator, a request-bin URL is
    /// allocated over the network.
    pub fn build(self) -> Result<AuthenticationRequest> {
        let request_id = self
            .request_id
            .filter(|id| !id.is_empty())
            .unwrap_or_else(new_request_id);

        let return_to = match (self.return_to_base, self.allocator) {
            (Some(base), _) => with_request_id(&base, &request_id)?,
            (None, Some(allocator)) => allocator.allocate(&request_id)?,
            (None, None) => default_allocator()?.allocate(&request_id)?,
        };

        tracing::debug!(%request_id, %return_to, "built authentication request");

        Ok(AuthenticationRequest {
            mode: CHECKID_SETUP,
            namespace: OPENID_NS,
            identity: IDENTIFIER_SELECT,
            claimed_id: IDENTIFIER_SELECT,
            return_to,
            request_id,
        })
    }
}

impl std::fmt::Debug for AuthenticationRequestBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthenticationRequestBuilder")
            .field("request_id", &self.request_id)
            .field("return_to_base", &self.return_to_base)
            .field("allocator", &self.allocator.is_some())
            .finish()
    }
}

/// Random 128-bit id as 32 lowercase hex digits.
pub fn new_request_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

#[cfg(feature = "transport-reqwest")]
fn default_allocator() -> Result<Arc<dyn ReturnToAllocator>> {
    let transport = crate::transport::default_transport()?;
    Ok(Arc::new(crate::return_to::RequestBinAllocator::new(transport)))
}

#[cfg(not(feature = "transport-reqwest"))]
fn default_allocator() -> Result<Arc<dyn ReturnToAllocator>> {
    Err(Error::Protocol(
        "no return_to given and no allocator available (enable transport-reqwest)".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::return_to::FixedReturnTo;
    use crate::test_support::{MockTransport, redirect};

    fn request() -> AuthenticationRequest {
        AuthenticationRequest::builder()
            .return_to("http://somewhere/")
            .build()
            .unwrap()
    }

    #[test]
    fn fixed_fields() {
        let req = request();
        assert_eq!(req.mode(), "checkid_setup");
        assert_eq!(req.namespace(), "http://specs.openid.net/auth/2.0");
        assert_eq!(
            req.identity(),
            "http://specs.openid.net/auth/2.0/identifier_select"
        );
        assert_eq!(req.claimed_id(), req.identity());
        assert_eq!(req.request_id().len(), 32);
        assert!(req.request_id().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn request_ids_are_unique() {
        assert_ne!(request().request_id(), request().request_id());
    }

    #[test]
    fn return_to_embeds_request_id() {
        let req = AuthenticationRequest::builder()
            .request_id("ID1")
            .return_to("http://localhost:8000/")
            .build()
            .unwrap();
        assert_eq!(req.return_to(), "http://localhost:8000/?request_id=ID1");
    }

    #[test]
    fn allocator_is_keyed_by_request_id() {
        let req = AuthenticationRequest::builder()
            .request_id("ID2")
            .allocator(Arc::new(FixedReturnTo::new("https://rp.example/cb")))
            .build()
            .unwrap();
        assert_eq!(req.return_to(), "https://rp.example/cb?request_id=ID2");
    }

    #[test]
    fn payload_has_five_keys_in_order() {
        let req = request();
        let keys: Vec<_> = req.payload().iter().map(|(k, _)| *k).collect();
        assert_eq!(
            keys,
            [
                "openid.mode",
                "openid.ns",
                "openid.identity",
                "openid.claimed_id",
                "openid.return_to"
            ]
        );
        assert!(req.payload().iter().all(|(_, v)| !v.is_empty()));
    }

    #[test]
    fn encoded_payload_round_trips() {
        let req = request();
        let encoded = AuthenticationRequest::encode(req.payload());
        assert!(encoded.contains("openid.ns="));
        assert!(encoded.contains('&'));

        let decoded: Vec<(String, String)> = form_urlencoded::parse(encoded.as_bytes())
            .into_owned()
            .collect();
        let expected: Vec<(String, String)> = req
            .payload()
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        assert_eq!(decoded, expected);
    }

    #[test]
    fn destination_appends_query() {
        let req = request();
        let dest = req.destination("https://eu.wargaming.net/id/openid/");
        assert!(dest.starts_with("https://eu.wargaming.net/id/openid/?openid.mode=checkid_setup&"));
        assert!(dest.contains("openid.return_to=http%3A%2F%2Fsomewhere%2F%3Frequest_id%3D"));
    }

    #[test]
    fn authenticate_returns_location() {
        let req = request();
        let transport =
            MockTransport::new(vec![("wargaming.net", redirect("https://test.it/login"))]);
        let location = req
            .authenticate("https://eu.wargaming.net/id/openid/", &transport)
            .unwrap();
        assert_eq!(location, "https://test.it/login");

        let sent = transport.requests();
        assert_eq!(sent[0].method, "GET");
        assert_eq!(sent[0].url, req.destination("https://eu.wargaming.net/id/openid/"));
    }

    #[test]
    fn authenticate_without_redirect_is_protocol_error() {
        let req = request();
        let transport = MockTransport::answering("<html>login</html>");
        let err = req
            .authenticate("https://op.example/", &transport)
            .unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
    }

    #[test]
    fn authenticate_rejects_bad_endpoint() {
        let req = request();
        let transport = MockTransport::answering("");
        assert!(matches!(
            req.authenticate("not an url", &transport),
            Err(Error::InvalidUrl { .. })
        ));
        assert!(transport.requests().is_empty());
    }

    #[test]
    fn evidence_records_request() {
        let req = request();
        let evidence = req.evidence();
        assert_eq!(evidence.request_id, req.request_id());
        assert_eq!(evidence.payload.len(), 5);
        assert!(evidence.timestamp > 0);
        assert!(evidence.http_date.ends_with("GMT"));

        let json = serde_json::to_value(&evidence).unwrap();
        assert_eq!(json["request_id"], req.request_id());
    }
}

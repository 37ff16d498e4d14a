//! Parsed callback URLs.
//!
//! The URL components are kept exactly as received. Return URL verification
//! compares scheme, authority and path byte for byte, so nothing here
//! lowercases hosts, strips default ports, or turns an empty path into `/`.

use crate::{Error, Result};

use url::form_urlencoded;

/// `openid.mode`
pub const MODE: &str = "openid.mode";
/// `openid.ns`
pub const NS: &str = "openid.ns";
/// `openid.identity`
pub const IDENTITY: &str = "openid.identity";
/// `openid.claimed_id`
pub const CLAIMED_ID: &str = "openid.claimed_id";
/// `openid.return_to`
pub const RETURN_TO: &str = "openid.return_to";
/// `openid.response_nonce`
pub const RESPONSE_NONCE: &str = "openid.response_nonce";
/// `openid.op_endpoint`
pub const OP_ENDPOINT: &str = "openid.op_endpoint";

/// Multi-valued query parameters in first-seen key order.
///
/// OpenID allows a parameter name to repeat; the first value is the canonical
/// one, but every value is kept for direct verification.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams {
    entries: Vec<(String, Vec<String>)>,
}

impl QueryParams {
    /// Decode an `application/x-www-form-urlencoded` query string.
    ///
    /// Pairs with an empty value are skipped.
    pub fn parse(query: &str) -> Self {
        let mut params = Self::default();
        for (key, value) in form_urlencoded::parse(query.as_bytes()) {
            if value.is_empty() {
                continue;
            }
            params.push(key.into_owned(), value.into_owned());
        }
        params
    }

    fn push(&mut self, key: String, value: String) {
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, values)) => values.push(value),
            None => self.entries.push((key, vec![value])),
        }
    }

    /// First value for `key`.
    pub fn first(&self, key: &str) -> Option<&str> {
        self.all(key).first().map(String::as_str)
    }

    /// Every value for `key`, in order of appearance.
    pub fn all(&self, key: &str) -> &[String] {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map_or(&[][..], |(_, values)| values.as_slice())
    }

    /// True if `key` appears at least once.
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    /// Keys with their values, in first-seen order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries
            .iter()
            .map(|(k, values)| (k.as_str(), values.as_slice()))
    }

    /// Keys with their first value only.
    pub fn flatten(&self) -> Vec<(&str, &str)> {
        self.entries
            .iter()
            .filter_map(|(k, values)| values.first().map(|v| (k.as_str(), v.as_str())))
            .collect()
    }

    /// Number of distinct keys.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if there are no parameters.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A URL split into its raw RFC 3986 components.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlParts {
    raw: String,
    scheme: String,
    authority: String,
    path: String,
    query: QueryParams,
}

impl UrlParts {
    /// Split `raw` after checking that it is an absolute URL.
    pub fn parse(raw: &str) -> std::result::Result<Self, url::ParseError> {
        url::Url::parse(raw)?;

        let without_fragment = raw.split_once('#').map_or(raw, |(head, _)| head);
        let (before_query, query) = without_fragment
            .split_once('?')
            .unwrap_or((without_fragment, ""));

        let (scheme, rest) = before_query.split_once(':').unwrap_or(("", before_query));
        let (authority, path) = match rest.strip_prefix("//") {
            Some(hier) => hier
                .find('/')
                .map_or((hier, ""), |slash| hier.split_at(slash)),
            None => ("", rest),
        };

        Ok(Self {
            raw: raw.to_string(),
            scheme: scheme.to_string(),
            authority: authority.to_string(),
            path: path.to_string(),
            query: QueryParams::parse(query),
        })
    }

    /// The URL as received.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Scheme, without the trailing `:`.
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// Authority (userinfo, host and port) as written.
    pub fn authority(&self) -> &str {
        &self.authority
    }

    /// Path as written; may be empty.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Decoded query parameters.
    pub fn query(&self) -> &QueryParams {
        &self.query
    }
}

/// A callback URL carrying an OpenID response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assertion {
    url: UrlParts,
}

impl Assertion {
    /// Parse the full callback URL the user agent was redirected to.
    pub fn parse(callback_url: &str) -> Result<Self> {
        let url = UrlParts::parse(callback_url).map_err(|e| {
            Error::MalformedAssertion(format!("callback URL does not parse: {e}"))
        })?;
        Ok(Self { url })
    }

    /// The callback URL components.
    pub fn url(&self) -> &UrlParts {
        &self.url
    }

    /// Decoded query parameters of the callback URL.
    pub fn params(&self) -> &QueryParams {
        self.url.query()
    }

    /// First value of `key`.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params().first(key)
    }

    /// First value of `key`, or [`Error::MalformedAssertion`].
    pub fn require(&self, key: &str) -> Result<&str> {
        self.param(key).ok_or_else(|| Error::missing(key))
    }

    /// `openid.return_to` parsed as a URL, `None` when the parameter is absent.
    pub fn return_to(&self) -> Result<Option<UrlParts>> {
        self.param(RETURN_TO)
            .map(|raw| {
                UrlParts::parse(raw).map_err(|e| {
                    Error::MalformedAssertion(format!("{RETURN_TO} does not parse: {e}"))
                })
            })
            .transpose()
    }
}

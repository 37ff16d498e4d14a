//! Mock capabilities for unit tests.

use std::collections::HashSet;
use std::sync::Mutex;

use crate::error::{Error, Result};
use crate::nonce::NonceStore;
use crate::transport::{HttpReply, HttpTransport};

/// A request seen by [`MockTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    pub method: &'static str,
    pub url: String,
    pub body: Option<String>,
}

/// Transport with canned replies matched by URL substring.
pub struct MockTransport {
    replies: Vec<(String, HttpReply)>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl MockTransport {
    pub fn new(replies: Vec<(&str, HttpReply)>) -> Self {
        Self {
            replies: replies
                .into_iter()
                .map(|(pattern, reply)| (pattern.to_string(), reply))
                .collect(),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Transport that answers every request with `body` and status 200.
    pub fn answering(body: &str) -> Self {
        Self::new(vec![("", ok(body))])
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn lookup(&self, method: &'static str, url: &str, body: Option<String>) -> Result<HttpReply> {
        self.requests.lock().unwrap().push(RecordedRequest {
            method,
            url: url.to_string(),
            body,
        });
        self.replies
            .iter()
            .find(|(pattern, _)| url.contains(pattern.as_str()))
            .map(|(_, reply)| reply.clone())
            .ok_or_else(|| Error::Transport(format!("no mock reply for {method} {url}")))
    }
}

impl HttpTransport for MockTransport {
    fn get(&self, url: &str) -> Result<HttpReply> {
        self.lookup("GET", url, None)
    }

    fn post_form(&self, url: &str, body: String) -> Result<HttpReply> {
        self.lookup("POST", url, Some(body))
    }
}

pub fn ok(body: &str) -> HttpReply {
    HttpReply {
        status: 200,
        location: None,
        body: body.to_string(),
    }
}

pub fn redirect(location: &str) -> HttpReply {
    HttpReply {
        status: 302,
        location: Some(location.to_string()),
        body: String::new(),
    }
}

/// Nonce store that records calls and can be preloaded with seen nonces.
#[derive(Default)]
pub struct RecordingNonceStore {
    seen: Mutex<HashSet<String>>,
    saved: Mutex<Vec<String>>,
}

impl RecordingNonceStore {
    pub fn with_seen(nonces: &[&str]) -> Self {
        Self {
            seen: Mutex::new(nonces.iter().map(ToString::to_string).collect()),
            saved: Mutex::new(Vec::new()),
        }
    }

    pub fn saved(&self) -> Vec<String> {
        self.saved.lock().unwrap().clone()
    }
}

impl NonceStore for RecordingNonceStore {
    fn save(&self, nonce: &str) -> bool {
        self.saved.lock().unwrap().push(nonce.to_string());
        self.seen.lock().unwrap().insert(nonce.to_string());
        true
    }

    fn exists(&self, nonce: &str) -> bool {
        self.seen.lock().unwrap().contains(nonce)
    }
}

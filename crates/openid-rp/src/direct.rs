//! Direct verification (`check_authentication`) wire format.

use std::collections::BTreeMap;

use serde::Serialize;
use url::form_urlencoded;

use crate::assertion::{MODE, QueryParams};
use crate::{Error, Result};

/// Mode used for direct verification.
pub const CHECK_AUTHENTICATION: &str = "check_authentication";

/// A value in a key-value form response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// Literal `true` or `false`.
    Bool(bool),
    /// Anything else, verbatim.
    Text(String),
}

impl FieldValue {
    fn parse(raw: &str) -> Self {
        match raw {
            "true" => FieldValue::Bool(true),
            "false" => FieldValue::Bool(false),
            other => FieldValue::Text(other.to_string()),
        }
    }
}

/// OP reply to a direct verification request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CheckAuthenticationResponse {
    fields: BTreeMap<String, FieldValue>,
}

impl CheckAuthenticationResponse {
    /// Parse newline-separated `key: value` lines.
    ///
    /// Only the first colon splits a line, so values such as URLs survive.
    /// Blank lines are skipped; a repeated key keeps its last value.
    pub fn parse(body: &str) -> Self {
        let fields = body
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(|line| {
                let (key, value) = line.split_once(':').unwrap_or((line, ""));
                (key.trim().to_string(), FieldValue::parse(value.trim()))
            })
            .collect();
        Self { fields }
    }

    /// Field by name.
    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.fields.get(key)
    }

    /// True only when `is_valid` is the literal `true`.
    pub fn is_valid(&self) -> bool {
        matches!(self.get("is_valid"), Some(FieldValue::Bool(true)))
    }

    /// `invalidate_handle`, when the OP asks the RP to drop an association.
    pub fn invalidate_handle(&self) -> Option<&str> {
        match self.get("invalidate_handle") {
            Some(FieldValue::Text(handle)) => Some(handle.as_str()),
            _ => None,
        }
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// True if the body had no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Form body for a direct verification request.
///
/// Every parameter is sent with its first value, in order, with
/// `openid.mode` replaced by `check_authentication`.
pub fn check_authentication_body(params: &QueryParams) -> Result<String> {
    if !params.contains_key(MODE) {
        return Err(Error::missing(MODE));
    }

    let pairs = params.flatten().into_iter().map(|(key, value)| {
        if key == MODE {
            (key, CHECK_AUTHENTICATION)
        } else {
            (key, value)
        }
    });

    Ok(form_urlencoded::Serializer::new(String::new())
        .extend_pairs(pairs)
        .finish())
}

//! Provider-specific helpers.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

static WARGAMING_IDENTITY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https://(?<region>[a-z]+)\.wargaming\.net/id/(?<account>[0-9]+)-(?<nickname>\w+)/?$")
        .expect("Invalid regex pattern")
});

/// Login endpoint of the European Wargaming.net OP.
pub const WARGAMING_EU_ENDPOINT: &str = "https://eu.wargaming.net/id/openid/";

/// A Wargaming.net account named by a verified identity URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WargamingAccount {
    /// Region subdomain (`eu`, `na`, `asia`, ...).
    pub region: String,
    /// Numeric account id.
    pub account_id: u64,
    /// Player nickname.
    pub nickname: String,
}

impl WargamingAccount {
    /// Parse `https://<region>.wargaming.net/id/<account_id>-<nickname>/`.
    pub fn from_identity(identity: &str) -> Option<Self> {
        let caps = WARGAMING_IDENTITY.captures(identity)?;
        Some(Self {
            region: caps["region"].to_string(),
            account_id: caps["account"].parse().ok()?,
            nickname: caps["nickname"].to_string(),
        })
    }
}

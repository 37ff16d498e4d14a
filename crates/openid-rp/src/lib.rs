//! openid-rp
//!
//! Relying Party side of OpenID 2.0 authentication. It covers the two halves
//! of a login:
//!
//! - **Requesting authentication**: build a `checkid_setup` request and resolve
//!   it into the OP login URL the user agent must visit
//! - **Verifying the assertion**: run the callback URL through an ordered
//!   pipeline (positive mode, return URL, nonce, direct signature verification)
//!   and identify the end user
//!
//! The core API is [`AuthenticationRequest`] and [`AssertionVerifier`]. Nonce
//! persistence, outbound HTTP and `return_to` allocation are injected through
//! [`NonceStore`], [`HttpTransport`] and [`ReturnToAllocator`].
//!
//! OP discovery is not performed and associations are never established;
//! signatures are always checked by asking the OP directly.
//!
//! ## Quick start
//! ```no_run
//! use std::sync::Arc;
//! use openid_rp::{AssertionVerifier, AuthenticationRequest, InMemoryNonceStore, ReqwestTransport};
//!
//! # fn demo(callback_url: &str) -> Result<(), Box<dyn std::error::Error>> {
//! let transport = ReqwestTransport::new()?;
//! let request = AuthenticationRequest::builder()
//!     .return_to("https://rp.example/openid/callback")
//!     .build()?;
//! let login_url = request.authenticate("https://eu.wargaming.net/id/openid/", &transport)?;
//! println!("send the user to {login_url}");
//!
//! // ... later, on the callback:
//! let nonces = Arc::new(InMemoryNonceStore::new());
//! let user = AssertionVerifier::with_capabilities(callback_url, nonces, Arc::new(transport))?
//!     .verify()?;
//! println!("claimed_id={}", user.claimed_id);
//! # Ok(()) }
//! ```

#![forbid(unsafe_code)]

mod assertion;
mod direct;
mod error;
mod nonce;
mod providers;
mod request;
mod return_to;
mod transport;
mod verify;

#[cfg(test)]
mod test_support;

pub use assertion::{
    Assertion, CLAIMED_ID, IDENTITY, MODE, NS, OP_ENDPOINT, QueryParams, RESPONSE_NONCE,
    RETURN_TO, UrlParts,
};
pub use direct::{
    CHECK_AUTHENTICATION, CheckAuthenticationResponse, FieldValue, check_authentication_body,
};
pub use error::{Error, Result};
#[cfg(feature = "memory-store")]
pub use nonce::InMemoryNonceStore;
pub use nonce::{FnNonceStore, NonceStore, PermissiveNonceStore};
pub use providers::{WARGAMING_EU_ENDPOINT, WargamingAccount};
pub use request::{
    AuthenticationRequest, AuthenticationRequestBuilder, CHECKID_SETUP, Evidence,
    IDENTIFIER_SELECT, OPENID_NS, new_request_id,
};
pub use return_to::{
    FixedReturnTo, REQUEST_ID_PARAM, RequestBinAllocator, ReturnToAllocator, with_request_id,
};
#[cfg(feature = "transport-reqwest")]
pub use transport::ReqwestTransport;
pub use transport::{FORM_CONTENT_TYPE, HttpReply, HttpTransport};
pub use verify::{AssertionVerifier, Check, CheckOutcome, ID_RES, VerifiedIdentity};

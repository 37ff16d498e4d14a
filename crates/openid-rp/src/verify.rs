//! Assertion verification.
//!
//! A callback URL is checked by a fixed pipeline. Each check either passes,
//! rejects the assertion with a reason, or fails with an error:
//!
//! | order | check | rejects when | errors when |
//! |---|---|---|---|
//! | 1 | `is_positive_assertion` | mode is not `id_res` | `openid.mode` missing |
//! | 2 | `verify_return_url` | never | `openid.return_to` missing/unparsable, or does not match |
//! | 3 | `verify_discovered_information` | never | never |
//! | 4 | `check_nonce` | nonce already seen | `openid.response_nonce` missing |
//! | 5 | `verify_signatures` | OP does not answer `is_valid:true` | `openid.op_endpoint` missing, transport failure |
//!
//! Rejections surface as [`Error::VerificationFailed`]; errors propagate as
//! they are, so a caller can tell tampered input from a routine negative
//! answer.
//!
//! Discovered information is **not** verified. The claimed identifier is not
//! re-discovered and `openid.op_endpoint` is trusted as sent, so a relying
//! party using only this module does not get the protection of OpenID 2.0
//! section 11.2.

use std::sync::{Arc, OnceLock};

use serde::Serialize;

use crate::assertion::{
    Assertion, CLAIMED_ID, IDENTITY, MODE, OP_ENDPOINT, RESPONSE_NONCE, RETURN_TO, UrlParts,
};
use crate::direct::{CheckAuthenticationResponse, check_authentication_body};
use crate::nonce::{NonceStore, PermissiveNonceStore};
use crate::transport::{HttpTransport, default_transport};
use crate::{Error, Result};

/// Mode of a positive assertion.
pub const ID_RES: &str = "id_res";

/// One step of the verification pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Check {
    /// `openid.mode` is `id_res`.
    PositiveAssertion,
    /// The callback URL matches `openid.return_to`.
    ReturnUrl,
    /// Not implemented; always passes.
    DiscoveredInformation,
    /// `openid.response_nonce` has not been seen before.
    Nonce,
    /// The OP confirms the signature by direct verification.
    Signatures,
}

impl Check {
    /// Execution order.
    pub const PIPELINE: [Check; 5] = [
        Check::PositiveAssertion,
        Check::ReturnUrl,
        Check::DiscoveredInformation,
        Check::Nonce,
        Check::Signatures,
    ];

    /// Stable name used in errors and logs.
    pub fn name(self) -> &'static str {
        match self {
            Check::PositiveAssertion => "is_positive_assertion",
            Check::ReturnUrl => "verify_return_url",
            Check::DiscoveredInformation => "verify_discovered_information",
            Check::Nonce => "check_nonce",
            Check::Signatures => "verify_signatures",
        }
    }
}

impl std::fmt::Display for Check {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Non-error result of a check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    /// Continue with the next check.
    Pass,
    /// Stop; the assertion is legitimately negative.
    Reject(String),
}

impl CheckOutcome {
    /// True for [`CheckOutcome::Pass`].
    pub fn passed(&self) -> bool {
        matches!(self, CheckOutcome::Pass)
    }
}

/// The end user named by a verified assertion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerifiedIdentity {
    /// `openid.identity`
    pub identity: String,
    /// `openid.claimed_id`; the key to store user data under.
    pub claimed_id: String,
}

/// Verifies one callback URL.
///
/// Holds the parsed assertion and the capabilities the checks need. Nothing
/// is mutated during verification, so a verifier can be shared across
/// threads; replay safety under concurrency is up to the [`NonceStore`].
pub struct AssertionVerifier {
    assertion: Assertion,
    nonces: Arc<dyn NonceStore>,
    transport: OnceLock<Arc<dyn HttpTransport>>,
}

impl AssertionVerifier {
    /// Verifier with the default capabilities.
    ///
    /// The default nonce store never reports a nonce as seen, so replayed
    /// callbacks are accepted. Use [`Self::with_nonce_store`] outside of demos.
    pub fn new(callback_url: &str) -> Result<Self> {
        Ok(Self {
            assertion: Assertion::parse(callback_url)?,
            nonces: Arc::new(PermissiveNonceStore),
            transport: OnceLock::new(),
        })
    }

    /// Verifier with injected capabilities.
    pub fn with_capabilities(
        callback_url: &str,
        nonces: Arc<dyn NonceStore>,
        transport: Arc<dyn HttpTransport>,
    ) -> Result<Self> {
        Ok(Self::new(callback_url)?
            .with_nonce_store(nonces)
            .with_transport(transport))
    }

    /// Replace the nonce store.
    #[must_use]
    pub fn with_nonce_store(mut self, nonces: Arc<dyn NonceStore>) -> Self {
        self.nonces = nonces;
        self
    }

    /// Replace the transport used for direct verification.
    #[must_use]
    pub fn with_transport(self, transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            transport: OnceLock::from(transport),
            ..self
        }
    }

    /// The parsed callback URL.
    pub fn assertion(&self) -> &Assertion {
        &self.assertion
    }

    /// `openid.return_to` parsed as a URL, if present.
    pub fn return_to(&self) -> Result<Option<UrlParts>> {
        self.assertion.return_to()
    }

    /// Run the whole pipeline and identify the end user.
    pub fn verify(&self) -> Result<VerifiedIdentity> {
        for check in Check::PIPELINE {
            tracing::debug!(check = check.name(), "running check");
            if let CheckOutcome::Reject(reason) = self.run(check)? {
                tracing::warn!(check = check.name(), %reason, "assertion rejected");
                return Err(Error::VerificationFailed {
                    check: check.name(),
                    reason,
                });
            }
        }

        let user = self.identify_the_end_user()?;
        tracing::info!(claimed_id = %user.claimed_id, "assertion verified");
        Ok(user)
    }

    /// Run a single check.
    pub fn run(&self, check: Check) -> Result<CheckOutcome> {
        match check {
            Check::PositiveAssertion => positive_assertion(&self.assertion),
            Check::ReturnUrl => return_url(&self.assertion),
            Check::DiscoveredInformation => Ok(CheckOutcome::Pass),
            Check::Nonce => nonce(&self.assertion, self.nonces.as_ref()),
            Check::Signatures => signatures(&self.assertion, self.transport()?.as_ref()),
        }
    }

    /// True for `id_res`, false for any other mode.
    pub fn is_positive_assertion(&self) -> Result<bool> {
        Ok(self.run(Check::PositiveAssertion)?.passed())
    }

    /// True when the callback URL matches `openid.return_to`; a mismatch is
    /// an [`Error::ReturnUrlMismatch`].
    pub fn verify_return_url(&self) -> Result<bool> {
        Ok(self.run(Check::ReturnUrl)?.passed())
    }

    /// Always true; see the module docs.
    pub fn verify_discovered_information(&self) -> bool {
        true
    }

    /// True, and the nonce is saved, when it was not seen before.
    pub fn check_nonce(&self) -> Result<bool> {
        Ok(self.run(Check::Nonce)?.passed())
    }

    /// True when the OP confirms the assertion by direct verification.
    pub fn verify_signatures(&self) -> Result<bool> {
        Ok(self.run(Check::Signatures)?.passed())
    }

    /// `openid.identity` and `openid.claimed_id` of the assertion.
    pub fn identify_the_end_user(&self) -> Result<VerifiedIdentity> {
        Ok(VerifiedIdentity {
            identity: self.assertion.require(IDENTITY)?.to_string(),
            claimed_id: self.assertion.require(CLAIMED_ID)?.to_string(),
        })
    }

    fn transport(&self) -> Result<&Arc<dyn HttpTransport>> {
        if let Some(transport) = self.transport.get() {
            return Ok(transport);
        }
        let transport = default_transport()?;
        Ok(self.transport.get_or_init(|| transport))
    }
}

impl std::fmt::Debug for AssertionVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssertionVerifier")
            .field("assertion", &self.assertion)
            .finish_non_exhaustive()
    }
}

fn positive_assertion(assertion: &Assertion) -> Result<CheckOutcome> {
    let mode = assertion.param(MODE).ok_or_else(|| {
        Error::MalformedAssertion("callback URL does not look like an OpenID response".to_string())
    })?;

    if mode == ID_RES {
        Ok(CheckOutcome::Pass)
    } else {
        Ok(CheckOutcome::Reject(mode.to_string()))
    }
}

fn return_url(assertion: &Assertion) -> Result<CheckOutcome> {
    let return_to = assertion
        .return_to()?
        .ok_or_else(|| Error::missing(RETURN_TO))?;
    let current = assertion.url();

    if current.scheme() != return_to.scheme()
        || current.authority() != return_to.authority()
        || current.path() != return_to.path()
    {
        return Err(Error::ReturnUrlMismatch(
            "scheme/authority/path are not the same".to_string(),
        ));
    }

    for (parameter, values) in return_to.query().iter() {
        let Some(expected) = values.first() else {
            continue;
        };
        match current.query().first(parameter) {
            Some(actual) if actual == expected => {}
            Some(_) => {
                return Err(Error::ReturnUrlMismatch(format!(
                    "parameter {parameter} has not the same value"
                )));
            }
            None => {
                return Err(Error::ReturnUrlMismatch(format!(
                    "parameter {parameter} is not present"
                )));
            }
        }
    }

    Ok(CheckOutcome::Pass)
}

fn nonce(assertion: &Assertion, store: &dyn NonceStore) -> Result<CheckOutcome> {
    let nonce = assertion.require(RESPONSE_NONCE)?;

    if store.exists(nonce) {
        return Ok(CheckOutcome::Reject(format!("nonce {nonce} was already used")));
    }

    if !store.save(nonce) {
        tracing::warn!(nonce, "nonce store did not persist nonce");
    }
    Ok(CheckOutcome::Pass)
}

fn signatures(assertion: &Assertion, transport: &dyn HttpTransport) -> Result<CheckOutcome> {
    let op_endpoint = assertion.require(OP_ENDPOINT)?;
    let body = check_authentication_body(assertion.params())?;

    tracing::debug!(op_endpoint, "sending direct verification request");
    let reply = transport.post_form(op_endpoint, body)?;
    if !reply.is_success() {
        tracing::warn!(
            op_endpoint,
            status = reply.status,
            "direct verification answered with error status"
        );
    }

    let response = CheckAuthenticationResponse::parse(&reply.body);
    if response.is_valid() {
        Ok(CheckOutcome::Pass)
    } else {
        let reason = match response.get("is_valid") {
            Some(_) => "OP reported is_valid other than true",
            None => "OP response has no is_valid field",
        };
        Ok(CheckOutcome::Reject(reason.to_string()))
    }
}

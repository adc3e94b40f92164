//! Bearer credential verification.
//!
//! Identity issuance lives with an external credential authority; this module
//! only verifies the bearer tokens that clients present on `auth`.

use std::sync::Arc;

use failure::Fail;
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use stentor_client_api_proto::UserId;

use crate::conf;

/// Identity extracted from a verified bearer credential.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Identity {
    pub user_id: UserId,
    pub display_name: Option<String>,
    pub photo_url: Option<String>,
}

/// Error of verifying a bearer credential.
#[derive(Clone, Copy, Debug, Eq, Fail, PartialEq)]
pub enum AuthError {
    /// Credential is structurally invalid, has a bad signature, or carries
    /// an empty subject.
    #[fail(display = "Invalid credential")]
    BadToken,

    /// Credential is well-formed but past its expiry.
    #[fail(display = "Credential expired")]
    Expired,
}

/// Verifier of bearer credentials.
///
/// Implementations must be idempotent and side-effect free.
pub trait CredentialVerifier: Send + Sync {
    /// Verifies the given bearer `token`, returning the authenticated
    /// [`Identity`].
    ///
    /// # Errors
    ///
    /// Errors if the token is invalid or expired.
    fn verify(&self, token: &str) -> Result<Identity, AuthError>;
}

/// Claims of interest carried by a bearer JWT.
#[derive(Debug, Deserialize, Serialize)]
struct Claims {
    sub: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    picture: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    exp: Option<u64>,
}

fn identity_from_claims(claims: Claims) -> Result<Identity, AuthError> {
    if claims.sub.is_empty() {
        return Err(AuthError::BadToken);
    }
    Ok(Identity {
        user_id: claims.sub.into(),
        display_name: claims.name,
        photo_url: claims.picture,
    })
}

/// [`CredentialVerifier`] verifying HS256-signed JWTs against a shared
/// secret.
pub struct JwtVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl JwtVerifier {
    #[must_use]
    pub fn new(secret: &str) -> Self {
        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
        }
    }
}

impl CredentialVerifier for JwtVerifier {
    fn verify(&self, token: &str) -> Result<Identity, AuthError> {
        let data =
            jsonwebtoken::decode::<Claims>(token, &self.key, &self.validation)
                .map_err(|e| match e.kind() {
                    jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                        AuthError::Expired
                    }
                    _ => AuthError::BadToken,
                })?;
        identity_from_claims(data.claims)
    }
}

/// Development-mode [`CredentialVerifier`].
///
/// Accepts tokens shaped `dev_<user>_<name>`, and decodes any other bearer
/// JWT without verifying its signature.
pub struct DevVerifier;

impl CredentialVerifier for DevVerifier {
    fn verify(&self, token: &str) -> Result<Identity, AuthError> {
        if let Some(rest) = token.strip_prefix("dev_") {
            let mut parts = rest.splitn(2, '_');
            let user = parts
                .next()
                .filter(|u| !u.is_empty())
                .ok_or(AuthError::BadToken)?;
            let name = parts.next().filter(|n| !n.is_empty());
            return Ok(Identity {
                user_id: user.into(),
                display_name: name.map(ToOwned::to_owned),
                photo_url: None,
            });
        }

        let mut validation = Validation::new(Algorithm::HS256);
        validation.insecure_disable_signature_validation();
        validation.validate_exp = false;
        validation.required_spec_claims.clear();
        jsonwebtoken::decode::<Claims>(
            token,
            &DecodingKey::from_secret(&[]),
            &validation,
        )
        .map_err(|_| AuthError::BadToken)
        .and_then(|data| identity_from_claims(data.claims))
    }
}

/// [`CredentialVerifier`] accepting any non-empty token verbatim as the
/// subject. Intended for tests.
pub struct StubVerifier;

impl CredentialVerifier for StubVerifier {
    fn verify(&self, token: &str) -> Result<Identity, AuthError> {
        if token.is_empty() {
            return Err(AuthError::BadToken);
        }
        Ok(Identity {
            user_id: token.into(),
            display_name: None,
            photo_url: None,
        })
    }
}

/// Builds the [`CredentialVerifier`] matching the given configuration.
///
/// Configuration validation guarantees that `jwt_secret` is set whenever dev
/// mode is off.
pub fn new_verifier(conf: &conf::Auth) -> Arc<dyn CredentialVerifier> {
    if conf.allow_dev {
        Arc::new(DevVerifier)
    } else {
        Arc::new(JwtVerifier::new(
            conf.jwt_secret.as_deref().unwrap_or_default(),
        ))
    }
}

//! Credential verification settings.

use serde::{Deserialize, Serialize};
use smart_default::SmartDefault;

/// [`Auth`] configuration section.
#[derive(Clone, Debug, Deserialize, Serialize, SmartDefault)]
#[serde(default)]
pub struct Auth {
    /// Shared secret used to verify HS256-signed bearer tokens.
    ///
    /// Required unless `allow_dev` is enabled.
    pub jwt_secret: Option<String>,

    /// Whether development credentials are accepted: tokens shaped
    /// `dev_<user>_<name>`, or bearer JWTs decoded without signature
    /// verification.
    ///
    /// Defaults to `false`.
    #[default(false)]
    pub allow_dev: bool,
}

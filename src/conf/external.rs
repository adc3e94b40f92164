//! External collaborator settings: the Directory Store and the Push Gateway.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use smart_default::SmartDefault;
use url::Url;

/// [`Directory`] configuration section.
#[derive(Clone, Debug, Deserialize, Serialize, SmartDefault)]
#[serde(default)]
pub struct Directory {
    /// Base URL of the Directory Store REST API. When absent, every lookup
    /// resolves to an empty result and wake-up pushes are effectively
    /// disabled.
    pub base_url: Option<Url>,

    /// Timeout applied to every Directory Store request.
    ///
    /// Defaults to `5s`.
    #[default(Duration::from_secs(5))]
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
}

/// [`Push`] configuration section.
#[derive(Clone, Debug, Deserialize, Serialize, SmartDefault)]
#[serde(default)]
pub struct Push {
    /// URL of the Push Gateway multicast endpoint. When absent, wake-up
    /// pushes are disabled.
    pub gateway_url: Option<Url>,

    /// Authorization key attached to every gateway submission.
    pub server_key: Option<String>,

    /// Timeout applied to every gateway submission.
    ///
    /// Defaults to `10s`.
    #[default(Duration::from_secs(10))]
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
}

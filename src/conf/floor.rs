//! PTT floor arbitration settings.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use smart_default::SmartDefault;

/// [`Floor`] configuration section.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, SmartDefault)]
#[serde(default)]
pub struct Floor {
    /// Maximum duration one member may hold a room's floor without
    /// re-requesting it. Expiry releases the floor automatically.
    ///
    /// Defaults to `2m`.
    #[default(Duration::from_secs(120))]
    #[serde(with = "humantime_serde")]
    pub max_duration: Duration,
}

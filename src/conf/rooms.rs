//! Room settings.

use serde::{Deserialize, Serialize};
use smart_default::SmartDefault;

/// [`Rooms`] configuration section.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, SmartDefault)]
#[serde(default)]
pub struct Rooms {
    /// Maximum number of members connected to one room at the same time.
    ///
    /// Defaults to `50`.
    #[default(50)]
    pub max_connections: usize,
}

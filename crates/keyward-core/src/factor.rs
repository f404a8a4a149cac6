//! Physical authorization factors of the 2-of-3 scheme.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One of the two physical factors. The server is the third, always-available
/// co-signer and never appears here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PhysicalFactor {
    /// The mobile app and its keys
    App,
    /// The hardware signing device
    Hardware,
}

impl PhysicalFactor {
    /// The factor that must authorize recovery of `self`.
    pub fn opposite(self) -> Self {
        match self {
            PhysicalFactor::App => PhysicalFactor::Hardware,
            PhysicalFactor::Hardware => PhysicalFactor::App,
        }
    }
}

impl fmt::Display for PhysicalFactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PhysicalFactor::App => f.write_str("app"),
            PhysicalFactor::Hardware => f.write_str("hardware"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opposite_is_an_involution() {
        for factor in [PhysicalFactor::App, PhysicalFactor::Hardware] {
            assert_ne!(factor.opposite(), factor);
            assert_eq!(factor.opposite().opposite(), factor);
        }
    }

    #[test]
    fn wire_names() {
        assert_eq!(
            serde_json::to_string(&PhysicalFactor::Hardware).unwrap(),
            "\"HARDWARE\""
        );
    }
}

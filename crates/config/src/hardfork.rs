//! Named protocol hardforks.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A named, height-gated change in protocol semantics.
///
/// Hardforks are strictly ordered; enabling one implies all earlier ones
/// are enabled at the same or a lower height.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Hardfork {
    #[serde(rename = "HF_Aspidochelone")]
    Aspidochelone,
    #[serde(rename = "HF_Basilisk")]
    Basilisk,
    #[serde(rename = "HF_Cockatrice")]
    Cockatrice,
    #[serde(rename = "HF_Domovoi")]
    Domovoi,
    #[serde(rename = "HF_Echidna")]
    Echidna,
}

impl Hardfork {
    /// All hardforks in activation order.
    pub const ALL: [Hardfork; 5] = [
        Hardfork::Aspidochelone,
        Hardfork::Basilisk,
        Hardfork::Cockatrice,
        Hardfork::Domovoi,
        Hardfork::Echidna,
    ];
}

impl fmt::Display for Hardfork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Hardfork::Aspidochelone => "Aspidochelone",
            Hardfork::Basilisk => "Basilisk",
            Hardfork::Cockatrice => "Cockatrice",
            Hardfork::Domovoi => "Domovoi",
            Hardfork::Echidna => "Echidna",
        };
        write!(f, "{name}")
    }
}

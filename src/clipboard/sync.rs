//! Synchronization Mode
//!
//! Which way content flows between the two managed selections. The mode is
//! read once at startup and fixes each selection's watch flag and partner.

use crate::clipboard::error::{Result, SyncError};
use std::fmt;
use std::str::FromStr;

/// Synchronization direction(s) between selection A and selection B
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SyncMode {
    /// A → B and B → A
    #[default]
    Bidirectional,
    /// A → B only
    AToB,
    /// B → A only
    BToA,
}

impl SyncMode {
    /// Accepted spellings, in config and CLI
    pub const NAMES: [&'static str; 3] = ["bidirectional", "a-to-b", "b-to-a"];

    /// Whether ownership changes on A are synced into B
    pub fn syncs_a_to_b(self) -> bool {
        matches!(self, Self::Bidirectional | Self::AToB)
    }

    /// Whether ownership changes on B are synced into A
    pub fn syncs_b_to_a(self) -> bool {
        matches!(self, Self::Bidirectional | Self::BToA)
    }

    /// Canonical name
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Bidirectional => "bidirectional",
            Self::AToB => "a-to-b",
            Self::BToA => "b-to-a",
        }
    }
}

impl FromStr for SyncMode {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bidirectional" | "both" => Ok(Self::Bidirectional),
            "a-to-b" | "a2b" => Ok(Self::AToB),
            "b-to-a" | "b2a" => Ok(Self::BToA),
            other => Err(SyncError::InvalidConfig(format!(
                "unknown sync mode '{}' (expected one of {})",
                other,
                Self::NAMES.join(", ")
            ))),
        }
    }
}

impl fmt::Display for SyncMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

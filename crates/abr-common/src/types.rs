//! Domain types shared across the loader

use serde::{Deserialize, Serialize};

use crate::error::{AbrError, Result};

/// Number of digits in a well-formed Australian Business Number
pub const ABN_LENGTH: usize = 11;

/// Australian Business Number, the mandatory key of every registry record
///
/// Construction only requires a non-empty trimmed value; the registry is the
/// authority on format, so [`Abn::is_well_formed`] is advisory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Abn(String);

impl Abn {
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(AbrError::InvalidIdentifier(raw.to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// True when the value is exactly eleven ASCII digits
    pub fn is_well_formed(&self) -> bool {
        self.0.len() == ABN_LENGTH && self.0.bytes().all(|b| b.is_ascii_digit())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Abn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for Abn {
    type Err = AbrError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl AsRef<str> for Abn {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

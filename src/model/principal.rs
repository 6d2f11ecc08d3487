use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

/// An authenticated caller identity, as handed to us by whatever sits in front
/// of the ledger. We never verify it ourselves; we only compare it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Principal(String);

impl Principal {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Is this the null principal?
    /// Empty identifiers and zero addresses (`0x000...`) are both null.
    pub fn is_null(&self) -> bool {
        let id = self.0.trim();
        let digits = id
            .strip_prefix("0x")
            .or_else(|| id.strip_prefix("0X"))
            .unwrap_or(id);
        digits.chars().all(|c| c == '0')
    }
}

impl Display for Principal {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Principal {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for Principal {
    fn from(id: String) -> Self {
        Self(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_principals() {
        assert!(Principal::new("").is_null());
        assert!(Principal::new("   ").is_null());
        assert!(Principal::new("0x0000000000000000000000000000000000000000").is_null());
        assert!(Principal::new("0").is_null());
        assert!(!Principal::new("0x01").is_null());
        assert!(!Principal::new("alice").is_null());
    }
}

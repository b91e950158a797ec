use serde::{Deserialize, Serialize};

use binsync_core::{BinId, DomainError, DomainResult, Entity, LocationId, ValueObject};

/// Bin number as shown on the bin record (e.g. `A-12`).
///
/// Labels are compared exactly; no case folding or trimming is applied, since
/// the platform's own bin lookup is exact-match.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BinLabel(String);

impl BinLabel {
    pub fn new(label: impl Into<String>) -> DomainResult<Self> {
        let label = label.into();
        if label.trim().is_empty() {
            return Err(DomainError::validation("bin label cannot be empty"));
        }
        Ok(Self(label))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True if the label starts with any of the given prefixes.
    pub fn starts_with_any<S: AsRef<str>>(&self, prefixes: &[S]) -> bool {
        prefixes.iter().any(|p| self.0.starts_with(p.as_ref()))
    }
}

impl ValueObject for BinLabel {}

impl core::fmt::Display for BinLabel {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for BinLabel {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<BinLabel> for String {
    fn from(label: BinLabel) -> Self {
        label.0
    }
}

impl AsRef<str> for BinLabel {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Bin record (storage slot inside a warehouse location).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bin {
    pub id: BinId,
    pub label: BinLabel,
    pub location_id: LocationId,
    #[serde(default)]
    pub inactive: bool,
}

impl Entity for Bin {
    type Id = BinId;

    fn id(&self) -> Self::Id {
        self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_label_is_rejected() {
        assert!(BinLabel::new("").is_err());
        assert!(BinLabel::new("   ").is_err());
    }

    #[test]
    fn prefix_match_is_case_sensitive() {
        let label = BinLabel::new("Mezz-04").unwrap();
        assert!(label.starts_with_any(&["Retail", "MF", "Mezz"]));
        assert!(!label.starts_with_any(&["mezz"]));
        assert!(!label.starts_with_any::<&str>(&[]));
    }

    #[test]
    fn blank_label_is_rejected_on_deserialize() {
        assert!(serde_json::from_str::<BinLabel>(r#""  ""#).is_err());
        let label: BinLabel = serde_json::from_str(r#""A-12""#).unwrap();
        assert_eq!(serde_json::to_string(&label).unwrap(), r#""A-12""#);
    }
}

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::SamplingError;

/// Logical dataset partitions whose facts can define "true" for filtering.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SplitLabel {
    /// Training split.
    Train,
    /// Validation split.
    Validation,
    /// Test split.
    Test,
}

impl SplitLabel {
    /// Canonical configuration name.
    pub fn as_str(self) -> &'static str {
        match self {
            SplitLabel::Train => "train",
            SplitLabel::Validation => "valid",
            SplitLabel::Test => "test",
        }
    }

    /// Resolve the filtering split: an empty name falls back to `train_split`.
    pub fn resolve_filtering(name: &str, train_split: &str) -> Result<Self, SamplingError> {
        if name.trim().is_empty() {
            return train_split.parse();
        }
        name.parse()
    }
}

impl fmt::Display for SplitLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SplitLabel {
    type Err = SamplingError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "train" => Ok(SplitLabel::Train),
            "valid" | "validation" => Ok(SplitLabel::Validation),
            "test" => Ok(SplitLabel::Test),
            other => Err(SamplingError::Configuration(format!(
                "unknown split '{other}' (expected train, valid, or test)"
            ))),
        }
    }
}

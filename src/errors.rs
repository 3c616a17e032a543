use std::io;

use thiserror::Error;

use crate::data::Slot;

/// Error type for sampler configuration, unsupported modes, and exhausted vocabularies.
#[derive(Debug, Error)]
pub enum SamplingError {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("negative sampling strategy '{name}' is not registered (registered: {registered})")]
    UnknownStrategy { name: String, registered: String },
    #[error("unsupported operation: {0}")]
    Unsupported(String),
    #[error("vocabulary exhausted for slot '{slot}' at row {row} after {attempts} attempts: {details}")]
    Exhausted {
        slot: Slot,
        row: usize,
        attempts: usize,
        details: String,
    },
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl SamplingError {
    /// True for errors raised while validating configuration or resolving a strategy.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            SamplingError::Configuration(_) | SamplingError::UnknownStrategy { .. }
        )
    }

    /// True for a mode a sampler or filter implementation does not provide.
    pub fn is_unsupported(&self) -> bool {
        matches!(self, SamplingError::Unsupported(_))
    }
}

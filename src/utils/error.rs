//! Error types and handling
//!
//! The pipeline reports typed results to the lifecycle command surface;
//! translating them into user-visible messages is the caller's job.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::compositor::policy::PolicyError;
use crate::encoder::EncoderError;
use crate::recorder::assembler::AssemblyError;
use crate::transfer::TransferError;

/// Pipeline-wide error type
#[derive(Error, Debug)]
pub enum PipelineError {
    /// The source stream is missing a required track. Missing audio is
    /// never an error; missing video is.
    #[error("source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("invalid composition policy: {0}")]
    Policy(#[from] PolicyError),

    #[error("encoder error: {0}")]
    Encoder(#[from] EncoderError),

    #[error("assembly error: {0}")]
    Assembly(#[from] AssemblyError),

    #[error("transfer error: {0}")]
    Transfer(#[from] TransferError),

    #[error("invalid lifecycle call: {0}")]
    InvalidState(String),
}

/// Structured error value for callers that speak JSON
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
}

impl From<&PipelineError> for ErrorResponse {
    fn from(error: &PipelineError) -> Self {
        let code = match error {
            PipelineError::SourceUnavailable(_) => "SOURCE_UNAVAILABLE",
            PipelineError::Policy(_) => "INVALID_POLICY",
            PipelineError::Encoder(_) => "ENCODER_ERROR",
            PipelineError::Assembly(_) => "ASSEMBLY_ERROR",
            PipelineError::Transfer(_) => "TRANSFER_ERROR",
            PipelineError::InvalidState(_) => "INVALID_STATE",
        };

        ErrorResponse {
            code: code.to_string(),
            message: error.to_string(),
        }
    }
}

/// Result type alias using PipelineError
pub type PipelineResult<T> = Result<T, PipelineError>;

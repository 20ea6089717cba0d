// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use reqwest::StatusCode;

use a2a_mesh_core::infrastructure::signing::SignatureError;

#[derive(Debug, thiserror::Error)]
pub enum SdkError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The mesh answered with an error body.
    #[error("Mesh rejected request ({status}): [{code}] {message}")]
    Mesh {
        status: StatusCode,
        code: String,
        message: String,
    },

    /// The capability's agent answered with a domain error.
    #[error("Agent rejected request: [{code}] {message}")]
    Rejected { code: String, message: String },

    #[error("Run {0} did not finish in time")]
    RunTimeout(String),

    #[error("Signing failed: {0}")]
    Signing(#[from] SignatureError),
}

impl SdkError {
    /// Stable error code, when the mesh or the agent supplied one.
    pub fn code(&self) -> Option<&str> {
        match self {
            SdkError::Mesh { code, .. } | SdkError::Rejected { code, .. } => Some(code),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, SdkError::Mesh { status, .. } if *status == StatusCode::NOT_FOUND)
    }
}

//! Ingestion error types

use crate::progress::IngestionProgress;
use lorehunt_common::errors::{AppError, ErrorCode};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Pipeline step an abort happened in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    CreateCollection,
    Read,
    Embed,
    Verify,
    Insert,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::CreateCollection => "create_collection",
            Stage::Read => "read",
            Stage::Embed => "embed",
            Stage::Verify => "verify",
            Stage::Insert => "insert",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum IngestionError {
    #[error("Ingestion aborted during {stage}: {source}")]
    Aborted {
        stage: Stage,
        progress: IngestionProgress,
        #[source]
        source: AppError,
    },
}

impl IngestionError {
    pub fn aborted(stage: Stage, progress: &IngestionProgress, source: AppError) -> Self {
        IngestionError::Aborted {
            stage,
            progress: progress.clone(),
            source,
        }
    }

    /// Machine-readable code of the underlying failure
    pub fn code(&self) -> ErrorCode {
        match self {
            IngestionError::Aborted { source, .. } => source.code(),
        }
    }
}

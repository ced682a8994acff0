//! Error types surfaced at the crate boundary.
//!
//! Evaluation itself never raises one of these — a failed evaluation is represented
//! inside [`crate::evaluation::Evaluation`] via its `reason` field, per the pipeline's
//! "never throws" contract.

use thiserror::Error;

/// Errors arising from instance construction, datafile installation, and refresh.
#[derive(Debug, Error)]
pub enum Error {
    #[error("instance requires either `datafile` or `datafile_url` to be configured")]
    MissingDatafileOptions,

    #[error("failed to parse datafile: {0}")]
    DatafileParse(#[from] serde_json::Error),

    #[error("failed to fetch datafile from {url}: {source}")]
    Fetch {
        url: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("invalid datafile url: {0}")]
    InvalidUrl(String),
}

pub type Result<T> = std::result::Result<T, Error>;

// Copyright 2024 TFAS Developers.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! # Relayer Utils Module
//!
//! Common error types, retry policies, probe targets and metrics shared by
//! every crate of the TFAS relayer.

use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use ethers::providers;

/// Metrics functionality
pub mod metric;
/// A module used for debugging relayer lifecycle, sync state, or other relayer state.
pub mod probe;
/// Retry functionality
pub mod retry;

type RetryClientProvider =
    providers::Provider<providers::RetryClient<providers::Http>>;

/// An enum of all possible errors that could be encountered during the
/// execution of the TFAS relayer.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An Io error occurred.
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// JSON Error occurred.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    /// Config loading error.
    #[error(transparent)]
    Config(#[from] config::ConfigError),
    /// Error while iterating over a glob pattern.
    #[error(transparent)]
    GlobPattern(#[from] glob::PatternError),
    /// Error from Glob Iterator.
    #[error(transparent)]
    Glob(#[from] glob::GlobError),
    /// Error while parsing a URL.
    #[error(transparent)]
    Url(#[from] url::ParseError),
    /// Error in the underlying Http server.
    #[error(transparent)]
    Axum(#[from] axum::Error),
    /// HTTP Error
    #[error(transparent)]
    Hyper(#[from] hyper::Error),
    /// Error in Http Provider (ethers client).
    #[error(transparent)]
    EthersProvider(#[from] ethers::providers::ProviderError),
    /// Smart contract call error.
    #[error(transparent)]
    EthersContractCall(
        #[from] ethers::contract::ContractError<RetryClientProvider>,
    ),
    /// Smart contract call error.
    #[error(transparent)]
    EthersContractCallCloneable(
        #[from] ethers::contract::ContractError<Arc<RetryClientProvider>>,
    ),
    /// Sled database error.
    #[error(transparent)]
    Sled(#[from] sled::Error),
    /// Prometheus registry error.
    #[error(transparent)]
    Prometheus(#[from] prometheus::Error),
    /// Error while parsing the config files.
    #[error("Config parse error: {}", _0)]
    ParseConfig(#[from] serde_path_to_error::Error<config::ConfigError>),
    /// Generic error.
    #[error("{}", _0)]
    Generic(&'static str),
    /// EVM Chain not found in the configuration.
    #[error("Chain Not Found: {}", chain_id)]
    ChainNotFound {
        /// The chain id of the chain.
        chain_id: String,
    },
    /// Missing ledger endpoint or contract address in the config.
    /// This is a fatal error: the relayer refuses to start without a ledger.
    #[error(
        "Missing required ledger endpoint or contract address in the config"
    )]
    MissingLedgerConfig,
    /// The ledger does not know the given project identifier.
    #[error("Project {} not found on the ledger", project_id)]
    ProjectNotFound {
        /// The requested project identifier.
        project_id: u64,
    },
    /// The mirror has no record for the given project identifier yet.
    ///
    /// The event relay reacts to this by fetching the project from the
    /// ledger before re-applying the update.
    #[error("Project {} is not in the mirror", project_id)]
    ProjectNotInMirror {
        /// The requested project identifier.
        project_id: u64,
    },
    /// The ledger returned a project status outside the known set.
    #[error("Invalid project status on the ledger: {}", _0)]
    InvalidProjectStatus(u8),
    /// The ledger returned a milestone status outside the known set.
    #[error("Invalid milestone status on the ledger: {}", _0)]
    InvalidMilestoneStatus(u8),
    /// The ledger response did not match the expected schema.
    #[error("Malformed ledger response: {}", _0)]
    MalformedLedgerResponse(String),
    /// A background task failed and force restarted.
    #[error("Task Force Restarted from an error")]
    ForceRestart,
    /// A background task failed and stopped abnormally.
    #[error("Task Stopped Abnormally")]
    TaskStoppedAbnormally,
}

impl Error {
    /// Whether this error is worth retrying with backoff.
    ///
    /// Transport-level failures are transient; schema mismatches and
    /// unknown identifiers are terminal for the affected record.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::EthersProvider(_)
                | Error::EthersContractCall(_)
                | Error::EthersContractCallCloneable(_)
                | Error::Hyper(_)
                | Error::ForceRestart
        )
    }
}

/// A type alias for the result used across the TFAS relayer.
pub type Result<T> = std::result::Result<T, Error>;

impl From<Error> for HandlerError {
    fn from(value: Error) -> Self {
        HandlerError(StatusCode::INTERNAL_SERVER_ERROR, value.to_string())
    }
}

/// Error type for HTTP handlers
pub struct HandlerError(
    /// HTTP status code for response
    pub StatusCode,
    /// Response message
    pub String,
);

impl IntoResponse for HandlerError {
    fn into_response(self) -> Response {
        (self.0, self.1).into_response()
    }
}

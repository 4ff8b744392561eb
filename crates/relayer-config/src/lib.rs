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

#![warn(missing_docs)]

//! # Relayer Configuration Module
//!
//! A module for configuring the relayer.
//!
//! ## Overview
//!
//! The relayer configuration module is responsible for configuring the
//! relayer. Possible configuration include:
//! * `port`: The port the relayer will listen on. Defaults to 9955
//! * `evm`: EVM based networks and their fund-allocation ledger contracts,
//!   a map between chain name and its configuration.

/// CLI configuration
#[cfg(feature = "cli")]
pub mod cli;
/// Event watcher configuration
pub mod event_watcher;
/// EVM configuration
pub mod evm;
/// Full resync configuration
pub mod resync;
/// Utils for processing configuration
pub mod utils;

use evm::EvmChainConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The default port the relayer will listen on. Defaults to 9955.
const fn default_port() -> u16 {
    9955
}
/// Event watching is enabled by default.
const fn enable_watcher_default() -> bool {
    true
}
/// Data query access is set to `true` by default.
const fn enable_data_query_default() -> bool {
    true
}
/// The maximum blocks per step is set to `100` by default.
const fn max_blocks_per_step_default() -> u64 {
    100
}
/// The print progress interval is set to `7_000` by default.
const fn print_progress_interval_default() -> u64 {
    7_000
}
/// A full resync runs every five minutes by default.
const fn resync_interval_default() -> u64 {
    300_000
}

/// TfasRelayerConfig is the configuration for the TFAS relayer.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(rename_all = "kebab-case")]
pub struct TfasRelayerConfig {
    /// HTTP API Server Port number
    ///
    /// default to 9955
    #[serde(default = "default_port", skip_serializing)]
    pub port: u16,
    /// EVM based networks and the configuration.
    ///
    /// a map between chain name and its configuration.
    #[serde(default)]
    pub evm: HashMap<String, EvmChainConfig>,
    /// Configuration for running relayer
    ///
    /// by default all features are enabled
    #[serde(default)]
    pub features: FeaturesConfig,
}

/// FeaturesConfig is the configuration for running relayer with option.
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct FeaturesConfig {
    /// Enable the read-only API for querying the mirror
    #[serde(rename(serialize = "dataQuery"))]
    pub data_query: bool,
}

impl Default for FeaturesConfig {
    fn default() -> Self {
        Self { data_query: true }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const GOOD_CONFIG: &str = r#"
port = 9955

[evm.ganache]
name = "ganache"
enabled = true
chain-id = 1337
http-endpoint = "http://127.0.0.1:7545"

[[evm.ganache.contracts]]
contract = "FundAllocation"
address = "0x38e2fb54587208f29532dbcefce1b9Cb660dDb1f"
deployed-at = 1

[evm.ganache.contracts.events-watcher]
enabled = true
polling-interval = 3000

[evm.ganache.contracts.resync]
enabled = true
interval = 60000
"#;

    #[test]
    fn parses_a_full_config() {
        let dir = tempfile::tempdir().unwrap();
        let mut file =
            std::fs::File::create(dir.path().join("main.toml")).unwrap();
        file.write_all(GOOD_CONFIG.as_bytes()).unwrap();
        let config = utils::load(dir.path()).unwrap();
        assert_eq!(config.port, 9955);
        assert!(config.features.data_query);
        // postloading re-keys enabled chains by chain id.
        let chain = config.evm.get("1337").unwrap();
        assert_eq!(chain.chain_id, 1337);
        assert_eq!(chain.contracts.len(), 1);
        let evm::Contract::FundAllocation(contract) = &chain.contracts[0];
        assert_eq!(contract.common.deployed_at, 1);
        assert!(contract.events_watcher.enabled);
        assert_eq!(contract.events_watcher.max_blocks_per_step, 100);
        assert_eq!(contract.resync.interval, 60_000);
    }

    #[test]
    fn rejects_a_config_without_a_ledger_contract() {
        let dir = tempfile::tempdir().unwrap();
        let mut file =
            std::fs::File::create(dir.path().join("main.toml")).unwrap();
        file.write_all(b"port = 9955\n").unwrap();
        let err = utils::load(dir.path()).unwrap_err();
        assert!(matches!(
            err,
            tfas_relayer_utils::Error::MissingLedgerConfig
        ));
    }
}

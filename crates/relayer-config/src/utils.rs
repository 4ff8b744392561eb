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

use config::{Config, File};
use std::path::{Path, PathBuf};

use crate::evm::Contract;

use super::*;

/// A helper function that will search for all config files in the given directory and return them as a vec
/// of the paths.
///
/// Supported file extensions are:
/// - `.toml`.
/// - `.json`.
pub fn search_config_files<P: AsRef<Path>>(
    base_dir: P,
) -> tfas_relayer_utils::Result<Vec<PathBuf>> {
    // A pattern that covers all toml or json files in the config directory and subdirectories.
    let toml_pattern = format!("{}/**/*.toml", base_dir.as_ref().display());
    let json_pattern = format!("{}/**/*.json", base_dir.as_ref().display());
    tracing::trace!(
        "Loading config files from {} and {}",
        toml_pattern,
        json_pattern
    );
    let toml_files = glob::glob(&toml_pattern)?;
    let json_files = glob::glob(&json_pattern)?;
    toml_files
        .chain(json_files)
        .map(|v| v.map_err(tfas_relayer_utils::Error::from))
        .collect()
}

/// Try to parse the [`TfasRelayerConfig`] from the given config file(s).
pub fn parse_from_files(
    files: &[PathBuf],
) -> tfas_relayer_utils::Result<TfasRelayerConfig> {
    let mut builder = Config::builder();
    for config_file in files {
        tracing::trace!("Loading config file: {}", config_file.display());
        let ext = config_file
            .extension()
            .map(|e| e.to_str().unwrap_or(""))
            .unwrap_or("");
        let format = match ext {
            "toml" => config::FileFormat::Toml,
            "json" => config::FileFormat::Json,
            _ => {
                tracing::warn!("Unknown file extension: {}", ext);
                continue;
            }
        };
        builder = builder
            .add_source(File::from(config_file.as_path()).format(format));
    }

    // also merge in the environment (with a prefix of TFAS).
    let builder = builder
        .add_source(config::Environment::with_prefix("TFAS").separator("_"));
    let cfg = builder.build()?;
    // and finally deserialize the config and post-process it
    let config: Result<
        TfasRelayerConfig,
        serde_path_to_error::Error<config::ConfigError>,
    > = serde_path_to_error::deserialize(cfg);
    match config {
        Ok(c) => postloading_process(c),
        Err(e) => {
            tracing::error!("{}", e);
            Err(e.into())
        }
    }
}

/// Load the configuration files from the given directory.
///
/// it is the same as using the [`search_config_files`] and
/// [`parse_from_files`] functions combined.
pub fn load<P: AsRef<Path>>(
    path: P,
) -> tfas_relayer_utils::Result<TfasRelayerConfig> {
    parse_from_files(&search_config_files(path)?)
}

/// The postloading_process exists to validate configuration and standardize
/// the format of the configuration
pub fn postloading_process(
    mut config: TfasRelayerConfig,
) -> tfas_relayer_utils::Result<TfasRelayerConfig> {
    tracing::trace!("Checking configration sanity ...");

    // make all chains keyed by their chain id.
    // 1. drain everything, and take enabled chains.
    let old_evm = config
        .evm
        .drain()
        .filter(|(_, chain)| chain.enabled)
        .collect::<HashMap<_, _>>();
    // 2. insert them again, keyed by chain id.
    for (_, v) in old_evm {
        config.evm.insert(v.chain_id.to_string(), v);
    }

    let mut has_ledger = false;
    for (_, network_chain) in config.evm.iter() {
        let ledgers = network_chain.contracts.iter().map(|c| match c {
            Contract::FundAllocation(cfg) => cfg,
        });
        for ledger in ledgers {
            has_ledger = true;
            // data querying reads the mirror, which only fills up when the
            // events watcher runs.
            if config.features.data_query && !ledger.events_watcher.enabled {
                tracing::warn!(
                    "!!WARNING!!: In order to enable data querying,
                    event-watcher should also be enabled for ({})",
                    ledger.common.address
                );
            }
            if config.features.data_query
                && !ledger.events_watcher.enable_data_query
            {
                tracing::warn!(
                    "!!WARNING!!: In order to enable data querying,
                    enable-data-query in events-watcher config should also be enabled for ({})",
                    ledger.common.address
                );
            }
            if !ledger.resync.enabled {
                tracing::warn!(
                    "Periodic full resync is disabled for ({}); the mirror
                    will only heal through relayed events",
                    ledger.common.address
                );
            }
        }
    }
    // the relayer is useless without at least one ledger contract to watch.
    if !has_ledger {
        return Err(tfas_relayer_utils::Error::MissingLedgerConfig);
    }

    tracing::trace!(
        "postloaded config: {}",
        serde_json::to_string_pretty(&config)?
    );

    Ok(config)
}

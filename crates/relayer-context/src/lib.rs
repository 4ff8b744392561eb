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
//! # Relayer Context Module
//!
//! A module for managing the context of the relayer.
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, Mutex};

use ethers::providers::{
    Http, HttpRateLimitRetryPolicy, Provider, RetryClientBuilder,
};
use tfas_relayer_store::SledStore;
use tfas_relayer_types::EthersClient;
use tfas_relayer_utils::metric::{self, Metrics};

/// RelayerContext contains Relayer's configuration and shutdown signal.
#[derive(Clone)]
pub struct RelayerContext {
    /// The configuration of the relayer.
    pub config: tfas_relayer_config::TfasRelayerConfig,
    /// Broadcasts a shutdown signal to all active connections.
    ///
    /// The initial `shutdown` trigger is provided by the `run` caller. The
    /// server is responsible for gracefully shutting down active connections.
    /// When a connection task is spawned, it is passed a broadcast receiver
    /// handle. When a graceful shutdown is initiated, a `()` value is sent via
    /// the broadcast::Sender. Each active connection receives it, reaches a
    /// safe terminal state, and completes the task.
    notify_shutdown: broadcast::Sender<()>,
    /// Represents the metrics for the relayer
    pub metrics: Arc<Mutex<metric::Metrics>>,
    store: SledStore,
}

impl RelayerContext {
    /// Creates a new RelayerContext.
    pub fn new(
        config: tfas_relayer_config::TfasRelayerConfig,
        store: SledStore,
    ) -> tfas_relayer_utils::Result<Self> {
        let (notify_shutdown, _) = broadcast::channel(2);
        let metrics = Arc::new(Mutex::new(Metrics::new()?));
        Ok(Self {
            config,
            notify_shutdown,
            metrics,
            store,
        })
    }

    /// Returns a broadcast receiver handle for the shutdown signal.
    pub fn shutdown_signal(&self) -> Shutdown {
        Shutdown::new(self.notify_shutdown.subscribe())
    }

    /// Sends a shutdown signal to all subscribed tasks/connections.
    pub fn shutdown(&self) {
        let _ = self.notify_shutdown.send(());
    }

    /// Returns a new Ethereum provider for the given chain, wrapped in a
    /// retrying client for transient RPC failures.
    ///
    /// # Arguments
    ///
    /// * `chain_id` - A string representing the chain id.
    pub async fn evm_provider(
        &self,
        chain_id: &str,
    ) -> tfas_relayer_utils::Result<EthersClient> {
        let chain_config = self.config.evm.get(chain_id).ok_or_else(|| {
            tfas_relayer_utils::Error::ChainNotFound {
                chain_id: chain_id.to_string(),
            }
        })?;
        let client: Http = chain_config.http_endpoint.as_str().parse()?;
        let retry_client = RetryClientBuilder::default()
            .timeout_retries(u32::MAX)
            .rate_limit_retries(u32::MAX)
            .build(client, Box::<HttpRateLimitRetryPolicy>::default());
        let provider = Provider::new(retry_client)
            .interval(Duration::from_millis(5u64));
        Ok(provider)
    }

    /// Returns [Sled](https://sled.rs)-based database store
    pub fn store(&self) -> &SledStore {
        &self.store
    }
}

/// Listens for the server shutdown signal.
///
/// Shutdown is signalled using a `broadcast::Receiver`. Only a single value is
/// ever sent. Once a value has been sent via the broadcast channel, the server
/// should shutdown.
///
/// The `Shutdown` struct listens for the signal and tracks that the signal has
/// been received. Callers may query for whether the shutdown signal has been
/// received or not.
#[derive(Debug)]
pub struct Shutdown {
    /// `true` if the shutdown signal has been received
    shutdown: bool,

    /// The receive half of the channel used to listen for shutdown.
    notify: broadcast::Receiver<()>,
}

impl Shutdown {
    /// Create a new `Shutdown` backed by the given `broadcast::Receiver`.
    pub fn new(notify: broadcast::Receiver<()>) -> Shutdown {
        Shutdown {
            shutdown: false,
            notify,
        }
    }

    /// Receive the shutdown notice, waiting if necessary.
    pub async fn recv(&mut self) {
        // If the shutdown signal has already been received, then return
        // immediately.
        if self.shutdown {
            return;
        }

        // Cannot receive a "lag error" as only one value is ever sent.
        let _ = self.notify.recv().await;

        // Remember that the signal has been received.
        self.shutdown = true;
    }
}

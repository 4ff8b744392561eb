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

//! # Relayer Service Module
//!
//! A module for starting long-running tasks for event watching.
//!
//! ## Overview
//!
//! Services are tasks which the relayer constantly runs throughout its
//! lifetime. Services handle keeping the mirror up to date with the
//! configured chains and serving it over HTTP.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use tfas_contract_gateway::FundAllocationContractWrapper;
use tfas_event_relay::handlers::{
    FeedbackSubmittedHandler, MilestoneChangedHandler, ProjectCreatedHandler,
};
use tfas_event_relay::{
    EventHandlerFor, EventWatcher, FundAllocationContractWatcher,
};
use tfas_relayer_config::evm::{Contract, FundAllocationContractConfig};
use tfas_relayer_context::RelayerContext;
use tfas_relayer_handlers::routes::{
    info, metric, notifications, projects,
};
use tfas_relayer_store::SledStore;
use tfas_relayer_types::EthersClient;
use tfas_state_mirror::ResyncService;

/// Type alias for [Sled](https://sled.rs)-based database store
pub type Store = SledStore;

/// Type alias for providers
pub type Client = EthersClient;

/// Sets up the HTTP server for the relayer, routing endpoint queries to
/// their handlers. Allows clients to query the mirror.
///
/// # Arguments
///
/// * `ctx` - RelayContext reference that holds the configuration and
///   database
pub async fn build_web_services(ctx: RelayerContext) -> crate::Result<()> {
    let socket_addr = SocketAddr::new([0, 0, 0, 0].into(), ctx.config.port);
    let api = Router::new()
        .route("/info", get(info::handle_relayer_info))
        .route("/projects", get(projects::handle_projects))
        .route("/projects/:project_id", get(projects::handle_project))
        .route(
            "/projects/:project_id/feedback",
            get(projects::handle_project_feedback),
        )
        .route(
            "/notifications",
            get(notifications::handle_notifications),
        )
        .route("/metrics", get(metric::handle_metric_info));

    let app = Router::new()
        .nest("/api/v1", api)
        .layer(CorsLayer::new().allow_origin(Any))
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(ctx));

    tracing::info!("Starting the server on {}", socket_addr);
    axum::Server::bind(&socket_addr)
        .serve(app.into_make_service())
        .await?;
    Ok(())
}

/// Starts all background services for all chains configured in the config
/// file.
///
/// Returns a future that resolves when all services are started
/// successfully.
///
/// # Arguments
///
/// * `ctx` - RelayContext reference that holds the configuration
/// * `store` -[Sled](https://sled.rs)-based database store
pub async fn ignite(
    ctx: &RelayerContext,
    store: Arc<Store>,
) -> crate::Result<()> {
    tracing::trace!(
        "Relayer configuration: {}",
        serde_json::to_string_pretty(&ctx.config)?
    );
    for chain_config in ctx.config.evm.values() {
        if !chain_config.enabled {
            continue;
        }
        let chain_name = &chain_config.name;
        let chain_id = chain_config.chain_id;
        let client =
            Arc::new(ctx.evm_provider(&chain_id.to_string()).await?);
        tracing::debug!(
            "Starting Background Services for ({}) chain.",
            chain_name
        );

        for contract in &chain_config.contracts {
            match contract {
                Contract::FundAllocation(config) => {
                    start_fund_allocation_events_watcher(
                        ctx,
                        config,
                        client.clone(),
                        store.clone(),
                    )
                    .await?;
                    start_resync_service(
                        ctx,
                        config,
                        chain_id,
                        client.clone(),
                        store.clone(),
                    )?;
                }
            }
        }
    }
    Ok(())
}

/// Starts the event watcher for the fund-allocation ledger events.
///
/// Returns Ok(()) if successful, or an error if not.
///
/// # Arguments
///
/// * `ctx` - RelayContext reference that holds the configuration
/// * `config` - Fund allocation contract configuration
/// * `client` - EVM Chain api client
/// * `store` -[Sled](https://sled.rs)-based database store
async fn start_fund_allocation_events_watcher(
    ctx: &RelayerContext,
    config: &FundAllocationContractConfig,
    client: Arc<Client>,
    store: Arc<Store>,
) -> crate::Result<()> {
    if !config.events_watcher.enabled {
        tracing::warn!(
            "Fund allocation events watcher is disabled for ({}).",
            config.common.address,
        );
        return Ok(());
    }
    let wrapper =
        FundAllocationContractWrapper::new(config.clone(), client.clone());
    let mut shutdown_signal = ctx.shutdown_signal();
    let contract_address = config.common.address;
    let my_ctx = ctx.clone();
    let task = async move {
        tracing::debug!(
            "Fund allocation events watcher for ({}) Started.",
            contract_address,
        );
        let contract_watcher = FundAllocationContractWatcher;
        let gateway = Arc::new(wrapper.clone());
        let handlers: Vec<EventHandlerFor<FundAllocationContractWatcher>> = vec![
            Box::new(ProjectCreatedHandler::new(gateway.clone())),
            Box::new(MilestoneChangedHandler::new(gateway.clone())),
            Box::new(FeedbackSubmittedHandler),
        ];
        let events_watcher_task =
            contract_watcher.run(client, store, wrapper, handlers, &my_ctx);
        tokio::select! {
            _ = events_watcher_task => {
                tracing::warn!(
                    "Fund allocation watcher task stopped for ({})",
                    contract_address,
                );
            },
            _ = shutdown_signal.recv() => {
                tracing::trace!(
                    "Stopping fund allocation watcher for ({})",
                    contract_address,
                );
            },
        }
        crate::Result::Ok(())
    };
    // kick off the watcher.
    tokio::task::spawn(task);
    Ok(())
}

/// Starts the periodic full resync task for the fund-allocation ledger.
///
/// Returns Ok(()) if successful, or an error if not.
///
/// # Arguments
///
/// * `ctx` - RelayContext reference that holds the configuration
/// * `config` - Fund allocation contract configuration
/// * `chain_id` - The chain the contract is deployed on
/// * `client` - EVM Chain api client
/// * `store` -[Sled](https://sled.rs)-based database store
fn start_resync_service(
    ctx: &RelayerContext,
    config: &FundAllocationContractConfig,
    chain_id: u32,
    client: Arc<Client>,
    store: Arc<Store>,
) -> crate::Result<()> {
    if !config.resync.enabled {
        tracing::warn!(
            "Full resync is disabled for ({}).",
            config.common.address,
        );
        return Ok(());
    }
    let wrapper =
        FundAllocationContractWrapper::new(config.clone(), client);
    let resync = ResyncService::new(
        (*store).clone(),
        Arc::new(wrapper),
        chain_id,
        config.resync,
    );
    let shutdown_signal = ctx.shutdown_signal();
    let metrics = ctx.metrics.clone();
    let contract_address = config.common.address;

    tracing::debug!("Full resync for ({}) Started.", contract_address);
    // the resync service handles the shutdown signal itself.
    tokio::task::spawn(resync.run(shutdown_signal, metrics));
    Ok(())
}

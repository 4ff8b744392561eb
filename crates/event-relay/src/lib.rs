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

//! # Event Relay Module
//!
//! Watches the fund-allocation ledger for events and applies them to the
//! local mirror.
//!
//! ## Overview
//!
//! The [`EventWatcher`] polls the chain in bounded block ranges, keeping a
//! durable block cursor so a restart resumes where it left off. Each found
//! event is dispatched to the [`handlers`], which deduplicate deliveries,
//! update the mirror, and record notifications. Handler failures are
//! retried a bounded number of times per event; if every handler fails,
//! the watcher restarts from the cursor with backoff.

use futures::prelude::*;
use std::ops::Deref;
use std::sync::Arc;
use std::time::Duration;

use ethers::contract;
use ethers::providers::Middleware;
use ethers::types;

use tfas_contract_gateway::{
    FundAllocationContractEvents, FundAllocationContractWrapper,
};
use tfas_relayer_context::RelayerContext;
use tfas_relayer_store::{
    EventHashStore, HistoryStore, HistoryStoreKey, SledStore,
};
use tfas_relayer_types::EthersClient;
use tfas_relayer_utils::metric;

mod event_watcher;
pub use event_watcher::*;

/// A module for handling the ledger events.
pub mod handlers;

#[cfg(test)]
mod tests;

impl<M> WatchableContract for FundAllocationContractWrapper<M>
where
    M: Middleware,
{
    fn deployed_at(&self) -> types::U64 {
        self.config.common.deployed_at.into()
    }

    fn sync_blocks_from(&self) -> types::U64 {
        self.config
            .events_watcher
            .sync_blocks_from
            .unwrap_or(self.config.common.deployed_at)
            .into()
    }

    fn polling_interval(&self) -> Duration {
        Duration::from_millis(self.config.events_watcher.polling_interval)
    }

    fn max_blocks_per_step(&self) -> types::U64 {
        self.config.events_watcher.max_blocks_per_step.into()
    }

    fn print_progress_interval(&self) -> Duration {
        Duration::from_millis(
            self.config.events_watcher.print_progress_interval,
        )
    }
}

/// A Fund Allocation Contract Watcher that watches for the ledger contract
/// events and calls the event handlers.
#[derive(Copy, Clone, Debug, Default)]
pub struct FundAllocationContractWatcher;

#[async_trait::async_trait]
impl EventWatcher for FundAllocationContractWatcher {
    const TAG: &'static str = "Fund Allocation Contract Watcher";

    type Contract = FundAllocationContractWrapper<EthersClient>;

    type Events = FundAllocationContractEvents;

    type Store = SledStore;
}

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

//! # Contract Gateway Module
//!
//! Typed read access to the fund-allocation ledger contract.
//!
//! ## Overview
//!
//! The gateway is the only component that talks to the ledger over RPC.
//! It exposes the contract's read surface ([`FundAllocationGateway`]) to
//! the resync service and the event relay, and decodes the raw views into
//! the mirror's domain records. It never caches: callers that want local
//! reads go through the state mirror instead.

use std::ops;
use std::sync::Arc;

use ethers::contract::Contract;
use ethers::prelude::Middleware;

/// Generated contract bindings.
pub mod contract;
/// The gateway trait and its ledger-backed implementation.
pub mod gateway;

pub use contract::{
    FeedbackSubmittedFilter, FundAllocationContract,
    FundAllocationContractEvents, MilestoneChangedFilter, MilestoneView,
    ProjectCreatedFilter, ProjectView,
};
pub use gateway::FundAllocationGateway;

/// FundAllocationContractWrapper contains the generated contract bindings
/// along with the configuration of the deployed contract.
#[derive(Debug)]
pub struct FundAllocationContractWrapper<M>
where
    M: Middleware,
{
    pub config: tfas_relayer_config::evm::FundAllocationContractConfig,
    pub contract: FundAllocationContract<M>,
}

// a derived Clone would require `M: Clone`, which the retrying provider
// is not. The bindings hold the client behind an `Arc`, so cloning never
// needs to clone the client itself.
impl<M> Clone for FundAllocationContractWrapper<M>
where
    M: Middleware,
{
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            contract: self.contract.clone(),
        }
    }
}

impl<M> FundAllocationContractWrapper<M>
where
    M: Middleware,
{
    /// Creates a new FundAllocationContractWrapper.
    pub fn new(
        config: tfas_relayer_config::evm::FundAllocationContractConfig,
        client: Arc<M>,
    ) -> Self {
        Self {
            contract: FundAllocationContract::new(
                config.common.address,
                client,
            ),
            config,
        }
    }
}

impl<M> ops::Deref for FundAllocationContractWrapper<M>
where
    M: Middleware,
{
    type Target = Contract<M>;

    fn deref(&self) -> &Self::Target {
        &self.contract
    }
}

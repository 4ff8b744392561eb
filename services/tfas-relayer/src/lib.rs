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

#![deny(unsafe_code)]
#![warn(missing_docs)]

//! # TFAS Relayer Crate
//!
//! A crate for mirroring a transparent fund-allocation ledger off-chain
//! and serving the mirrored state over HTTP.
//!
//! ## Overview
//!
//! The relayer keeps a local, queryable mirror of the on-chain fund
//! allocation contract so that dashboards and auditors never have to pay
//! the latency (or the RPC quota) of reading the chain directly.
//!
//! The relayer is composed of three long-running services per configured
//! contract:
//!
//!   1. An event watcher that polls the chain for `ProjectCreated`,
//!      `MilestoneChanged` and `FeedbackSubmitted` events and applies
//!      them to the mirror incrementally.
//!   2. A periodic full resync that re-reads every project from the
//!      contract and reconciles the mirror, healing anything the event
//!      relay missed while the relayer was offline.
//!   3. An HTTP API that serves the mirrored projects, their feedback
//!      logs, and the append-only notification log derived from the
//!      relayed events.

/// A module for starting long-running tasks for event watching.
pub mod service;

pub use tfas_relayer_utils::{Error, Result};

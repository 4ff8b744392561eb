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

//! # Relayer Types Module
//!
//! Small wrapper types shared between the configuration layer and the
//! runtime of the TFAS relayer.

#![warn(missing_docs)]

use ethers::providers;

/// RPC URL wrapper type.
pub mod rpc_url;

pub use rpc_url::RpcUrl;

/// Ethereum client using Ethers, that includes a retry strategy for
/// rate-limited or flaky HTTP endpoints.
pub type EthersClient =
    providers::Provider<providers::RetryClient<providers::Http>>;

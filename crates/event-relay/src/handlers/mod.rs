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

//! Handlers for the fund-allocation ledger events.
//!
//! Every handler follows the same discipline: deliveries already seen are
//! skipped, malformed events are logged and dropped without failing the
//! watcher, and a notification is recorded exactly once per applied event.

use ethers::types::U256;

mod feedback_handler;
mod milestone_changed_handler;
mod project_created_handler;

pub use feedback_handler::FeedbackSubmittedHandler;
pub use milestone_changed_handler::MilestoneChangedHandler;
pub use project_created_handler::ProjectCreatedHandler;

/// Narrows an on-chain 256-bit identifier to the mirror's 64-bit keys.
pub(crate) fn event_u64(value: U256) -> Option<u64> {
    (value <= U256::from(u64::MAX)).then(|| value.as_u64())
}

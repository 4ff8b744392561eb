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

use derive_more::Display;

/// Target for logger
pub const TARGET: &str = "tfas_probe";

/// The Kind of the Probe.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    /// When the Lifecycle of the Relayer changes, like starting or shutting down.
    #[display(fmt = "lifecycle")]
    Lifecycle,
    /// Event relay sync state against the ledger.
    #[display(fmt = "sync")]
    Sync,
    /// A full resync cycle of the state mirror.
    #[display(fmt = "resync")]
    Resync,
    /// State mirror writes (project upserts and milestone merges).
    #[display(fmt = "mirror_store")]
    MirrorStore,
    /// Notification sink appends.
    #[display(fmt = "notification")]
    Notification,
    /// When the relayer will retry to do something.
    #[display(fmt = "retry")]
    Retry,
}

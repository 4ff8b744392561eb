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

use super::*;

/// ResyncConfig is the configuration for the periodic full resync of the
/// state mirror.
#[derive(Debug, Clone, Serialize, Deserialize, Copy)]
#[serde(rename_all = "kebab-case")]
pub struct ResyncConfig {
    /// if the periodic full resync is enabled for this contract or not.
    #[serde(default = "enable_watcher_default")]
    pub enabled: bool,
    /// Resync interval in milliseconds
    #[serde(default = "resync_interval_default")]
    pub interval: u64,
}

impl Default for ResyncConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: resync_interval_default(),
        }
    }
}

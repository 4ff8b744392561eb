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

use serde::Serialize;

/// Relayer configuration routes.
pub mod info;
/// Prometheus metrics routes.
pub mod metric;
/// Notification log routes.
pub mod notifications;
/// Mirrored project routes.
pub mod projects;

/// Unsupported feature response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnsupportedFeature {
    /// A message explaining what is not supported.
    pub message: String,
}

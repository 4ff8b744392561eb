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

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::Serialize;
use tfas_relayer_context::RelayerContext;
use tfas_relayer_utils::metric::Metrics;
use tfas_relayer_utils::HandlerError;

/// Handles relayer metric requests
///
/// Returns a Result with the `RelayerMetricResponse` on success
pub async fn handle_metric_info(
    State(ctx): State<Arc<RelayerContext>>,
) -> Result<Json<RelayerMetricResponse>, HandlerError> {
    // refresh the storage gauge so scrapes see the current size.
    let data_stored_size = ctx.store().get_data_stored_size();
    ctx.metrics
        .lock()
        .await
        .total_amount_of_data_stored
        .set(data_stored_size as f64);
    let metrics = Metrics::gather_metrics().map_err(tfas_relayer_utils::Error::from)?;
    Ok(Json(RelayerMetricResponse { metrics }))
}

/// The whole relayer metrics, in the Prometheus text format.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayerMetricResponse {
    metrics: String,
}

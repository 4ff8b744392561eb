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

use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use tfas_relayer_context::RelayerContext;
use tfas_relayer_store::{Notification, NotificationStore};
use tfas_relayer_utils::HandlerError;

use super::UnsupportedFeature;
use axum::http::StatusCode;

/// Optional cursor for the notification log.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationsQuery {
    /// Only notifications recorded at or after this unix-millisecond
    /// timestamp.
    pub since: Option<u64>,
}

/// Notification log response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct NotificationsResponse {
    notifications: Vec<Notification>,
}

/// Handles notification log requests, in arrival order.
///
/// Consumers poll this endpoint with their last seen `recordedAt` as the
/// `since` cursor.
///
/// # Arguments
///
/// * `ctx` - RelayContext reference that holds the configuration
/// * `query` - Optional `since` cursor, unix milliseconds
pub async fn handle_notifications(
    State(ctx): State<Arc<RelayerContext>>,
    Query(query): Query<NotificationsQuery>,
) -> Result<Response, HandlerError> {
    if !ctx.config.features.data_query {
        tracing::warn!("Data query is not enabled for relayer.");
        return Ok((
            StatusCode::FORBIDDEN,
            Json(UnsupportedFeature {
                message: "Data query is not enabled for relayer."
                    .to_string(),
            }),
        )
            .into_response());
    }
    let notifications = ctx
        .store()
        .notifications_since(query.since.unwrap_or_default())?;
    Ok(Json(NotificationsResponse { notifications }).into_response())
}

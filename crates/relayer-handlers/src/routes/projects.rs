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

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use ethereum_types::Address;
use serde::{Deserialize, Serialize};
use tfas_relayer_context::RelayerContext;
use tfas_relayer_store::{
    Feedback, FeedbackStore, Project, ProjectFilter, ProjectStatus,
    ProjectStore,
};
use tfas_relayer_utils::HandlerError;

use super::UnsupportedFeature;

/// Optional filters for project listing.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectsQuery {
    /// Only projects with this status.
    pub status: Option<ProjectStatus>,
    /// Only projects owned by this account.
    pub owner: Option<Address>,
}

/// Mirrored projects response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ProjectsResponse {
    projects: Vec<Project>,
}

/// Feedback log response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FeedbackResponse {
    feedback: Vec<Feedback>,
}

fn data_query_disabled() -> Response {
    tracing::warn!("Data query is not enabled for relayer.");
    (
        StatusCode::FORBIDDEN,
        Json(UnsupportedFeature {
            message: "Data query is not enabled for relayer.".to_string(),
        }),
    )
        .into_response()
}

/// Handles mirrored project listing requests, with optional status and
/// owner filters.
///
/// # Arguments
///
/// * `ctx` - RelayContext reference that holds the configuration
/// * `query` - Optional `status` and `owner` filters
pub async fn handle_projects(
    State(ctx): State<Arc<RelayerContext>>,
    Query(query): Query<ProjectsQuery>,
) -> Result<Response, HandlerError> {
    if !ctx.config.features.data_query {
        return Ok(data_query_disabled());
    }
    let filter = ProjectFilter {
        status: query.status,
        owner: query.owner,
    };
    let projects = ctx.store().list_projects(&filter)?;
    Ok(Json(ProjectsResponse { projects }).into_response())
}

/// Handles single mirrored project requests.
///
/// Responds with `404 Not Found` when the project is not in the mirror,
/// which covers both unknown identifiers and projects the relayer has not
/// synchronized yet.
pub async fn handle_project(
    State(ctx): State<Arc<RelayerContext>>,
    Path(project_id): Path<u64>,
) -> Result<Response, HandlerError> {
    if !ctx.config.features.data_query {
        return Ok(data_query_disabled());
    }
    match ctx.store().get_project(project_id)? {
        Some(project) => Ok(Json(project).into_response()),
        None => Err(HandlerError(
            StatusCode::NOT_FOUND,
            format!("Project not found in the mirror: {project_id}"),
        )),
    }
}

/// Handles feedback log requests for a single project, in arrival order.
///
/// An unknown project yields an empty log rather than an error; feedback
/// may legitimately arrive before the project itself is mirrored.
pub async fn handle_project_feedback(
    State(ctx): State<Arc<RelayerContext>>,
    Path(project_id): Path<u64>,
) -> Result<Response, HandlerError> {
    if !ctx.config.features.data_query {
        return Ok(data_query_disabled());
    }
    let feedback = ctx.store().feedback_for_project(project_id)?;
    Ok(Json(FeedbackResponse { feedback }).into_response())
}

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
use tokio::sync::Mutex;

use ethers::prelude::LogMeta;
use tfas_contract_gateway::{
    FundAllocationContractEvents, FundAllocationContractWrapper,
};
use tfas_relayer_store::{
    now_ms, EventHashStore, Feedback, FeedbackStore, NotificationPayload,
    NotificationStore, SledStore,
};
use tfas_relayer_types::EthersClient;
use tfas_relayer_utils::metric;

use super::event_u64;
use crate::EventHandler;

/// A handler for `FeedbackSubmitted` events that appends the feedback to
/// the project's log and records a notification.
#[derive(Copy, Clone, Debug, Default)]
pub struct FeedbackSubmittedHandler;

#[async_trait::async_trait]
impl EventHandler for FeedbackSubmittedHandler {
    type Contract = FundAllocationContractWrapper<EthersClient>;

    type Events = FundAllocationContractEvents;

    type Store = SledStore;

    #[tracing::instrument(skip_all)]
    async fn handle_event(
        &self,
        store: Arc<Self::Store>,
        _wrapper: &Self::Contract,
        (event, log): (Self::Events, LogMeta),
        metrics: Arc<Mutex<metric::Metrics>>,
    ) -> tfas_relayer_utils::Result<()> {
        let submitted = match event {
            FundAllocationContractEvents::FeedbackSubmittedFilter(e) => e,
            _ => return Ok(()),
        };
        let event_bytes = serde_json::to_vec(&submitted)?;
        if store.contains_event(&event_bytes)? {
            tracing::trace!(
                %log.block_number,
                "skipping duplicate FeedbackSubmitted delivery",
            );
            return Ok(());
        }
        let Some(project_id) = event_u64(submitted.project_id) else {
            tracing::warn!(
                "skipping malformed FeedbackSubmitted event: project id {} \
                 does not fit in 64 bits",
                submitted.project_id,
            );
            metrics.lock().await.events_skipped.inc();
            return Ok(());
        };
        store.append_feedback(Feedback {
            project_id,
            author: submitted.author,
            body: submitted.feedback.clone(),
            submitted_at: now_ms(),
        })?;
        store.record_notification_for_event(
            &event_bytes,
            NotificationPayload::FeedbackSubmitted {
                project_id,
                author: submitted.author,
            },
        )?;
        let metrics = metrics.lock().await;
        metrics.events_handled.inc();
        metrics.notifications_recorded.inc();
        tracing::trace!(
            project_id,
            %log.block_number,
            "recorded submitted feedback",
        );
        Ok(())
    }

    async fn can_handle_events(
        &self,
        (event, _log): (Self::Events, LogMeta),
        _wrapper: &Self::Contract,
    ) -> tfas_relayer_utils::Result<bool> {
        Ok(matches!(
            event,
            FundAllocationContractEvents::FeedbackSubmittedFilter(_)
        ))
    }
}

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
    FundAllocationGateway,
};
use tfas_relayer_store::{
    EventHashStore, Milestone, MilestoneStatus, NotificationPayload,
    NotificationStore, SledStore,
};
use tfas_relayer_types::EthersClient;
use tfas_relayer_utils::{metric, Error};
use tfas_state_mirror::RelayMirror;

use super::event_u64;
use crate::EventHandler;

/// A handler for `MilestoneChanged` events that merges the changed
/// milestone into its project in the mirror.
///
/// When the owning project is not mirrored yet (for example when the
/// relayer missed its creation while offline), the handler self-heals by
/// fetching the whole project from the ledger first.
pub struct MilestoneChangedHandler<G> {
    gateway: Arc<G>,
}

impl<G> MilestoneChangedHandler<G> {
    /// Creates a new MilestoneChangedHandler.
    pub fn new(gateway: Arc<G>) -> Self {
        Self { gateway }
    }
}

#[async_trait::async_trait]
impl<G> EventHandler for MilestoneChangedHandler<G>
where
    G: FundAllocationGateway + 'static,
{
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
        let changed = match event {
            FundAllocationContractEvents::MilestoneChangedFilter(e) => e,
            _ => return Ok(()),
        };
        let event_bytes = serde_json::to_vec(&changed)?;
        if store.contains_event(&event_bytes)? {
            tracing::trace!(
                %log.block_number,
                "skipping duplicate MilestoneChanged delivery",
            );
            return Ok(());
        }
        let (Some(project_id), Some(milestone_id)) = (
            event_u64(changed.project_id),
            event_u64(changed.milestone_id),
        ) else {
            tracing::warn!(
                "skipping malformed MilestoneChanged event: identifiers \
                 do not fit in 64 bits",
            );
            metrics.lock().await.events_skipped.inc();
            return Ok(());
        };
        let status = match MilestoneStatus::try_from(changed.status) {
            Ok(status) => status,
            Err(e) => {
                tracing::warn!(
                    project_id,
                    milestone_id,
                    "skipping malformed MilestoneChanged event: {}", e,
                );
                metrics.lock().await.events_skipped.inc();
                return Ok(());
            }
        };
        // the event does not carry the description, so prefer the
        // ledger's record and fall back to the event fields.
        let fallback = Milestone {
            id: milestone_id,
            description: String::new(),
            status,
            proof_uri: changed.proof_uri.clone(),
        };
        let milestone = match self.gateway.list_milestones(project_id).await
        {
            Ok(milestones) => milestones
                .into_iter()
                .find(|m| m.id == milestone_id)
                .unwrap_or(fallback),
            Err(e) if e.is_transient() => return Err(e),
            Err(e) => {
                tracing::debug!(
                    project_id,
                    "using event fields for the milestone: {}", e,
                );
                fallback
            }
        };
        match store.apply_milestone_from_relay(project_id, milestone) {
            Ok(applied) => {
                if !applied {
                    tracing::trace!(
                        project_id,
                        milestone_id,
                        "milestone write superseded by a resync",
                    );
                }
            }
            Err(Error::ProjectNotInMirror { .. }) => {
                let project = self.gateway.get_project(project_id).await?;
                store.upsert_from_relay(project)?;
            }
            Err(e) => return Err(e),
        }
        store.record_notification_for_event(
            &event_bytes,
            NotificationPayload::MilestoneChanged {
                project_id,
                milestone_id,
                status,
            },
        )?;
        let metrics = metrics.lock().await;
        metrics.events_handled.inc();
        metrics.notifications_recorded.inc();
        tracing::trace!(
            project_id,
            milestone_id,
            %log.block_number,
            "mirrored a milestone change",
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
            FundAllocationContractEvents::MilestoneChangedFilter(_)
        ))
    }
}

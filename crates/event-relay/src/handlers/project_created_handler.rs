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
    EventHashStore, NotificationPayload, NotificationStore, SledStore,
};
use tfas_relayer_types::EthersClient;
use tfas_relayer_utils::metric;
use tfas_state_mirror::RelayMirror;

use super::event_u64;
use crate::EventHandler;

/// A handler for `ProjectCreated` events that inserts the new project
/// into the mirror.
///
/// The event only carries the identifier, name and owner, so the full
/// record (budget, timeline, status) is fetched from the ledger before
/// it is written.
pub struct ProjectCreatedHandler<G> {
    gateway: Arc<G>,
}

impl<G> ProjectCreatedHandler<G> {
    /// Creates a new ProjectCreatedHandler.
    pub fn new(gateway: Arc<G>) -> Self {
        Self { gateway }
    }
}

#[async_trait::async_trait]
impl<G> EventHandler for ProjectCreatedHandler<G>
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
        let created = match event {
            FundAllocationContractEvents::ProjectCreatedFilter(e) => e,
            _ => return Ok(()),
        };
        let event_bytes = serde_json::to_vec(&created)?;
        if store.contains_event(&event_bytes)? {
            tracing::trace!(
                %log.block_number,
                "skipping duplicate ProjectCreated delivery",
            );
            return Ok(());
        }
        let Some(project_id) = event_u64(created.project_id) else {
            tracing::warn!(
                "skipping malformed ProjectCreated event: project id {} \
                 does not fit in 64 bits",
                created.project_id,
            );
            metrics.lock().await.events_skipped.inc();
            return Ok(());
        };
        let project = self.gateway.get_project(project_id).await?;
        store.upsert_from_relay(project)?;
        store.record_notification_for_event(
            &event_bytes,
            NotificationPayload::ProjectCreated {
                project_id,
                name: created.name.clone(),
                owner: created.owner,
            },
        )?;
        let metrics = metrics.lock().await;
        metrics.events_handled.inc();
        metrics.notifications_recorded.inc();
        tracing::trace!(
            project_id,
            %log.block_number,
            "mirrored a newly created project",
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
            FundAllocationContractEvents::ProjectCreatedFilter(_)
        ))
    }
}

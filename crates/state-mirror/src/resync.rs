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
use std::time::Duration;

use tokio::sync::Mutex;

use tfas_contract_gateway::FundAllocationGateway;
use tfas_relayer_config::resync::ResyncConfig;
use tfas_relayer_context::Shutdown;
use tfas_relayer_store::{ProjectStore, WriteOrigin};
use tfas_relayer_utils::metric::Metrics;
use tfas_relayer_utils::{probe, Error, Result};

/// ResyncService periodically refetches the full ledger state and
/// reconciles the mirror under a fresh resync epoch.
///
/// One cycle never fails as a whole because of a single project: a project
/// whose fetch keeps failing is skipped and logged, and will be retried on
/// the next cycle.
pub struct ResyncService<S, G>
where
    S: ProjectStore,
    G: FundAllocationGateway,
{
    store: S,
    gateway: Arc<G>,
    chain_id: u32,
    config: ResyncConfig,
}

impl<S, G> ResyncService<S, G>
where
    S: ProjectStore,
    G: FundAllocationGateway,
{
    /// Creates a new ResyncService for one ledger contract.
    pub fn new(
        store: S,
        gateway: Arc<G>,
        chain_id: u32,
        config: ResyncConfig,
    ) -> Self {
        Self {
            store,
            gateway,
            chain_id,
            config,
        }
    }

    /// Runs resync cycles until the shutdown signal fires.
    ///
    /// The first cycle runs immediately, so the mirror is populated at
    /// startup before the first interval elapses.
    pub async fn run(
        self,
        mut shutdown: Shutdown,
        metrics: Arc<Mutex<Metrics>>,
    ) {
        let mut interval =
            tokio::time::interval(Duration::from_millis(self.config.interval));
        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    tracing::event!(
                        target: probe::TARGET,
                        tracing::Level::TRACE,
                        kind = %probe::Kind::Lifecycle,
                        chain_id = self.chain_id,
                        resync = "stopped",
                    );
                    break;
                }
                _ = interval.tick() => {
                    match self.resync_once().await {
                        Ok(upserted) => {
                            let metrics = metrics.lock().await;
                            metrics.resync_cycles_completed.inc();
                            metrics
                                .projects_resynced
                                .inc_by(upserted as f64);
                        }
                        Err(e) => {
                            tracing::error!(
                                chain_id = self.chain_id,
                                "resync cycle failed: {}", e,
                            );
                        }
                    }
                }
            }
        }
    }

    /// Runs a single resync cycle and returns the number of records
    /// written into the mirror.
    pub async fn resync_once(&self) -> Result<usize> {
        // bump the epoch before fetching anything, so relay events that
        // were observed before this point carry a smaller epoch and lose.
        let epoch = self.store.begin_resync_epoch()?;
        tracing::event!(
            target: probe::TARGET,
            tracing::Level::DEBUG,
            kind = %probe::Kind::Resync,
            chain_id = self.chain_id,
            epoch,
            started = true,
        );
        let projects = backoff::future::retry(fetch_backoff(), || {
            let gateway = self.gateway.clone();
            async move { gateway.list_projects().await.map_err(into_backoff) }
        })
        .await?;
        let total = projects.len();
        let mut upserted = 0usize;
        for mut project in projects {
            let project_id = project.id;
            let milestones =
                backoff::future::retry(fetch_backoff(), || {
                    let gateway = self.gateway.clone();
                    async move {
                        gateway
                            .list_milestones(project_id)
                            .await
                            .map_err(into_backoff)
                    }
                })
                .await;
            match milestones {
                Ok(milestones) => project.milestones = milestones,
                Err(e) => {
                    // skip this project only; the rest of the cycle
                    // proceeds.
                    tracing::warn!(
                        project_id,
                        "skipping project during resync: {}", e,
                    );
                    continue;
                }
            }
            match self
                .store
                .upsert_project(WriteOrigin::Resync { epoch }, project)
            {
                Ok(true) => upserted += 1,
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(
                        project_id,
                        "failed to write project during resync: {}", e,
                    );
                }
            }
        }
        tracing::event!(
            target: probe::TARGET,
            tracing::Level::DEBUG,
            kind = %probe::Kind::Resync,
            chain_id = self.chain_id,
            epoch,
            total,
            upserted,
            finished = true,
        );
        Ok(upserted)
    }
}

/// Transient ledger errors are retried for a bounded window; a cycle that
/// cannot fetch within it fails and waits for the next interval.
fn fetch_backoff() -> backoff::ExponentialBackoff {
    backoff::ExponentialBackoff {
        max_elapsed_time: Some(Duration::from_secs(30)),
        ..Default::default()
    }
}

fn into_backoff(e: Error) -> backoff::Error<Error> {
    if e.is_transient() {
        backoff::Error::transient(e)
    } else {
        backoff::Error::permanent(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RelayMirror;
    use ethereum_types::{Address, U256};
    use tfas_relayer_store::{
        InMemoryStore, Milestone, MilestoneStatus, Project, ProjectFilter,
        ProjectStatus,
    };

    #[derive(Default)]
    struct ScriptedLedger {
        projects: Vec<Project>,
        fail_milestones_for: Option<u64>,
    }

    #[async_trait::async_trait]
    impl FundAllocationGateway for ScriptedLedger {
        async fn list_projects(&self) -> Result<Vec<Project>> {
            Ok(self
                .projects
                .iter()
                .cloned()
                .map(|mut p| {
                    p.milestones = vec![];
                    p
                })
                .collect())
        }

        async fn get_project(&self, project_id: u64) -> Result<Project> {
            self.projects
                .iter()
                .find(|p| p.id == project_id)
                .cloned()
                .ok_or(Error::ProjectNotFound { project_id })
        }

        async fn list_milestones(
            &self,
            project_id: u64,
        ) -> Result<Vec<Milestone>> {
            if self.fail_milestones_for == Some(project_id) {
                return Err(Error::MalformedLedgerResponse(
                    "scripted failure".to_string(),
                ));
            }
            Ok(self
                .get_project(project_id)
                .await
                .map(|p| p.milestones)
                .unwrap_or_default())
        }
    }

    fn project(id: u64, name: &str) -> Project {
        Project {
            id,
            name: name.to_string(),
            budget: U256::from(1_000u64),
            status: ProjectStatus::Active,
            timeline: "Q1".to_string(),
            owner: Address::zero(),
            milestones: vec![Milestone {
                id: 1,
                description: "first deliverable".to_string(),
                status: MilestoneStatus::Pending,
                proof_uri: String::new(),
            }],
            last_synced_at: 0,
            sync_epoch: 0,
        }
    }

    fn service(
        store: InMemoryStore,
        ledger: ScriptedLedger,
    ) -> ResyncService<InMemoryStore, ScriptedLedger> {
        ResyncService::new(store, Arc::new(ledger), 1337, ResyncConfig::default())
    }

    #[tokio::test]
    async fn populates_an_empty_mirror() {
        let store = InMemoryStore::default();
        let ledger = ScriptedLedger {
            projects: vec![project(1, "Road"), project(2, "Bridge")],
            ..Default::default()
        };
        let service = service(store.clone(), ledger);
        let upserted = service.resync_once().await.unwrap();
        assert_eq!(upserted, 2);
        let mirrored =
            store.list_projects(&ProjectFilter::default()).unwrap();
        assert_eq!(mirrored.len(), 2);
        assert!(mirrored.iter().all(|p| p.sync_epoch == 1));
        assert!(mirrored.iter().all(|p| p.milestones.len() == 1));
    }

    #[tokio::test]
    async fn a_failing_project_does_not_block_the_cycle() {
        let store = InMemoryStore::default();
        let ledger = ScriptedLedger {
            projects: vec![project(1, "Road"), project(2, "Bridge")],
            fail_milestones_for: Some(1),
        };
        let service = service(store.clone(), ledger);
        let upserted = service.resync_once().await.unwrap();
        assert_eq!(upserted, 1);
        assert!(store.get_project(1).unwrap().is_none());
        assert_eq!(store.get_project(2).unwrap().unwrap().name, "Bridge");
    }

    #[tokio::test]
    async fn a_cycle_supersedes_earlier_relay_writes() {
        let store = InMemoryStore::default();
        // a relay write lands first, stamped with the pre-resync epoch.
        store.upsert_from_relay(project(1, "Road (stale)")).unwrap();
        let ledger = ScriptedLedger {
            projects: vec![project(1, "Road")],
            ..Default::default()
        };
        let service = service(store.clone(), ledger);
        service.resync_once().await.unwrap();
        let found = store.get_project(1).unwrap().unwrap();
        assert_eq!(found.name, "Road");
        assert_eq!(found.sync_epoch, 1);
    }
}

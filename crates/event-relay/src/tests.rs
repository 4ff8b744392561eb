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
use std::sync::OnceLock;

use ethers::prelude::LogMeta;
use ethers::providers::{
    Http, HttpRateLimitRetryPolicy, Provider, RetryClientBuilder,
};
use ethers::types::{Address, H256, U256, U64};
use tokio::sync::Mutex;

use tfas_contract_gateway::{
    FeedbackSubmittedFilter, FundAllocationContractEvents,
    FundAllocationContractWrapper, FundAllocationGateway,
    MilestoneChangedFilter, ProjectCreatedFilter,
};
use tfas_relayer_config::evm::{
    CommonContractConfig, FundAllocationContractConfig,
};
use tfas_relayer_store::{
    Milestone, MilestoneStatus, NotificationKind, NotificationStore,
    Project, ProjectStatus, ProjectStore, SledStore,
};
use tfas_relayer_types::EthersClient;
use tfas_relayer_utils::metric::Metrics;
use tfas_relayer_utils::{Error, Result};
use tfas_state_mirror::RelayMirror;

use crate::handlers::{
    FeedbackSubmittedHandler, MilestoneChangedHandler, ProjectCreatedHandler,
};
use crate::{
    dispatch_event, EventHandler, EventHandlerFor,
    FundAllocationContractWatcher, WatchableContract,
};

#[derive(Default)]
struct ScriptedLedger {
    projects: Vec<Project>,
}

#[async_trait::async_trait]
impl FundAllocationGateway for ScriptedLedger {
    async fn list_projects(&self) -> Result<Vec<Project>> {
        Ok(self.projects.clone())
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
        Ok(self
            .get_project(project_id)
            .await
            .map(|p| p.milestones)
            .unwrap_or_default())
    }
}

// prometheus counters register globally once per process.
fn metrics() -> Arc<Mutex<Metrics>> {
    static METRICS: OnceLock<Arc<Mutex<Metrics>>> = OnceLock::new();
    METRICS
        .get_or_init(|| {
            Arc::new(Mutex::new(Metrics::new().expect("metrics")))
        })
        .clone()
}

fn wrapper() -> FundAllocationContractWrapper<EthersClient> {
    // never dialed by these tests; the handlers talk to ScriptedLedger.
    let http = "http://127.0.0.1:1".parse::<Http>().expect("url");
    let retry_client = RetryClientBuilder::default()
        .build(http, Box::<HttpRateLimitRetryPolicy>::default());
    let client = Provider::new(retry_client);
    let config = FundAllocationContractConfig {
        common: CommonContractConfig {
            address: Address::zero(),
            deployed_at: 1,
        },
        events_watcher: Default::default(),
        resync: Default::default(),
    };
    FundAllocationContractWrapper::new(config, Arc::new(client))
}

fn log_meta(log_index: u64) -> LogMeta {
    LogMeta {
        address: Address::zero(),
        block_number: U64::from(10u64),
        block_hash: H256::zero(),
        transaction_hash: H256::zero(),
        transaction_index: U64::zero(),
        log_index: U256::from(log_index),
    }
}

fn ledger_project(id: u64, name: &str) -> Project {
    Project {
        id,
        name: name.to_string(),
        budget: U256::from(50_000u64),
        status: ProjectStatus::Active,
        timeline: "Q2 2024".to_string(),
        owner: Address::zero(),
        milestones: vec![Milestone {
            id: 1,
            description: "site survey".to_string(),
            status: MilestoneStatus::Submitted,
            proof_uri: "ipfs://proof".to_string(),
        }],
        last_synced_at: 0,
        sync_epoch: 0,
    }
}

fn milestone_changed_event(
    project_id: u64,
    milestone_id: u64,
    status: u8,
) -> FundAllocationContractEvents {
    FundAllocationContractEvents::MilestoneChangedFilter(
        MilestoneChangedFilter {
            project_id: U256::from(project_id),
            milestone_id: U256::from(milestone_id),
            status,
            proof_uri: "ipfs://proof".to_string(),
        },
    )
}

#[tokio::test]
async fn project_created_mirrors_the_full_ledger_record() {
    let store = Arc::new(SledStore::temporary().unwrap());
    let ledger = Arc::new(ScriptedLedger {
        projects: vec![ledger_project(1, "Road")],
    });
    let handler = ProjectCreatedHandler::new(ledger);
    let event = FundAllocationContractEvents::ProjectCreatedFilter(
        ProjectCreatedFilter {
            project_id: U256::from(1u64),
            name: "Road".to_string(),
            owner: Address::zero(),
        },
    );
    handler
        .handle_event(store.clone(), &wrapper(), (event, log_meta(0)), metrics())
        .await
        .unwrap();
    let mirrored = store.get_project(1).unwrap().unwrap();
    // the event alone has no budget; it must come from the ledger fetch.
    assert_eq!(mirrored.budget, U256::from(50_000u64));
    assert_eq!(mirrored.milestones.len(), 1);
    let notifications = store.notifications_since(0).unwrap();
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].kind(), NotificationKind::ProjectCreated);
}

#[tokio::test]
async fn duplicate_milestone_deliveries_apply_once() {
    let store = Arc::new(SledStore::temporary().unwrap());
    store.upsert_from_relay(ledger_project(1, "Road")).unwrap();
    let ledger = Arc::new(ScriptedLedger {
        projects: vec![ledger_project(1, "Road")],
    });
    let handler = MilestoneChangedHandler::new(ledger);
    let event = milestone_changed_event(1, 1, 2);
    for _ in 0..2 {
        handler
            .handle_event(
                store.clone(),
                &wrapper(),
                (event.clone(), log_meta(1)),
                metrics(),
            )
            .await
            .unwrap();
    }
    let notifications = store.notifications_since(0).unwrap();
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].kind(), NotificationKind::MilestoneChanged);
}

#[tokio::test]
#[tracing_test::traced_test]
async fn milestone_for_an_unknown_project_self_heals() {
    let store = Arc::new(SledStore::temporary().unwrap());
    let ledger = Arc::new(ScriptedLedger {
        projects: vec![ledger_project(9, "Bridge")],
    });
    let handler = MilestoneChangedHandler::new(ledger);
    let event = milestone_changed_event(9, 1, 1);
    handler
        .handle_event(store.clone(), &wrapper(), (event, log_meta(2)), metrics())
        .await
        .unwrap();
    // the whole project was fetched and mirrored, milestone included.
    let healed = store.get_project(9).unwrap().unwrap();
    assert_eq!(healed.name, "Bridge");
    assert_eq!(healed.milestones.len(), 1);
    assert_eq!(store.notifications_since(0).unwrap().len(), 1);
}

#[tokio::test]
async fn a_malformed_milestone_status_is_skipped() {
    let store = Arc::new(SledStore::temporary().unwrap());
    store.upsert_from_relay(ledger_project(1, "Road")).unwrap();
    let ledger = Arc::new(ScriptedLedger {
        projects: vec![ledger_project(1, "Road")],
    });
    let handler = MilestoneChangedHandler::new(ledger);
    // status 9 is outside the ledger's status set.
    let event = milestone_changed_event(1, 1, 9);
    handler
        .handle_event(store.clone(), &wrapper(), (event, log_meta(3)), metrics())
        .await
        .unwrap();
    assert!(store.notifications_since(0).unwrap().is_empty());
    let untouched = store.get_project(1).unwrap().unwrap();
    assert_eq!(untouched.milestones[0].status, MilestoneStatus::Submitted);
}

#[tokio::test]
async fn a_failing_handler_does_not_poison_the_store() {
    let store = Arc::new(SledStore::temporary().unwrap());
    // the ledger knows nothing, so the created-project fetch fails.
    let empty_ledger = Arc::new(ScriptedLedger::default());
    let created_handler = ProjectCreatedHandler::new(empty_ledger);
    let created = FundAllocationContractEvents::ProjectCreatedFilter(
        ProjectCreatedFilter {
            project_id: U256::from(42u64),
            name: "Ghost".to_string(),
            owner: Address::zero(),
        },
    );
    let err = created_handler
        .handle_event(
            store.clone(),
            &wrapper(),
            (created, log_meta(4)),
            metrics(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ProjectNotFound { project_id: 42 }));
    // other handlers keep working against the same store.
    let feedback_handler = FeedbackSubmittedHandler;
    let feedback = FundAllocationContractEvents::FeedbackSubmittedFilter(
        FeedbackSubmittedFilter {
            project_id: U256::from(1u64),
            author: Address::zero(),
            feedback: "on schedule".to_string(),
        },
    );
    feedback_handler
        .handle_event(
            store.clone(),
            &wrapper(),
            (feedback, log_meta(5)),
            metrics(),
        )
        .await
        .unwrap();
    assert!(store.get_project(42).unwrap().is_none());
    assert_eq!(store.notifications_since(0).unwrap().len(), 1);
}

#[test]
fn the_wrapper_clones_for_gateway_sharing() {
    // the retrying provider itself is not cloneable; the wrapper must
    // still be, so the handlers can share it as their gateway.
    let wrapper = wrapper();
    let shared = Arc::new(wrapper.clone());
    assert_eq!(shared.address(), wrapper.address());
}

#[test]
fn the_cursor_default_honors_the_sync_blocks_from_override() {
    let mut wrapper = wrapper();
    assert_eq!(wrapper.sync_blocks_from(), U64::from(1u64));
    wrapper.config.events_watcher.sync_blocks_from = Some(77);
    assert_eq!(wrapper.sync_blocks_from(), U64::from(77u64));
}

#[tokio::test]
async fn a_bystander_handler_does_not_mark_a_failed_event_handled() {
    let store = Arc::new(SledStore::temporary().unwrap());
    // the ledger knows nothing, so the created-project fetch fails on
    // every retry; the other two handlers do not claim the event.
    let empty_ledger = Arc::new(ScriptedLedger::default());
    let handlers: Vec<EventHandlerFor<FundAllocationContractWatcher>> = vec![
        Box::new(ProjectCreatedHandler::new(empty_ledger.clone())),
        Box::new(MilestoneChangedHandler::new(empty_ledger)),
        Box::new(FeedbackSubmittedHandler),
    ];
    let created = FundAllocationContractEvents::ProjectCreatedFilter(
        ProjectCreatedFilter {
            project_id: U256::from(7u64),
            name: "Ghost".to_string(),
            owner: Address::zero(),
        },
    );
    let handled = dispatch_event::<FundAllocationContractWatcher>(
        &handlers,
        store.clone(),
        &wrapper(),
        (created, log_meta(8)),
        &metrics(),
    )
    .await
    .unwrap();
    // the cursor must not advance past a lost event.
    assert!(!handled);
    assert!(store.get_project(7).unwrap().is_none());
    assert!(store.notifications_since(0).unwrap().is_empty());

    // an event whose claiming handler succeeds is marked handled.
    let feedback = FundAllocationContractEvents::FeedbackSubmittedFilter(
        FeedbackSubmittedFilter {
            project_id: U256::from(7u64),
            author: Address::zero(),
            feedback: "still waiting".to_string(),
        },
    );
    let handled = dispatch_event::<FundAllocationContractWatcher>(
        &handlers,
        store.clone(),
        &wrapper(),
        (feedback, log_meta(9)),
        &metrics(),
    )
    .await
    .unwrap();
    assert!(handled);
    assert_eq!(store.notifications_since(0).unwrap().len(), 1);
}

#[tokio::test]
async fn feedback_is_appended_in_arrival_order() {
    let store = Arc::new(SledStore::temporary().unwrap());
    let handler = FeedbackSubmittedHandler;
    for (i, body) in ["good progress", "needs an audit"].iter().enumerate() {
        let event = FundAllocationContractEvents::FeedbackSubmittedFilter(
            FeedbackSubmittedFilter {
                project_id: U256::from(3u64),
                author: Address::zero(),
                feedback: body.to_string(),
            },
        );
        handler
            .handle_event(
                store.clone(),
                &wrapper(),
                (event.clone(), log_meta(6 + i as u64)),
                metrics(),
            )
            .await
            .unwrap();
        // a duplicate delivery of the same event is dropped.
        handler
            .handle_event(
                store.clone(),
                &wrapper(),
                (event, log_meta(6 + i as u64)),
                metrics(),
            )
            .await
            .unwrap();
    }
    use tfas_relayer_store::FeedbackStore;
    let feedback = store.feedback_for_project(3).unwrap();
    assert_eq!(feedback.len(), 2);
    assert_eq!(feedback[0].body, "good progress");
    assert_eq!(feedback[1].body, "needs an audit");
    assert_eq!(store.notifications_since(0).unwrap().len(), 2);
}

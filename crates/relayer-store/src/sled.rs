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

use std::fmt::Debug;
use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use sled::Transactional;
use tfas_relayer_utils::Error;

use super::{
    merge_milestone, now_ms, EventHashStore, Feedback, FeedbackStore,
    HistoryStore, HistoryStoreKey, Milestone, Notification,
    NotificationPayload, NotificationStore, Project, ProjectFilter,
    ProjectStore, Result, WriteOrigin,
};

const PROJECTS_TREE: &str = "mirror_projects";
const META_TREE: &str = "mirror_meta";
const FEEDBACK_TREE: &str = "feedback";
const NOTIFICATIONS_TREE: &str = "notifications";
const EVENT_HASHES_TREE: &str = "event_hashes";
const RESYNC_EPOCH_KEY: &str = "resync_epoch";

/// SledStore is a store that keeps the mirror, the feedback log, the
/// notification log and the event-watcher cursors in a
/// [Sled](https://sled.rs)-based database.
#[derive(Clone)]
pub struct SledStore {
    db: sled::Db,
    // serializes notification appends so the sequence order and the
    // recorded timestamps never disagree.
    notification_guard: Arc<Mutex<()>>,
}

impl std::fmt::Debug for SledStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SledStore").finish()
    }
}

impl SledStore {
    /// Create a new SledStore.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let db = sled::Config::new()
            .path(path)
            .temporary(cfg!(test))
            .mode(sled::Mode::HighThroughput)
            .open()?;
        Ok(Self {
            db,
            notification_guard: Arc::new(Mutex::new(())),
        })
    }

    /// Creates a temporary SledStore.
    pub fn temporary() -> Result<Self> {
        let dir = tempfile::tempdir()?;
        Self::open(dir.path())
    }

    /// Gets the total amount of data stored on disk.
    pub fn get_data_stored_size(&self) -> u64 {
        self.db.size_on_disk().unwrap_or_default()
    }
}

fn u64_from_le(bytes: &[u8]) -> u64 {
    let mut output = [0u8; 8];
    output.copy_from_slice(&bytes[0..8]);
    u64::from_le_bytes(output)
}

impl HistoryStore for SledStore {
    #[tracing::instrument(skip(self))]
    fn set_last_block_number<K: Into<HistoryStoreKey> + Debug>(
        &self,
        key: K,
        block_number: u64,
    ) -> Result<u64> {
        let tree = self.db.open_tree("last_block_numbers")?;
        let key: HistoryStoreKey = key.into();
        let old =
            tree.insert(key.to_bytes(), &block_number.to_le_bytes())?;
        match old {
            Some(v) => Ok(u64_from_le(&v)),
            None => Ok(block_number),
        }
    }

    #[tracing::instrument(skip(self))]
    fn get_last_block_number<K: Into<HistoryStoreKey> + Debug>(
        &self,
        key: K,
        default_block_number: u64,
    ) -> Result<u64> {
        let tree = self.db.open_tree("last_block_numbers")?;
        let key: HistoryStoreKey = key.into();
        let val = tree.get(key.to_bytes())?;
        match val {
            Some(v) => Ok(u64_from_le(&v)),
            None => Ok(default_block_number),
        }
    }

    #[tracing::instrument(skip(self))]
    fn set_target_block_number<K: Into<HistoryStoreKey> + Debug>(
        &self,
        key: K,
        block_number: u64,
    ) -> Result<u64> {
        let tree = self.db.open_tree("target_block_numbers")?;
        let key: HistoryStoreKey = key.into();
        let old =
            tree.insert(key.to_bytes(), &block_number.to_le_bytes())?;
        match old {
            Some(v) => Ok(u64_from_le(&v)),
            None => Ok(block_number),
        }
    }

    #[tracing::instrument(skip(self))]
    fn get_target_block_number<K: Into<HistoryStoreKey> + Debug>(
        &self,
        key: K,
        default_block_number: u64,
    ) -> Result<u64> {
        let tree = self.db.open_tree("target_block_numbers")?;
        let key: HistoryStoreKey = key.into();
        let val = tree.get(key.to_bytes())?;
        match val {
            Some(v) => Ok(u64_from_le(&v)),
            None => Ok(default_block_number),
        }
    }
}

impl EventHashStore for SledStore {
    fn store_event(&self, event: &[u8]) -> Result<()> {
        let tree = self.db.open_tree(EVENT_HASHES_TREE)?;
        tree.insert(event, &[])?;
        Ok(())
    }

    fn contains_event(&self, event: &[u8]) -> Result<bool> {
        let tree = self.db.open_tree(EVENT_HASHES_TREE)?;
        Ok(tree.contains_key(event)?)
    }
}

impl ProjectStore for SledStore {
    fn begin_resync_epoch(&self) -> Result<u64> {
        let tree = self.db.open_tree(META_TREE)?;
        let next = tree.update_and_fetch(RESYNC_EPOCH_KEY, |old| {
            let next = old.map(u64_from_le).unwrap_or(0) + 1;
            Some(next.to_le_bytes().to_vec())
        })?;
        Ok(next.map(|v| u64_from_le(&v)).unwrap_or(1))
    }

    fn current_resync_epoch(&self) -> Result<u64> {
        let tree = self.db.open_tree(META_TREE)?;
        Ok(tree.get(RESYNC_EPOCH_KEY)?.map(|v| u64_from_le(&v)).unwrap_or(0))
    }

    #[tracing::instrument(skip(self, project), fields(project_id = project.id))]
    fn upsert_project(
        &self,
        origin: WriteOrigin,
        mut project: Project,
    ) -> Result<bool> {
        let tree = self.db.open_tree(PROJECTS_TREE)?;
        let key = project.id.to_be_bytes();
        // per-key compare-and-swap loop; writes for other projects are
        // never blocked by this one.
        loop {
            let current = tree.get(key)?;
            let existing_epoch = match &current {
                Some(raw) => {
                    serde_json::from_slice::<Project>(raw)?.sync_epoch
                }
                None => 0,
            };
            if origin.epoch() < existing_epoch {
                tracing::debug!(
                    project_id = project.id,
                    %origin,
                    existing_epoch,
                    "dropping stale mirror write",
                );
                return Ok(false);
            }
            project.sync_epoch = origin.epoch();
            project.last_synced_at = now_ms();
            let next = serde_json::to_vec(&project)?;
            match tree.compare_and_swap(key, current, Some(next))? {
                Ok(()) => {
                    tracing::event!(
                        target: tfas_relayer_utils::probe::TARGET,
                        tracing::Level::TRACE,
                        kind = %tfas_relayer_utils::probe::Kind::MirrorStore,
                        project_id = project.id,
                        %origin,
                    );
                    return Ok(true);
                }
                Err(_) => continue,
            }
        }
    }

    #[tracing::instrument(skip(self, milestone))]
    fn apply_milestone(
        &self,
        origin: WriteOrigin,
        project_id: u64,
        milestone: Milestone,
    ) -> Result<bool> {
        let tree = self.db.open_tree(PROJECTS_TREE)?;
        let key = project_id.to_be_bytes();
        loop {
            let current = tree
                .get(key)?
                .ok_or(Error::ProjectNotInMirror { project_id })?;
            let mut project: Project = serde_json::from_slice(&current)?;
            if origin.epoch() < project.sync_epoch {
                tracing::debug!(
                    project_id,
                    %origin,
                    existing_epoch = project.sync_epoch,
                    "dropping stale milestone write",
                );
                return Ok(false);
            }
            merge_milestone(&mut project, milestone.clone());
            project.sync_epoch = origin.epoch().max(project.sync_epoch);
            project.last_synced_at = now_ms();
            let next = serde_json::to_vec(&project)?;
            match tree.compare_and_swap(key, Some(current), Some(next))? {
                Ok(()) => return Ok(true),
                Err(_) => continue,
            }
        }
    }

    fn get_project(&self, project_id: u64) -> Result<Option<Project>> {
        let tree = self.db.open_tree(PROJECTS_TREE)?;
        let val = tree.get(project_id.to_be_bytes())?;
        match val {
            Some(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
            None => Ok(None),
        }
    }

    fn list_projects(&self, filter: &ProjectFilter) -> Result<Vec<Project>> {
        let tree = self.db.open_tree(PROJECTS_TREE)?;
        let mut projects = Vec::new();
        for (_, raw) in tree.iter().flatten() {
            let project: Project = serde_json::from_slice(&raw)?;
            if filter.matches(&project) {
                projects.push(project);
            }
        }
        Ok(projects)
    }
}

impl FeedbackStore for SledStore {
    #[tracing::instrument(skip(self, feedback), fields(project_id = feedback.project_id))]
    fn append_feedback(&self, feedback: Feedback) -> Result<()> {
        let tree = self.db.open_tree(FEEDBACK_TREE)?;
        // key is project id + a monotonic sequence, so a prefix scan
        // yields one project's feedback in arrival order.
        let seq = self.db.generate_id()?;
        let mut key = feedback.project_id.to_be_bytes().to_vec();
        key.extend_from_slice(&seq.to_be_bytes());
        tree.insert(key, serde_json::to_vec(&feedback)?)?;
        Ok(())
    }

    fn feedback_for_project(&self, project_id: u64) -> Result<Vec<Feedback>> {
        let tree = self.db.open_tree(FEEDBACK_TREE)?;
        tree.scan_prefix(project_id.to_be_bytes())
            .flatten()
            .map(|(_, raw)| {
                serde_json::from_slice(&raw).map_err(Error::from)
            })
            .collect()
    }
}

/// The timestamp of the latest notification in the tree, or zero when
/// the log is empty.
fn last_recorded_at(tree: &sled::Tree) -> Result<u64> {
    Ok(tree
        .last()?
        .map(|(_, raw)| serde_json::from_slice::<Notification>(&raw))
        .transpose()?
        .map(|n| n.recorded_at)
        .unwrap_or_default())
}

impl NotificationStore for SledStore {
    #[tracing::instrument(skip(self, payload))]
    fn record_notification(
        &self,
        payload: NotificationPayload,
    ) -> Result<Notification> {
        let tree = self.db.open_tree(NOTIFICATIONS_TREE)?;
        // the sequence number and the timestamp are assigned under one
        // guard, so arrival order never shows a decreasing timestamp.
        let _guard = self.notification_guard.lock();
        let notification = Notification {
            payload,
            recorded_at: now_ms().max(last_recorded_at(&tree)?),
        };
        let seq = self.db.generate_id()?;
        tree.insert(
            seq.to_be_bytes(),
            serde_json::to_vec(&notification)?,
        )?;
        tracing::event!(
            target: tfas_relayer_utils::probe::TARGET,
            tracing::Level::TRACE,
            kind = %tfas_relayer_utils::probe::Kind::Notification,
            notification_kind = ?notification.kind(),
        );
        Ok(notification)
    }

    #[tracing::instrument(skip(self, event, payload))]
    fn record_notification_for_event(
        &self,
        event: &[u8],
        payload: NotificationPayload,
    ) -> Result<Notification> {
        let notifications = self.db.open_tree(NOTIFICATIONS_TREE)?;
        let hashes = self.db.open_tree(EVENT_HASHES_TREE)?;
        let _guard = self.notification_guard.lock();
        let notification = Notification {
            payload,
            recorded_at: now_ms().max(last_recorded_at(&notifications)?),
        };
        let seq = self.db.generate_id()?;
        let raw = serde_json::to_vec(&notification)?;
        // one transaction covers both trees, so a crash cannot leave the
        // notification recorded with the event still unmarked.
        (&notifications, &hashes)
            .transaction(|(notifications, hashes)| {
                notifications
                    .insert(&seq.to_be_bytes()[..], raw.as_slice())?;
                hashes.insert(event, &[] as &[u8])?;
                Ok(())
            })
            .map_err(|e| match e {
                sled::transaction::TransactionError::Abort(e)
                | sled::transaction::TransactionError::Storage(e) => {
                    Error::Sled(e)
                }
            })?;
        tracing::event!(
            target: tfas_relayer_utils::probe::TARGET,
            tracing::Level::TRACE,
            kind = %tfas_relayer_utils::probe::Kind::Notification,
            notification_kind = ?notification.kind(),
        );
        Ok(notification)
    }

    fn notifications_since(&self, since_ms: u64) -> Result<Vec<Notification>> {
        let tree = self.db.open_tree(NOTIFICATIONS_TREE)?;
        let mut notifications = Vec::new();
        // keys are monotonic sequence numbers, so iteration order is
        // arrival order.
        for (_, raw) in tree.iter().flatten() {
            let notification: Notification = serde_json::from_slice(&raw)?;
            if notification.recorded_at >= since_ms {
                notifications.push(notification);
            }
        }
        Ok(notifications)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MilestoneStatus, NotificationKind, ProjectStatus};
    use ethereum_types::{Address, U256};

    fn project(id: u64, name: &str) -> Project {
        Project {
            id,
            name: name.to_string(),
            budget: U256::from(1000u64),
            status: ProjectStatus::Active,
            timeline: "Q3".to_string(),
            owner: Address::zero(),
            milestones: vec![],
            last_synced_at: 0,
            sync_epoch: 0,
        }
    }

    fn milestone(id: u64, status: MilestoneStatus) -> Milestone {
        Milestone {
            id,
            description: "grade the roadbed".to_string(),
            status,
            proof_uri: String::new(),
        }
    }

    #[test]
    fn upsert_then_get_roundtrips() {
        let store = SledStore::temporary().unwrap();
        let epoch = store.begin_resync_epoch().unwrap();
        let applied = store
            .upsert_project(WriteOrigin::Resync { epoch }, project(1, "Road"))
            .unwrap();
        assert!(applied);
        let found = store.get_project(1).unwrap().unwrap();
        assert_eq!(found.name, "Road");
        assert_eq!(found.sync_epoch, epoch);
        assert!(found.last_synced_at > 0);
    }

    #[test]
    fn resync_wins_over_stale_relay_write() {
        let store = SledStore::temporary().unwrap();
        // the relay observes the epoch before the resync cycle starts.
        let stale_epoch = store.current_resync_epoch().unwrap();
        let epoch = store.begin_resync_epoch().unwrap();
        store
            .upsert_project(
                WriteOrigin::Resync { epoch },
                project(1, "Road (resynced)"),
            )
            .unwrap();
        // the in-flight relay write lands after the resync and must lose.
        let applied = store
            .upsert_project(
                WriteOrigin::Relay { epoch: stale_epoch },
                project(1, "Road (stale)"),
            )
            .unwrap();
        assert!(!applied);
        let found = store.get_project(1).unwrap().unwrap();
        assert_eq!(found.name, "Road (resynced)");
    }

    #[test]
    fn relay_write_at_current_epoch_applies() {
        let store = SledStore::temporary().unwrap();
        let epoch = store.begin_resync_epoch().unwrap();
        store
            .upsert_project(WriteOrigin::Resync { epoch }, project(1, "Road"))
            .unwrap();
        let applied = store
            .upsert_project(
                WriteOrigin::Relay { epoch },
                project(1, "Road (renamed)"),
            )
            .unwrap();
        assert!(applied);
        let found = store.get_project(1).unwrap().unwrap();
        assert_eq!(found.name, "Road (renamed)");
    }

    #[test]
    fn milestone_merge_replaces_or_appends() {
        let store = SledStore::temporary().unwrap();
        let epoch = store.begin_resync_epoch().unwrap();
        store
            .upsert_project(WriteOrigin::Resync { epoch }, project(1, "Road"))
            .unwrap();
        store
            .apply_milestone(
                WriteOrigin::Relay { epoch },
                1,
                milestone(1, MilestoneStatus::Submitted),
            )
            .unwrap();
        store
            .apply_milestone(
                WriteOrigin::Relay { epoch },
                1,
                milestone(2, MilestoneStatus::Pending),
            )
            .unwrap();
        // same milestone again with a new status replaces, not appends.
        store
            .apply_milestone(
                WriteOrigin::Relay { epoch },
                1,
                milestone(1, MilestoneStatus::Approved),
            )
            .unwrap();
        let found = store.get_project(1).unwrap().unwrap();
        assert_eq!(found.milestones.len(), 2);
        assert_eq!(found.milestones[0].status, MilestoneStatus::Approved);
    }

    #[test]
    fn milestone_for_unknown_project_is_an_error() {
        let store = SledStore::temporary().unwrap();
        let err = store
            .apply_milestone(
                WriteOrigin::Relay { epoch: 0 },
                42,
                milestone(1, MilestoneStatus::Submitted),
            )
            .unwrap_err();
        assert!(matches!(
            err,
            Error::ProjectNotInMirror { project_id: 42 }
        ));
    }

    #[test]
    fn list_projects_honors_the_filter() {
        let store = SledStore::temporary().unwrap();
        let epoch = store.begin_resync_epoch().unwrap();
        let mut flagged = project(2, "Bridge");
        flagged.status = ProjectStatus::Flagged;
        store
            .upsert_project(WriteOrigin::Resync { epoch }, project(1, "Road"))
            .unwrap();
        store
            .upsert_project(WriteOrigin::Resync { epoch }, flagged)
            .unwrap();
        let all = store.list_projects(&ProjectFilter::default()).unwrap();
        assert_eq!(all.len(), 2);
        let filter = ProjectFilter {
            status: Some(ProjectStatus::Flagged),
            ..Default::default()
        };
        let flagged_only = store.list_projects(&filter).unwrap();
        assert_eq!(flagged_only.len(), 1);
        assert_eq!(flagged_only[0].name, "Bridge");
    }

    #[test]
    fn notifications_are_arrival_ordered_and_filtered() {
        let store = SledStore::temporary().unwrap();
        for project_id in [1u64, 2, 3] {
            store
                .record_notification(NotificationPayload::FeedbackSubmitted {
                    project_id,
                    author: Address::zero(),
                })
                .unwrap();
        }
        let all = store.notifications_since(0).unwrap();
        assert_eq!(all.len(), 3);
        // arrival order with non-decreasing timestamps.
        assert!(all.windows(2).all(|w| w[0].recorded_at <= w[1].recorded_at));
        assert!(all
            .iter()
            .all(|n| n.kind() == NotificationKind::FeedbackSubmitted));
        let future = now_ms() + 60_000;
        assert!(store.notifications_since(future).unwrap().is_empty());
    }

    #[test]
    fn concurrent_notification_writers_keep_timestamps_ordered() {
        let store = SledStore::temporary().unwrap();
        let mut writers = Vec::new();
        for _ in 0..4 {
            let store = store.clone();
            writers.push(std::thread::spawn(move || {
                for _ in 0..25 {
                    store
                        .record_notification(
                            NotificationPayload::FeedbackSubmitted {
                                project_id: 1,
                                author: Address::zero(),
                            },
                        )
                        .unwrap();
                }
            }));
        }
        for writer in writers {
            writer.join().unwrap();
        }
        let all = store.notifications_since(0).unwrap();
        assert_eq!(all.len(), 100);
        assert!(all.windows(2).all(|w| w[0].recorded_at <= w[1].recorded_at));
    }

    #[test]
    fn a_notification_and_its_event_hash_commit_together() {
        let store = SledStore::temporary().unwrap();
        let event = b"FeedbackSubmitted(3)";
        assert!(!store.contains_event(event).unwrap());
        store
            .record_notification_for_event(
                event,
                NotificationPayload::FeedbackSubmitted {
                    project_id: 3,
                    author: Address::zero(),
                },
            )
            .unwrap();
        assert!(store.contains_event(event).unwrap());
        let all = store.notifications_since(0).unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].kind(), NotificationKind::FeedbackSubmitted);
    }

    #[test]
    fn feedback_is_scoped_to_its_project() {
        let store = SledStore::temporary().unwrap();
        for (project_id, body) in [(1u64, "good"), (2, "bad"), (1, "fine")] {
            store
                .append_feedback(Feedback {
                    project_id,
                    author: Address::zero(),
                    body: body.to_string(),
                    submitted_at: now_ms(),
                })
                .unwrap();
        }
        let for_one = store.feedback_for_project(1).unwrap();
        assert_eq!(for_one.len(), 2);
        assert_eq!(for_one[0].body, "good");
        assert_eq!(for_one[1].body, "fine");
        assert_eq!(store.feedback_for_project(2).unwrap().len(), 1);
        assert!(store.feedback_for_project(3).unwrap().is_empty());
    }

    #[test]
    fn event_hash_store_marks_processed_events() {
        let store = SledStore::temporary().unwrap();
        let event = b"ProjectCreated(1)";
        assert!(!store.contains_event(event).unwrap());
        store.store_event(event).unwrap();
        assert!(store.contains_event(event).unwrap());
    }
}

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

use std::collections::{HashMap, HashSet};
use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tfas_relayer_utils::Error;

use super::{
    merge_milestone, now_ms, EventHashStore, Feedback, FeedbackStore,
    HistoryStore, HistoryStoreKey, Milestone, Notification,
    NotificationPayload, NotificationStore, Project, ProjectFilter,
    ProjectStore, Result, WriteOrigin,
};

/// InMemoryStore is a store backed by plain in-memory maps, used for
/// testing. It keeps the same semantics as the Sled backend.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    projects: Arc<RwLock<HashMap<u64, Project>>>,
    resync_epoch: Arc<AtomicU64>,
    feedback: Arc<RwLock<HashMap<u64, Vec<Feedback>>>>,
    notifications: Arc<RwLock<Vec<Notification>>>,
    event_hashes: Arc<RwLock<HashSet<Vec<u8>>>>,
    last_block_numbers: Arc<RwLock<HashMap<HistoryStoreKey, u64>>>,
    target_block_numbers: Arc<RwLock<HashMap<HistoryStoreKey, u64>>>,
}

impl Debug for InMemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryStore").finish()
    }
}

impl HistoryStore for InMemoryStore {
    #[tracing::instrument(skip(self))]
    fn set_last_block_number<K: Into<HistoryStoreKey> + Debug>(
        &self,
        key: K,
        block_number: u64,
    ) -> Result<u64> {
        let mut guard = self.last_block_numbers.write();
        let old = guard.insert(key.into(), block_number);
        Ok(old.unwrap_or(block_number))
    }

    #[tracing::instrument(skip(self))]
    fn get_last_block_number<K: Into<HistoryStoreKey> + Debug>(
        &self,
        key: K,
        default_block_number: u64,
    ) -> Result<u64> {
        let guard = self.last_block_numbers.read();
        Ok(guard.get(&key.into()).copied().unwrap_or(default_block_number))
    }

    #[tracing::instrument(skip(self))]
    fn set_target_block_number<K: Into<HistoryStoreKey> + Debug>(
        &self,
        key: K,
        block_number: u64,
    ) -> Result<u64> {
        let mut guard = self.target_block_numbers.write();
        let old = guard.insert(key.into(), block_number);
        Ok(old.unwrap_or(block_number))
    }

    #[tracing::instrument(skip(self))]
    fn get_target_block_number<K: Into<HistoryStoreKey> + Debug>(
        &self,
        key: K,
        default_block_number: u64,
    ) -> Result<u64> {
        let guard = self.target_block_numbers.read();
        Ok(guard.get(&key.into()).copied().unwrap_or(default_block_number))
    }
}

impl EventHashStore for InMemoryStore {
    fn store_event(&self, event: &[u8]) -> Result<()> {
        self.event_hashes.write().insert(event.to_vec());
        Ok(())
    }

    fn contains_event(&self, event: &[u8]) -> Result<bool> {
        Ok(self.event_hashes.read().contains(event))
    }
}

impl ProjectStore for InMemoryStore {
    fn begin_resync_epoch(&self) -> Result<u64> {
        Ok(self.resync_epoch.fetch_add(1, Ordering::SeqCst) + 1)
    }

    fn current_resync_epoch(&self) -> Result<u64> {
        Ok(self.resync_epoch.load(Ordering::SeqCst))
    }

    #[tracing::instrument(skip(self, project), fields(project_id = project.id))]
    fn upsert_project(
        &self,
        origin: WriteOrigin,
        mut project: Project,
    ) -> Result<bool> {
        let mut guard = self.projects.write();
        if let Some(existing) = guard.get(&project.id) {
            if origin.epoch() < existing.sync_epoch {
                return Ok(false);
            }
        }
        project.sync_epoch = origin.epoch();
        project.last_synced_at = now_ms();
        guard.insert(project.id, project);
        Ok(true)
    }

    #[tracing::instrument(skip(self, milestone))]
    fn apply_milestone(
        &self,
        origin: WriteOrigin,
        project_id: u64,
        milestone: Milestone,
    ) -> Result<bool> {
        let mut guard = self.projects.write();
        let project = guard
            .get_mut(&project_id)
            .ok_or(Error::ProjectNotInMirror { project_id })?;
        if origin.epoch() < project.sync_epoch {
            return Ok(false);
        }
        merge_milestone(project, milestone);
        project.sync_epoch = origin.epoch().max(project.sync_epoch);
        project.last_synced_at = now_ms();
        Ok(true)
    }

    fn get_project(&self, project_id: u64) -> Result<Option<Project>> {
        Ok(self.projects.read().get(&project_id).cloned())
    }

    fn list_projects(&self, filter: &ProjectFilter) -> Result<Vec<Project>> {
        let guard = self.projects.read();
        let mut projects: Vec<_> =
            guard.values().filter(|p| filter.matches(p)).cloned().collect();
        projects.sort_by_key(|p| p.id);
        Ok(projects)
    }
}

impl FeedbackStore for InMemoryStore {
    fn append_feedback(&self, feedback: Feedback) -> Result<()> {
        self.feedback
            .write()
            .entry(feedback.project_id)
            .or_default()
            .push(feedback);
        Ok(())
    }

    fn feedback_for_project(&self, project_id: u64) -> Result<Vec<Feedback>> {
        Ok(self
            .feedback
            .read()
            .get(&project_id)
            .cloned()
            .unwrap_or_default())
    }
}

impl NotificationStore for InMemoryStore {
    fn record_notification(
        &self,
        payload: NotificationPayload,
    ) -> Result<Notification> {
        // the timestamp is clamped under the write lock, so arrival
        // order never shows a decreasing timestamp.
        let mut guard = self.notifications.write();
        let previous =
            guard.last().map(|n| n.recorded_at).unwrap_or_default();
        let notification = Notification {
            payload,
            recorded_at: now_ms().max(previous),
        };
        guard.push(notification.clone());
        Ok(notification)
    }

    fn record_notification_for_event(
        &self,
        event: &[u8],
        payload: NotificationPayload,
    ) -> Result<Notification> {
        let mut guard = self.notifications.write();
        let previous =
            guard.last().map(|n| n.recorded_at).unwrap_or_default();
        let notification = Notification {
            payload,
            recorded_at: now_ms().max(previous),
        };
        guard.push(notification.clone());
        self.event_hashes.write().insert(event.to_vec());
        Ok(notification)
    }

    fn notifications_since(&self, since_ms: u64) -> Result<Vec<Notification>> {
        Ok(self
            .notifications
            .read()
            .iter()
            .filter(|n| n.recorded_at >= since_ms)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ProjectStatus;
    use ethereum_types::{Address, U256};

    fn project(id: u64, name: &str) -> Project {
        Project {
            id,
            name: name.to_string(),
            budget: U256::from(500u64),
            status: ProjectStatus::Proposed,
            timeline: "Q4".to_string(),
            owner: Address::zero(),
            milestones: vec![],
            last_synced_at: 0,
            sync_epoch: 0,
        }
    }

    #[test]
    fn matches_sled_precedence_semantics() {
        let store = InMemoryStore::default();
        let stale_epoch = store.current_resync_epoch().unwrap();
        let epoch = store.begin_resync_epoch().unwrap();
        assert!(store
            .upsert_project(WriteOrigin::Resync { epoch }, project(1, "A"))
            .unwrap());
        assert!(!store
            .upsert_project(
                WriteOrigin::Relay { epoch: stale_epoch },
                project(1, "B"),
            )
            .unwrap());
        assert_eq!(store.get_project(1).unwrap().unwrap().name, "A");
    }

    #[test]
    fn records_the_notification_and_event_hash_together() {
        let store = InMemoryStore::default();
        let event = b"MilestoneChanged(1, 2)";
        store
            .record_notification_for_event(
                event,
                NotificationPayload::MilestoneChanged {
                    project_id: 1,
                    milestone_id: 2,
                    status: crate::MilestoneStatus::Approved,
                },
            )
            .unwrap();
        assert!(store.contains_event(event).unwrap());
        assert_eq!(store.notifications_since(0).unwrap().len(), 1);
    }

    #[test]
    fn list_projects_is_id_ordered() {
        let store = InMemoryStore::default();
        let epoch = store.begin_resync_epoch().unwrap();
        for id in [3u64, 1, 2] {
            store
                .upsert_project(
                    WriteOrigin::Resync { epoch },
                    project(id, "P"),
                )
                .unwrap();
        }
        let ids: Vec<_> = store
            .list_projects(&ProjectFilter::default())
            .unwrap()
            .iter()
            .map(|p| p.id)
            .collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }
}

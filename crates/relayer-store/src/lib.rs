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

//! # Relayer Store Module
//!
//! The local, durable projection of on-chain TFAS state.
//!
//! ## Overview
//!
//! This module holds the domain records mirrored off the ledger (projects,
//! milestones, feedback, notifications) and the storage traits the mirror,
//! the event relay and the API handlers are written against. Two backends
//! are provided: a [Sled](https://sled.rs)-based one for the daemon and an
//! in-memory one for tests.

use std::fmt::{Debug, Display};
use std::time::{SystemTime, UNIX_EPOCH};

use ethereum_types::{Address, U256};
use serde::{Deserialize, Serialize};
use tfas_relayer_utils::{Error, Result};

/// A module for managing in-memory storage of the relayer.
pub mod mem;
/// A module for setting up and managing a [Sled](https://sled.rs)-based database.
#[cfg(feature = "sled")]
pub mod sled;

/// A store that uses [`sled`](https://sled.rs) as the backend.
#[cfg(feature = "sled")]
pub use self::sled::SledStore;
/// A store that uses in memory data structures as the backend.
pub use mem::InMemoryStore;

/// Returns the current wall-clock time as unix milliseconds.
///
/// All mirror timestamps (`last_synced_at`, `recorded_at`, `submitted_at`)
/// use this clock.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

/// The lifecycle status of a [`Project`] as encoded on the ledger.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum ProjectStatus {
    /// Proposed but not yet funded.
    Proposed,
    /// Funded and in progress.
    Active,
    /// All milestones approved and funds released.
    Completed,
    /// Flagged by an audit.
    Flagged,
}

impl TryFrom<u8> for ProjectStatus {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Self::Proposed),
            1 => Ok(Self::Active),
            2 => Ok(Self::Completed),
            3 => Ok(Self::Flagged),
            v => Err(Error::InvalidProjectStatus(v)),
        }
    }
}

/// The lifecycle status of a [`Milestone`] as encoded on the ledger.
///
/// A milestone's lifecycle is a strict subset of its project's lifecycle.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum MilestoneStatus {
    /// Declared but not yet submitted by the contractor.
    Pending,
    /// Submitted with a proof reference, awaiting verification.
    Submitted,
    /// Verified by an auditor; the payment tranche is released.
    Approved,
    /// Rejected by an auditor.
    Rejected,
}

impl TryFrom<u8> for MilestoneStatus {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Self::Pending),
            1 => Ok(Self::Submitted),
            2 => Ok(Self::Approved),
            3 => Ok(Self::Rejected),
            v => Err(Error::InvalidMilestoneStatus(v)),
        }
    }
}

/// A single milestone of a project, scoped to its owning project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Milestone {
    /// Milestone identifier, scoped to the owning project.
    pub id: u64,
    /// Free-text description of the deliverable.
    pub description: String,
    /// Current lifecycle status.
    pub status: MilestoneStatus,
    /// Opaque proof reference (URI or content hash).
    pub proof_uri: String,
}

/// A project record mirrored off the ledger.
///
/// Owned exclusively by the state mirror: the `last_synced_at` and
/// `sync_epoch` fields are managed by the store on every write and any
/// values supplied by the caller are overwritten.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    /// Ledger-assigned identifier, immutable.
    pub id: u64,
    /// Human-readable project name.
    pub name: String,
    /// Allocated budget in the smallest on-chain unit.
    pub budget: U256,
    /// Current lifecycle status.
    pub status: ProjectStatus,
    /// Free-text timeline.
    pub timeline: String,
    /// Ledger account of the project owner.
    pub owner: Address,
    /// Milestones of this project.
    #[serde(default)]
    pub milestones: Vec<Milestone>,
    /// When this record was last written by a sync or relay operation,
    /// unix milliseconds. Doubles as the staleness indicator on the API.
    #[serde(default)]
    pub last_synced_at: u64,
    /// The resync epoch this record was last written under. Used for the
    /// resync-beats-stale-relay-write precedence rule.
    #[serde(default)]
    pub sync_epoch: u64,
}

/// A feedback record for a project. Append-only, never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Feedback {
    /// The project this feedback is about.
    pub project_id: u64,
    /// Ledger account that submitted the feedback.
    pub author: Address,
    /// Free-text body.
    pub body: String,
    /// Arrival timestamp, unix milliseconds.
    pub submitted_at: u64,
}

/// The kind of a [`Notification`], matching the ledger event types.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum NotificationKind {
    /// A new project was created on the ledger.
    ProjectCreated,
    /// A milestone changed status on the ledger.
    MilestoneChanged,
    /// Feedback was submitted on the ledger.
    FeedbackSubmitted,
}

/// The structured per-kind payload of a [`Notification`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum NotificationPayload {
    /// A new project was created on the ledger.
    #[serde(rename_all = "camelCase")]
    ProjectCreated {
        /// The new project identifier.
        project_id: u64,
        /// The project name.
        name: String,
        /// The creating account.
        owner: Address,
    },
    /// A milestone changed status on the ledger.
    #[serde(rename_all = "camelCase")]
    MilestoneChanged {
        /// The owning project identifier.
        project_id: u64,
        /// The milestone identifier.
        milestone_id: u64,
        /// The new milestone status.
        status: MilestoneStatus,
    },
    /// Feedback was submitted on the ledger.
    #[serde(rename_all = "camelCase")]
    FeedbackSubmitted {
        /// The project the feedback is about.
        project_id: u64,
        /// The submitting account.
        author: Address,
    },
}

impl NotificationPayload {
    /// The kind tag of this payload.
    pub fn kind(&self) -> NotificationKind {
        match self {
            Self::ProjectCreated { .. } => NotificationKind::ProjectCreated,
            Self::MilestoneChanged { .. } => {
                NotificationKind::MilestoneChanged
            }
            Self::FeedbackSubmitted { .. } => {
                NotificationKind::FeedbackSubmitted
            }
        }
    }
}

/// A derived event record for downstream consumers. Append-only, ordered
/// by arrival.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    /// The structured payload, tagged with its kind.
    #[serde(flatten)]
    pub payload: NotificationPayload,
    /// Arrival timestamp, unix milliseconds.
    pub recorded_at: u64,
}

impl Notification {
    /// The kind of this notification.
    pub fn kind(&self) -> NotificationKind {
        self.payload.kind()
    }
}

/// The origin of a mirror write, carrying the resync epoch the writer
/// observed.
///
/// A full resync bumps the epoch at the start of its cycle and stamps all
/// of its writes with it; the event relay stamps each write with the epoch
/// current at event arrival. A write older than the record's epoch is
/// dropped, which makes a resync always win over relay writes that were
/// in flight before the cycle started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOrigin {
    /// A write from a full resync cycle.
    Resync {
        /// The epoch of the resync cycle.
        epoch: u64,
    },
    /// An incremental write from the event relay.
    Relay {
        /// The epoch observed when the event arrived.
        epoch: u64,
    },
}

impl WriteOrigin {
    /// The epoch this write carries.
    pub fn epoch(&self) -> u64 {
        match *self {
            Self::Resync { epoch } | Self::Relay { epoch } => epoch,
        }
    }
}

impl Display for WriteOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Resync { epoch } => write!(f, "Resync(epoch {epoch})"),
            Self::Relay { epoch } => write!(f, "Relay(epoch {epoch})"),
        }
    }
}

/// A filter for mirror queries. An empty filter matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectFilter {
    /// Only projects with this status.
    pub status: Option<ProjectStatus>,
    /// Only projects owned by this account.
    pub owner: Option<Address>,
}

impl ProjectFilter {
    /// Whether the given project passes this filter.
    pub fn matches(&self, project: &Project) -> bool {
        self.status.map_or(true, |s| project.status == s)
            && self.owner.map_or(true, |o| project.owner == o)
    }
}

/// HistoryStoreKey contains the keys used to store the block cursors of
/// the event watchers.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum HistoryStoreKey {
    /// A deployed contract on a specific chain.
    Contract {
        /// The chain the contract is deployed on.
        chain_id: u32,
        /// The contract address.
        address: Address,
    },
}

impl HistoryStoreKey {
    /// Returns the chain id of the chain this key is for.
    pub fn chain_id(&self) -> u32 {
        match self {
            HistoryStoreKey::Contract { chain_id, .. } => *chain_id,
        }
    }

    /// Returns the contract address this key is for.
    pub fn address(&self) -> Address {
        match self {
            HistoryStoreKey::Contract { address, .. } => *address,
        }
    }

    /// Returns the bytes of the key.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut vec = vec![];
        match self {
            Self::Contract { chain_id, address } => {
                vec.extend_from_slice(&chain_id.to_be_bytes());
                vec.extend_from_slice(address.as_bytes());
            }
        }
        vec
    }
}

impl Display for HistoryStoreKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Contract { chain_id, address } => {
                write!(f, "Contract({address:?} @ chain {chain_id})")
            }
        }
    }
}

impl From<(u32, Address)> for HistoryStoreKey {
    fn from((chain_id, address): (u32, Address)) -> Self {
        Self::Contract { chain_id, address }
    }
}

/// HistoryStore is a simple trait for storing and retrieving the block
/// cursor of an event watcher.
pub trait HistoryStore: Clone + Send + Sync {
    /// Sets the new block number for that contract in the cache and
    /// returns the old one.
    fn set_last_block_number<K: Into<HistoryStoreKey> + Debug>(
        &self,
        key: K,
        block_number: u64,
    ) -> Result<u64>;

    /// Get the last block number for that contract.
    /// if not found, returns the `default_block_number`.
    fn get_last_block_number<K: Into<HistoryStoreKey> + Debug>(
        &self,
        key: K,
        default_block_number: u64,
    ) -> Result<u64>;

    /// Sets the target block number (usually the latest block number of
    /// the chain). This is used to check whether we are fully synced.
    fn set_target_block_number<K: Into<HistoryStoreKey> + Debug>(
        &self,
        key: K,
        block_number: u64,
    ) -> Result<u64>;

    /// Get the target block number.
    /// if not found, returns the `default_block_number`.
    fn get_target_block_number<K: Into<HistoryStoreKey> + Debug>(
        &self,
        key: K,
        default_block_number: u64,
    ) -> Result<u64>;
}

/// A simple event store, that does not store the events themselves,
/// instead it stores the hash of the event as the key and the value is
/// just empty bytes.
///
/// This is mainly useful to mark an event as processed, which is what
/// makes at-least-once delivery idempotent.
pub trait EventHashStore: Send + Sync + Clone {
    /// Store the event in the store.
    /// the key is the hash of the event.
    fn store_event(&self, event: &[u8]) -> Result<()>;

    /// Check if the event is stored in the store.
    /// the key is the hash of the event.
    fn contains_event(&self, event: &[u8]) -> Result<bool>;
}

/// The mirror of on-chain project state.
///
/// Writes are atomic per project. The durable backend implements them as
/// per-key compare-and-swap operations, so writes for different projects
/// never contend on a shared lock; the in-memory test backend uses a
/// single map lock instead.
pub trait ProjectStore: Clone + Send + Sync {
    /// Bumps the resync epoch and returns the new value. Called once at
    /// the start of every full resync cycle.
    fn begin_resync_epoch(&self) -> Result<u64>;

    /// The current resync epoch. The event relay reads this at event
    /// arrival and stamps its writes with it.
    fn current_resync_epoch(&self) -> Result<u64>;

    /// Inserts or replaces the record keyed by the project identifier and
    /// stamps `last_synced_at`.
    ///
    /// Returns `true` when the write was applied and `false` when it was
    /// dropped as stale (its epoch is older than the record's).
    fn upsert_project(
        &self,
        origin: WriteOrigin,
        project: Project,
    ) -> Result<bool>;

    /// Merges a single milestone into the owning project's milestone
    /// list, replacing a matching identifier or appending if absent.
    ///
    /// Fails with [`Error::ProjectNotInMirror`] when the project is
    /// unknown, so the relay can self-heal by fetching it first. Returns
    /// `false` when the write was dropped as stale.
    fn apply_milestone(
        &self,
        origin: WriteOrigin,
        project_id: u64,
        milestone: Milestone,
    ) -> Result<bool>;

    /// Get a single project by identifier.
    fn get_project(&self, project_id: u64) -> Result<Option<Project>>;

    /// The read path for API consumers. Local storage only, never
    /// network.
    fn list_projects(&self, filter: &ProjectFilter) -> Result<Vec<Project>>;
}

/// Append-only feedback storage.
pub trait FeedbackStore: Send + Sync + Clone {
    /// Appends a feedback record. There is no update or delete.
    fn append_feedback(&self, feedback: Feedback) -> Result<()>;

    /// All feedback for the given project, in arrival order.
    fn feedback_for_project(&self, project_id: u64) -> Result<Vec<Feedback>>;
}

/// The append-only notification log.
///
/// Timestamps are clamped to be non-decreasing along the arrival
/// sequence, even with concurrent writers.
pub trait NotificationStore: EventHashStore {
    /// Appends a notification derived from a relay event, stamping the
    /// arrival timestamp. Returns the recorded notification.
    fn record_notification(
        &self,
        payload: NotificationPayload,
    ) -> Result<Notification>;

    /// Appends a notification and marks the originating relay event as
    /// processed in one atomic step, so a delivery retried after a crash
    /// between the two writes cannot record the notification twice.
    fn record_notification_for_event(
        &self,
        event: &[u8],
        payload: NotificationPayload,
    ) -> Result<Notification>;

    /// Returns notifications recorded at or after the given unix
    /// millisecond timestamp, in arrival order.
    fn notifications_since(&self, since_ms: u64) -> Result<Vec<Notification>>;
}

/// Merges a milestone into a project's milestone list: replace on
/// matching identifier, append otherwise. Shared by both store backends.
pub(crate) fn merge_milestone(project: &mut Project, milestone: Milestone) {
    match project.milestones.iter_mut().find(|m| m.id == milestone.id) {
        Some(existing) => *existing = milestone,
        None => project.milestones.push(milestone),
    }
}

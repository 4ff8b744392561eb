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

use ethers::contract::ContractError;
use ethers::types::U256;

use tfas_relayer_store::{Milestone, MilestoneStatus, Project, ProjectStatus};
use tfas_relayer_types::EthersClient;
use tfas_relayer_utils::{Error, Result};

use crate::{FundAllocationContractWrapper, MilestoneView, ProjectView};

/// The read surface of the fund-allocation ledger.
///
/// The resync service and the event relay are written against this trait
/// so tests can substitute the ledger with a scripted fake.
#[async_trait::async_trait]
pub trait FundAllocationGateway: Send + Sync {
    /// Fetches all projects from the ledger, without their milestones.
    async fn list_projects(&self) -> Result<Vec<Project>>;

    /// Fetches a single project and its milestones.
    ///
    /// Fails with [`Error::ProjectNotFound`] when the ledger reverts on
    /// the given identifier.
    async fn get_project(&self, project_id: u64) -> Result<Project>;

    /// Fetches the milestones of a single project.
    async fn list_milestones(&self, project_id: u64)
        -> Result<Vec<Milestone>>;
}

/// Decodes a raw project view into a mirror record.
///
/// The sync bookkeeping fields are zeroed; the store stamps them on write.
pub fn decode_project(view: ProjectView) -> Result<Project> {
    Ok(Project {
        id: u256_to_u64(view.id, "project id")?,
        name: view.name,
        budget: view.budget,
        status: ProjectStatus::try_from(view.status)?,
        timeline: view.timeline,
        owner: view.owner,
        milestones: vec![],
        last_synced_at: 0,
        sync_epoch: 0,
    })
}

/// Decodes a raw milestone view into a mirror record.
pub fn decode_milestone(view: MilestoneView) -> Result<Milestone> {
    Ok(Milestone {
        id: u256_to_u64(view.id, "milestone id")?,
        description: view.description,
        status: MilestoneStatus::try_from(view.status)?,
        proof_uri: view.proof_uri,
    })
}

fn u256_to_u64(value: U256, field: &'static str) -> Result<u64> {
    if value > U256::from(u64::MAX) {
        return Err(Error::MalformedLedgerResponse(format!(
            "{field} does not fit in 64 bits: {value}"
        )));
    }
    Ok(value.as_u64())
}

fn map_call_error(
    e: ContractError<EthersClient>,
    project_id: u64,
) -> Error {
    // the ledger reverts on unknown project identifiers.
    if e.is_revert() {
        Error::ProjectNotFound { project_id }
    } else {
        Error::from(e)
    }
}

#[async_trait::async_trait]
impl FundAllocationGateway for FundAllocationContractWrapper<EthersClient> {
    #[tracing::instrument(skip(self))]
    async fn list_projects(&self) -> Result<Vec<Project>> {
        let views = self.contract.get_projects().call().await?;
        views.into_iter().map(decode_project).collect()
    }

    #[tracing::instrument(skip(self))]
    async fn get_project(&self, project_id: u64) -> Result<Project> {
        let view = self
            .contract
            .get_project(project_id.into())
            .call()
            .await
            .map_err(|e| map_call_error(e, project_id))?;
        let mut project = decode_project(view)?;
        project.milestones = self.list_milestones(project_id).await?;
        Ok(project)
    }

    #[tracing::instrument(skip(self))]
    async fn list_milestones(
        &self,
        project_id: u64,
    ) -> Result<Vec<Milestone>> {
        let views = self
            .contract
            .get_milestones(project_id.into())
            .call()
            .await
            .map_err(|e| map_call_error(e, project_id))?;
        views.into_iter().map(decode_milestone).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::types::Address;

    fn project_view(id: u64, status: u8) -> ProjectView {
        ProjectView {
            id: U256::from(id),
            name: "Road rehabilitation".to_string(),
            budget: U256::from(25_000u64),
            status,
            timeline: "Q3 2024".to_string(),
            owner: Address::random(),
        }
    }

    #[test]
    fn decodes_a_valid_project() {
        let view = project_view(7, 1);
        let project = decode_project(view.clone()).unwrap();
        assert_eq!(project.id, 7);
        assert_eq!(project.name, view.name);
        assert_eq!(project.status, ProjectStatus::Active);
        assert!(project.milestones.is_empty());
        assert_eq!(project.sync_epoch, 0);
    }

    #[test]
    fn rejects_an_unknown_project_status() {
        let err = decode_project(project_view(7, 9)).unwrap_err();
        assert!(matches!(err, Error::InvalidProjectStatus(9)));
    }

    #[test]
    fn rejects_a_project_id_wider_than_64_bits() {
        let mut view = project_view(1, 0);
        view.id = U256::MAX;
        let err = decode_project(view).unwrap_err();
        assert!(matches!(err, Error::MalformedLedgerResponse(_)));
    }

    #[test]
    fn decodes_a_valid_milestone() {
        let view = MilestoneView {
            id: U256::from(2u64),
            description: "Pour the foundation".to_string(),
            status: 2,
            proof_uri: "ipfs://bafy".to_string(),
        };
        let milestone = decode_milestone(view).unwrap();
        assert_eq!(milestone.id, 2);
        assert_eq!(milestone.status, MilestoneStatus::Approved);
        assert_eq!(milestone.proof_uri, "ipfs://bafy");
    }

    #[test]
    fn rejects_an_unknown_milestone_status() {
        let view = MilestoneView {
            id: U256::from(2u64),
            description: String::new(),
            status: 7,
            proof_uri: String::new(),
        };
        let err = decode_milestone(view).unwrap_err();
        assert!(matches!(err, Error::InvalidMilestoneStatus(7)));
    }
}

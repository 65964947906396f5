// Dotlanth
// Copyright (C) 2025 Synerthink

// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.

// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.

//! Project lifecycle

use super::{EntityType, StateMachine, TimestampField, TransitionKind, TransitionRule, WorkflowEntity, WorkflowState};
use crate::error::{GuardError, GuardResult};
use crate::models::{Actor, CustomerId, OrganizationId, ProjectId, RoleKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    Pending,
    Approved,
    InProgress,
    Delivered,
    Archived,
    Rejected,
}

impl ProjectStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectStatus::Pending => "pending",
            ProjectStatus::Approved => "approved",
            ProjectStatus::InProgress => "in_progress",
            ProjectStatus::Delivered => "delivered",
            ProjectStatus::Archived => "archived",
            ProjectStatus::Rejected => "rejected",
        }
    }
}

impl fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProjectStatus {
    type Err = GuardError;

    fn from_str(s: &str) -> GuardResult<Self> {
        Self::all()
            .iter()
            .copied()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| GuardError::invalid_record(format!("unknown project status '{}'", s)))
    }
}

fn project_rules() -> Vec<TransitionRule<ProjectStatus>> {
    use ProjectStatus::*;

    vec![
        TransitionRule::new(Pending, Approved, TransitionKind::Approve, RoleKind::Approver),
        TransitionRule::new(Pending, Rejected, TransitionKind::Reject, RoleKind::Approver),
        TransitionRule::new(Approved, InProgress, TransitionKind::Start, RoleKind::Technician).assigned(),
        TransitionRule::new(InProgress, Delivered, TransitionKind::Deliver, RoleKind::Technician).assigned(),
        TransitionRule::new(Delivered, InProgress, TransitionKind::RequestRevision, RoleKind::CustomerOwner),
        TransitionRule::new(Delivered, Archived, TransitionKind::Archive, RoleKind::SalesLead),
        TransitionRule::new(Rejected, Pending, TransitionKind::Resubmit, RoleKind::SalesLead),
        TransitionRule::new(Rejected, Archived, TransitionKind::Archive, RoleKind::SalesLead),
    ]
}

static PROJECT_MACHINE: LazyLock<StateMachine<ProjectStatus>> = LazyLock::new(|| StateMachine::from_rules(project_rules()));

impl WorkflowState for ProjectStatus {
    const ENTITY: EntityType = EntityType::Project;

    fn all() -> &'static [Self] {
        &[
            ProjectStatus::Pending,
            ProjectStatus::Approved,
            ProjectStatus::InProgress,
            ProjectStatus::Delivered,
            ProjectStatus::Archived,
            ProjectStatus::Rejected,
        ]
    }

    fn machine() -> &'static StateMachine<Self> {
        &PROJECT_MACHINE
    }

    fn timestamp_field(self) -> Option<TimestampField> {
        match self {
            ProjectStatus::Pending => None,
            ProjectStatus::Approved => Some(TimestampField::ApprovedAt),
            ProjectStatus::InProgress => Some(TimestampField::StartedAt),
            ProjectStatus::Delivered => Some(TimestampField::DeliveredAt),
            ProjectStatus::Archived => Some(TimestampField::ArchivedAt),
            ProjectStatus::Rejected => Some(TimestampField::RejectedAt),
        }
    }
}

/// Capture project as seen by the guard layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectRecord {
    pub id: ProjectId,
    pub organization_id: OrganizationId,
    pub customer_id: CustomerId,
    pub status: ProjectStatus,
    pub approved_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub rejected_at: Option<DateTime<Utc>>,
    pub archived_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl ProjectRecord {
    /// New pending project
    pub fn new(id: impl Into<ProjectId>, organization_id: impl Into<OrganizationId>, customer_id: impl Into<CustomerId>) -> Self {
        Self {
            id: id.into(),
            organization_id: organization_id.into(),
            customer_id: customer_id.into(),
            status: ProjectStatus::Pending,
            approved_at: None,
            started_at: None,
            delivered_at: None,
            rejected_at: None,
            archived_at: None,
            updated_at: Utc::now(),
        }
    }

    pub fn with_status(mut self, status: ProjectStatus) -> Self {
        self.status = status;
        self
    }
}

impl WorkflowEntity for ProjectRecord {
    type State = ProjectStatus;

    const TRANSITION_MUTATION: &'static str = "project.transition";

    fn entity_id(&self) -> &str {
        self.id.as_str()
    }

    fn organization_id(&self) -> &OrganizationId {
        &self.organization_id
    }

    fn status(&self) -> ProjectStatus {
        self.status
    }

    fn is_assigned(&self, actor: &Actor) -> bool {
        actor.is_assigned_to(self.id.as_str())
    }

    fn customer_id(&self) -> Option<&CustomerId> {
        Some(&self.customer_id)
    }

    fn cache_bindings(&self) -> Vec<(&'static str, String)> {
        vec![("project_id", self.id.to_string())]
    }

    fn enter(&mut self, to: ProjectStatus, field: Option<TimestampField>, at: DateTime<Utc>) {
        self.status = to;
        self.updated_at = at;

        match field {
            Some(TimestampField::ApprovedAt) => self.approved_at = Some(at),
            Some(TimestampField::StartedAt) => self.started_at = Some(at),
            Some(TimestampField::DeliveredAt) => self.delivered_at = Some(at),
            Some(TimestampField::RejectedAt) => self.rejected_at = Some(at),
            Some(TimestampField::ArchivedAt) => self.archived_at = Some(at),
            Some(TimestampField::PaidAt | TimestampField::FailedAt) | None => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_has_no_duplicate_rows() {
        assert!(StateMachine::new(project_rules()).is_ok());
    }

    #[test]
    fn test_archived_is_the_only_terminal_state() {
        assert_eq!(ProjectStatus::machine().terminal_states(), vec![ProjectStatus::Archived]);
    }

    #[test]
    fn test_technician_start_requires_assignment() {
        let machine = ProjectStatus::machine();

        assert!(machine.can_transition(ProjectStatus::Approved, ProjectStatus::InProgress, RoleKind::Technician, true));
        assert!(!machine.can_transition(ProjectStatus::Approved, ProjectStatus::InProgress, RoleKind::Technician, false));
    }

    #[test]
    fn test_admin_overrides_role_requirements() {
        let machine = ProjectStatus::machine();

        assert!(machine.can_transition(ProjectStatus::Pending, ProjectStatus::Approved, RoleKind::Admin, false));
        assert!(machine.can_transition(ProjectStatus::Approved, ProjectStatus::InProgress, RoleKind::Admin, false));
        assert!(!machine.can_transition(ProjectStatus::Pending, ProjectStatus::Delivered, RoleKind::Admin, true));
    }

    #[test]
    fn test_next_states_depend_on_role() {
        let machine = ProjectStatus::machine();

        assert_eq!(machine.next_states(ProjectStatus::Pending, RoleKind::Approver, false), vec![ProjectStatus::Approved, ProjectStatus::Rejected]);
        assert_eq!(machine.next_states(ProjectStatus::Delivered, RoleKind::CustomerOwner, false), vec![ProjectStatus::InProgress]);
        assert!(machine.next_states(ProjectStatus::Pending, RoleKind::Technician, true).is_empty());
    }

    #[test]
    fn test_status_parsing() {
        assert_eq!("in_progress".parse::<ProjectStatus>().unwrap(), ProjectStatus::InProgress);
        assert!("done".parse::<ProjectStatus>().is_err());
    }
}

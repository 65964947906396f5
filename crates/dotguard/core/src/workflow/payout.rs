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

//! Payout lifecycle

use super::{EntityType, StateMachine, TimestampField, TransitionKind, TransitionRule, WorkflowEntity, WorkflowState};
use crate::error::{GuardError, GuardResult};
use crate::models::{Actor, ActorId, OrganizationId, PayoutId, ProjectId, RoleKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayoutStatus {
    Pending,
    Approved,
    Paid,
    Rejected,
    Failed,
}

impl PayoutStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PayoutStatus::Pending => "pending",
            PayoutStatus::Approved => "approved",
            PayoutStatus::Paid => "paid",
            PayoutStatus::Rejected => "rejected",
            PayoutStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for PayoutStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PayoutStatus {
    type Err = GuardError;

    fn from_str(s: &str) -> GuardResult<Self> {
        Self::all()
            .iter()
            .copied()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| GuardError::invalid_record(format!("unknown payout status '{}'", s)))
    }
}

fn payout_rules() -> Vec<TransitionRule<PayoutStatus>> {
    use PayoutStatus::*;

    vec![
        TransitionRule::new(Pending, Approved, TransitionKind::Approve, RoleKind::Approver),
        TransitionRule::new(Pending, Rejected, TransitionKind::Reject, RoleKind::Approver),
        TransitionRule::new(Approved, Paid, TransitionKind::Pay, RoleKind::Admin),
        TransitionRule::new(Approved, Failed, TransitionKind::Fail, RoleKind::Admin),
        TransitionRule::new(Rejected, Pending, TransitionKind::Resubmit, RoleKind::Technician).assigned(),
    ]
}

static PAYOUT_MACHINE: LazyLock<StateMachine<PayoutStatus>> = LazyLock::new(|| StateMachine::from_rules(payout_rules()));

impl WorkflowState for PayoutStatus {
    const ENTITY: EntityType = EntityType::Payout;

    fn all() -> &'static [Self] {
        &[PayoutStatus::Pending, PayoutStatus::Approved, PayoutStatus::Paid, PayoutStatus::Rejected, PayoutStatus::Failed]
    }

    fn machine() -> &'static StateMachine<Self> {
        &PAYOUT_MACHINE
    }

    fn timestamp_field(self) -> Option<TimestampField> {
        match self {
            PayoutStatus::Pending => None,
            PayoutStatus::Approved => Some(TimestampField::ApprovedAt),
            PayoutStatus::Paid => Some(TimestampField::PaidAt),
            PayoutStatus::Rejected => Some(TimestampField::RejectedAt),
            PayoutStatus::Failed => Some(TimestampField::FailedAt),
        }
    }
}

/// Payout owed to the photographer who worked a project
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoutRecord {
    pub id: PayoutId,
    pub organization_id: OrganizationId,
    pub project_id: ProjectId,
    pub photographer_id: ActorId,
    pub amount_cents: u64,
    pub status: PayoutStatus,
    pub approved_at: Option<DateTime<Utc>>,
    pub paid_at: Option<DateTime<Utc>>,
    pub rejected_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl PayoutRecord {
    pub fn new(id: impl Into<PayoutId>, organization_id: impl Into<OrganizationId>, project_id: impl Into<ProjectId>, photographer_id: impl Into<ActorId>, amount_cents: u64) -> Self {
        Self {
            id: id.into(),
            organization_id: organization_id.into(),
            project_id: project_id.into(),
            photographer_id: photographer_id.into(),
            amount_cents,
            status: PayoutStatus::Pending,
            approved_at: None,
            paid_at: None,
            rejected_at: None,
            failed_at: None,
            updated_at: Utc::now(),
        }
    }

    pub fn with_status(mut self, status: PayoutStatus) -> Self {
        self.status = status;
        self
    }
}

impl WorkflowEntity for PayoutRecord {
    type State = PayoutStatus;

    const TRANSITION_MUTATION: &'static str = "payout.transition";

    fn entity_id(&self) -> &str {
        self.id.as_str()
    }

    fn organization_id(&self) -> &OrganizationId {
        &self.organization_id
    }

    fn status(&self) -> PayoutStatus {
        self.status
    }

    fn is_assigned(&self, actor: &Actor) -> bool {
        self.photographer_id == actor.id
    }

    fn cache_bindings(&self) -> Vec<(&'static str, String)> {
        vec![("payout_id", self.id.to_string()), ("project_id", self.project_id.to_string())]
    }

    fn enter(&mut self, to: PayoutStatus, field: Option<TimestampField>, at: DateTime<Utc>) {
        self.status = to;
        self.updated_at = at;

        match field {
            Some(TimestampField::ApprovedAt) => self.approved_at = Some(at),
            Some(TimestampField::PaidAt) => self.paid_at = Some(at),
            Some(TimestampField::RejectedAt) => self.rejected_at = Some(at),
            Some(TimestampField::FailedAt) => self.failed_at = Some(at),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;
    use crate::workflow::apply_transition;

    #[test]
    fn test_table_has_no_duplicate_rows() {
        assert!(StateMachine::new(payout_rules()).is_ok());
    }

    #[test]
    fn test_paid_and_failed_are_terminal() {
        assert_eq!(PayoutStatus::machine().terminal_states(), vec![PayoutStatus::Paid, PayoutStatus::Failed]);
    }

    #[test]
    fn test_only_admin_settles_payouts() {
        let machine = PayoutStatus::machine();

        assert!(machine.can_transition(PayoutStatus::Approved, PayoutStatus::Paid, RoleKind::Admin, false));
        assert!(!machine.can_transition(PayoutStatus::Approved, PayoutStatus::Paid, RoleKind::Approver, false));
        assert!(!machine.can_transition(PayoutStatus::Paid, PayoutStatus::Pending, RoleKind::Admin, true));
    }

    #[test]
    fn test_photographer_resubmits_own_payout() {
        let payout = PayoutRecord::new("po-1", "org-1", "p-1", "u-7", 12_500).with_status(PayoutStatus::Rejected);
        let photographer = Actor::new("u-7", "org-1", Role::technician(Vec::<&str>::new()));
        let other = Actor::new("u-8", "org-1", Role::technician(Vec::<&str>::new()));

        assert!(payout.is_assigned(&photographer));
        assert!(!payout.is_assigned(&other));

        let (updated, record) = apply_transition(&payout, PayoutStatus::Pending, &photographer, payout.is_assigned(&photographer), Utc::now()).unwrap();
        assert_eq!(updated.status, PayoutStatus::Pending);
        assert_eq!(record.kind, TransitionKind::Resubmit);

        assert!(apply_transition(&payout, PayoutStatus::Pending, &other, payout.is_assigned(&other), Utc::now()).is_err());
    }

    #[test]
    fn test_paid_stamps_paid_at() {
        let payout = PayoutRecord::new("po-1", "org-1", "p-1", "u-7", 100).with_status(PayoutStatus::Approved);
        let admin = Actor::new("u-1", "org-1", Role::Admin);
        let at = Utc::now();

        let (updated, _) = apply_transition(&payout, PayoutStatus::Paid, &admin, false, at).unwrap();

        assert_eq!(updated.paid_at, Some(at));
        assert_eq!(updated.failed_at, None);
    }
}

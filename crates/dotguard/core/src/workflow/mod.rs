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

//! Entity lifecycles
//!
//! Projects and payouts move through fixed status graphs. Deciding a
//! transition is pure; [`apply_transition`] builds the updated entity as a
//! fresh copy only after the decision succeeded, so a rejected request never
//! leaves a half-applied change behind.

pub mod machine;
pub mod payout;
pub mod project;

pub use machine::*;
pub use payout::*;
pub use project::*;

use crate::error::GuardResult;
use crate::models::{Actor, ActorId, CustomerId, OrganizationId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::Hash;

/// Entity types with a guarded lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Project,
    Payout,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Project => "project",
            EntityType::Payout => "payout",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Timestamp stamped on an entity when it enters a state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimestampField {
    ApprovedAt,
    StartedAt,
    DeliveredAt,
    RejectedAt,
    ArchivedAt,
    PaidAt,
    FailedAt,
}

/// Status enum of an entity with a transition table
pub trait WorkflowState: Copy + Eq + Hash + fmt::Debug + fmt::Display + Send + Sync + 'static {
    const ENTITY: EntityType;

    /// Every state, in declaration order
    fn all() -> &'static [Self];

    /// The compiled-in transition table for this entity type
    fn machine() -> &'static StateMachine<Self>;

    /// Field stamped when an entity enters this state
    fn timestamp_field(self) -> Option<TimestampField>;
}

/// Record with a status governed by a [`StateMachine`]
pub trait WorkflowEntity: Clone {
    type State: WorkflowState;

    /// Name of the mutation reported to the cache policy table
    const TRANSITION_MUTATION: &'static str;

    fn entity_id(&self) -> &str;

    fn organization_id(&self) -> &OrganizationId;

    fn status(&self) -> Self::State;

    /// Whether the actor is the assigned technician or photographer
    fn is_assigned(&self, actor: &Actor) -> bool;

    /// Customer owning the entity, checked against customer-side actors
    fn customer_id(&self) -> Option<&CustomerId> {
        None
    }

    /// Placeholder bindings naming this entity in cache templates
    fn cache_bindings(&self) -> Vec<(&'static str, String)>;

    /// Move to `to`, stamping `field` and the update time
    fn enter(&mut self, to: Self::State, field: Option<TimestampField>, at: DateTime<Utc>);
}

/// Audit record of an accepted transition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub entity: EntityType,
    pub entity_id: String,
    pub organization_id: OrganizationId,
    pub from: String,
    pub to: String,
    pub kind: TransitionKind,
    pub actor_id: ActorId,
    pub at: DateTime<Utc>,
}

/// Decide and apply a transition without touching `entity`
///
/// Returns the updated copy and the record describing it. The caller is
/// responsible for persisting the copy, emitting the audit record and
/// invalidating cached reads.
pub fn apply_transition<E: WorkflowEntity>(entity: &E, to: E::State, actor: &Actor, has_assignment: bool, at: DateTime<Utc>) -> GuardResult<(E, TransitionRecord)> {
    let from = entity.status();
    let rule = E::State::machine().validate(from, to, actor.kind(), has_assignment)?;

    let mut updated = entity.clone();
    updated.enter(to, to.timestamp_field(), at);

    let record = TransitionRecord {
        entity: E::State::ENTITY,
        entity_id: entity.entity_id().to_string(),
        organization_id: entity.organization_id().clone(),
        from: from.to_string(),
        to: to.to_string(),
        kind: rule.kind,
        actor_id: actor.id.clone(),
        at,
    };

    Ok((updated, record))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GuardError;
    use crate::models::Role;

    fn project(status: ProjectStatus) -> ProjectRecord {
        ProjectRecord::new("p-1", "org-1", "c-1").with_status(status)
    }

    #[test]
    fn test_apply_stamps_target_timestamp() {
        let approver = Actor::new("u-1", "org-1", Role::Approver);
        let at = Utc::now();

        let (updated, record) = apply_transition(&project(ProjectStatus::Pending), ProjectStatus::Approved, &approver, false, at).unwrap();

        assert_eq!(updated.status, ProjectStatus::Approved);
        assert_eq!(updated.approved_at, Some(at));
        assert_eq!(updated.updated_at, at);
        assert_eq!(record.kind, TransitionKind::Approve);
        assert_eq!(record.from, "pending");
        assert_eq!(record.to, "approved");
    }

    #[test]
    fn test_rejected_transition_leaves_entity_untouched() {
        let technician = Actor::new("u-2", "org-1", Role::technician(["p-1"]));
        let original = project(ProjectStatus::Pending);

        let result = apply_transition(&original, ProjectStatus::Delivered, &technician, true, Utc::now());

        assert!(matches!(
            result,
            Err(GuardError::InvalidTransition {
                reason: TransitionDenial::NoSuchTransition,
                ..
            })
        ));
        assert_eq!(original.status, ProjectStatus::Pending);
        assert_eq!(original.delivered_at, None);
    }
}

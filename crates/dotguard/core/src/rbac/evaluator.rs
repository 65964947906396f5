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

//! Permission evaluation

use crate::error::{GuardError, GuardResult};
use crate::models::{Action, Actor, OrganizationId, Permission, ResourceKind, Role};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// Why an access request was denied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenialReason {
    /// Actor and resource belong to different organizations
    OrganizationMismatch,
    /// Role never has access to this resource kind
    RoleNotPermitted,
    /// Role has access to the resource kind but not for this action
    ActionNotPermitted,
    /// Resource is not among the actor's assignments
    NotAssigned,
    /// Resource belongs to another customer
    OutsideCustomerScope,
    /// No resource id to run the assignment check against
    MissingResourceId,
    /// No customer or project scope to run the scope check against
    MissingScope,
    /// Resource kind is not known to the evaluator
    UnknownResource,
}

impl DenialReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DenialReason::OrganizationMismatch => "organization_mismatch",
            DenialReason::RoleNotPermitted => "role_not_permitted",
            DenialReason::ActionNotPermitted => "action_not_permitted",
            DenialReason::NotAssigned => "not_assigned",
            DenialReason::OutsideCustomerScope => "outside_customer_scope",
            DenialReason::MissingResourceId => "missing_resource_id",
            DenialReason::MissingScope => "missing_scope",
            DenialReason::UnknownResource => "unknown_resource",
        }
    }
}

impl fmt::Display for DenialReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a permission evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", content = "reason", rename_all = "snake_case")]
pub enum AccessDecision {
    Granted,
    Denied(DenialReason),
}

impl AccessDecision {
    pub fn is_granted(&self) -> bool {
        matches!(self, AccessDecision::Granted)
    }

    pub fn reason(&self) -> Option<DenialReason> {
        match self {
            AccessDecision::Granted => None,
            AccessDecision::Denied(reason) => Some(*reason),
        }
    }

    fn from_check(granted: bool, otherwise: DenialReason) -> Self {
        if granted { AccessDecision::Granted } else { AccessDecision::Denied(otherwise) }
    }
}

/// Stateless evaluator deciding whether an actor may perform an action
///
/// Holds no state, so one instance can be shared by any number of callers.
#[derive(Debug, Clone, Copy, Default)]
pub struct PermissionEvaluator;

impl PermissionEvaluator {
    pub fn new() -> Self {
        Self
    }

    /// Check if the actor may perform the requested action
    pub fn can_access(&self, actor: &Actor, permission: &Permission) -> bool {
        self.evaluate(actor, permission).is_granted()
    }

    /// Same as [`can_access`](Self::can_access) but as an error for callers that propagate
    pub fn require_access(&self, actor: &Actor, permission: &Permission) -> GuardResult<()> {
        match self.evaluate(actor, permission) {
            AccessDecision::Granted => Ok(()),
            AccessDecision::Denied(reason) => Err(GuardError::unauthorized(format!(
                "{} may not {} {} ({})",
                actor.id, permission.action, permission.resource, reason
            ))),
        }
    }

    /// Tenant boundary check shared by every other decision
    pub fn same_organization(&self, actor: &Actor, organization_id: &OrganizationId) -> bool {
        actor.organization_id == *organization_id
    }

    /// Evaluate a permission request, keeping the denial reason
    pub fn evaluate(&self, actor: &Actor, permission: &Permission) -> AccessDecision {
        let decision = if !self.same_organization(actor, &permission.organization_id) {
            AccessDecision::Denied(DenialReason::OrganizationMismatch)
        } else if matches!(actor.role, Role::Admin) {
            AccessDecision::Granted
        } else {
            match &permission.resource {
                ResourceKind::Project => self.evaluate_project(actor, permission),
                ResourceKind::Payout => self.evaluate_payout(actor, permission),
                ResourceKind::Asset => self.evaluate_asset(actor, permission),
                ResourceKind::User | ResourceKind::AuditLog => AccessDecision::Denied(DenialReason::RoleNotPermitted),
                ResourceKind::Unknown(_) => AccessDecision::Denied(DenialReason::UnknownResource),
            }
        };

        debug!(
            actor_id = %actor.id,
            role = %actor.kind(),
            resource = %permission.resource,
            action = %permission.action,
            resource_id = ?permission.resource_id,
            decision = ?decision,
            "Permission evaluated"
        );

        decision
    }

    fn evaluate_project(&self, actor: &Actor, permission: &Permission) -> AccessDecision {
        let project_id = permission.resource_id.as_deref();

        match &actor.role {
            Role::Admin => AccessDecision::Granted,
            Role::Technician { assigned_projects } | Role::CustomerViewer { assigned_projects, .. } => {
                if permission.action != Action::Read {
                    return AccessDecision::Denied(DenialReason::ActionNotPermitted);
                }
                match project_id {
                    Some(id) => AccessDecision::from_check(assigned_projects.contains(id), DenialReason::NotAssigned),
                    None => AccessDecision::Denied(DenialReason::MissingResourceId),
                }
            }
            Role::CustomerOwner { customer_id } => {
                if !matches!(permission.action, Action::Read | Action::Update) {
                    return AccessDecision::Denied(DenialReason::ActionNotPermitted);
                }
                match &permission.customer_id {
                    Some(owner) => AccessDecision::from_check(owner == customer_id, DenialReason::OutsideCustomerScope),
                    None => AccessDecision::Denied(DenialReason::MissingScope),
                }
            }
            Role::Approver | Role::SalesLead | Role::PublicVisitor => AccessDecision::Denied(DenialReason::RoleNotPermitted),
        }
    }

    fn evaluate_payout(&self, actor: &Actor, permission: &Permission) -> AccessDecision {
        match &actor.role {
            Role::Admin => AccessDecision::Granted,
            Role::Approver => AccessDecision::from_check(matches!(permission.action, Action::Read | Action::Update), DenialReason::ActionNotPermitted),
            Role::Technician { .. } | Role::SalesLead | Role::CustomerOwner { .. } | Role::CustomerViewer { .. } | Role::PublicVisitor => {
                AccessDecision::Denied(DenialReason::RoleNotPermitted)
            }
        }
    }

    /// Assets inherit access from their parent project
    fn evaluate_asset(&self, actor: &Actor, permission: &Permission) -> AccessDecision {
        let project_id = permission.project_id.as_ref().map(|id| id.as_str());

        match &actor.role {
            Role::Admin => AccessDecision::Granted,
            Role::Technician { assigned_projects } => {
                if !matches!(permission.action, Action::Read | Action::Create) {
                    return AccessDecision::Denied(DenialReason::ActionNotPermitted);
                }
                match project_id {
                    Some(id) => AccessDecision::from_check(assigned_projects.contains(id), DenialReason::NotAssigned),
                    None => AccessDecision::Denied(DenialReason::MissingScope),
                }
            }
            Role::CustomerViewer { assigned_projects, .. } => {
                if permission.action != Action::Read {
                    return AccessDecision::Denied(DenialReason::ActionNotPermitted);
                }
                match project_id {
                    Some(id) => AccessDecision::from_check(assigned_projects.contains(id), DenialReason::NotAssigned),
                    None => AccessDecision::Denied(DenialReason::MissingScope),
                }
            }
            Role::CustomerOwner { customer_id } => {
                if permission.action != Action::Read {
                    return AccessDecision::Denied(DenialReason::ActionNotPermitted);
                }
                match &permission.customer_id {
                    Some(owner) => AccessDecision::from_check(owner == customer_id, DenialReason::OutsideCustomerScope),
                    None => AccessDecision::Denied(DenialReason::MissingScope),
                }
            }
            Role::Approver | Role::SalesLead | Role::PublicVisitor => AccessDecision::Denied(DenialReason::RoleNotPermitted),
        }
    }
}

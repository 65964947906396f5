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

//! Actors and their roles

use super::{ActorId, CustomerId, OrganizationId, ProjectId};
use crate::error::{GuardError, GuardResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Role held by an actor inside its organization
///
/// Closed set: every evaluator matches it exhaustively, so a new kind has to
/// be handled everywhere before the crate builds again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Role {
    Admin,
    Approver,
    Technician {
        #[serde(default)]
        assigned_projects: BTreeSet<ProjectId>,
    },
    SalesLead,
    CustomerOwner {
        customer_id: CustomerId,
    },
    CustomerViewer {
        customer_id: CustomerId,
        #[serde(default)]
        assigned_projects: BTreeSet<ProjectId>,
    },
    PublicVisitor,
}

impl Role {
    /// Payload-free tag of this role
    pub fn kind(&self) -> RoleKind {
        match self {
            Role::Admin => RoleKind::Admin,
            Role::Approver => RoleKind::Approver,
            Role::Technician { .. } => RoleKind::Technician,
            Role::SalesLead => RoleKind::SalesLead,
            Role::CustomerOwner { .. } => RoleKind::CustomerOwner,
            Role::CustomerViewer { .. } => RoleKind::CustomerViewer,
            Role::PublicVisitor => RoleKind::PublicVisitor,
        }
    }

    /// Technician with the given project assignments
    pub fn technician<I, P>(projects: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<ProjectId>,
    {
        Role::Technician {
            assigned_projects: projects.into_iter().map(Into::into).collect(),
        }
    }

    /// Customer viewer limited to the given projects
    pub fn customer_viewer<I, P>(customer_id: impl Into<CustomerId>, projects: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<ProjectId>,
    {
        Role::CustomerViewer {
            customer_id: customer_id.into(),
            assigned_projects: projects.into_iter().map(Into::into).collect(),
        }
    }

    pub fn customer_owner(customer_id: impl Into<CustomerId>) -> Self {
        Role::CustomerOwner { customer_id: customer_id.into() }
    }
}

/// Role tag without payload, as used by the workflow transition tables
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleKind {
    Admin,
    Approver,
    Technician,
    SalesLead,
    CustomerOwner,
    CustomerViewer,
    PublicVisitor,
}

impl RoleKind {
    pub const ALL: [RoleKind; 7] = [
        RoleKind::Admin,
        RoleKind::Approver,
        RoleKind::Technician,
        RoleKind::SalesLead,
        RoleKind::CustomerOwner,
        RoleKind::CustomerViewer,
        RoleKind::PublicVisitor,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RoleKind::Admin => "admin",
            RoleKind::Approver => "approver",
            RoleKind::Technician => "technician",
            RoleKind::SalesLead => "sales_lead",
            RoleKind::CustomerOwner => "customer_owner",
            RoleKind::CustomerViewer => "customer_viewer",
            RoleKind::PublicVisitor => "public_visitor",
        }
    }
}

impl fmt::Display for RoleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RoleKind {
    type Err = GuardError;

    fn from_str(s: &str) -> GuardResult<Self> {
        RoleKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| GuardError::invalid_record(format!("unknown role kind '{}'", s)))
    }
}

/// Authenticated actor as resolved by the authentication layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    /// Actor identifier
    pub id: ActorId,

    /// Organization the actor belongs to
    pub organization_id: OrganizationId,

    /// Role inside that organization
    pub role: Role,
}

impl Actor {
    /// Create a new actor
    pub fn new(id: impl Into<ActorId>, organization_id: impl Into<OrganizationId>, role: Role) -> Self {
        Self {
            id: id.into(),
            organization_id: organization_id.into(),
            role,
        }
    }

    pub fn kind(&self) -> RoleKind {
        self.role.kind()
    }

    /// Whether the actor's role lists this project among its assignments
    pub fn is_assigned_to(&self, project_id: &str) -> bool {
        match &self.role {
            Role::Technician { assigned_projects } | Role::CustomerViewer { assigned_projects, .. } => assigned_projects.contains(project_id),
            Role::Admin | Role::Approver | Role::SalesLead | Role::CustomerOwner { .. } | Role::PublicVisitor => false,
        }
    }

    /// Customer scope of customer-side roles
    pub fn customer_id(&self) -> Option<&CustomerId> {
        match &self.role {
            Role::CustomerOwner { customer_id } | Role::CustomerViewer { customer_id, .. } => Some(customer_id),
            Role::Admin | Role::Approver | Role::Technician { .. } | Role::SalesLead | Role::PublicVisitor => None,
        }
    }
}

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

//! Resources and requested permissions

use super::{CustomerId, OrganizationId, ProjectId};
use crate::error::{GuardError, GuardResult};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

/// Kind of resource an action targets
///
/// Unrecognised names are kept as `Unknown` so they can be denied explicitly.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ResourceKind {
    Project,
    Payout,
    Asset,
    User,
    AuditLog,
    Unknown(String),
}

impl ResourceKind {
    pub fn as_str(&self) -> &str {
        match self {
            ResourceKind::Project => "project",
            ResourceKind::Payout => "payout",
            ResourceKind::Asset => "asset",
            ResourceKind::User => "user",
            ResourceKind::AuditLog => "audit_log",
            ResourceKind::Unknown(name) => name,
        }
    }
}

impl From<String> for ResourceKind {
    fn from(name: String) -> Self {
        match name.as_str() {
            "project" => ResourceKind::Project,
            "payout" => ResourceKind::Payout,
            "asset" => ResourceKind::Asset,
            "user" => ResourceKind::User,
            "audit_log" => ResourceKind::AuditLog,
            _ => ResourceKind::Unknown(name),
        }
    }
}

impl From<ResourceKind> for String {
    fn from(kind: ResourceKind) -> Self {
        kind.as_str().to_string()
    }
}

impl FromStr for ResourceKind {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(ResourceKind::from(s.to_string()))
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operation requested on a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Read,
    Create,
    Update,
    Delete,
}

impl Action {
    /// Mutations are never served from or stored in the response cache
    pub fn is_mutation(&self) -> bool {
        !matches!(self, Action::Read)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Read => "read",
            Action::Create => "create",
            Action::Update => "update",
            Action::Delete => "delete",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = GuardError;

    fn from_str(s: &str) -> GuardResult<Self> {
        match s {
            "read" => Ok(Action::Read),
            "create" => Ok(Action::Create),
            "update" => Ok(Action::Update),
            "delete" => Ok(Action::Delete),
            other => Err(GuardError::invalid_record(format!("unknown action '{}'", other))),
        }
    }
}

/// Permission request evaluated against an actor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    /// Resource kind being accessed
    pub resource: ResourceKind,

    /// Requested action
    pub action: Action,

    /// Organization owning the resource
    pub organization_id: OrganizationId,

    /// Concrete resource identifier, required for assignment checks
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,

    /// Customer owning the resource, required for customer-scope checks
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<CustomerId>,

    /// Parent project of the resource, used for assets
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<ProjectId>,
}

impl Permission {
    /// Create a new permission request
    pub fn new(resource: ResourceKind, action: Action, organization_id: impl Into<OrganizationId>) -> Self {
        Self {
            resource,
            action,
            organization_id: organization_id.into(),
            resource_id: None,
            customer_id: None,
            project_id: None,
        }
    }

    /// Set the concrete resource identifier
    pub fn with_resource_id(mut self, resource_id: impl Into<String>) -> Self {
        self.resource_id = Some(resource_id.into());
        self
    }

    /// Set the owning customer
    pub fn with_customer(mut self, customer_id: impl Into<CustomerId>) -> Self {
        self.customer_id = Some(customer_id.into());
        self
    }

    /// Set the parent project
    pub fn with_project(mut self, project_id: impl Into<ProjectId>) -> Self {
        self.project_id = Some(project_id.into());
        self
    }
}

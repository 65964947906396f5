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

//! Organization (tenant) records and their transfer form

use super::{OrganizationId, ServiceTier};
use crate::error::{GuardError, GuardResult};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Tenant boundary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organization {
    pub id: OrganizationId,
    pub name: String,
    pub slug: String,
    pub tier: ServiceTier,
    pub created_at: DateTime<Utc>,
}

/// Organization as exchanged with the request layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrganizationDto {
    pub id: String,
    pub name: String,
    pub slug: String,
    pub tier: String,
    /// RFC 3339, UTC with a `Z` suffix
    pub created_at: String,
}

impl Organization {
    /// Validate and convert a transfer record
    pub fn from_dto(dto: OrganizationDto) -> GuardResult<Self> {
        if dto.id.trim().is_empty() {
            return Err(GuardError::invalid_record("organization id must not be empty"));
        }

        if dto.name.trim().is_empty() {
            return Err(GuardError::invalid_record(format!("organization {} has an empty name", dto.id)));
        }

        if !is_valid_slug(&dto.slug) {
            return Err(GuardError::invalid_record(format!("organization {} has an invalid slug '{}'", dto.id, dto.slug)));
        }

        let tier = dto.tier.parse::<ServiceTier>()?;

        let created_at = DateTime::parse_from_rfc3339(&dto.created_at)
            .map_err(|e| GuardError::invalid_record(format!("organization {} has an invalid createdAt: {}", dto.id, e)))?
            .with_timezone(&Utc);

        // Only the form `to_dto` writes back is accepted
        if created_at.to_rfc3339_opts(SecondsFormat::AutoSi, true) != dto.created_at {
            return Err(GuardError::invalid_record(format!(
                "organization {} has a non-canonical createdAt '{}'; expected UTC with a Z suffix",
                dto.id, dto.created_at
            )));
        }

        Ok(Self {
            id: OrganizationId::from(dto.id),
            name: dto.name,
            slug: dto.slug,
            tier,
            created_at,
        })
    }

    /// Convert into the transfer record
    pub fn to_dto(&self) -> OrganizationDto {
        OrganizationDto {
            id: self.id.to_string(),
            name: self.name.clone(),
            slug: self.slug.clone(),
            tier: self.tier.as_str().to_string(),
            created_at: self.created_at.to_rfc3339_opts(SecondsFormat::AutoSi, true),
        }
    }
}

impl TryFrom<OrganizationDto> for Organization {
    type Error = GuardError;

    fn try_from(dto: OrganizationDto) -> GuardResult<Self> {
        Organization::from_dto(dto)
    }
}

impl From<&Organization> for OrganizationDto {
    fn from(organization: &Organization) -> Self {
        organization.to_dto()
    }
}

fn is_valid_slug(slug: &str) -> bool {
    !slug.is_empty() && !slug.starts_with('-') && !slug.ends_with('-') && slug.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

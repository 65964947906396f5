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

use crate::error::{GuardError, GuardResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Service tier of the calling organization, ordered from lowest to highest
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceTier {
    Free,
    Starter,
    Professional,
    Enterprise,
}

impl ServiceTier {
    pub const ALL: [ServiceTier; 4] = [ServiceTier::Free, ServiceTier::Starter, ServiceTier::Professional, ServiceTier::Enterprise];

    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceTier::Free => "free",
            ServiceTier::Starter => "starter",
            ServiceTier::Professional => "professional",
            ServiceTier::Enterprise => "enterprise",
        }
    }
}

impl fmt::Display for ServiceTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServiceTier {
    type Err = GuardError;

    fn from_str(s: &str) -> GuardResult<Self> {
        ServiceTier::ALL
            .into_iter()
            .find(|tier| tier.as_str() == s)
            .ok_or_else(|| GuardError::invalid_record(format!("unknown service tier '{}'", s)))
    }
}

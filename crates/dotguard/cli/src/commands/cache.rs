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

use super::CommandContext;
use anyhow::Result;
use dotguard_core::cache::CacheKey;
use dotguard_core::models::{Action, ServiceTier};
use std::str::FromStr;

pub fn show_key(ctx: &CommandContext, target: &str, org: Option<&str>, tier: &str) -> Result<()> {
    let tier = ServiceTier::from_str(tier)?;
    let mut key = CacheKey::parse(target);
    if let Some(org) = org {
        key = key.scoped(org);
    }

    println!("Key: {}", key);

    let policies = ctx.guard.policies();
    match policies.lookup(key.path()) {
        Some(policy) => {
            println!("Policy: {}", policy.template);
            match policies.ttl_for(key.path(), Action::Read, tier) {
                Some(ttl) => println!("TTL ({}): {}s", tier, ttl.as_secs()),
                None => println!("TTL ({}): not cached", tier),
            }
            if !policy.invalidated_by.is_empty() {
                println!("Invalidated by: {}", policy.invalidated_by.join(", "));
            }
        }
        None => println!("Policy: none (not cached)"),
    }

    Ok(())
}

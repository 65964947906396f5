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
use dotguard_core::rate_limit::RateTier;
use std::str::FromStr;
use std::time::{Duration, Instant};

/// Replay `requests` checks on a simulated clock
pub fn simulate(ctx: &CommandContext, endpoint: &str, tier: &str, requests: u32, interval_ms: u64) -> Result<()> {
    let tier = RateTier::from_str(tier)?;
    let limiter = ctx.guard.rate_limiter();

    match limiter.table().rule(endpoint, tier) {
        Some(rule) => println!("Rule for {} ({}): {} req/min, burst {}", endpoint, tier, rule.requests_per_minute, rule.burst_size),
        None => println!("No rule for {} ({}): every request is denied", endpoint, tier),
    }
    println!();

    let start = Instant::now();
    let mut admitted = 0;

    for i in 0..requests {
        let at = start + Duration::from_millis(interval_ms * u64::from(i));
        let decision = limiter.check_at("simulation", endpoint, tier, at);

        if decision.allowed {
            admitted += 1;
            println!("#{:<4} allowed  remaining={}", i + 1, decision.remaining);
        } else {
            match decision.retry_after {
                Some(retry) => println!("#{:<4} denied   retry_after={:.2}s", i + 1, retry.as_secs_f64()),
                None => println!("#{:<4} denied   retry_after=never", i + 1),
            }
        }
    }

    println!();
    println!("Admitted {} of {} requests", admitted, requests);

    Ok(())
}

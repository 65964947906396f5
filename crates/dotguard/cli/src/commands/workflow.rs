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

use crate::EntityArg;
use anyhow::Result;
use dotguard_core::GuardError;
use dotguard_core::models::RoleKind;
use dotguard_core::workflow::{PayoutStatus, ProjectStatus, WorkflowState};
use std::str::FromStr;

pub fn list_transitions(entity: EntityArg, from: &str, role: &str, assigned: bool) -> Result<()> {
    let role = RoleKind::from_str(role)?;
    match entity {
        EntityArg::Project => print_next::<ProjectStatus>(from, role, assigned),
        EntityArg::Payout => print_next::<PayoutStatus>(from, role, assigned),
    }
}

pub fn check_transition(entity: EntityArg, from: &str, to: &str, role: &str, assigned: bool) -> Result<()> {
    let role = RoleKind::from_str(role)?;
    match entity {
        EntityArg::Project => print_check::<ProjectStatus>(from, to, role, assigned),
        EntityArg::Payout => print_check::<PayoutStatus>(from, to, role, assigned),
    }
}

fn print_next<S>(from: &str, role: RoleKind, assigned: bool) -> Result<()>
where
    S: WorkflowState + FromStr<Err = GuardError>,
{
    let from = S::from_str(from)?;
    let machine = S::machine();

    if machine.is_terminal(from) {
        println!("{} {} is terminal", S::ENTITY, from);
        return Ok(());
    }

    let next = machine.next_states(from, role, assigned);
    if next.is_empty() {
        println!("{} cannot move {} {} anywhere", role, S::ENTITY, from);
        return Ok(());
    }

    println!("{} {} -> (as {}{})", S::ENTITY, from, role, if assigned { ", assigned" } else { "" });
    for to in next {
        if let Some(rule) = machine.rule(from, to) {
            println!("  {:<12} via {}", to.to_string(), rule.kind);
        }
    }

    Ok(())
}

fn print_check<S>(from: &str, to: &str, role: RoleKind, assigned: bool) -> Result<()>
where
    S: WorkflowState + FromStr<Err = GuardError>,
{
    let from = S::from_str(from)?;
    let to = S::from_str(to)?;

    match S::machine().validate(from, to, role, assigned) {
        Ok(rule) => println!("allowed: {} {} -> {} ({})", S::ENTITY, from, to, rule.kind),
        Err(GuardError::InvalidTransition { reason, .. }) => println!("denied: {} {} -> {} ({})", S::ENTITY, from, to, reason),
        Err(e) => return Err(e.into()),
    }

    Ok(())
}

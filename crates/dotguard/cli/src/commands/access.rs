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
use anyhow::{Context, Result};
use dotguard_core::models::{Actor, Permission};
use serde::de::DeserializeOwned;
use std::path::Path;

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("parsing {}", path.display()))
}

pub fn check_access(ctx: &CommandContext, actor_path: &Path, permission_path: &Path) -> Result<()> {
    let actor: Actor = read_json(actor_path)?;
    let permission: Permission = read_json(permission_path)?;

    let decision = ctx.guard.evaluator().evaluate(&actor, &permission);

    println!("Actor:      {} ({}, org {})", actor.id, actor.kind(), actor.organization_id);
    println!("Permission: {} {} in org {}", permission.action, permission.resource, permission.organization_id);
    if let Some(resource_id) = &permission.resource_id {
        println!("Resource:   {}", resource_id);
    }
    println!();
    println!("{}", serde_json::to_string_pretty(&decision)?);

    Ok(())
}

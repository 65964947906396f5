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

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing::Level;

mod commands;

use crate::commands::CommandContext;
use anyhow::Result;
use dotguard_core::config::GuardConfig;

/// Inspect DotGuard access-control decisions
#[derive(Parser, Debug)]
#[command(name = "dotguard", about = "DotGuard access-control toolkit")]
pub struct Cli {
    /// Path to configuration file (TOML, overrides $DOTGUARD_CONFIG)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

/// Entity types with a lifecycle
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntityArg {
    Project,
    Payout,
}

/// Subcommands for configuration inspection
#[derive(Subcommand, Debug)]
#[command(about = "Inspect guard configuration")]
pub enum ConfigCommands {
    /// Show current effective configuration as TOML
    Show,
}

/// Top-level commands for dotguard
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Evaluate a permission request for an actor
    CheckAccess {
        /// Actor JSON file
        #[arg(long)]
        actor: PathBuf,
        /// Permission JSON file
        #[arg(long)]
        permission: PathBuf,
    },

    /// List the states a role can move an entity to
    Transitions {
        #[arg(long, value_enum)]
        entity: EntityArg,
        /// Current status
        #[arg(long)]
        from: String,
        /// Role kind, e.g. technician
        #[arg(long)]
        role: String,
        /// Actor is assigned to the entity
        #[arg(long)]
        assigned: bool,
    },

    /// Check a single transition
    CanTransition {
        #[arg(long, value_enum)]
        entity: EntityArg,
        #[arg(long)]
        from: String,
        #[arg(long)]
        to: String,
        #[arg(long)]
        role: String,
        #[arg(long)]
        assigned: bool,
    },

    /// Run a burst of requests against one rate limit bucket
    SimulateRate {
        /// Endpoint name, e.g. projects:write
        #[arg(long)]
        endpoint: String,
        /// Rate tier, e.g. free or unauthenticated
        #[arg(long, default_value = "free")]
        tier: String,
        /// Number of requests to send
        #[arg(long, default_value_t = 20)]
        requests: u32,
        /// Simulated spacing between requests
        #[arg(long, default_value_t = 0)]
        interval_ms: u64,
    },

    /// Print the canonical cache key and policy for a request target
    CacheKey {
        /// Request target, e.g. "/projects?status=pending&page=2"
        target: String,
        /// Organization scoping the key
        #[arg(long)]
        org: Option<String>,
        /// Service tier used to pick the TTL
        #[arg(long, default_value = "free")]
        tier: String,
    },

    /// Inspect configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => Level::WARN,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };

    tracing_subscriber::fmt().with_max_level(level).with_writer(std::io::stderr).init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    // Load configuration
    let config = GuardConfig::resolve(cli.config)?;

    // Create command context
    let ctx = CommandContext::new(config)?;

    // Dispatch commands
    match cli.command {
        Commands::CheckAccess { actor, permission } => {
            commands::access::check_access(&ctx, &actor, &permission)?;
        }
        Commands::Transitions { entity, from, role, assigned } => {
            commands::workflow::list_transitions(entity, &from, &role, assigned)?;
        }
        Commands::CanTransition { entity, from, to, role, assigned } => {
            commands::workflow::check_transition(entity, &from, &to, &role, assigned)?;
        }
        Commands::SimulateRate {
            endpoint,
            tier,
            requests,
            interval_ms,
        } => {
            commands::rate::simulate(&ctx, &endpoint, &tier, requests, interval_ms)?;
        }
        Commands::CacheKey { target, org, tier } => {
            commands::cache::show_key(&ctx, &target, org.as_deref(), &tier)?;
        }
        Commands::Config { command } => {
            commands::config::handle_config_command(&ctx, command)?;
        }
    }

    Ok(())
}

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

//! # Guarded State Machine
//!
//! A table of legal transitions per entity type. Each row names the role
//! allowed to take it and whether the actor must also be assigned to the
//! entity. The table, not the caller, defines reachability: a pair of states
//! without a row is illegal for everyone.

use super::WorkflowState;
use crate::error::{GuardError, GuardResult};
use crate::models::RoleKind;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use tracing::debug;

/// Business meaning of a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionKind {
    Approve,
    Reject,
    Start,
    Deliver,
    RequestRevision,
    Archive,
    Resubmit,
    Pay,
    Fail,
}

impl TransitionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransitionKind::Approve => "approve",
            TransitionKind::Reject => "reject",
            TransitionKind::Start => "start",
            TransitionKind::Deliver => "deliver",
            TransitionKind::RequestRevision => "request_revision",
            TransitionKind::Archive => "archive",
            TransitionKind::Resubmit => "resubmit",
            TransitionKind::Pay => "pay",
            TransitionKind::Fail => "fail",
        }
    }
}

impl fmt::Display for TransitionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a transition request was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum TransitionDenial {
    /// No row for this pair of states
    NoSuchTransition,
    /// Row exists but needs another role
    RoleNotPermitted { required: RoleKind },
    /// Row requires the actor to be assigned to the entity
    AssignmentRequired,
}

impl fmt::Display for TransitionDenial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransitionDenial::NoSuchTransition => write!(f, "no such transition"),
            TransitionDenial::RoleNotPermitted { required } => write!(f, "requires role {}", required),
            TransitionDenial::AssignmentRequired => write!(f, "requires the assigned actor"),
        }
    }
}

/// One row of a transition table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionRule<S> {
    pub from: S,
    pub to: S,
    pub kind: TransitionKind,
    pub required_role: RoleKind,
    pub requires_assignment: bool,
}

impl<S: WorkflowState> TransitionRule<S> {
    pub fn new(from: S, to: S, kind: TransitionKind, required_role: RoleKind) -> Self {
        Self {
            from,
            to,
            kind,
            required_role,
            requires_assignment: false,
        }
    }

    /// Require the actor to be assigned to the entity
    pub fn assigned(mut self) -> Self {
        self.requires_assignment = true;
        self
    }

    /// Check the role and assignment requirements of this row
    ///
    /// Admin overrides every row, assignment requirement included.
    pub fn permits(&self, role: RoleKind, has_assignment: bool) -> Result<(), TransitionDenial> {
        if role == RoleKind::Admin {
            return Ok(());
        }

        if role != self.required_role {
            return Err(TransitionDenial::RoleNotPermitted { required: self.required_role });
        }

        if self.requires_assignment && !has_assignment {
            return Err(TransitionDenial::AssignmentRequired);
        }

        Ok(())
    }
}

/// Transition table for one entity type
#[derive(Debug, Clone)]
pub struct StateMachine<S> {
    rules: Vec<TransitionRule<S>>,
}

impl<S: WorkflowState> StateMachine<S> {
    /// Build a machine, rejecting tables with two rows for the same pair
    pub fn new(rules: Vec<TransitionRule<S>>) -> GuardResult<Self> {
        let mut seen = HashSet::new();
        for rule in &rules {
            if !seen.insert((rule.from, rule.to)) {
                return Err(GuardError::invalid_config(format!("duplicate {} transition {} -> {}", S::ENTITY, rule.from, rule.to)));
            }
        }

        Ok(Self { rules })
    }

    /// Compiled-in tables; their shape is covered by unit tests
    pub(crate) fn from_rules(rules: Vec<TransitionRule<S>>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &[TransitionRule<S>] {
        &self.rules
    }

    /// Row for a pair of states, if the table has one
    pub fn rule(&self, from: S, to: S) -> Option<&TransitionRule<S>> {
        self.rules.iter().find(|rule| rule.from == from && rule.to == to)
    }

    /// Decide a transition, returning the matching row when it is allowed
    pub fn validate(&self, from: S, to: S, role: RoleKind, has_assignment: bool) -> GuardResult<&TransitionRule<S>> {
        let outcome = match self.rule(from, to) {
            Some(rule) => rule.permits(role, has_assignment).map(|()| rule),
            None => Err(TransitionDenial::NoSuchTransition),
        };

        debug!(
            entity = %S::ENTITY,
            from = %from,
            to = %to,
            role = %role,
            has_assignment = has_assignment,
            allowed = outcome.is_ok(),
            "Transition evaluated"
        );

        outcome.map_err(|reason| GuardError::InvalidTransition {
            entity: S::ENTITY,
            from: from.to_string(),
            to: to.to_string(),
            reason,
        })
    }

    pub fn can_transition(&self, from: S, to: S, role: RoleKind, has_assignment: bool) -> bool {
        self.rule(from, to).is_some_and(|rule| rule.permits(role, has_assignment).is_ok())
    }

    /// States the actor could move the entity to from `from`, in table order
    pub fn next_states(&self, from: S, role: RoleKind, has_assignment: bool) -> Vec<S> {
        self.rules
            .iter()
            .filter(|rule| rule.from == from && rule.permits(role, has_assignment).is_ok())
            .map(|rule| rule.to)
            .collect()
    }

    /// A state without outgoing rows
    pub fn is_terminal(&self, state: S) -> bool {
        !self.rules.iter().any(|rule| rule.from == state)
    }

    pub fn terminal_states(&self) -> Vec<S> {
        S::all().iter().copied().filter(|state| self.is_terminal(*state)).collect()
    }
}

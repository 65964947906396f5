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

//! DotGuard access-control core
//!
//! This crate decides whether an actor may act on a resource, keeps projects
//! and payouts on their legal status paths, and protects backend capacity
//! with a TTL/LRU response cache and tiered token-bucket admission control:
//! - Organization-scoped permission evaluation over a closed role model
//! - Guarded workflow state machines for project and payout lifecycles
//! - In-memory response cache with template-based invalidation
//! - Per actor/endpoint/tier rate limiting
//! - Audit logging of accepted and rejected decisions

pub mod audit;
pub mod cache;
pub mod config;
pub mod error;
pub mod guard;
pub mod models;
pub mod rate_limit;
pub mod rbac;
pub mod workflow;

pub use error::{GuardError, GuardResult};
pub use guard::{GuardSystem, RequestContext};

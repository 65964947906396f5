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

//! Main guard system coordinating all components
//!
//! Reads: rate limiter, permission evaluator, then cache lookup or
//! compute-and-store. Writes: rate limiter, tenant and transition checks,
//! then audit and cache invalidation of the affected reads.

use crate::audit::AuditLogger;
use crate::cache::{CacheKey, CacheManager, CachePolicyTable};
use crate::config::GuardConfig;
use crate::error::{GuardError, GuardResult};
use crate::models::{Action, Actor, OrganizationId, Permission, ResourceKind, Role, ServiceTier};
use crate::rate_limit::{RateLimitDecision, RateLimiter, RateTier};
use crate::rbac::{AccessDecision, DenialReason, PermissionEvaluator};
use crate::workflow::{self, EntityType, PayoutRecord, PayoutStatus, ProjectRecord, ProjectStatus, TransitionRecord, WorkflowEntity, WorkflowState};
use chrono::Utc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Rate limit endpoint charged for project writes
pub const PROJECTS_WRITE: &str = "projects:write";

/// Rate limit endpoint charged for payout writes
pub const PAYOUTS_WRITE: &str = "payouts:write";

/// Facts about the caller resolved before the guard runs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    /// `None` for unauthenticated traffic
    pub actor: Option<Actor>,
    pub client_ip: Option<String>,
    pub tier: ServiceTier,
    pub request_id: Option<String>,
}

impl RequestContext {
    pub fn authenticated(actor: Actor, tier: ServiceTier) -> Self {
        Self {
            actor: Some(actor),
            client_ip: None,
            tier,
            request_id: None,
        }
    }

    pub fn anonymous(client_ip: Option<String>, tier: ServiceTier) -> Self {
        Self {
            actor: None,
            client_ip,
            tier,
            request_id: None,
        }
    }

    pub fn with_client_ip(mut self, client_ip: impl Into<String>) -> Self {
        self.client_ip = Some(client_ip.into());
        self
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    /// Bucket owner: the actor, else the client address
    pub fn client_key(&self) -> String {
        match (&self.actor, &self.client_ip) {
            (Some(actor), _) => format!("actor:{}", actor.id),
            (None, Some(ip)) => format!("ip:{}", ip),
            (None, None) => "unauthenticated".to_string(),
        }
    }

    pub fn rate_tier(&self) -> RateTier {
        match self.actor {
            Some(_) => self.tier.into(),
            None => RateTier::Unauthenticated,
        }
    }

    fn require_actor(&self) -> GuardResult<&Actor> {
        self.actor.as_ref().ok_or_else(|| GuardError::unauthorized("authentication required"))
    }
}

fn resource_kind(entity: EntityType) -> ResourceKind {
    match entity {
        EntityType::Project => ResourceKind::Project,
        EntityType::Payout => ResourceKind::Payout,
    }
}

/// Roles whose reads are narrowed to their own assignments or customer
fn has_personal_view(role: &Role) -> bool {
    match role {
        Role::Technician { .. } | Role::CustomerOwner { .. } | Role::CustomerViewer { .. } | Role::PublicVisitor => true,
        Role::Admin | Role::Approver | Role::SalesLead => false,
    }
}

/// Guard system wiring evaluator, workflows, cache, limiter and audit
#[derive(Debug)]
pub struct GuardSystem<V = serde_json::Value> {
    evaluator: PermissionEvaluator,
    cache: Arc<CacheManager<V>>,
    policies: Arc<CachePolicyTable>,
    rate_limiter: Arc<RateLimiter>,
    audit: Arc<AuditLogger>,
}

impl<V> Clone for GuardSystem<V> {
    fn clone(&self) -> Self {
        Self {
            evaluator: self.evaluator,
            cache: self.cache.clone(),
            policies: self.policies.clone(),
            rate_limiter: self.rate_limiter.clone(),
            audit: self.audit.clone(),
        }
    }
}

impl<V: Clone + Send + Sync + 'static> GuardSystem<V> {
    pub fn new(cache: Arc<CacheManager<V>>, policies: Arc<CachePolicyTable>, rate_limiter: Arc<RateLimiter>, audit: Arc<AuditLogger>) -> Self {
        Self {
            evaluator: PermissionEvaluator::new(),
            cache,
            policies,
            rate_limiter,
            audit,
        }
    }

    /// Build every component from a validated configuration
    pub fn from_config(config: &GuardConfig) -> GuardResult<Self> {
        config.validate()?;

        let system = Self::new(
            Arc::new(CacheManager::new(config.cache.max_entries)),
            Arc::new(config.cache_policy_table()?),
            Arc::new(RateLimiter::new(config.rate_limit_table()?, config.rate_limit_idle_window())),
            Arc::new(AuditLogger::with_max_events(config.audit.max_events)),
        );

        info!(
            max_entries = config.cache.max_entries,
            idle_window_secs = config.rate_limit.idle_window_secs,
            "Guard system initialized"
        );
        Ok(system)
    }

    /// Start cache and rate limiter sweeps; requires a tokio runtime
    pub fn start_background_tasks(&self, config: &GuardConfig) -> Vec<tokio::task::JoinHandle<()>> {
        vec![
            CacheManager::start_cleanup_task(self.cache.clone(), config.cache_cleanup_interval()),
            RateLimiter::start_cleanup_task(self.rate_limiter.clone(), config.rate_limit_cleanup_interval()),
        ]
    }

    pub fn evaluator(&self) -> &PermissionEvaluator {
        &self.evaluator
    }

    pub fn cache(&self) -> &Arc<CacheManager<V>> {
        &self.cache
    }

    pub fn policies(&self) -> &CachePolicyTable {
        &self.policies
    }

    pub fn rate_limiter(&self) -> &Arc<RateLimiter> {
        &self.rate_limiter
    }

    pub fn audit(&self) -> &Arc<AuditLogger> {
        &self.audit
    }

    /// Charge one request against the caller's bucket for `endpoint`
    pub fn admit(&self, ctx: &RequestContext, endpoint: &str) -> GuardResult<RateLimitDecision> {
        let client = ctx.client_key();
        let tier = ctx.rate_tier();
        let decision = self.rate_limiter.check(&client, endpoint, tier);

        if decision.allowed {
            return Ok(decision);
        }

        self.audit.log_rate_limited(&client, endpoint, tier, decision.retry_after, ctx.client_ip.clone(), ctx.request_id.clone());
        Err(GuardError::RateLimited {
            message: format!("Rate limit exceeded for endpoint '{}'", endpoint),
            retry_after: decision.retry_after,
        })
    }

    fn check_permission<'a>(&self, ctx: &'a RequestContext, permission: &Permission) -> GuardResult<&'a Actor> {
        let Some(actor) = ctx.actor.as_ref() else {
            self.audit.log_access_denied(&ctx.client_key(), permission, "unauthenticated", ctx.client_ip.clone(), ctx.request_id.clone());
            return Err(GuardError::unauthorized("authentication required"));
        };

        let start_time = Instant::now();
        let decision = self.evaluator.evaluate(actor, permission);
        let duration = start_time.elapsed();

        // Log performance warning if check took too long
        if duration > Duration::from_millis(5) {
            warn!(
                actor_id = %actor.id,
                resource = %permission.resource,
                action = %permission.action,
                duration_ms = %duration.as_millis(),
                "Slow permission check detected"
            );
        }

        match decision {
            AccessDecision::Granted => Ok(actor),
            AccessDecision::Denied(reason) => {
                self.audit.log_access_denied(actor.id.as_str(), permission, reason.as_str(), ctx.client_ip.clone(), ctx.request_id.clone());
                Err(GuardError::unauthorized(format!("{} may not {} {} ({})", actor.id, permission.action, permission.resource, reason)))
            }
        }
    }

    /// Admission and authorization for a request outside the workflows
    pub fn authorize(&self, ctx: &RequestContext, permission: &Permission, endpoint: &str) -> GuardResult<RateLimitDecision> {
        let decision = self.admit(ctx, endpoint)?;
        self.check_permission(ctx, permission)?;
        Ok(decision)
    }

    /// Guarded read served from the cache when the endpoint policy allows
    ///
    /// `compute` produces the response on a miss. Entries are scoped to the
    /// resource's organization; roles with a personal view also get their
    /// own entries.
    pub fn authorize_read<I, K, P, F>(&self, ctx: &RequestContext, permission: &Permission, endpoint: &str, path: &str, params: I, compute: F) -> GuardResult<V>
    where
        I: IntoIterator<Item = (K, P)>,
        K: AsRef<str>,
        P: AsRef<str>,
        F: FnOnce() -> GuardResult<V>,
    {
        self.admit(ctx, endpoint)?;
        let actor = self.check_permission(ctx, permission)?;

        let Some(ttl) = self.policies.ttl_for(path, permission.action, ctx.tier) else {
            debug!(path = path, "Endpoint not cacheable");
            return compute();
        };

        let mut key = CacheKey::new(path, params).scoped(permission.organization_id.clone());
        if has_personal_view(&actor.role) {
            key = key.for_viewer(actor.id.clone());
        }

        self.cache.get_or_insert_with(key, ttl, compute)
    }

    pub fn apply_project_transition(&self, ctx: &RequestContext, project: &ProjectRecord, to: ProjectStatus) -> GuardResult<(ProjectRecord, TransitionRecord)> {
        self.apply_transition(ctx, project, to, PROJECTS_WRITE)
    }

    pub fn apply_payout_transition(&self, ctx: &RequestContext, payout: &PayoutRecord, to: PayoutStatus) -> GuardResult<(PayoutRecord, TransitionRecord)> {
        self.apply_transition(ctx, payout, to, PAYOUTS_WRITE)
    }

    /// Decide and apply a transition, then audit it and purge stale reads
    ///
    /// Nothing is mutated or invalidated unless every check passed.
    pub fn apply_transition<E: WorkflowEntity>(&self, ctx: &RequestContext, entity: &E, to: E::State, endpoint: &str) -> GuardResult<(E, TransitionRecord)> {
        self.admit(ctx, endpoint)?;

        let entity_type = E::State::ENTITY;
        let permission = Permission::new(resource_kind(entity_type), Action::Update, entity.organization_id().clone()).with_resource_id(entity.entity_id());

        let actor = match ctx.require_actor() {
            Ok(actor) => actor,
            Err(e) => {
                self.audit.log_access_denied(&ctx.client_key(), &permission, "unauthenticated", ctx.client_ip.clone(), ctx.request_id.clone());
                return Err(e);
            }
        };

        let scope_denial = if !self.evaluator.same_organization(actor, entity.organization_id()) {
            Some(DenialReason::OrganizationMismatch)
        } else {
            match (actor.customer_id(), entity.customer_id()) {
                (Some(own), Some(owner)) if own != owner => Some(DenialReason::OutsideCustomerScope),
                _ => None,
            }
        };

        if let Some(reason) = scope_denial {
            self.audit.log_access_denied(actor.id.as_str(), &permission, reason.as_str(), ctx.client_ip.clone(), ctx.request_id.clone());
            return Err(GuardError::unauthorized(format!("{} may not transition {} {} ({})", actor.id, entity_type, entity.entity_id(), reason)));
        }

        let has_assignment = entity.is_assigned(actor);
        let (updated, record) = match workflow::apply_transition(entity, to, actor, has_assignment, Utc::now()) {
            Ok(applied) => applied,
            Err(err) => {
                if let GuardError::InvalidTransition { from, to, reason, .. } = &err {
                    self.audit.log_transition_rejected(
                        actor.id.as_str(),
                        entity.organization_id(),
                        entity_type,
                        entity.entity_id(),
                        from,
                        to,
                        reason,
                        ctx.client_ip.clone(),
                        ctx.request_id.clone(),
                    );
                }
                return Err(err);
            }
        };

        self.audit.log_transition(&record, ctx.client_ip.clone(), ctx.request_id.clone());

        let bindings = entity.cache_bindings();
        let mut pairs: Vec<(&str, &str)> = vec![("id", entity.entity_id())];
        pairs.extend(bindings.iter().map(|(name, value)| (*name, value.as_str())));
        let invalidated = self.invalidate_for(E::TRANSITION_MUTATION, entity.organization_id(), &pairs);

        info!(
            entity = %entity_type,
            entity_id = %record.entity_id,
            from = %record.from,
            to = %record.to,
            actor_id = %record.actor_id,
            invalidated = invalidated,
            "Transition applied"
        );

        Ok((updated, record))
    }

    /// Purge reads made stale by a completed write in one organization
    ///
    /// `bindings` name the placeholders the mutation touched, e.g.
    /// `[("id", "42")]`. Returns the number of entries removed.
    pub fn record_mutation(&self, mutation: &str, organization_id: &OrganizationId, bindings: &[(&str, &str)]) -> usize {
        self.invalidate_for(mutation, organization_id, bindings)
    }

    fn invalidate_for(&self, mutation: &str, organization_id: &OrganizationId, bindings: &[(&str, &str)]) -> usize {
        self.policies
            .invalidation_patterns_with(mutation, bindings)
            .iter()
            .map(|template| self.cache.invalidate_matching(template, Some(organization_id)))
            .sum()
    }
}

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

//! Audit trail for guard decisions
//!
//! Events are mirrored to `tracing` and kept in bounded in-memory rings.
//! Applied transitions have a ring of their own, so floods of denials only
//! push out older denials. Delivery is best-effort: once a ring is full its
//! oldest events go.

use crate::models::{OrganizationId, Permission};
use crate::rate_limit::RateTier;
use crate::workflow::{EntityType, TransitionDenial, TransitionRecord};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{info, warn};

/// Default number of events kept in memory per ring
pub const DEFAULT_MAX_EVENTS: usize = 10_000;

/// Audit event types
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    /// Status transition applied
    TransitionApplied,
    /// Status transition refused
    TransitionRejected,
    /// Permission check denied
    AccessDenied,
    /// Request refused by the rate limiter
    RateLimited,
}

/// Audit event result
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditResult {
    Success,
    Denied,
}

/// Audit event entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Unique event ID
    pub id: String,

    pub event_type: AuditEventType,

    pub timestamp: DateTime<Utc>,

    /// Actor id, or the client key for unauthenticated traffic
    pub actor: String,

    pub organization_id: Option<OrganizationId>,

    /// Entity or resource kind
    pub resource: Option<String>,

    pub resource_id: Option<String>,

    pub result: AuditResult,

    pub client_ip: Option<String>,

    /// Request ID for correlation
    pub request_id: Option<String>,

    pub details: BTreeMap<String, String>,
}

impl AuditEvent {
    /// Create a new audit event
    pub fn new(event_type: AuditEventType, actor: impl Into<String>, result: AuditResult) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            event_type,
            timestamp: Utc::now(),
            actor: actor.into(),
            organization_id: None,
            resource: None,
            resource_id: None,
            result,
            client_ip: None,
            request_id: None,
            details: BTreeMap::new(),
        }
    }

    pub fn with_organization(mut self, organization_id: OrganizationId) -> Self {
        self.organization_id = Some(organization_id);
        self
    }

    pub fn with_resource(mut self, resource: impl Into<String>, resource_id: Option<String>) -> Self {
        self.resource = Some(resource.into());
        self.resource_id = resource_id;
        self
    }

    pub fn with_client_info(mut self, client_ip: Option<String>, request_id: Option<String>) -> Self {
        self.client_ip = client_ip;
        self.request_id = request_id;
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }
}

/// Audit logger for guard decisions
#[derive(Debug)]
pub struct AuditLogger {
    /// Applied transitions
    transitions: RwLock<VecDeque<(u64, AuditEvent)>>,

    /// Rejections, denials and rate limit refusals
    decisions: RwLock<VecDeque<(u64, AuditEvent)>>,

    /// Logging order across both rings
    next_seq: AtomicU64,

    /// Maximum number of events to keep in each ring
    max_events: usize,
}

impl AuditLogger {
    pub fn new() -> Self {
        Self::with_max_events(DEFAULT_MAX_EVENTS)
    }

    pub fn with_max_events(max_events: usize) -> Self {
        Self {
            transitions: RwLock::new(VecDeque::new()),
            decisions: RwLock::new(VecDeque::new()),
            next_seq: AtomicU64::new(0),
            max_events,
        }
    }

    /// Log an audit event
    pub fn log_event(&self, event: AuditEvent) {
        match event.result {
            AuditResult::Success => {
                info!(
                    event_type = ?event.event_type,
                    actor = %event.actor,
                    organization_id = ?event.organization_id.as_ref().map(|o| o.as_str()),
                    resource = ?event.resource,
                    resource_id = ?event.resource_id,
                    request_id = ?event.request_id,
                    "Audit event: {:?}", event.event_type
                );
            }
            AuditResult::Denied => {
                warn!(
                    event_type = ?event.event_type,
                    actor = %event.actor,
                    organization_id = ?event.organization_id.as_ref().map(|o| o.as_str()),
                    resource = ?event.resource,
                    resource_id = ?event.resource_id,
                    client_ip = ?event.client_ip,
                    request_id = ?event.request_id,
                    details = ?event.details,
                    "Audit event: {:?} - {:?}", event.event_type, event.result
                );
            }
        }

        if self.max_events == 0 {
            return;
        }

        let ring = match event.event_type {
            AuditEventType::TransitionApplied => &self.transitions,
            AuditEventType::TransitionRejected | AuditEventType::AccessDenied | AuditEventType::RateLimited => &self.decisions,
        };
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);

        let mut events = ring.write();
        while events.len() >= self.max_events {
            events.pop_front();
        }
        events.push_back((seq, event));
    }

    /// Log an accepted transition
    pub fn log_transition(&self, record: &TransitionRecord, client_ip: Option<String>, request_id: Option<String>) {
        let event = AuditEvent::new(AuditEventType::TransitionApplied, record.actor_id.as_str(), AuditResult::Success)
            .with_timestamp(record.at)
            .with_organization(record.organization_id.clone())
            .with_resource(record.entity.as_str(), Some(record.entity_id.clone()))
            .with_client_info(client_ip, request_id)
            .with_detail("from", record.from.as_str())
            .with_detail("to", record.to.as_str())
            .with_detail("kind", record.kind.as_str());

        self.log_event(event);
    }

    /// Log a refused transition
    #[allow(clippy::too_many_arguments)]
    pub fn log_transition_rejected(
        &self,
        actor: &str,
        organization_id: &OrganizationId,
        entity: EntityType,
        entity_id: &str,
        from: &str,
        to: &str,
        reason: &TransitionDenial,
        client_ip: Option<String>,
        request_id: Option<String>,
    ) {
        let event = AuditEvent::new(AuditEventType::TransitionRejected, actor, AuditResult::Denied)
            .with_organization(organization_id.clone())
            .with_resource(entity.as_str(), Some(entity_id.to_string()))
            .with_client_info(client_ip, request_id)
            .with_detail("from", from)
            .with_detail("to", to)
            .with_detail("reason", reason.to_string());

        self.log_event(event);
    }

    /// Log a denied permission check
    pub fn log_access_denied(&self, actor: &str, permission: &Permission, reason: &str, client_ip: Option<String>, request_id: Option<String>) {
        let event = AuditEvent::new(AuditEventType::AccessDenied, actor, AuditResult::Denied)
            .with_organization(permission.organization_id.clone())
            .with_resource(permission.resource.as_str(), permission.resource_id.clone())
            .with_client_info(client_ip, request_id)
            .with_detail("action", permission.action.as_str())
            .with_detail("reason", reason);

        self.log_event(event);
    }

    /// Log a rate limit refusal
    pub fn log_rate_limited(&self, client: &str, endpoint: &str, tier: RateTier, retry_after: Option<Duration>, client_ip: Option<String>, request_id: Option<String>) {
        let mut event = AuditEvent::new(AuditEventType::RateLimited, client, AuditResult::Denied)
            .with_resource(endpoint, None)
            .with_client_info(client_ip, request_id)
            .with_detail("tier", tier.as_str());

        if let Some(retry_after) = retry_after {
            event = event.with_detail("retry_after_ms", retry_after.as_millis().to_string());
        }

        self.log_event(event);
    }

    /// Most recent events first
    pub fn get_events(&self, limit: Option<usize>) -> Vec<AuditEvent> {
        self.query(|_| true, limit)
    }

    pub fn get_actor_events(&self, actor: &str, limit: Option<usize>) -> Vec<AuditEvent> {
        self.query(|event| event.actor == actor, limit)
    }

    pub fn get_entity_events(&self, entity: EntityType, entity_id: &str, limit: Option<usize>) -> Vec<AuditEvent> {
        self.query(|event| event.resource.as_deref() == Some(entity.as_str()) && event.resource_id.as_deref() == Some(entity_id), limit)
    }

    pub fn get_events_by_type(&self, event_type: AuditEventType, limit: Option<usize>) -> Vec<AuditEvent> {
        self.query(|event| event.event_type == event_type, limit)
    }

    pub fn get_events_in_range(&self, start: DateTime<Utc>, end: DateTime<Utc>, limit: Option<usize>) -> Vec<AuditEvent> {
        self.query(|event| event.timestamp >= start && event.timestamp <= end, limit)
    }

    fn query<F>(&self, filter: F, limit: Option<usize>) -> Vec<AuditEvent>
    where
        F: Fn(&AuditEvent) -> bool,
    {
        let transitions = self.transitions.read();
        let decisions = self.decisions.read();

        let mut matching: Vec<&(u64, AuditEvent)> = transitions.iter().chain(decisions.iter()).filter(|(_, event)| filter(event)).collect();
        matching.sort_unstable_by_key(|(seq, _)| Reverse(*seq));

        matching.into_iter().take(limit.unwrap_or(usize::MAX)).map(|(_, event)| event.clone()).collect()
    }

    pub fn clear_events(&self) {
        self.transitions.write().clear();
        self.decisions.write().clear();
        info!("Audit log cleared");
    }

    pub fn get_statistics(&self) -> AuditStatistics {
        let transitions = self.transitions.read();
        let decisions = self.decisions.read();

        let mut stats = AuditStatistics {
            total_events: transitions.len() + decisions.len(),
            ..Default::default()
        };

        for (_, event) in transitions.iter().chain(decisions.iter()) {
            match event.result {
                AuditResult::Success => stats.successful_events += 1,
                AuditResult::Denied => stats.denied_events += 1,
            }

            *stats.events_by_type.entry(event.event_type).or_insert(0) += 1;
        }

        stats
    }
}

/// Audit statistics
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct AuditStatistics {
    pub total_events: usize,
    pub successful_events: usize,
    pub denied_events: usize,
    pub events_by_type: HashMap<AuditEventType, usize>,
}

impl Default for AuditLogger {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Action, ActorId, ResourceKind};
    use crate::workflow::TransitionKind;

    fn record(entity_id: &str) -> TransitionRecord {
        TransitionRecord {
            entity: EntityType::Project,
            entity_id: entity_id.to_string(),
            organization_id: OrganizationId::new("org-1"),
            from: "pending".to_string(),
            to: "approved".to_string(),
            kind: TransitionKind::Approve,
            actor_id: ActorId::new("u-1"),
            at: Utc::now(),
        }
    }

    #[test]
    fn test_transition_event_carries_record() {
        let logger = AuditLogger::new();
        let record = record("p-1");

        logger.log_transition(&record, None, Some("req-1".to_string()));

        let events = logger.get_entity_events(EntityType::Project, "p-1", None);
        assert_eq!(events.len(), 1);

        let event = &events[0];
        assert_eq!(event.event_type, AuditEventType::TransitionApplied);
        assert_eq!(event.actor, "u-1");
        assert_eq!(event.timestamp, record.at);
        assert_eq!(event.details.get("from").map(String::as_str), Some("pending"));
        assert_eq!(event.details.get("to").map(String::as_str), Some("approved"));
        assert_eq!(event.request_id.as_deref(), Some("req-1"));
    }

    #[test]
    fn test_queries_and_statistics() {
        let logger = AuditLogger::new();
        let permission = Permission::new(ResourceKind::Payout, Action::Read, "org-1");

        logger.log_transition(&record("p-1"), None, None);
        logger.log_access_denied("u-2", &permission, "role_not_permitted", None, None);
        logger.log_rate_limited("203.0.113.9", "projects:write", RateTier::Unauthenticated, None, Some("203.0.113.9".to_string()), None);

        assert_eq!(logger.get_events(None).len(), 3);
        assert_eq!(logger.get_events(Some(1))[0].event_type, AuditEventType::RateLimited);
        assert_eq!(logger.get_actor_events("u-2", None).len(), 1);
        assert_eq!(logger.get_events_by_type(AuditEventType::AccessDenied, None).len(), 1);

        let stats = logger.get_statistics();
        assert_eq!(stats.total_events, 3);
        assert_eq!(stats.successful_events, 1);
        assert_eq!(stats.denied_events, 2);
        assert_eq!(stats.events_by_type.get(&AuditEventType::RateLimited), Some(&1));
    }

    #[test]
    fn test_audit_logger_limits() {
        let logger = AuditLogger::with_max_events(2);

        for i in 0..5 {
            logger.log_transition(&record(&format!("p-{}", i)), None, None);
        }

        // Should only keep the last 2 events
        let events = logger.get_events(None);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].resource_id.as_deref(), Some("p-4"));
        assert_eq!(events[1].resource_id.as_deref(), Some("p-3"));
    }

    #[test]
    fn test_clear_events() {
        let logger = AuditLogger::new();
        logger.log_transition(&record("p-1"), None, None);

        logger.clear_events();

        assert!(logger.get_events(None).is_empty());
    }

    #[test]
    fn test_denial_flood_keeps_transitions() {
        let logger = AuditLogger::with_max_events(3);

        logger.log_transition(&record("p-1"), None, None);
        for _ in 0..10 {
            logger.log_rate_limited("ip:203.0.113.9", "projects:write", RateTier::Unauthenticated, None, None, None);
        }

        let trail = logger.get_entity_events(EntityType::Project, "p-1", None);
        assert_eq!(trail.len(), 1);
        assert_eq!(trail[0].event_type, AuditEventType::TransitionApplied);

        let events = logger.get_events(None);
        assert_eq!(events.len(), 4);
        assert_eq!(events[3].event_type, AuditEventType::TransitionApplied);
        assert_eq!(logger.get_statistics().events_by_type.get(&AuditEventType::RateLimited), Some(&3));
    }
}

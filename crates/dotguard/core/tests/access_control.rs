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

//! Integration tests for permission evaluation and organization records

use chrono::{DateTime, Utc};
use dotguard_core::models::{Action, Actor, Organization, OrganizationDto, Permission, ResourceKind, Role, ServiceTier};
use dotguard_core::rbac::{AccessDecision, DenialReason, PermissionEvaluator};
use proptest::prelude::*;

fn denied(reason: DenialReason) -> AccessDecision {
    AccessDecision::Denied(reason)
}

#[test]
fn test_technician_reads_only_assigned_projects() {
    let evaluator = PermissionEvaluator::new();
    let technician = Actor::new("tech-1", "org-1", Role::technician(["p-1"]));

    let assigned = Permission::new(ResourceKind::Project, Action::Read, "org-1").with_resource_id("p-1");
    assert_eq!(evaluator.evaluate(&technician, &assigned), AccessDecision::Granted);

    let other = Permission::new(ResourceKind::Project, Action::Read, "org-1").with_resource_id("p-2");
    assert_eq!(evaluator.evaluate(&technician, &other), denied(DenialReason::NotAssigned));

    let listing = Permission::new(ResourceKind::Project, Action::Read, "org-1");
    assert_eq!(evaluator.evaluate(&technician, &listing), denied(DenialReason::MissingResourceId));

    let update = Permission::new(ResourceKind::Project, Action::Update, "org-1").with_resource_id("p-1");
    assert_eq!(evaluator.evaluate(&technician, &update), denied(DenialReason::ActionNotPermitted));
}

#[test]
fn test_customer_owner_is_limited_to_own_customer() {
    let evaluator = PermissionEvaluator::new();
    let owner = Actor::new("cust-1", "org-1", Role::customer_owner("c-1"));

    let own = Permission::new(ResourceKind::Project, Action::Update, "org-1").with_resource_id("p-1").with_customer("c-1");
    assert!(evaluator.can_access(&owner, &own));

    let foreign = Permission::new(ResourceKind::Project, Action::Read, "org-1").with_resource_id("p-9").with_customer("c-2");
    assert_eq!(evaluator.evaluate(&owner, &foreign), denied(DenialReason::OutsideCustomerScope));

    let unscoped = Permission::new(ResourceKind::Project, Action::Read, "org-1").with_resource_id("p-1");
    assert_eq!(evaluator.evaluate(&owner, &unscoped), denied(DenialReason::MissingScope));

    let delete = Permission::new(ResourceKind::Project, Action::Delete, "org-1").with_customer("c-1");
    assert_eq!(evaluator.evaluate(&owner, &delete), denied(DenialReason::ActionNotPermitted));
}

#[test]
fn test_assets_follow_parent_project() {
    let evaluator = PermissionEvaluator::new();
    let technician = Actor::new("tech-1", "org-1", Role::technician(["p-1"]));
    let viewer = Actor::new("view-1", "org-1", Role::customer_viewer("c-1", ["p-1"]));

    let upload = Permission::new(ResourceKind::Asset, Action::Create, "org-1").with_project("p-1");
    assert!(evaluator.can_access(&technician, &upload));
    assert_eq!(evaluator.evaluate(&viewer, &upload), denied(DenialReason::ActionNotPermitted));

    let view = Permission::new(ResourceKind::Asset, Action::Read, "org-1").with_resource_id("a-1").with_project("p-1");
    assert!(evaluator.can_access(&viewer, &view));

    let elsewhere = Permission::new(ResourceKind::Asset, Action::Read, "org-1").with_project("p-2");
    assert_eq!(evaluator.evaluate(&viewer, &elsewhere), denied(DenialReason::NotAssigned));
}

#[test]
fn test_payouts_are_for_approvers_and_admins() {
    let evaluator = PermissionEvaluator::new();
    let approver = Actor::new("appr-1", "org-1", Role::Approver);
    let sales = Actor::new("sales-1", "org-1", Role::SalesLead);
    let admin = Actor::new("admin-1", "org-1", Role::Admin);

    let review = Permission::new(ResourceKind::Payout, Action::Update, "org-1").with_resource_id("po-1");
    assert!(evaluator.can_access(&approver, &review));
    assert!(evaluator.can_access(&admin, &review));
    assert_eq!(evaluator.evaluate(&sales, &review), denied(DenialReason::RoleNotPermitted));

    let create = Permission::new(ResourceKind::Payout, Action::Create, "org-1");
    assert_eq!(evaluator.evaluate(&approver, &create), denied(DenialReason::ActionNotPermitted));
}

#[test]
fn test_unknown_resources_are_denied_to_non_admins() {
    let evaluator = PermissionEvaluator::new();
    let approver = Actor::new("appr-1", "org-1", Role::Approver);

    let permission: Permission = serde_json::from_str(r#"{"resource":"invoice","action":"read","organization_id":"org-1"}"#).unwrap();
    assert_eq!(permission.resource, ResourceKind::Unknown("invoice".to_string()));
    assert_eq!(evaluator.evaluate(&approver, &permission), denied(DenialReason::UnknownResource));

    let err = evaluator.require_access(&approver, &permission).unwrap_err();
    assert_eq!(err.error_type(), "unauthorized");
}

#[test]
fn test_actor_json_from_authentication_layer() {
    let json = r#"{
        "id": "tech-7",
        "organization_id": "org-3",
        "role": { "kind": "technician", "assigned_projects": ["p-70", "p-71"] }
    }"#;

    let actor: Actor = serde_json::from_str(json).unwrap();
    assert!(actor.is_assigned_to("p-71"));
    assert!(!actor.is_assigned_to("p-72"));
}

fn any_role() -> impl Strategy<Value = Role> {
    prop_oneof![
        Just(Role::Admin),
        Just(Role::Approver),
        Just(Role::SalesLead),
        Just(Role::PublicVisitor),
        Just(Role::technician(["p-1"])),
        Just(Role::customer_owner("c-1")),
        Just(Role::customer_viewer("c-1", ["p-1"])),
    ]
}

fn any_resource() -> impl Strategy<Value = ResourceKind> {
    prop_oneof![
        Just(ResourceKind::Project),
        Just(ResourceKind::Payout),
        Just(ResourceKind::Asset),
        Just(ResourceKind::User),
        Just(ResourceKind::AuditLog),
        "[a-z]{3,10}".prop_map(ResourceKind::from),
    ]
}

fn any_action() -> impl Strategy<Value = Action> {
    prop::sample::select(vec![Action::Read, Action::Create, Action::Update, Action::Delete])
}

proptest! {
    #[test]
    fn test_other_organizations_are_always_denied(
        role in any_role(),
        resource in any_resource(),
        action in any_action(),
        own_org in "org-[a-z0-9]{1,6}",
        other_org in "org-[a-z0-9]{1,6}",
    ) {
        prop_assume!(own_org != other_org);

        let actor = Actor::new("u-1", own_org.as_str(), role);
        let permission = Permission::new(resource, action, other_org.as_str())
            .with_resource_id("p-1")
            .with_customer("c-1")
            .with_project("p-1");

        prop_assert_eq!(PermissionEvaluator::new().evaluate(&actor, &permission), denied(DenialReason::OrganizationMismatch));
    }

    #[test]
    fn test_organization_dto_round_trips(
        id in "org-[a-z0-9]{1,8}",
        name in "[A-Za-z][A-Za-z0-9 ]{0,20}",
        slug in "[a-z0-9]([a-z0-9-]{0,10}[a-z0-9])?",
        tier in prop::sample::select(ServiceTier::ALL.to_vec()),
        secs in 0i64..4_000_000_000,
        millis in 0u32..1000,
    ) {
        let created_at: DateTime<Utc> = DateTime::from_timestamp(secs, millis * 1_000_000).unwrap();
        let organization = Organization { id: id.as_str().into(), name, slug, tier, created_at };

        let dto = organization.to_dto();
        prop_assert!(dto.created_at.ends_with('Z'));

        let parsed = Organization::from_dto(dto.clone()).unwrap();
        prop_assert_eq!(&parsed, &organization);

        let json = serde_json::to_string(&dto).unwrap();
        let back: OrganizationDto = serde_json::from_str(&json).unwrap();
        prop_assert_eq!(back, dto);
    }

    #[test]
    fn test_valid_dtos_survive_conversion(
        id in "org-[a-z0-9]{1,8}",
        name in "[A-Za-z][A-Za-z0-9 ]{0,20}",
        slug in "[a-z0-9]([a-z0-9-]{0,10}[a-z0-9])?",
        tier in prop::sample::select(ServiceTier::ALL.to_vec()),
        date in (2000i32..2100, 1u32..=12, 1u32..=28),
        time in (0u32..24, 0u32..60, 0u32..60),
        millis in prop::option::of(1u32..1000),
    ) {
        let (year, month, day) = date;
        let (hour, minute, second) = time;
        let fraction = match millis {
            Some(ms) => format!(".{:03}", ms),
            None => String::new(),
        };
        let dto = OrganizationDto {
            id,
            name,
            slug,
            tier: tier.as_str().to_string(),
            created_at: format!("{:04}-{:02}-{:02}T{:02}:{:02}:{:02}{}Z", year, month, day, hour, minute, second, fraction),
        };

        let organization = Organization::from_dto(dto.clone()).unwrap();
        prop_assert_eq!(organization.to_dto(), dto);
    }
}

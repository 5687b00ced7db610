mod common;

use common::TestIdentity;
use identity_service::config::{CacheConfig, OsInheritConfig};
use identity_service::models::{Actor, RoleAssignment, Scope};
use identity_service::services::{EntityKind, IdentityManager, ServiceError};

fn user_on_project(user_id: &str, project_id: &str, role_id: &str) -> RoleAssignment {
    RoleAssignment::new(
        Actor::User(user_id.to_string()),
        Scope::Project(project_id.to_string()),
        role_id,
    )
}

fn on_domain(actor: Actor, domain_id: &str, role_id: &str) -> RoleAssignment {
    RoleAssignment::new(actor, Scope::Domain(domain_id.to_string()), role_id)
}

#[tokio::test]
async fn test_inherited_domain_grant_reaches_projects_only() {
    let env = TestIdentity::new(true).await;
    let d1 = env.domain("d1").await;
    let d2 = env.domain("d2").await;
    let p1 = env.project("p1", &d1.id).await;
    let other = env.project("elsewhere", &d2.id).await;
    let user = env.user("alice", &d1.id).await;
    env.role("admin").await;
    env.role("member").await;

    env.manager
        .create_grant(on_domain(Actor::User(user.id.clone()), &d1.id, "admin").inherited())
        .await
        .unwrap();
    env.manager
        .create_grant(user_on_project(&user.id, &p1.id, "member"))
        .await
        .unwrap();

    let on_project = env
        .manager
        .get_roles_for_user_and_project(&user.id, &p1.id)
        .await
        .unwrap();
    assert_eq!(on_project, vec!["admin", "member"]);

    let on_domain_itself = env
        .manager
        .get_roles_for_user_and_domain(&user.id, &d1.id)
        .await
        .unwrap();
    assert!(on_domain_itself.is_empty());

    let outside = env
        .manager
        .get_roles_for_user_and_project(&user.id, &other.id)
        .await
        .unwrap();
    assert!(outside.is_empty());
}

#[tokio::test]
async fn test_inherited_grants_ignored_when_disabled() {
    let env = TestIdentity::new(true).await;
    let d1 = env.domain("d1").await;
    let p1 = env.project("p1", &d1.id).await;
    let user = env.user("alice", &d1.id).await;
    env.role("admin").await;
    env.manager
        .create_grant(on_domain(Actor::User(user.id.clone()), &d1.id, "admin").inherited())
        .await
        .unwrap();

    let disabled = IdentityManager::new(
        env.store.clone(),
        &CacheConfig::default(),
        &OsInheritConfig { enabled: false },
    );
    let roles = disabled
        .get_roles_for_user_and_project(&user.id, &p1.id)
        .await
        .unwrap();
    assert!(roles.is_empty());
}

#[tokio::test]
async fn test_roles_from_user_and_groups_are_deduplicated() {
    let env = TestIdentity::new(false).await;
    let project = env.project("p1", "default").await;
    let user = env.user("bob", "default").await;
    let ops = env.group("ops", "default").await;
    let dev = env.group("dev", "default").await;
    env.role("member").await;
    env.role("reader").await;

    env.manager.add_user_to_group(&user.id, &ops.id).await.unwrap();
    env.manager.add_user_to_group(&user.id, &dev.id).await.unwrap();

    for group_id in [&ops.id, &dev.id] {
        env.manager
            .create_grant(RoleAssignment::new(
                Actor::Group(group_id.clone()),
                Scope::Project(project.id.clone()),
                "member",
            ))
            .await
            .unwrap();
    }
    env.manager
        .create_grant(user_on_project(&user.id, &project.id, "member"))
        .await
        .unwrap();
    env.manager
        .create_grant(RoleAssignment::new(
            Actor::Group(dev.id.clone()),
            Scope::Project(project.id.clone()),
            "reader",
        ))
        .await
        .unwrap();

    let roles = env
        .manager
        .get_roles_for_user_and_project(&user.id, &project.id)
        .await
        .unwrap();
    assert_eq!(roles, vec!["member", "reader"]);

    let stored = env
        .manager
        .list_grants(&Actor::User(user.id.clone()), &Scope::Project(project.id.clone()))
        .await
        .unwrap();
    assert_eq!(stored.len(), 1);
}

#[tokio::test]
async fn test_duplicate_grant_is_conflict() {
    let env = TestIdentity::new(false).await;
    let project = env.project("p1", "default").await;
    let user = env.user("carol", "default").await;
    env.role("member").await;

    env.manager
        .add_role_to_user_and_project(&user.id, &project.id, "member")
        .await
        .unwrap();
    let err = env
        .manager
        .add_role_to_user_and_project(&user.id, &project.id, "member")
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Conflict(_)));
}

#[tokio::test]
async fn test_removing_missing_grant_is_not_found() {
    let env = TestIdentity::new(false).await;
    let project = env.project("p1", "default").await;
    let user = env.user("dave", "default").await;
    env.role("member").await;

    let err = env
        .manager
        .remove_role_from_user_and_project(&user.id, &project.id, "member")
        .await
        .unwrap_err();
    assert!(err.is_not_found_of(EntityKind::Grant));
}

#[tokio::test]
async fn test_projects_for_user_include_inherited_and_group_grants() {
    let env = TestIdentity::new(true).await;
    let d1 = env.domain("d1").await;
    let inherited_a = env.project("a", &d1.id).await;
    let inherited_b = env.project("b", &d1.id).await;
    let via_group = env.project("c", "default").await;
    env.project("unrelated", "default").await;
    let user = env.user("erin", "default").await;
    let group = env.group("ops", "default").await;
    env.role("member").await;

    env.manager.add_user_to_group(&user.id, &group.id).await.unwrap();
    env.manager
        .create_grant(on_domain(Actor::Group(group.id.clone()), &d1.id, "member").inherited())
        .await
        .unwrap();
    env.manager
        .create_grant(RoleAssignment::new(
            Actor::Group(group.id.clone()),
            Scope::Project(via_group.id.clone()),
            "member",
        ))
        .await
        .unwrap();

    let mut ids: Vec<String> = env
        .manager
        .list_projects_for_user(&user.id)
        .await
        .unwrap()
        .into_iter()
        .map(|p| p.id)
        .collect();
    ids.sort();
    let mut expected = vec![inherited_a.id, inherited_b.id, via_group.id];
    expected.sort();
    assert_eq!(ids, expected);
}

#[tokio::test]
async fn test_user_ids_for_project_list_direct_holders() {
    let env = TestIdentity::new(false).await;
    let project = env.project("p1", "default").await;
    let alice = env.user("alice", "default").await;
    let bob = env.user("bob", "default").await;
    env.role("member").await;
    env.role("admin").await;

    env.manager
        .add_role_to_user_and_project(&alice.id, &project.id, "member")
        .await
        .unwrap();
    env.manager
        .add_role_to_user_and_project(&alice.id, &project.id, "admin")
        .await
        .unwrap();
    env.manager
        .add_role_to_user_and_project(&bob.id, &project.id, "member")
        .await
        .unwrap();

    let mut ids = env
        .manager
        .list_user_ids_for_project(&project.id)
        .await
        .unwrap();
    ids.sort();
    let mut expected = vec![alice.id, bob.id];
    expected.sort();
    assert_eq!(ids, expected);
}

#[tokio::test]
async fn test_deleting_role_removes_its_grants() {
    let env = TestIdentity::new(false).await;
    let project = env.project("p1", "default").await;
    let user = env.user("frank", "default").await;
    env.role("member").await;
    env.role("admin").await;

    env.manager
        .add_role_to_user_and_project(&user.id, &project.id, "member")
        .await
        .unwrap();
    env.manager
        .add_role_to_user_and_project(&user.id, &project.id, "admin")
        .await
        .unwrap();

    env.manager.delete_role("admin").await.unwrap();

    let assignments = env.manager.list_role_assignments(None).await.unwrap();
    assert_eq!(assignments.len(), 1);
    assert_eq!(assignments[0].role_id, "member");
    assert!(env
        .manager
        .list_role_assignments(Some("admin"))
        .await
        .unwrap()
        .is_empty());
}

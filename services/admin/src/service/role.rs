//! Roles and their menu grants.
use crate::context::OpContext;
use crate::model::{
    MenuFilter, QueryOptions, QueryResult, Role, RoleFilter, RoleInput, RoleMenu,
};
use crate::model::role::is_storable_code;
use crate::service::diff::{diff_by_key, first_duplicate};
use crate::service::policy::PolicyProjector;
use crate::service::tx::run_in_transaction;
use crate::service::{ServiceResult, not_found, validation};
use crate::store::{AdminStore, Session};
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

#[derive(Clone)]
pub struct RoleService {
    store: Arc<dyn AdminStore>,
    projector: PolicyProjector,
}

impl RoleService {
    pub fn new(store: Arc<dyn AdminStore>, projector: PolicyProjector) -> Self {
        Self { store, projector }
    }

    pub async fn get(&self, ctx: &OpContext, id: &str, options: QueryOptions) -> ServiceResult<Role> {
        let mut session = self.store.session().await?;
        let Some(role) = ctx.run(session.get_role(id)).await?? else {
            return Err(not_found(format!("role {id} not found")));
        };
        let mut roles = vec![role];
        if options.include_menus {
            ctx.run(attach_grants(session.as_mut(), &mut roles)).await??;
        }
        Ok(roles.remove(0))
    }

    pub async fn query(
        &self,
        ctx: &OpContext,
        filter: &RoleFilter,
        options: QueryOptions,
    ) -> ServiceResult<QueryResult<Role>> {
        let mut session = self.store.session().await?;
        let mut result = ctx
            .run(session.query_roles(filter, options.pagination))
            .await??;
        if options.include_menus {
            ctx.run(attach_grants(session.as_mut(), &mut result.data))
                .await??;
        }
        Ok(result)
    }

    /// Every role without grants, for pickers.
    pub async fn query_select(&self, ctx: &OpContext) -> ServiceResult<Vec<Role>> {
        let result = self
            .query(ctx, &RoleFilter::default(), QueryOptions::default())
            .await?;
        Ok(result.data)
    }

    pub async fn create(&self, ctx: &OpContext, input: RoleInput) -> ServiceResult<Role> {
        validate_input(&input)?;
        let mut session = self.store.session().await?;
        let actor = ctx.actor.clone();
        let role = run_in_transaction(ctx, session.as_mut(), move |s| {
            Box::pin(async move {
                ensure_name_free(s, &input.name, None).await?;
                ensure_menus_exist(s, &input).await?;
                let id = uuid::Uuid::new_v4().to_string();
                let now = Utc::now();
                let role = Role {
                    id: id.clone(),
                    name: input.name.clone(),
                    sequence: input.sequence,
                    memo: input.memo.clone(),
                    creator: actor,
                    created_at: now,
                    updated_at: now,
                    row_id: 0,
                    menus: input.grants_for(&id),
                };
                s.create_role(&role).await?;
                for grant in &role.menus {
                    s.create_role_menu(grant).await?;
                }
                Ok(role)
            })
        })
        .await?;

        self.project(session.as_mut(), &role.id).await?;
        Ok(role)
    }

    pub async fn update(&self, ctx: &OpContext, id: &str, input: RoleInput) -> ServiceResult<Role> {
        validate_input(&input)?;
        let mut session = self.store.session().await?;
        let id = id.to_string();
        let role = run_in_transaction(ctx, session.as_mut(), move |s| {
            Box::pin(async move {
                let Some(mut role) = s.get_role(&id).await? else {
                    return Err(not_found(format!("role {id} not found")));
                };
                ensure_name_free(s, &input.name, Some(&id)).await?;
                ensure_menus_exist(s, &input).await?;

                let current = s.list_role_menus(&[id.clone()]).await?;
                let desired = input.grants_for(&id);
                let plan = diff_by_key(&current, &desired, |grant| grant.menu_id.clone());
                for grant in &plan.delete {
                    s.delete_role_menu(&id, &grant.menu_id).await?;
                }
                for grant in &plan.update {
                    s.update_role_menu(grant).await?;
                }
                for grant in &plan.create {
                    s.create_role_menu(grant).await?;
                }

                role.name = input.name.clone();
                role.sequence = input.sequence;
                role.memo = input.memo.clone();
                role.updated_at = Utc::now();
                s.update_role(&role).await?;
                role.menus = desired;
                Ok(role)
            })
        })
        .await?;

        self.project(session.as_mut(), &role.id).await?;
        Ok(role)
    }

    /// Remove the role, its grants and every user assignment naming it.
    pub async fn delete(&self, ctx: &OpContext, id: &str) -> ServiceResult<()> {
        let mut session = self.store.session().await?;
        let role_id = id.to_string();
        run_in_transaction(ctx, session.as_mut(), move |s| {
            Box::pin(async move {
                if s.get_role(&role_id).await?.is_none() {
                    return Err(not_found(format!("role {role_id} not found")));
                }
                s.delete_role_menus(&role_id).await?;
                s.delete_role_users(&role_id).await?;
                s.delete_role(&role_id).await?;
                Ok(())
            })
        })
        .await?;

        self.projector
            .remove_role(id)
            .await
            .inspect_err(|err| tracing::warn!(role_id = id, error = %err, "role removal from policy failed"))?;
        Ok(())
    }

    async fn project(&self, session: &mut dyn Session, role_id: &str) -> ServiceResult<()> {
        self.projector
            .project_role(session, role_id)
            .await
            .inspect_err(|err| tracing::warn!(role_id, error = %err, "role projection failed"))?;
        Ok(())
    }
}

fn validate_input(input: &RoleInput) -> ServiceResult<()> {
    if input.name.trim().is_empty() {
        return Err(validation("role name is required"));
    }
    if let Some(menu_id) = first_duplicate(&input.menus, |grant| grant.menu_id.clone()) {
        return Err(validation(format!("menu {menu_id} granted twice")));
    }
    for grant in &input.menus {
        let invalid = grant
            .actions
            .iter()
            .chain(&grant.resources)
            .find(|code| !is_storable_code(code));
        if let Some(code) = invalid {
            return Err(validation(format!(
                "invalid code {code:?} in grant on menu {}",
                grant.menu_id
            )));
        }
    }
    Ok(())
}

async fn ensure_name_free(s: &mut dyn Session, name: &str, except: Option<&str>) -> ServiceResult<()> {
    let taken = s
        .query_roles(&RoleFilter::named(name), None)
        .await?
        .data
        .into_iter()
        .any(|role| Some(role.id.as_str()) != except);
    if taken {
        return Err(validation(format!("role name {name} already exists")));
    }
    Ok(())
}

async fn ensure_menus_exist(s: &mut dyn Session, input: &RoleInput) -> ServiceResult<()> {
    if input.menus.is_empty() {
        return Ok(());
    }
    let wanted: Vec<String> = input.menus.iter().map(|grant| grant.menu_id.clone()).collect();
    let filter = MenuFilter {
        ids: Some(wanted.clone()),
        ..MenuFilter::default()
    };
    let found: HashSet<String> = s
        .query_menus(&filter, None)
        .await?
        .data
        .into_iter()
        .map(|menu| menu.id)
        .collect();
    match wanted.into_iter().find(|id| !found.contains(id)) {
        Some(missing) => Err(not_found(format!("menu {missing} not found"))),
        None => Ok(()),
    }
}

async fn attach_grants(s: &mut dyn Session, roles: &mut [Role]) -> ServiceResult<()> {
    if roles.is_empty() {
        return Ok(());
    }
    let ids: Vec<String> = roles.iter().map(|role| role.id.clone()).collect();
    let mut by_role: HashMap<String, Vec<RoleMenu>> = HashMap::new();
    for grant in s.list_role_menus(&ids).await? {
        by_role.entry(grant.role_id.clone()).or_default().push(grant);
    }
    for role in roles.iter_mut() {
        role.menus = by_role.remove(&role.id).unwrap_or_default();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{MenuInput, MenuResourceInput, RoleMenuInput};
    use crate::service::ServiceError;
    use crate::service::testing::Fixture;
    use portcullis_authz::PolicyRule;

    async fn menu_with_get(fx: &Fixture, ctx: &OpContext) -> String {
        let menu = fx
            .menus
            .create(
                ctx,
                MenuInput {
                    name: "M".to_string(),
                    resources: vec![
                        MenuResourceInput {
                            code: "get".to_string(),
                            name: "get".to_string(),
                            method: "GET".to_string(),
                            path: "/x".to_string(),
                        },
                        MenuResourceInput {
                            code: "label".to_string(),
                            name: "label only".to_string(),
                            method: String::new(),
                            path: String::new(),
                        },
                    ],
                    ..MenuInput::default()
                },
            )
            .await
            .expect("menu");
        menu.id
    }

    fn role_input(name: &str, grants: Vec<RoleMenuInput>) -> RoleInput {
        RoleInput {
            name: name.to_string(),
            menus: grants,
            ..RoleInput::default()
        }
    }

    fn grant(menu_id: &str, resources: &[&str]) -> RoleMenuInput {
        RoleMenuInput {
            menu_id: menu_id.to_string(),
            actions: Vec::new(),
            resources: resources.iter().map(|code| code.to_string()).collect(),
        }
    }

    #[tokio::test]
    async fn grant_then_revoke_flips_decision() {
        let fx = Fixture::new().await;
        let ctx = OpContext::new("tester");
        let menu_id = menu_with_get(&fx, &ctx).await;

        let role = fx
            .roles
            .create(&ctx, role_input("R", vec![grant(&menu_id, &["get"])]))
            .await
            .expect("create");
        assert!(fx.engine.evaluate(&role.id, "/x", "GET").await.expect("eval"));

        fx.roles
            .update(&ctx, &role.id, role_input("R", Vec::new()))
            .await
            .expect("revoke");
        assert!(!fx.engine.evaluate(&role.id, "/x", "GET").await.expect("eval"));
    }

    #[tokio::test]
    async fn projected_rules_match_grants_exactly() {
        let fx = Fixture::new().await;
        let ctx = OpContext::new("tester");
        let menu_id = menu_with_get(&fx, &ctx).await;

        let role = fx
            .roles
            .create(
                &ctx,
                role_input("R", vec![grant(&menu_id, &["get", "label", "unknown"])]),
            )
            .await
            .expect("create");

        assert_eq!(
            fx.engine.permissions_for(&role.id).await,
            vec![PolicyRule {
                subject: role.id.clone(),
                path: "/x".to_string(),
                method: "GET".to_string(),
            }]
        );
    }

    #[tokio::test]
    async fn duplicate_name_is_validation() {
        let fx = Fixture::new().await;
        let ctx = OpContext::new("tester");
        fx.roles.create(&ctx, role_input("R", Vec::new())).await.expect("first");
        let err = fx
            .roles
            .create(&ctx, role_input("R", Vec::new()))
            .await
            .expect_err("duplicate");
        assert!(matches!(err, ServiceError::Validation(_)));
    }

    #[tokio::test]
    async fn grant_on_missing_menu_is_not_found() {
        let fx = Fixture::new().await;
        let err = fx
            .roles
            .create(
                &OpContext::new("tester"),
                role_input("R", vec![grant("missing", &["get"])]),
            )
            .await
            .expect_err("missing menu");
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[tokio::test]
    async fn delete_clears_rules_and_memberships() {
        let fx = Fixture::new().await;
        let ctx = OpContext::new("tester");
        let menu_id = menu_with_get(&fx, &ctx).await;
        let role = fx
            .roles
            .create(&ctx, role_input("R", vec![grant(&menu_id, &["get"])]))
            .await
            .expect("create");
        let user = fx.user_with_roles(&ctx, "alice", &[&role.id]).await;
        assert!(fx.engine.evaluate(&user.id, "/x", "GET").await.expect("eval"));

        fx.roles.delete(&ctx, &role.id).await.expect("delete");

        assert!(fx.engine.permissions_for(&role.id).await.is_empty());
        assert!(fx.engine.memberships_for(&user.id).await.is_empty());
        let user = fx
            .users
            .get(&ctx, &user.id, QueryOptions::with_children())
            .await
            .expect("user");
        assert!(user.roles.is_empty());
    }

    #[tokio::test]
    async fn hydrated_get_returns_grants() {
        let fx = Fixture::new().await;
        let ctx = OpContext::new("tester");
        let menu_id = menu_with_get(&fx, &ctx).await;
        let role = fx
            .roles
            .create(&ctx, role_input("R", vec![grant(&menu_id, &["get"])]))
            .await
            .expect("create");

        let loaded = fx
            .roles
            .get(&ctx, &role.id, QueryOptions::with_children())
            .await
            .expect("get");
        assert_eq!(loaded.menus.len(), 1);
        assert_eq!(loaded.menus[0].resources, vec!["get".to_string()]);

        let bare = fx.roles.query_select(&ctx).await.expect("select");
        assert!(bare.iter().all(|role| role.menus.is_empty()));
    }

    #[tokio::test]
    async fn grant_codes_must_survive_storage() {
        let fx = Fixture::new().await;
        let ctx = OpContext::new("tester");
        let menu_id = menu_with_get(&fx, &ctx).await;

        for code in ["get,label", " get", ""] {
            let err = fx
                .roles
                .create(&ctx, role_input("R", vec![grant(&menu_id, &[code])]))
                .await
                .expect_err("unstorable code");
            assert!(matches!(err, ServiceError::Validation(_)), "{code:?}");
        }
        let roles = fx.roles.query_select(&ctx).await.expect("roles");
        assert!(roles.is_empty());
    }
}

//! Users, credentials and role assignments.
//!
//! Enabled users carry one membership edge per assigned role in the policy
//! engine; disabled users carry none but keep their stored assignments.
use crate::context::OpContext;
use crate::model::{
    CurrentUser, QueryOptions, QueryResult, RoleFilter, User, UserFilter, UserInput, UserRole,
    UserStatus,
};
use crate::service::diff::{diff_by_key, first_duplicate};
use crate::service::password::{hash_password, verify_password};
use crate::service::policy::PolicyProjector;
use crate::service::tx::run_in_transaction;
use crate::service::{ServiceError, ServiceResult, forbidden, not_found, validation};
use crate::store::{AdminStore, Session, StoreError};
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

#[derive(Clone)]
pub struct UserService {
    store: Arc<dyn AdminStore>,
    projector: PolicyProjector,
    root_username: String,
}

impl UserService {
    pub fn new(
        store: Arc<dyn AdminStore>,
        projector: PolicyProjector,
        root_username: impl Into<String>,
    ) -> Self {
        Self {
            store,
            projector,
            root_username: root_username.into(),
        }
    }

    pub async fn get(&self, ctx: &OpContext, id: &str, options: QueryOptions) -> ServiceResult<User> {
        let mut session = self.store.session().await?;
        let Some(user) = ctx.run(session.get_user(id)).await?? else {
            return Err(not_found(format!("user {id} not found")));
        };
        let mut users = vec![user];
        if options.include_roles {
            ctx.run(attach_roles(session.as_mut(), &mut users)).await??;
        }
        Ok(users.remove(0))
    }

    pub async fn query(
        &self,
        ctx: &OpContext,
        filter: &UserFilter,
        options: QueryOptions,
    ) -> ServiceResult<QueryResult<User>> {
        let mut session = self.store.session().await?;
        let mut result = ctx
            .run(session.query_users(filter, options.pagination))
            .await??;
        if options.include_roles {
            ctx.run(attach_roles(session.as_mut(), &mut result.data))
                .await??;
        }
        Ok(result)
    }

    pub async fn create(&self, ctx: &OpContext, input: UserInput) -> ServiceResult<User> {
        self.validate_input(&input)?;
        if input.password.is_empty() {
            return Err(validation("password is required"));
        }
        let password_hash = hash(&input.password)?;
        let mut session = self.store.session().await?;
        let actor = ctx.actor.clone();
        let user = run_in_transaction(ctx, session.as_mut(), move |s| {
            Box::pin(async move {
                ensure_username_free(s, &input.username, None).await?;
                ensure_roles_exist(s, &input.role_ids).await?;
                let id = uuid::Uuid::new_v4().to_string();
                let now = Utc::now();
                let user = User {
                    id: id.clone(),
                    username: input.username.clone(),
                    real_name: input.real_name.clone(),
                    password_hash,
                    email: input.email.clone(),
                    phone: input.phone.clone(),
                    status: input.status,
                    creator: actor,
                    created_at: now,
                    updated_at: now,
                    row_id: 0,
                    roles: input.edges_for(&id),
                };
                s.create_user(&user).await?;
                for edge in &user.roles {
                    s.create_user_role(edge).await?;
                }
                Ok(user)
            })
        })
        .await?;

        self.sync_policy(session.as_mut(), &user.id, user.status)
            .await?;
        Ok(user)
    }

    /// Update profile, status and role edges. An empty password keeps the
    /// stored hash.
    pub async fn update(&self, ctx: &OpContext, id: &str, input: UserInput) -> ServiceResult<User> {
        self.validate_input(&input)?;
        let password_hash = if input.password.is_empty() {
            None
        } else {
            Some(hash(&input.password)?)
        };
        let mut session = self.store.session().await?;
        let id = id.to_string();
        let user = run_in_transaction(ctx, session.as_mut(), move |s| {
            Box::pin(async move {
                let Some(mut user) = s.get_user(&id).await? else {
                    return Err(not_found(format!("user {id} not found")));
                };
                ensure_username_free(s, &input.username, Some(&id)).await?;
                ensure_roles_exist(s, &input.role_ids).await?;

                let current = s.list_user_roles(&[id.clone()]).await?;
                let desired = input.edges_for(&id);
                let plan = diff_by_key(&current, &desired, |edge| edge.role_id.clone());
                for edge in &plan.delete {
                    s.delete_user_role(&id, &edge.role_id).await?;
                }
                for edge in &plan.create {
                    s.create_user_role(edge).await?;
                }

                user.username = input.username.clone();
                user.real_name = input.real_name.clone();
                user.email = input.email.clone();
                user.phone = input.phone.clone();
                user.updated_at = Utc::now();
                s.update_user(&user).await?;
                if user.status != input.status {
                    s.update_user_status(&id, input.status).await?;
                    user.status = input.status;
                }
                if let Some(password_hash) = password_hash {
                    s.update_user_password(&id, &password_hash).await?;
                    user.password_hash = password_hash;
                }
                user.roles = desired;
                Ok(user)
            })
        })
        .await?;

        self.sync_policy(session.as_mut(), &user.id, user.status)
            .await?;
        Ok(user)
    }

    pub async fn delete(&self, ctx: &OpContext, id: &str) -> ServiceResult<()> {
        let mut session = self.store.session().await?;
        let user_id = id.to_string();
        run_in_transaction(ctx, session.as_mut(), move |s| {
            Box::pin(async move {
                if s.get_user(&user_id).await?.is_none() {
                    return Err(not_found(format!("user {user_id} not found")));
                }
                s.delete_user_roles(&user_id).await?;
                s.delete_user(&user_id).await?;
                Ok(())
            })
        })
        .await?;

        self.projector
            .remove_user(id)
            .await
            .inspect_err(|err| tracing::warn!(user_id = id, error = %err, "user removal from policy failed"))?;
        Ok(())
    }

    /// Enable or disable a user. Disabling drops its memberships from the
    /// engine; enabling restores them from the stored assignments.
    pub async fn update_status(
        &self,
        ctx: &OpContext,
        id: &str,
        status: UserStatus,
    ) -> ServiceResult<()> {
        let mut session = self.store.session().await?;
        let user_id = id.to_string();
        run_in_transaction(ctx, session.as_mut(), move |s| {
            Box::pin(async move {
                if s.get_user(&user_id).await?.is_none() {
                    return Err(not_found(format!("user {user_id} not found")));
                }
                s.update_user_status(&user_id, status).await?;
                Ok(())
            })
        })
        .await?;

        self.sync_policy(session.as_mut(), id, status).await
    }

    pub async fn update_password(&self, ctx: &OpContext, id: &str, password: &str) -> ServiceResult<()> {
        if password.is_empty() {
            return Err(validation("password is required"));
        }
        let password_hash = hash(password)?;
        let mut session = self.store.session().await?;
        let user_id = id.to_string();
        run_in_transaction(ctx, session.as_mut(), move |s| {
            Box::pin(async move {
                s.update_user_password(&user_id, &password_hash).await?;
                Ok(())
            })
        })
        .await
    }

    /// Check credentials for an enabled user. Unknown users and disabled
    /// accounts never verify.
    pub async fn verify_password(
        &self,
        ctx: &OpContext,
        username: &str,
        password: &str,
    ) -> ServiceResult<bool> {
        let mut session = self.store.session().await?;
        let found = ctx
            .run(session.query_users(&UserFilter::username(username), None))
            .await??;
        Ok(found
            .data
            .first()
            .is_some_and(|user| user.is_enabled() && verify_password(&user.password_hash, password)))
    }

    pub fn is_root(&self, user_id: &str) -> bool {
        user_id == self.root_username
    }

    /// Profile of the calling user. Root has no stored record and no roles.
    pub async fn current(&self, ctx: &OpContext, user_id: &str) -> ServiceResult<CurrentUser> {
        if self.is_root(user_id) {
            return Ok(CurrentUser {
                id: user_id.to_string(),
                username: self.root_username.clone(),
                real_name: self.root_username.clone(),
                root: true,
                role_names: Vec::new(),
            });
        }
        let mut session = self.store.session().await?;
        let user = active_user(ctx, session.as_mut(), user_id).await?;
        let role_ids: Vec<String> = ctx
            .run(session.list_user_roles(&[user.id.clone()]))
            .await??
            .into_iter()
            .map(|edge| edge.role_id)
            .collect();
        let role_names = if role_ids.is_empty() {
            Vec::new()
        } else {
            let filter = RoleFilter {
                ids: Some(role_ids),
                ..RoleFilter::default()
            };
            ctx.run(session.query_roles(&filter, None))
                .await??
                .data
                .into_iter()
                .map(|role| role.name)
                .collect()
        };
        Ok(CurrentUser {
            id: user.id,
            username: user.username,
            real_name: user.real_name,
            root: false,
            role_names,
        })
    }

    /// Self-service password change. The old password must match; the root
    /// password comes from configuration and cannot be changed here.
    pub async fn change_own_password(
        &self,
        ctx: &OpContext,
        user_id: &str,
        old_password: &str,
        new_password: &str,
    ) -> ServiceResult<()> {
        if self.is_root(user_id) {
            return Err(validation("root password is managed by configuration"));
        }
        if new_password.is_empty() {
            return Err(validation("new password is required"));
        }
        let user = {
            let mut session = self.store.session().await?;
            active_user(ctx, session.as_mut(), user_id).await?
        };
        if !self.verify_password(ctx, &user.username, old_password).await? {
            return Err(validation("old password is incorrect"));
        }
        self.update_password(ctx, user_id, new_password).await
    }

    fn validate_input(&self, input: &UserInput) -> ServiceResult<()> {
        if input.username.trim().is_empty() {
            return Err(validation("username is required"));
        }
        if input.username == self.root_username {
            return Err(validation(format!("username {} is reserved", input.username)));
        }
        if let Some(role_id) = first_duplicate(&input.role_ids, |role_id| role_id.clone()) {
            return Err(validation(format!("role {role_id} assigned twice")));
        }
        Ok(())
    }

    async fn sync_policy(
        &self,
        session: &mut dyn Session,
        user_id: &str,
        status: UserStatus,
    ) -> ServiceResult<()> {
        let outcome = match status {
            UserStatus::Enabled => self.projector.project_user(session, user_id).await.map(drop),
            UserStatus::Disabled => self.projector.remove_user(user_id).await,
        };
        outcome
            .inspect_err(|err| tracing::warn!(user_id, error = %err, "user projection failed"))?;
        Ok(())
    }
}

/// Load the caller for a self-service operation; unknown and disabled users are refused.
pub(crate) async fn active_user(
    ctx: &OpContext,
    s: &mut dyn Session,
    user_id: &str,
) -> ServiceResult<User> {
    match ctx.run(s.get_user(user_id)).await?? {
        Some(user) if user.is_enabled() => Ok(user),
        Some(_) => Err(forbidden("user is disabled")),
        None => Err(forbidden(format!("unknown user {user_id}"))),
    }
}

fn hash(password: &str) -> ServiceResult<String> {
    hash_password(password)
        .map_err(|err| ServiceError::Storage(StoreError::Unexpected(err.context("hash password"))))
}

async fn ensure_username_free(
    s: &mut dyn Session,
    username: &str,
    except: Option<&str>,
) -> ServiceResult<()> {
    let taken = s
        .query_users(&UserFilter::username(username), None)
        .await?
        .data
        .into_iter()
        .any(|user| Some(user.id.as_str()) != except);
    if taken {
        return Err(validation(format!("username {username} already exists")));
    }
    Ok(())
}

async fn ensure_roles_exist(s: &mut dyn Session, role_ids: &[String]) -> ServiceResult<()> {
    if role_ids.is_empty() {
        return Ok(());
    }
    let filter = RoleFilter {
        ids: Some(role_ids.to_vec()),
        ..RoleFilter::default()
    };
    let found: HashSet<String> = s
        .query_roles(&filter, None)
        .await?
        .data
        .into_iter()
        .map(|role| role.id)
        .collect();
    match role_ids.iter().find(|id| !found.contains(*id)) {
        Some(missing) => Err(not_found(format!("role {missing} not found"))),
        None => Ok(()),
    }
}

async fn attach_roles(s: &mut dyn Session, users: &mut [User]) -> ServiceResult<()> {
    if users.is_empty() {
        return Ok(());
    }
    let ids: Vec<String> = users.iter().map(|user| user.id.clone()).collect();
    let mut by_user: HashMap<String, Vec<UserRole>> = HashMap::new();
    for edge in s.list_user_roles(&ids).await? {
        by_user.entry(edge.user_id.clone()).or_default().push(edge);
    }
    for user in users.iter_mut() {
        user.roles = by_user.remove(&user.id).unwrap_or_default();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RoleInput;
    use crate::service::testing::{Fixture, ROOT};

    fn input(username: &str, role_ids: &[&str]) -> UserInput {
        UserInput {
            username: username.to_string(),
            real_name: username.to_uppercase(),
            password: "s3cret".to_string(),
            email: String::new(),
            phone: String::new(),
            status: UserStatus::Enabled,
            role_ids: role_ids.iter().map(|id| id.to_string()).collect(),
        }
    }

    async fn role(fx: &Fixture, ctx: &OpContext, name: &str) -> String {
        fx.roles
            .create(
                ctx,
                RoleInput {
                    name: name.to_string(),
                    ..RoleInput::default()
                },
            )
            .await
            .expect("role")
            .id
    }

    fn role_set(memberships: Vec<portcullis_authz::Membership>) -> Vec<String> {
        let mut roles: Vec<String> = memberships.into_iter().map(|edge| edge.role).collect();
        roles.sort();
        roles
    }

    #[tokio::test]
    async fn root_username_is_reserved() {
        let fx = Fixture::new().await;
        let err = fx
            .users
            .create(&OpContext::new("tester"), input(ROOT, &[]))
            .await
            .expect_err("reserved");
        assert!(matches!(err, ServiceError::Validation(_)));
    }

    #[tokio::test]
    async fn duplicate_username_and_missing_password_are_rejected() {
        let fx = Fixture::new().await;
        let ctx = OpContext::new("tester");
        fx.users.create(&ctx, input("alice", &[])).await.expect("alice");
        let err = fx
            .users
            .create(&ctx, input("alice", &[]))
            .await
            .expect_err("duplicate");
        assert!(matches!(err, ServiceError::Validation(_)));

        let mut no_password = input("bob", &[]);
        no_password.password.clear();
        let err = fx.users.create(&ctx, no_password).await.expect_err("password");
        assert!(matches!(err, ServiceError::Validation(_)));
    }

    #[tokio::test]
    async fn disable_removes_and_enable_restores_memberships() {
        let fx = Fixture::new().await;
        let ctx = OpContext::new("tester");
        let r1 = role(&fx, &ctx, "r1").await;
        let r2 = role(&fx, &ctx, "r2").await;
        let user = fx.users.create(&ctx, input("alice", &[&r1, &r2])).await.expect("user");

        let mut expected = vec![r1.clone(), r2.clone()];
        expected.sort();
        assert_eq!(role_set(fx.engine.memberships_for(&user.id).await), expected);

        fx.users
            .update_status(&ctx, &user.id, UserStatus::Disabled)
            .await
            .expect("disable");
        assert!(fx.engine.memberships_for(&user.id).await.is_empty());

        fx.users
            .update_status(&ctx, &user.id, UserStatus::Enabled)
            .await
            .expect("enable");
        assert_eq!(role_set(fx.engine.memberships_for(&user.id).await), expected);
    }

    #[tokio::test]
    async fn update_diffs_role_edges_and_keeps_password_when_blank() {
        let fx = Fixture::new().await;
        let ctx = OpContext::new("tester");
        let a = role(&fx, &ctx, "a").await;
        let b = role(&fx, &ctx, "b").await;
        let c = role(&fx, &ctx, "c").await;
        let user = fx.users.create(&ctx, input("alice", &[&a, &b])).await.expect("user");

        let mut update = input("alice", &[&b, &c]);
        update.password.clear();
        fx.users.update(&ctx, &user.id, update).await.expect("update");

        let loaded = fx
            .users
            .get(&ctx, &user.id, QueryOptions::with_children())
            .await
            .expect("get");
        let mut assigned = loaded.role_ids();
        assigned.sort();
        let mut expected = vec![b.clone(), c.clone()];
        expected.sort();
        assert_eq!(assigned, expected);
        assert_eq!(role_set(fx.engine.memberships_for(&user.id).await), expected);
        assert!(fx.users.verify_password(&ctx, "alice", "s3cret").await.expect("verify"));
    }

    #[tokio::test]
    async fn password_change_and_disabled_accounts() {
        let fx = Fixture::new().await;
        let ctx = OpContext::new("tester");
        let user = fx.users.create(&ctx, input("alice", &[])).await.expect("user");

        fx.users
            .update_password(&ctx, &user.id, "rotated")
            .await
            .expect("rotate");
        assert!(!fx.users.verify_password(&ctx, "alice", "s3cret").await.expect("old"));
        assert!(fx.users.verify_password(&ctx, "alice", "rotated").await.expect("new"));

        fx.users
            .update_status(&ctx, &user.id, UserStatus::Disabled)
            .await
            .expect("disable");
        assert!(!fx.users.verify_password(&ctx, "alice", "rotated").await.expect("disabled"));
        assert!(!fx.users.verify_password(&ctx, "nobody", "x").await.expect("unknown"));
    }

    #[tokio::test]
    async fn delete_drops_memberships() {
        let fx = Fixture::new().await;
        let ctx = OpContext::new("tester");
        let r = role(&fx, &ctx, "r").await;
        let user = fx.users.create(&ctx, input("alice", &[&r])).await.expect("user");

        fx.users.delete(&ctx, &user.id).await.expect("delete");
        assert!(fx.engine.memberships_for(&user.id).await.is_empty());
        let err = fx
            .users
            .get(&ctx, &user.id, QueryOptions::default())
            .await
            .expect_err("gone");
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[tokio::test]
    async fn create_disabled_user_projects_nothing() {
        let fx = Fixture::new().await;
        let ctx = OpContext::new("tester");
        let r = role(&fx, &ctx, "r").await;
        let mut disabled = input("alice", &[&r]);
        disabled.status = UserStatus::Disabled;
        let user = fx.users.create(&ctx, disabled).await.expect("user");
        assert!(fx.engine.memberships_for(&user.id).await.is_empty());
    }

    #[tokio::test]
    async fn current_profile_lists_role_names() {
        let fx = Fixture::new().await;
        let ctx = OpContext::new("tester");
        let admins = role(&fx, &ctx, "admins").await;
        let auditors = role(&fx, &ctx, "auditors").await;
        let user = fx
            .users
            .create(&ctx, input("alice", &[&admins, &auditors]))
            .await
            .expect("user");

        let mut me = fx.users.current(&ctx, &user.id).await.expect("current");
        me.role_names.sort();
        assert_eq!(me.username, "alice");
        assert_eq!(me.real_name, "ALICE");
        assert!(!me.root);
        assert_eq!(me.role_names, ["admins", "auditors"]);

        let root = fx.users.current(&ctx, ROOT).await.expect("root");
        assert!(root.root);
        assert!(root.role_names.is_empty());

        fx.users
            .update_status(&ctx, &user.id, UserStatus::Disabled)
            .await
            .expect("disable");
        let err = fx.users.current(&ctx, &user.id).await.expect_err("disabled");
        assert!(matches!(err, ServiceError::Forbidden(_)));
        let err = fx.users.current(&ctx, "ghost").await.expect_err("unknown");
        assert!(matches!(err, ServiceError::Forbidden(_)));
    }

    #[tokio::test]
    async fn own_password_change_checks_the_old_password() {
        let fx = Fixture::new().await;
        let ctx = OpContext::new("tester");
        let user = fx.users.create(&ctx, input("alice", &[])).await.expect("user");

        let err = fx
            .users
            .change_own_password(&ctx, &user.id, "wrong", "next")
            .await
            .expect_err("wrong old password");
        assert!(matches!(err, ServiceError::Validation(_)));
        let err = fx
            .users
            .change_own_password(&ctx, &user.id, "s3cret", "")
            .await
            .expect_err("empty new password");
        assert!(matches!(err, ServiceError::Validation(_)));

        fx.users
            .change_own_password(&ctx, &user.id, "s3cret", "next")
            .await
            .expect("change");
        assert!(fx.users.verify_password(&ctx, "alice", "next").await.expect("new"));
        assert!(!fx.users.verify_password(&ctx, "alice", "s3cret").await.expect("old"));

        let err = fx
            .users
            .change_own_password(&ctx, ROOT, "x", "y")
            .await
            .expect_err("root");
        assert!(matches!(err, ServiceError::Validation(_)));
    }
}

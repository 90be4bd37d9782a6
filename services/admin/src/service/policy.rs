//! Projection of relational assignments into the policy engine.
//!
//! # Purpose
//! Re-derives one subject's rules from storage and replaces them wholesale in
//! the [`PolicyEngine`]: remove everything for the subject, then add the
//! freshly computed set.
//!
//! # Key invariants and assumptions
//! - Storage is the source of truth; the engine is a cache rebuilt from it.
//! - A role's rules are `(role, resource.path, resource.method)` for each
//!   granted resource code that exists on the granted menu and names both a
//!   method and a path.
//! - A user's memberships mirror its role edges; disabled users have none.
//! - Projection runs after commit and is not transactional with the write.
use crate::model::{MenuResource, RoleFilter, RoleMenu, UserFilter};
use crate::store::{AdminStore, Session, StoreError};
use portcullis_authz::{AuthzError, PolicyEngine};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use utoipa::ToSchema;

#[derive(Debug, Error)]
pub enum ProjectionError {
    #[error("load assignments: {0}")]
    Store(#[from] StoreError),
    #[error("policy engine: {0}")]
    Engine(#[from] AuthzError),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ProjectionSummary {
    pub roles: usize,
    pub users: usize,
    pub permissions: usize,
    pub memberships: usize,
    /// Subjects present in the engine but absent from storage, dropped by this pass.
    pub pruned: usize,
}

#[derive(Clone)]
pub struct PolicyProjector {
    engine: Arc<PolicyEngine>,
}

/// `(path, method)` pairs a role's grants resolve to.
pub fn role_rules(grants: &[RoleMenu], resources: &[MenuResource]) -> BTreeSet<(String, String)> {
    let mut by_menu: HashMap<&str, Vec<&MenuResource>> = HashMap::new();
    for resource in resources {
        by_menu
            .entry(resource.menu_id.as_str())
            .or_default()
            .push(resource);
    }
    let mut rules = BTreeSet::new();
    for grant in grants {
        let Some(menu_resources) = by_menu.get(grant.menu_id.as_str()) else {
            continue;
        };
        for code in &grant.resources {
            let granted = menu_resources
                .iter()
                .filter(|resource| &resource.code == code && resource.is_enforceable());
            for resource in granted {
                rules.insert((resource.path.clone(), resource.method.clone()));
            }
        }
    }
    rules
}

impl PolicyProjector {
    pub fn new(engine: Arc<PolicyEngine>) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &Arc<PolicyEngine> {
        &self.engine
    }

    /// Replace `role_id`'s permissions with what its current grants imply.
    pub async fn project_role(
        &self,
        session: &mut dyn Session,
        role_id: &str,
    ) -> Result<usize, ProjectionError> {
        let outcome = self.project_role_inner(session, role_id).await;
        record("role", &outcome);
        outcome
    }

    async fn project_role_inner(
        &self,
        session: &mut dyn Session,
        role_id: &str,
    ) -> Result<usize, ProjectionError> {
        let grants = session.list_role_menus(&[role_id.to_string()]).await?;
        let menu_ids: Vec<String> = grants.iter().map(|grant| grant.menu_id.clone()).collect();
        let resources = if menu_ids.is_empty() {
            Vec::new()
        } else {
            session.list_menu_resources(&menu_ids).await?
        };
        let rules = role_rules(&grants, &resources);

        self.engine.remove_permissions(role_id).await?;
        for (path, method) in &rules {
            self.engine.add_permission(role_id, path, method).await?;
        }
        tracing::debug!(role_id, permissions = rules.len(), "projected role");
        Ok(rules.len())
    }

    /// Replace `user_id`'s memberships with its current role edges.
    pub async fn project_user(
        &self,
        session: &mut dyn Session,
        user_id: &str,
    ) -> Result<usize, ProjectionError> {
        let outcome = self.project_user_inner(session, user_id).await;
        record("user", &outcome);
        outcome
    }

    async fn project_user_inner(
        &self,
        session: &mut dyn Session,
        user_id: &str,
    ) -> Result<usize, ProjectionError> {
        let edges = session.list_user_roles(&[user_id.to_string()]).await?;
        self.engine.remove_memberships(user_id).await?;
        for edge in &edges {
            self.engine.add_membership(user_id, &edge.role_id).await?;
        }
        tracing::debug!(user_id, memberships = edges.len(), "projected user");
        Ok(edges.len())
    }

    /// Re-project every role holding a grant on `menu_id`.
    pub async fn project_menu_grantees(
        &self,
        session: &mut dyn Session,
        menu_id: &str,
    ) -> Result<usize, ProjectionError> {
        let role_ids = session.roles_granting_menu(menu_id).await?;
        for role_id in &role_ids {
            self.project_role(session, role_id).await?;
        }
        Ok(role_ids.len())
    }

    /// Drop a deleted role's permissions and every membership naming it.
    pub async fn remove_role(&self, role_id: &str) -> Result<(), ProjectionError> {
        self.engine.remove_permissions(role_id).await?;
        self.engine.remove_role_memberships(role_id).await?;
        Ok(())
    }

    /// Drop a deleted or disabled user's memberships.
    pub async fn remove_user(&self, user_id: &str) -> Result<(), ProjectionError> {
        self.engine.remove_memberships(user_id).await?;
        Ok(())
    }

    /// Rebuild the engine from storage: every role, every enabled user, then
    /// prune subjects storage no longer knows about.
    pub async fn project_all(
        &self,
        session: &mut dyn Session,
    ) -> Result<ProjectionSummary, ProjectionError> {
        let mut summary = ProjectionSummary::default();

        let roles = session.query_roles(&RoleFilter::default(), None).await?.data;
        let role_ids: HashSet<String> = roles.iter().map(|role| role.id.clone()).collect();
        for role in &roles {
            summary.permissions += self.project_role(session, &role.id).await?;
            summary.roles += 1;
        }

        let users = session.query_users(&UserFilter::enabled(), None).await?.data;
        let user_ids: HashSet<String> = users.iter().map(|user| user.id.clone()).collect();
        for user in &users {
            summary.memberships += self.project_user(session, &user.id).await?;
            summary.users += 1;
        }

        let snapshot = self.engine.snapshot().await;
        let stale_roles: BTreeSet<String> = snapshot
            .permissions
            .iter()
            .filter(|rule| !role_ids.contains(&rule.subject))
            .map(|rule| rule.subject.clone())
            .collect();
        let stale_users: BTreeSet<String> = snapshot
            .memberships
            .iter()
            .filter(|edge| !user_ids.contains(&edge.user))
            .map(|edge| edge.user.clone())
            .collect();
        for subject in &stale_roles {
            self.engine.remove_permissions(subject).await?;
        }
        for user in &stale_users {
            self.engine.remove_memberships(user).await?;
        }
        summary.pruned = stale_roles.len() + stale_users.len();

        tracing::info!(
            roles = summary.roles,
            users = summary.users,
            permissions = summary.permissions,
            memberships = summary.memberships,
            pruned = summary.pruned,
            "policy projection complete"
        );
        Ok(summary)
    }
}

/// Periodically rebuild the engine from storage to heal projections that
/// failed after commit. Failures are logged and retried on the next tick.
pub fn spawn_reconcile_task(
    store: Arc<dyn AdminStore>,
    projector: PolicyProjector,
    every: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick fires immediately; startup has just projected.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let outcome = match store.session().await {
                Ok(mut session) => projector.project_all(session.as_mut()).await,
                Err(err) => Err(ProjectionError::Store(err)),
            };
            if let Err(err) = outcome {
                tracing::warn!(error = %err, "policy reconciliation failed");
            }
        }
    })
}

fn record<T>(subject: &'static str, outcome: &Result<T, ProjectionError>) {
    let label = if outcome.is_ok() { "ok" } else { "error" };
    metrics::counter!(
        "portcullis_policy_projections_total",
        "subject" => subject,
        "outcome" => label
    )
    .increment(1);
}

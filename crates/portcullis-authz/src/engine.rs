//! Process-owned authorization engine.
//!
//! # Purpose
//! Wraps a Casbin enforcer behind an async lock and exposes the small rule
//! vocabulary the admin service needs: permissions keyed by subject and
//! user-to-role memberships.
//!
//! # Key invariants and assumptions
//! - The engine holds derived state only; callers rebuild it from storage.
//! - Every primitive takes the lock on its own. A remove followed by an add
//!   for the same subject is two critical sections, so a concurrent
//!   `evaluate` may observe the subject with no rules in between.
use crate::casbin_model::casbin_model;
use crate::errors::{AuthzError, AuthzResult};
use crate::types::{Membership, PolicyRule, RuleSnapshot};
use casbin::{CoreApi, Enforcer, MemoryAdapter, MgmtApi};
use tokio::sync::RwLock;

pub struct PolicyEngine {
    enforcer: RwLock<Enforcer>,
}

impl PolicyEngine {
    /// Build an empty engine from the embedded model.
    pub async fn new() -> AuthzResult<Self> {
        let model = casbin_model()
            .await
            .map_err(|err| AuthzError::Model(err.to_string()))?;
        let enforcer = Enforcer::new(model, MemoryAdapter::default()).await?;
        Ok(Self {
            enforcer: RwLock::new(enforcer),
        })
    }

    /// Allow `subject` to call `method` on `path`. Returns false when the rule already existed.
    pub async fn add_permission(&self, subject: &str, path: &str, method: &str) -> AuthzResult<bool> {
        if subject.is_empty() || path.is_empty() || method.is_empty() {
            return Err(AuthzError::InvalidRule(format!(
                "permission requires subject, path and method: ({subject}, {path}, {method})"
            )));
        }
        let mut enforcer = self.enforcer.write().await;
        let added = enforcer
            .add_policy(vec![
                subject.to_string(),
                path.to_string(),
                method.to_string(),
            ])
            .await?;
        Ok(added)
    }

    /// Drop every permission whose subject is `subject`.
    pub async fn remove_permissions(&self, subject: &str) -> AuthzResult<bool> {
        let mut enforcer = self.enforcer.write().await;
        let removed = enforcer
            .remove_filtered_policy(0, vec![subject.to_string()])
            .await?;
        tracing::debug!(subject, removed, "removed permissions");
        Ok(removed)
    }

    pub async fn add_membership(&self, user: &str, role: &str) -> AuthzResult<bool> {
        if user.is_empty() || role.is_empty() {
            return Err(AuthzError::InvalidRule(format!(
                "membership requires user and role: ({user}, {role})"
            )));
        }
        let mut enforcer = self.enforcer.write().await;
        let added = enforcer
            .add_grouping_policy(vec![user.to_string(), role.to_string()])
            .await?;
        Ok(added)
    }

    /// Drop every membership edge where `user` is the member.
    pub async fn remove_memberships(&self, user: &str) -> AuthzResult<bool> {
        self.remove_grouping_field(0, user).await
    }

    /// Drop every membership edge pointing at `role`.
    pub async fn remove_role_memberships(&self, role: &str) -> AuthzResult<bool> {
        self.remove_grouping_field(1, role).await
    }

    async fn remove_grouping_field(&self, field: usize, value: &str) -> AuthzResult<bool> {
        let mut enforcer = self.enforcer.write().await;
        let removed = enforcer
            .remove_filtered_grouping_policy(field, vec![value.to_string()])
            .await?;
        if removed {
            enforcer.build_role_links()?;
        }
        tracing::debug!(field, value, removed, "removed memberships");
        Ok(removed)
    }

    /// Answer whether `subject` may call `method` on `path`.
    pub async fn evaluate(&self, subject: &str, path: &str, method: &str) -> AuthzResult<bool> {
        let enforcer = self.enforcer.read().await;
        Ok(enforcer.enforce((subject, path, method))?)
    }

    pub async fn permissions_for(&self, subject: &str) -> Vec<PolicyRule> {
        let enforcer = self.enforcer.read().await;
        let mut rules: Vec<PolicyRule> = enforcer
            .get_filtered_policy(0, vec![subject.to_string()])
            .into_iter()
            .filter_map(PolicyRule::from_row)
            .collect();
        rules.sort();
        rules
    }

    pub async fn memberships_for(&self, user: &str) -> Vec<Membership> {
        let enforcer = self.enforcer.read().await;
        let mut edges: Vec<Membership> = enforcer
            .get_filtered_grouping_policy(0, vec![user.to_string()])
            .into_iter()
            .filter_map(Membership::from_row)
            .collect();
        edges.sort();
        edges
    }

    pub async fn snapshot(&self) -> RuleSnapshot {
        let enforcer = self.enforcer.read().await;
        let mut permissions: Vec<PolicyRule> = enforcer
            .get_policy()
            .into_iter()
            .filter_map(PolicyRule::from_row)
            .collect();
        let mut memberships: Vec<Membership> = enforcer
            .get_grouping_policy()
            .into_iter()
            .filter_map(Membership::from_row)
            .collect();
        permissions.sort();
        memberships.sort();
        RuleSnapshot {
            permissions,
            memberships,
        }
    }
}

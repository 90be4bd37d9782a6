//! Roles and their menu grants.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Role {
    pub id: String,
    pub name: String,
    pub sequence: i32,
    pub memo: String,
    pub creator: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip)]
    pub row_id: i64,
    #[serde(default)]
    pub menus: Vec<RoleMenu>,
}

/// Grant of one menu to a role, carrying the granted action and resource codes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct RoleMenu {
    #[serde(default)]
    pub role_id: String,
    pub menu_id: String,
    #[serde(default)]
    pub actions: Vec<String>,
    #[serde(default)]
    pub resources: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct RoleInput {
    pub name: String,
    #[serde(default)]
    pub sequence: i32,
    #[serde(default)]
    pub memo: String,
    #[serde(default)]
    pub menus: Vec<RoleMenuInput>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct RoleMenuInput {
    pub menu_id: String,
    #[serde(default)]
    pub actions: Vec<String>,
    #[serde(default)]
    pub resources: Vec<String>,
}

impl RoleInput {
    pub fn grants_for(&self, role_id: &str) -> Vec<RoleMenu> {
        self.menus
            .iter()
            .map(|grant| RoleMenu {
                role_id: role_id.to_string(),
                menu_id: grant.menu_id.clone(),
                actions: grant.actions.clone(),
                resources: grant.resources.clone(),
            })
            .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoleFilter {
    pub ids: Option<Vec<String>>,
    pub name: Option<String>,
    pub like_name: Option<String>,
    /// Roles assigned to this user.
    pub user_id: Option<String>,
}

impl RoleFilter {
    pub fn named(name: &str) -> Self {
        Self {
            name: Some(name.to_string()),
            ..Self::default()
        }
    }

    /// Row-level checks; the `user_id` join is applied by the store.
    pub fn matches(&self, role: &Role) -> bool {
        if let Some(ids) = &self.ids {
            if !ids.contains(&role.id) {
                return false;
            }
        }
        if let Some(name) = &self.name {
            if &role.name != name {
                return false;
            }
        }
        if let Some(like) = &self.like_name {
            if !role.name.contains(like.as_str()) {
                return false;
            }
        }
        true
    }
}

/// Grant list serialization used by the `role_menus` table.
pub fn join_codes(codes: &[String]) -> String {
    codes.join(",")
}

/// Whether `code` reads back unchanged from the comma-joined storage form.
pub fn is_storable_code(code: &str) -> bool {
    !code.is_empty() && !code.contains(',') && code.trim() == code
}

pub fn split_codes(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|code| !code.is_empty())
        .map(str::to_string)
        .collect()
}

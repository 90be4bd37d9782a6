//! Users and their role assignments.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum UserStatus {
    Enabled,
    Disabled,
}

impl UserStatus {
    pub fn code(self) -> i16 {
        match self {
            UserStatus::Enabled => 1,
            UserStatus::Disabled => 2,
        }
    }

    pub fn from_code(code: i16) -> Option<Self> {
        match code {
            1 => Some(UserStatus::Enabled),
            2 => Some(UserStatus::Disabled),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct User {
    pub id: String,
    pub username: String,
    pub real_name: String,
    #[serde(skip)]
    pub password_hash: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: String,
    pub status: UserStatus,
    pub creator: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip)]
    pub row_id: i64,
    #[serde(default)]
    pub roles: Vec<UserRole>,
}

impl User {
    pub fn is_enabled(&self) -> bool {
        self.status == UserStatus::Enabled
    }

    pub fn role_ids(&self) -> Vec<String> {
        self.roles.iter().map(|edge| edge.role_id.clone()).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub struct UserRole {
    pub user_id: String,
    pub role_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct UserInput {
    pub username: String,
    #[serde(default)]
    pub real_name: String,
    /// Required on create; on update an empty value keeps the current password.
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default = "default_status")]
    pub status: UserStatus,
    #[serde(default)]
    pub role_ids: Vec<String>,
}

fn default_status() -> UserStatus {
    UserStatus::Enabled
}

impl UserInput {
    pub fn edges_for(&self, user_id: &str) -> Vec<UserRole> {
        self.role_ids
            .iter()
            .map(|role_id| UserRole {
                user_id: user_id.to_string(),
                role_id: role_id.clone(),
            })
            .collect()
    }
}

/// Profile of the calling user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct CurrentUser {
    pub id: String,
    pub username: String,
    pub real_name: String,
    pub root: bool,
    /// Names of the assigned roles; empty for root.
    pub role_names: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserFilter {
    pub ids: Option<Vec<String>>,
    pub username: Option<String>,
    pub like_username: Option<String>,
    pub like_real_name: Option<String>,
    pub status: Option<UserStatus>,
    /// Users holding any of these roles; applied by the store.
    pub role_ids: Option<Vec<String>>,
}

impl UserFilter {
    pub fn username(username: &str) -> Self {
        Self {
            username: Some(username.to_string()),
            ..Self::default()
        }
    }

    pub fn enabled() -> Self {
        Self {
            status: Some(UserStatus::Enabled),
            ..Self::default()
        }
    }

    pub fn matches(&self, user: &User) -> bool {
        if let Some(ids) = &self.ids {
            if !ids.contains(&user.id) {
                return false;
            }
        }
        if let Some(username) = &self.username {
            if &user.username != username {
                return false;
            }
        }
        if let Some(like) = &self.like_username {
            if !user.username.contains(like.as_str()) {
                return false;
            }
        }
        if let Some(like) = &self.like_real_name {
            if !user.real_name.contains(like.as_str()) {
                return false;
            }
        }
        if let Some(status) = self.status {
            if user.status != status {
                return false;
            }
        }
        true
    }
}

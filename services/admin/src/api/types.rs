//! Request and response bodies that are not domain records.
use crate::model::{Menu, PageResult, Pagination, QueryResult, Role, User};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct SystemInfo {
    pub service: String,
    pub api_version: String,
    pub storage_backend: String,
    pub durable_storage: bool,
    pub enforce: bool,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct HealthStatus {
    pub status: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
    pub request_id: Option<String>,
}

/// Paging parameters shared by list endpoints. Omitting both disables paging.
#[derive(Debug, Clone, Copy, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
pub struct PageQuery {
    /// 1-based page index.
    pub current: Option<u32>,
    /// Rows per page; `-1` returns every row with a total.
    pub page_size: Option<i64>,
}

impl PageQuery {
    pub fn pagination(&self) -> Option<Pagination> {
        match (self.current, self.page_size) {
            (None, None) => None,
            (current, page_size) => Some(Pagination::page(
                current.unwrap_or(1),
                page_size.unwrap_or(crate::model::query::DEFAULT_PAGE_SIZE),
            )),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
pub struct MenuListQuery {
    pub like_name: Option<String>,
    pub parent_id: Option<String>,
    pub prefix_parent_path: Option<String>,
    pub hidden: Option<bool>,
    /// Include actions and resources.
    #[serde(default)]
    pub include_children: bool,
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
pub struct RoleListQuery {
    pub name: Option<String>,
    pub like_name: Option<String>,
    pub user_id: Option<String>,
    /// Include menu grants.
    #[serde(default)]
    pub include_menus: bool,
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
pub struct UserListQuery {
    pub username: Option<String>,
    pub like_username: Option<String>,
    pub like_real_name: Option<String>,
    pub status: Option<crate::model::UserStatus>,
    /// Comma-separated role ids.
    pub role_ids: Option<String>,
    #[serde(default)]
    pub include_roles: bool,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct MenuListResponse {
    pub items: Vec<Menu>,
    pub page: Option<PageResult>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct RoleListResponse {
    pub items: Vec<Role>,
    pub page: Option<PageResult>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct UserListResponse {
    pub items: Vec<User>,
    pub page: Option<PageResult>,
}

impl From<QueryResult<Menu>> for MenuListResponse {
    fn from(result: QueryResult<Menu>) -> Self {
        Self {
            items: result.data,
            page: result.page,
        }
    }
}

impl From<QueryResult<Role>> for RoleListResponse {
    fn from(result: QueryResult<Role>) -> Self {
        Self {
            items: result.data,
            page: result.page,
        }
    }
}

impl From<QueryResult<User>> for UserListResponse {
    fn from(result: QueryResult<User>) -> Self {
        Self {
            items: result.data,
            page: result.page,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct PasswordChangeRequest {
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct CurrentPasswordRequest {
    pub old_password: String,
    pub new_password: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct PolicyCheckRequest {
    pub subject: String,
    pub path: String,
    pub method: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct PolicyCheckResponse {
    pub allowed: bool,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct PolicyRuleView {
    pub subject: String,
    pub path: String,
    pub method: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct MembershipView {
    pub user: String,
    pub role: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct PolicyRulesResponse {
    pub permissions: Vec<PolicyRuleView>,
    pub memberships: Vec<MembershipView>,
}

impl From<portcullis_authz::RuleSnapshot> for PolicyRulesResponse {
    fn from(snapshot: portcullis_authz::RuleSnapshot) -> Self {
        Self {
            permissions: snapshot
                .permissions
                .into_iter()
                .map(|rule| PolicyRuleView {
                    subject: rule.subject,
                    path: rule.path,
                    method: rule.method,
                })
                .collect(),
            memberships: snapshot
                .memberships
                .into_iter()
                .map(|edge| MembershipView {
                    user: edge.user,
                    role: edge.role,
                })
                .collect(),
        }
    }
}

//! Storage layer for menus, roles and users.
//!
//! # Purpose
//! Defines the [`Session`] trait every backend implements and the
//! [`AdminStore`] factory that hands sessions out.
//!
//! # Key invariants
//! - A session is either idle or holds exactly one open transaction.
//! - Writes issued while a transaction is open become visible to other
//!   sessions only after `commit`.
//! - Listings are ordered by `sequence` descending then insertion order
//!   descending.
use crate::model::{
    AncestorPath, Menu, MenuAction, MenuFilter, MenuResource, Pagination, QueryResult, Role,
    RoleFilter, RoleMenu, User, UserFilter, UserRole, UserStatus,
};
use async_trait::async_trait;
use thiserror::Error;

pub mod memory;
pub mod postgres;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("transaction state: {0}")]
    Transaction(&'static str),
    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait AdminStore: Send + Sync {
    /// Open an idle session.
    async fn session(&self) -> StoreResult<Box<dyn Session>>;
    async fn health_check(&self) -> StoreResult<()>;
    fn is_durable(&self) -> bool;
    fn backend_name(&self) -> &'static str;
}

#[async_trait]
pub trait Session: Send {
    fn in_transaction(&self) -> bool;
    async fn begin(&mut self) -> StoreResult<()>;
    async fn commit(&mut self) -> StoreResult<()>;
    async fn rollback(&mut self) -> StoreResult<()>;

    async fn query_menus(
        &mut self,
        filter: &MenuFilter,
        pagination: Option<Pagination>,
    ) -> StoreResult<QueryResult<Menu>>;
    async fn get_menu(&mut self, id: &str) -> StoreResult<Option<Menu>>;
    async fn create_menu(&mut self, menu: &Menu) -> StoreResult<()>;
    /// Rewrite every column except `id`, `creator` and `created_at`.
    async fn update_menu(&mut self, menu: &Menu) -> StoreResult<()>;
    async fn update_menu_parent_path(&mut self, id: &str, path: &AncestorPath)
    -> StoreResult<()>;
    async fn delete_menu(&mut self, id: &str) -> StoreResult<()>;

    async fn list_menu_actions(&mut self, menu_ids: &[String]) -> StoreResult<Vec<MenuAction>>;
    async fn create_menu_action(&mut self, action: &MenuAction) -> StoreResult<()>;
    async fn update_menu_action(&mut self, action: &MenuAction) -> StoreResult<()>;
    async fn delete_menu_action(&mut self, menu_id: &str, code: &str) -> StoreResult<()>;
    async fn delete_menu_actions(&mut self, menu_id: &str) -> StoreResult<()>;

    async fn list_menu_resources(&mut self, menu_ids: &[String])
    -> StoreResult<Vec<MenuResource>>;
    async fn create_menu_resource(&mut self, resource: &MenuResource) -> StoreResult<()>;
    async fn update_menu_resource(&mut self, resource: &MenuResource) -> StoreResult<()>;
    async fn delete_menu_resource(&mut self, menu_id: &str, code: &str) -> StoreResult<()>;
    async fn delete_menu_resources(&mut self, menu_id: &str) -> StoreResult<()>;

    async fn query_roles(
        &mut self,
        filter: &RoleFilter,
        pagination: Option<Pagination>,
    ) -> StoreResult<QueryResult<Role>>;
    async fn get_role(&mut self, id: &str) -> StoreResult<Option<Role>>;
    async fn create_role(&mut self, role: &Role) -> StoreResult<()>;
    async fn update_role(&mut self, role: &Role) -> StoreResult<()>;
    async fn delete_role(&mut self, id: &str) -> StoreResult<()>;

    async fn list_role_menus(&mut self, role_ids: &[String]) -> StoreResult<Vec<RoleMenu>>;
    /// Role ids holding a grant on `menu_id`.
    async fn roles_granting_menu(&mut self, menu_id: &str) -> StoreResult<Vec<String>>;
    async fn create_role_menu(&mut self, grant: &RoleMenu) -> StoreResult<()>;
    async fn update_role_menu(&mut self, grant: &RoleMenu) -> StoreResult<()>;
    async fn delete_role_menu(&mut self, role_id: &str, menu_id: &str) -> StoreResult<()>;
    async fn delete_role_menus(&mut self, role_id: &str) -> StoreResult<()>;

    async fn query_users(
        &mut self,
        filter: &UserFilter,
        pagination: Option<Pagination>,
    ) -> StoreResult<QueryResult<User>>;
    async fn get_user(&mut self, id: &str) -> StoreResult<Option<User>>;
    async fn create_user(&mut self, user: &User) -> StoreResult<()>;
    /// Profile columns only; password and status have their own setters.
    async fn update_user(&mut self, user: &User) -> StoreResult<()>;
    async fn update_user_status(&mut self, id: &str, status: UserStatus) -> StoreResult<()>;
    async fn update_user_password(&mut self, id: &str, password_hash: &str) -> StoreResult<()>;
    async fn delete_user(&mut self, id: &str) -> StoreResult<()>;

    async fn list_user_roles(&mut self, user_ids: &[String]) -> StoreResult<Vec<UserRole>>;
    async fn create_user_role(&mut self, edge: &UserRole) -> StoreResult<()>;
    async fn delete_user_role(&mut self, user_id: &str, role_id: &str) -> StoreResult<()>;
    async fn delete_user_roles(&mut self, user_id: &str) -> StoreResult<()>;
    async fn delete_role_users(&mut self, role_id: &str) -> StoreResult<()>;
}

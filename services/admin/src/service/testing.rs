//! Shared fixture for service tests: an in-memory store wired to a fresh engine.
use crate::context::OpContext;
use crate::model::{
    AncestorPath, Menu, MenuAction, MenuFilter, MenuResource, Pagination, QueryResult, Role,
    RoleFilter, RoleMenu, User, UserFilter, UserInput, UserRole, UserStatus,
};
use crate::service::{MenuService, PolicyProjector, RoleService, UserService};
use crate::store::{AdminStore, Session, StoreError, StoreResult};
use async_trait::async_trait;
use crate::store::memory::InMemoryStore;
use portcullis_authz::PolicyEngine;
use std::sync::Arc;

pub(crate) const ROOT: &str = "root";

pub(crate) struct Fixture {
    pub store: Arc<dyn AdminStore>,
    pub engine: Arc<PolicyEngine>,
    pub projector: PolicyProjector,
    pub menus: MenuService,
    pub roles: RoleService,
    pub users: UserService,
}

impl Fixture {
    pub async fn new() -> Self {
        let store: Arc<dyn AdminStore> = Arc::new(InMemoryStore::new());
        let engine = Arc::new(PolicyEngine::new().await.expect("engine"));
        let projector = PolicyProjector::new(engine.clone());
        Self {
            menus: MenuService::new(store.clone(), projector.clone()),
            roles: RoleService::new(store.clone(), projector.clone()),
            users: UserService::new(store.clone(), projector.clone(), ROOT),
            store,
            engine,
            projector,
        }
    }

    pub async fn user_with_roles(&self, ctx: &OpContext, username: &str, roles: &[&str]) -> User {
        self.users
            .create(
                ctx,
                UserInput {
                    username: username.to_string(),
                    real_name: username.to_string(),
                    password: "password".to_string(),
                    email: String::new(),
                    phone: String::new(),
                    status: UserStatus::Enabled,
                    role_ids: roles.iter().map(|role| role.to_string()).collect(),
                },
            )
            .await
            .expect("user")
    }
}

/// Store whose sessions fail `roles_granting_menu` and delegate everything else.
pub(crate) struct GrantLookupFails {
    pub inner: Arc<dyn AdminStore>,
}

#[async_trait]
impl AdminStore for GrantLookupFails {
    async fn session(&self) -> StoreResult<Box<dyn Session>> {
        Ok(Box::new(GrantLookupFailsSession {
            inner: self.inner.session().await?,
        }))
    }

    async fn health_check(&self) -> StoreResult<()> {
        self.inner.health_check().await
    }

    fn is_durable(&self) -> bool {
        self.inner.is_durable()
    }

    fn backend_name(&self) -> &'static str {
        self.inner.backend_name()
    }
}

struct GrantLookupFailsSession {
    inner: Box<dyn Session>,
}

#[async_trait]
impl Session for GrantLookupFailsSession {
    fn in_transaction(&self) -> bool {
        self.inner.in_transaction()
    }
    async fn begin(&mut self) -> StoreResult<()> {
        self.inner.begin().await
    }
    async fn commit(&mut self) -> StoreResult<()> {
        self.inner.commit().await
    }
    async fn rollback(&mut self) -> StoreResult<()> {
        self.inner.rollback().await
    }

    async fn query_menus(
        &mut self,
        filter: &MenuFilter,
        pagination: Option<Pagination>,
    ) -> StoreResult<QueryResult<Menu>> {
        self.inner.query_menus(filter, pagination).await
    }
    async fn get_menu(&mut self, id: &str) -> StoreResult<Option<Menu>> {
        self.inner.get_menu(id).await
    }
    async fn create_menu(&mut self, menu: &Menu) -> StoreResult<()> {
        self.inner.create_menu(menu).await
    }
    async fn update_menu(&mut self, menu: &Menu) -> StoreResult<()> {
        self.inner.update_menu(menu).await
    }
    async fn update_menu_parent_path(
        &mut self,
        id: &str,
        path: &AncestorPath,
    ) -> StoreResult<()> {
        self.inner.update_menu_parent_path(id, path).await
    }
    async fn delete_menu(&mut self, id: &str) -> StoreResult<()> {
        self.inner.delete_menu(id).await
    }

    async fn list_menu_actions(&mut self, menu_ids: &[String]) -> StoreResult<Vec<MenuAction>> {
        self.inner.list_menu_actions(menu_ids).await
    }
    async fn create_menu_action(&mut self, action: &MenuAction) -> StoreResult<()> {
        self.inner.create_menu_action(action).await
    }
    async fn update_menu_action(&mut self, action: &MenuAction) -> StoreResult<()> {
        self.inner.update_menu_action(action).await
    }
    async fn delete_menu_action(&mut self, menu_id: &str, code: &str) -> StoreResult<()> {
        self.inner.delete_menu_action(menu_id, code).await
    }
    async fn delete_menu_actions(&mut self, menu_id: &str) -> StoreResult<()> {
        self.inner.delete_menu_actions(menu_id).await
    }

    async fn list_menu_resources(
        &mut self,
        menu_ids: &[String],
    ) -> StoreResult<Vec<MenuResource>> {
        self.inner.list_menu_resources(menu_ids).await
    }
    async fn create_menu_resource(&mut self, resource: &MenuResource) -> StoreResult<()> {
        self.inner.create_menu_resource(resource).await
    }
    async fn update_menu_resource(&mut self, resource: &MenuResource) -> StoreResult<()> {
        self.inner.update_menu_resource(resource).await
    }
    async fn delete_menu_resource(&mut self, menu_id: &str, code: &str) -> StoreResult<()> {
        self.inner.delete_menu_resource(menu_id, code).await
    }
    async fn delete_menu_resources(&mut self, menu_id: &str) -> StoreResult<()> {
        self.inner.delete_menu_resources(menu_id).await
    }

    async fn query_roles(
        &mut self,
        filter: &RoleFilter,
        pagination: Option<Pagination>,
    ) -> StoreResult<QueryResult<Role>> {
        self.inner.query_roles(filter, pagination).await
    }
    async fn get_role(&mut self, id: &str) -> StoreResult<Option<Role>> {
        self.inner.get_role(id).await
    }
    async fn create_role(&mut self, role: &Role) -> StoreResult<()> {
        self.inner.create_role(role).await
    }
    async fn update_role(&mut self, role: &Role) -> StoreResult<()> {
        self.inner.update_role(role).await
    }
    async fn delete_role(&mut self, id: &str) -> StoreResult<()> {
        self.inner.delete_role(id).await
    }

    async fn list_role_menus(&mut self, role_ids: &[String]) -> StoreResult<Vec<RoleMenu>> {
        self.inner.list_role_menus(role_ids).await
    }
    async fn roles_granting_menu(&mut self, _menu_id: &str) -> StoreResult<Vec<String>> {
        Err(StoreError::Unexpected(anyhow::anyhow!("list granting roles: connection reset")))
    }
    async fn create_role_menu(&mut self, grant: &RoleMenu) -> StoreResult<()> {
        self.inner.create_role_menu(grant).await
    }
    async fn update_role_menu(&mut self, grant: &RoleMenu) -> StoreResult<()> {
        self.inner.update_role_menu(grant).await
    }
    async fn delete_role_menu(&mut self, role_id: &str, menu_id: &str) -> StoreResult<()> {
        self.inner.delete_role_menu(role_id, menu_id).await
    }
    async fn delete_role_menus(&mut self, role_id: &str) -> StoreResult<()> {
        self.inner.delete_role_menus(role_id).await
    }

    async fn query_users(
        &mut self,
        filter: &UserFilter,
        pagination: Option<Pagination>,
    ) -> StoreResult<QueryResult<User>> {
        self.inner.query_users(filter, pagination).await
    }
    async fn get_user(&mut self, id: &str) -> StoreResult<Option<User>> {
        self.inner.get_user(id).await
    }
    async fn create_user(&mut self, user: &User) -> StoreResult<()> {
        self.inner.create_user(user).await
    }
    async fn update_user(&mut self, user: &User) -> StoreResult<()> {
        self.inner.update_user(user).await
    }
    async fn update_user_status(&mut self, id: &str, status: UserStatus) -> StoreResult<()> {
        self.inner.update_user_status(id, status).await
    }
    async fn update_user_password(&mut self, id: &str, password_hash: &str) -> StoreResult<()> {
        self.inner.update_user_password(id, password_hash).await
    }
    async fn delete_user(&mut self, id: &str) -> StoreResult<()> {
        self.inner.delete_user(id).await
    }

    async fn list_user_roles(&mut self, user_ids: &[String]) -> StoreResult<Vec<UserRole>> {
        self.inner.list_user_roles(user_ids).await
    }
    async fn create_user_role(&mut self, edge: &UserRole) -> StoreResult<()> {
        self.inner.create_user_role(edge).await
    }
    async fn delete_user_role(&mut self, user_id: &str, role_id: &str) -> StoreResult<()> {
        self.inner.delete_user_role(user_id, role_id).await
    }
    async fn delete_user_roles(&mut self, user_id: &str) -> StoreResult<()> {
        self.inner.delete_user_roles(user_id).await
    }
    async fn delete_role_users(&mut self, role_id: &str) -> StoreResult<()> {
        self.inner.delete_role_users(role_id).await
    }
}

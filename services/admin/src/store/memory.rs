//! In-memory implementation of the admin store.
//!
//! # Purpose
//! Keeps every table in process memory behind one `tokio::sync::RwLock`. It
//! backs local runs and the test suite, and mirrors the Postgres backend's
//! ordering, uniqueness and transaction semantics.
//!
//! # Transactions
//! `begin` takes the write lock for the life of the transaction and works on
//! a copy of the tables. `commit` swaps the copy in; `rollback` (or dropping
//! the session) discards it. Other sessions block until the lock is released,
//! so uncommitted writes are never visible.
//!
//! # Durability
//! Not durable: all state is lost on process restart.
use super::{AdminStore, Session, StoreError, StoreResult};
use crate::model::tree::sibling_order;
use crate::model::{
    AncestorPath, Menu, MenuAction, MenuFilter, MenuResource, Pagination, QueryResult, Role,
    RoleFilter, RoleMenu, User, UserFilter, UserRole, UserStatus,
};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{OwnedRwLockWriteGuard, RwLock};

#[derive(Debug, Clone, Default)]
struct Tables {
    next_row_id: i64,
    menus: HashMap<String, Menu>,
    menu_actions: Vec<MenuAction>,
    menu_resources: Vec<MenuResource>,
    roles: HashMap<String, Role>,
    role_menus: Vec<RoleMenu>,
    users: HashMap<String, User>,
    user_roles: Vec<UserRole>,
}

impl Tables {
    fn next_row_id(&mut self) -> i64 {
        self.next_row_id += 1;
        self.next_row_id
    }

    fn query_menus(&self, filter: &MenuFilter, pagination: Option<Pagination>) -> QueryResult<Menu> {
        let mut rows: Vec<Menu> = self
            .menus
            .values()
            .filter(|menu| filter.matches(menu))
            .cloned()
            .collect();
        rows.sort_by(sibling_order);
        QueryResult::paginate(rows, pagination)
    }

    fn create_menu(&mut self, menu: &Menu) -> StoreResult<()> {
        if self.menus.contains_key(&menu.id) {
            return Err(StoreError::Conflict(format!("menu {} exists", menu.id)));
        }
        let mut row = bare_menu(menu);
        row.row_id = self.next_row_id();
        self.menus.insert(row.id.clone(), row);
        Ok(())
    }

    fn update_menu(&mut self, menu: &Menu) -> StoreResult<()> {
        let row = self
            .menus
            .get_mut(&menu.id)
            .ok_or_else(|| StoreError::NotFound(format!("menu {}", menu.id)))?;
        row.name = menu.name.clone();
        row.sequence = menu.sequence;
        row.icon = menu.icon.clone();
        row.router = menu.router.clone();
        row.hidden = menu.hidden;
        row.parent_id = menu.parent_id.clone();
        row.parent_path = menu.parent_path.clone();
        row.updated_at = menu.updated_at;
        Ok(())
    }

    fn update_menu_parent_path(&mut self, id: &str, path: &AncestorPath) -> StoreResult<()> {
        let row = self
            .menus
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(format!("menu {id}")))?;
        row.parent_path = path.clone();
        Ok(())
    }

    fn create_menu_action(&mut self, action: &MenuAction) -> StoreResult<()> {
        if self
            .menu_actions
            .iter()
            .any(|item| item.menu_id == action.menu_id && item.code == action.code)
        {
            return Err(StoreError::Conflict(format!(
                "action {} exists on menu {}",
                action.code, action.menu_id
            )));
        }
        self.menu_actions.push(action.clone());
        Ok(())
    }

    fn update_menu_action(&mut self, action: &MenuAction) -> StoreResult<()> {
        let row = self
            .menu_actions
            .iter_mut()
            .find(|item| item.menu_id == action.menu_id && item.code == action.code)
            .ok_or_else(|| StoreError::NotFound(format!("action {}", action.code)))?;
        row.name = action.name.clone();
        Ok(())
    }

    fn create_menu_resource(&mut self, resource: &MenuResource) -> StoreResult<()> {
        if self
            .menu_resources
            .iter()
            .any(|item| item.menu_id == resource.menu_id && item.code == resource.code)
        {
            return Err(StoreError::Conflict(format!(
                "resource {} exists on menu {}",
                resource.code, resource.menu_id
            )));
        }
        self.menu_resources.push(resource.clone());
        Ok(())
    }

    fn update_menu_resource(&mut self, resource: &MenuResource) -> StoreResult<()> {
        let row = self
            .menu_resources
            .iter_mut()
            .find(|item| item.menu_id == resource.menu_id && item.code == resource.code)
            .ok_or_else(|| StoreError::NotFound(format!("resource {}", resource.code)))?;
        row.name = resource.name.clone();
        row.method = resource.method.clone();
        row.path = resource.path.clone();
        Ok(())
    }

    fn query_roles(&self, filter: &RoleFilter, pagination: Option<Pagination>) -> QueryResult<Role> {
        let assigned: Option<HashSet<&str>> = filter.user_id.as_ref().map(|user_id| {
            self.user_roles
                .iter()
                .filter(|edge| &edge.user_id == user_id)
                .map(|edge| edge.role_id.as_str())
                .collect()
        });
        let mut rows: Vec<Role> = self
            .roles
            .values()
            .filter(|role| filter.matches(role))
            .filter(|role| {
                assigned
                    .as_ref()
                    .is_none_or(|ids| ids.contains(role.id.as_str()))
            })
            .cloned()
            .collect();
        rows.sort_by(|a, b| {
            b.sequence
                .cmp(&a.sequence)
                .then_with(|| b.row_id.cmp(&a.row_id))
        });
        QueryResult::paginate(rows, pagination)
    }

    fn create_role(&mut self, role: &Role) -> StoreResult<()> {
        if self.roles.contains_key(&role.id) {
            return Err(StoreError::Conflict(format!("role {} exists", role.id)));
        }
        if self.roles.values().any(|row| row.name == role.name) {
            return Err(StoreError::Conflict(format!("role name {} exists", role.name)));
        }
        let mut row = role.clone();
        row.menus.clear();
        row.row_id = self.next_row_id();
        self.roles.insert(row.id.clone(), row);
        Ok(())
    }

    fn update_role(&mut self, role: &Role) -> StoreResult<()> {
        if self
            .roles
            .values()
            .any(|row| row.name == role.name && row.id != role.id)
        {
            return Err(StoreError::Conflict(format!("role name {} exists", role.name)));
        }
        let row = self
            .roles
            .get_mut(&role.id)
            .ok_or_else(|| StoreError::NotFound(format!("role {}", role.id)))?;
        row.name = role.name.clone();
        row.sequence = role.sequence;
        row.memo = role.memo.clone();
        row.updated_at = role.updated_at;
        Ok(())
    }

    fn create_role_menu(&mut self, grant: &RoleMenu) -> StoreResult<()> {
        if self
            .role_menus
            .iter()
            .any(|item| item.role_id == grant.role_id && item.menu_id == grant.menu_id)
        {
            return Err(StoreError::Conflict(format!(
                "grant {} exists on role {}",
                grant.menu_id, grant.role_id
            )));
        }
        self.role_menus.push(grant.clone());
        Ok(())
    }

    fn update_role_menu(&mut self, grant: &RoleMenu) -> StoreResult<()> {
        let row = self
            .role_menus
            .iter_mut()
            .find(|item| item.role_id == grant.role_id && item.menu_id == grant.menu_id)
            .ok_or_else(|| StoreError::NotFound(format!("grant {}", grant.menu_id)))?;
        row.actions = grant.actions.clone();
        row.resources = grant.resources.clone();
        Ok(())
    }

    fn query_users(&self, filter: &UserFilter, pagination: Option<Pagination>) -> QueryResult<User> {
        let holders: Option<HashSet<&str>> = filter.role_ids.as_ref().map(|role_ids| {
            self.user_roles
                .iter()
                .filter(|edge| role_ids.contains(&edge.role_id))
                .map(|edge| edge.user_id.as_str())
                .collect()
        });
        let mut rows: Vec<User> = self
            .users
            .values()
            .filter(|user| filter.matches(user))
            .filter(|user| {
                holders
                    .as_ref()
                    .is_none_or(|ids| ids.contains(user.id.as_str()))
            })
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.row_id.cmp(&a.row_id));
        QueryResult::paginate(rows, pagination)
    }

    fn create_user(&mut self, user: &User) -> StoreResult<()> {
        if self.users.contains_key(&user.id) {
            return Err(StoreError::Conflict(format!("user {} exists", user.id)));
        }
        if self.users.values().any(|row| row.username == user.username) {
            return Err(StoreError::Conflict(format!(
                "username {} exists",
                user.username
            )));
        }
        let mut row = user.clone();
        row.roles.clear();
        row.row_id = self.next_row_id();
        self.users.insert(row.id.clone(), row);
        Ok(())
    }

    fn update_user(&mut self, user: &User) -> StoreResult<()> {
        if self
            .users
            .values()
            .any(|row| row.username == user.username && row.id != user.id)
        {
            return Err(StoreError::Conflict(format!(
                "username {} exists",
                user.username
            )));
        }
        let row = self.user_mut(&user.id)?;
        row.username = user.username.clone();
        row.real_name = user.real_name.clone();
        row.email = user.email.clone();
        row.phone = user.phone.clone();
        row.updated_at = user.updated_at;
        Ok(())
    }

    fn user_mut(&mut self, id: &str) -> StoreResult<&mut User> {
        self.users
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(format!("user {id}")))
    }

    fn create_user_role(&mut self, edge: &UserRole) -> StoreResult<()> {
        if self.user_roles.contains(edge) {
            return Err(StoreError::Conflict(format!(
                "user {} already holds role {}",
                edge.user_id, edge.role_id
            )));
        }
        self.user_roles.push(edge.clone());
        Ok(())
    }
}

fn bare_menu(menu: &Menu) -> Menu {
    let mut row = menu.clone();
    row.actions.clear();
    row.resources.clear();
    row
}

struct MemoryTx {
    guard: OwnedRwLockWriteGuard<Tables>,
    working: Tables,
}

/// Non-durable store shared by every session it hands out.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AdminStore for InMemoryStore {
    async fn session(&self) -> StoreResult<Box<dyn Session>> {
        Ok(Box::new(MemorySession {
            tables: self.tables.clone(),
            tx: None,
        }))
    }

    async fn health_check(&self) -> StoreResult<()> {
        Ok(())
    }

    fn is_durable(&self) -> bool {
        false
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

pub struct MemorySession {
    tables: Arc<RwLock<Tables>>,
    tx: Option<MemoryTx>,
}

impl MemorySession {
    async fn read<R, F>(&self, f: F) -> R
    where
        F: FnOnce(&Tables) -> R + Send,
    {
        if let Some(tx) = &self.tx {
            return f(&tx.working);
        }
        let tables = self.tables.read().await;
        f(&tables)
    }

    async fn write<R, F>(&mut self, f: F) -> StoreResult<R>
    where
        F: FnOnce(&mut Tables) -> StoreResult<R> + Send,
    {
        if let Some(tx) = &mut self.tx {
            return f(&mut tx.working);
        }
        let mut tables = self.tables.write().await;
        f(&mut tables)
    }
}

#[async_trait]
impl Session for MemorySession {
    fn in_transaction(&self) -> bool {
        self.tx.is_some()
    }

    async fn begin(&mut self) -> StoreResult<()> {
        if self.tx.is_some() {
            return Err(StoreError::Transaction("transaction already open"));
        }
        let guard = self.tables.clone().write_owned().await;
        let working = guard.clone();
        self.tx = Some(MemoryTx { guard, working });
        Ok(())
    }

    async fn commit(&mut self) -> StoreResult<()> {
        let MemoryTx { mut guard, working } = self
            .tx
            .take()
            .ok_or(StoreError::Transaction("no open transaction"))?;
        *guard = working;
        Ok(())
    }

    async fn rollback(&mut self) -> StoreResult<()> {
        self.tx
            .take()
            .map(|_| ())
            .ok_or(StoreError::Transaction("no open transaction"))
    }

    async fn query_menus(
        &mut self,
        filter: &MenuFilter,
        pagination: Option<Pagination>,
    ) -> StoreResult<QueryResult<Menu>> {
        Ok(self.read(|t| t.query_menus(filter, pagination)).await)
    }

    async fn get_menu(&mut self, id: &str) -> StoreResult<Option<Menu>> {
        Ok(self.read(|t| t.menus.get(id).cloned()).await)
    }

    async fn create_menu(&mut self, menu: &Menu) -> StoreResult<()> {
        self.write(|t| t.create_menu(menu)).await
    }

    async fn update_menu(&mut self, menu: &Menu) -> StoreResult<()> {
        self.write(|t| t.update_menu(menu)).await
    }

    async fn update_menu_parent_path(
        &mut self,
        id: &str,
        path: &AncestorPath,
    ) -> StoreResult<()> {
        self.write(|t| t.update_menu_parent_path(id, path)).await
    }

    async fn delete_menu(&mut self, id: &str) -> StoreResult<()> {
        self.write(|t| {
            t.menus.remove(id);
            Ok(())
        })
        .await
    }

    async fn list_menu_actions(&mut self, menu_ids: &[String]) -> StoreResult<Vec<MenuAction>> {
        Ok(self
            .read(|t| {
                t.menu_actions
                    .iter()
                    .filter(|item| menu_ids.contains(&item.menu_id))
                    .cloned()
                    .collect()
            })
            .await)
    }

    async fn create_menu_action(&mut self, action: &MenuAction) -> StoreResult<()> {
        self.write(|t| t.create_menu_action(action)).await
    }

    async fn update_menu_action(&mut self, action: &MenuAction) -> StoreResult<()> {
        self.write(|t| t.update_menu_action(action)).await
    }

    async fn delete_menu_action(&mut self, menu_id: &str, code: &str) -> StoreResult<()> {
        self.write(|t| {
            t.menu_actions
                .retain(|item| !(item.menu_id == menu_id && item.code == code));
            Ok(())
        })
        .await
    }

    async fn delete_menu_actions(&mut self, menu_id: &str) -> StoreResult<()> {
        self.write(|t| {
            t.menu_actions.retain(|item| item.menu_id != menu_id);
            Ok(())
        })
        .await
    }

    async fn list_menu_resources(
        &mut self,
        menu_ids: &[String],
    ) -> StoreResult<Vec<MenuResource>> {
        Ok(self
            .read(|t| {
                t.menu_resources
                    .iter()
                    .filter(|item| menu_ids.contains(&item.menu_id))
                    .cloned()
                    .collect()
            })
            .await)
    }

    async fn create_menu_resource(&mut self, resource: &MenuResource) -> StoreResult<()> {
        self.write(|t| t.create_menu_resource(resource)).await
    }

    async fn update_menu_resource(&mut self, resource: &MenuResource) -> StoreResult<()> {
        self.write(|t| t.update_menu_resource(resource)).await
    }

    async fn delete_menu_resource(&mut self, menu_id: &str, code: &str) -> StoreResult<()> {
        self.write(|t| {
            t.menu_resources
                .retain(|item| !(item.menu_id == menu_id && item.code == code));
            Ok(())
        })
        .await
    }

    async fn delete_menu_resources(&mut self, menu_id: &str) -> StoreResult<()> {
        self.write(|t| {
            t.menu_resources.retain(|item| item.menu_id != menu_id);
            Ok(())
        })
        .await
    }

    async fn query_roles(
        &mut self,
        filter: &RoleFilter,
        pagination: Option<Pagination>,
    ) -> StoreResult<QueryResult<Role>> {
        Ok(self.read(|t| t.query_roles(filter, pagination)).await)
    }

    async fn get_role(&mut self, id: &str) -> StoreResult<Option<Role>> {
        Ok(self.read(|t| t.roles.get(id).cloned()).await)
    }

    async fn create_role(&mut self, role: &Role) -> StoreResult<()> {
        self.write(|t| t.create_role(role)).await
    }

    async fn update_role(&mut self, role: &Role) -> StoreResult<()> {
        self.write(|t| t.update_role(role)).await
    }

    async fn delete_role(&mut self, id: &str) -> StoreResult<()> {
        self.write(|t| {
            t.roles.remove(id);
            Ok(())
        })
        .await
    }

    async fn list_role_menus(&mut self, role_ids: &[String]) -> StoreResult<Vec<RoleMenu>> {
        Ok(self
            .read(|t| {
                t.role_menus
                    .iter()
                    .filter(|grant| role_ids.contains(&grant.role_id))
                    .cloned()
                    .collect()
            })
            .await)
    }

    async fn roles_granting_menu(&mut self, menu_id: &str) -> StoreResult<Vec<String>> {
        Ok(self
            .read(|t| {
                t.role_menus
                    .iter()
                    .filter(|grant| grant.menu_id == menu_id)
                    .map(|grant| grant.role_id.clone())
                    .collect()
            })
            .await)
    }

    async fn create_role_menu(&mut self, grant: &RoleMenu) -> StoreResult<()> {
        self.write(|t| t.create_role_menu(grant)).await
    }

    async fn update_role_menu(&mut self, grant: &RoleMenu) -> StoreResult<()> {
        self.write(|t| t.update_role_menu(grant)).await
    }

    async fn delete_role_menu(&mut self, role_id: &str, menu_id: &str) -> StoreResult<()> {
        self.write(|t| {
            t.role_menus
                .retain(|grant| !(grant.role_id == role_id && grant.menu_id == menu_id));
            Ok(())
        })
        .await
    }

    async fn delete_role_menus(&mut self, role_id: &str) -> StoreResult<()> {
        self.write(|t| {
            t.role_menus.retain(|grant| grant.role_id != role_id);
            Ok(())
        })
        .await
    }

    async fn query_users(
        &mut self,
        filter: &UserFilter,
        pagination: Option<Pagination>,
    ) -> StoreResult<QueryResult<User>> {
        Ok(self.read(|t| t.query_users(filter, pagination)).await)
    }

    async fn get_user(&mut self, id: &str) -> StoreResult<Option<User>> {
        Ok(self.read(|t| t.users.get(id).cloned()).await)
    }

    async fn create_user(&mut self, user: &User) -> StoreResult<()> {
        self.write(|t| t.create_user(user)).await
    }

    async fn update_user(&mut self, user: &User) -> StoreResult<()> {
        self.write(|t| t.update_user(user)).await
    }

    async fn update_user_status(&mut self, id: &str, status: UserStatus) -> StoreResult<()> {
        self.write(|t| {
            t.user_mut(id)?.status = status;
            Ok(())
        })
        .await
    }

    async fn update_user_password(&mut self, id: &str, password_hash: &str) -> StoreResult<()> {
        self.write(|t| {
            t.user_mut(id)?.password_hash = password_hash.to_string();
            Ok(())
        })
        .await
    }

    async fn delete_user(&mut self, id: &str) -> StoreResult<()> {
        self.write(|t| {
            t.users.remove(id);
            Ok(())
        })
        .await
    }

    async fn list_user_roles(&mut self, user_ids: &[String]) -> StoreResult<Vec<UserRole>> {
        Ok(self
            .read(|t| {
                t.user_roles
                    .iter()
                    .filter(|edge| user_ids.contains(&edge.user_id))
                    .cloned()
                    .collect()
            })
            .await)
    }

    async fn create_user_role(&mut self, edge: &UserRole) -> StoreResult<()> {
        self.write(|t| t.create_user_role(edge)).await
    }

    async fn delete_user_role(&mut self, user_id: &str, role_id: &str) -> StoreResult<()> {
        self.write(|t| {
            t.user_roles
                .retain(|edge| !(edge.user_id == user_id && edge.role_id == role_id));
            Ok(())
        })
        .await
    }

    async fn delete_user_roles(&mut self, user_id: &str) -> StoreResult<()> {
        self.write(|t| {
            t.user_roles.retain(|edge| edge.user_id != user_id);
            Ok(())
        })
        .await
    }

    async fn delete_role_users(&mut self, role_id: &str) -> StoreResult<()> {
        self.write(|t| {
            t.user_roles.retain(|edge| edge.role_id != role_id);
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn menu(id: &str, parent_path: &str, sequence: i32) -> Menu {
        let path = AncestorPath::parse(parent_path);
        Menu {
            id: id.to_string(),
            name: format!("menu {id}"),
            sequence,
            icon: String::new(),
            router: String::new(),
            hidden: false,
            parent_id: path.ids().last().cloned().unwrap_or_default(),
            parent_path: path,
            creator: String::new(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            row_id: 0,
            actions: Vec::new(),
            resources: Vec::new(),
        }
    }

    #[tokio::test]
    async fn rollback_discards_writes() {
        let store = InMemoryStore::new();
        let mut session = store.session().await.expect("session");
        session.begin().await.expect("begin");
        session.create_menu(&menu("m1", "", 0)).await.expect("create");
        assert!(session.get_menu("m1").await.expect("get").is_some());
        session.rollback().await.expect("rollback");
        assert!(session.get_menu("m1").await.expect("get").is_none());
    }

    #[tokio::test]
    async fn committed_writes_are_visible_to_other_sessions() {
        let store = InMemoryStore::new();
        let mut writer = store.session().await.expect("session");
        writer.begin().await.expect("begin");
        writer.create_menu(&menu("m1", "", 0)).await.expect("create");
        writer.commit().await.expect("commit");

        let mut reader = store.session().await.expect("session");
        assert!(reader.get_menu("m1").await.expect("get").is_some());
    }

    #[tokio::test]
    async fn dropped_transaction_leaves_no_trace() {
        let store = InMemoryStore::new();
        {
            let mut session = store.session().await.expect("session");
            session.begin().await.expect("begin");
            session.create_menu(&menu("m1", "", 0)).await.expect("create");
        }
        let mut session = store.session().await.expect("session");
        assert!(session.get_menu("m1").await.expect("get").is_none());
    }

    #[tokio::test]
    async fn menus_sort_by_sequence_then_insertion() {
        let store = InMemoryStore::new();
        let mut session = store.session().await.expect("session");
        session.create_menu(&menu("a", "", 1)).await.expect("a");
        session.create_menu(&menu("b", "", 3)).await.expect("b");
        session.create_menu(&menu("c", "", 1)).await.expect("c");
        let result = session
            .query_menus(&MenuFilter::default(), None)
            .await
            .expect("query");
        let ids: Vec<&str> = result.data.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c", "a"]);
    }

    #[tokio::test]
    async fn subtree_filter_matches_whole_segments() {
        let store = InMemoryStore::new();
        let mut session = store.session().await.expect("session");
        session.create_menu(&menu("m2", "m1", 0)).await.expect("m2");
        session.create_menu(&menu("m3", "m1/m2", 0)).await.expect("m3");
        session.create_menu(&menu("x", "m1/m22", 0)).await.expect("x");
        let result = session
            .query_menus(&MenuFilter::subtree(AncestorPath::parse("m1/m2")), None)
            .await
            .expect("query");
        let ids: Vec<&str> = result.data.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["m3"]);
    }

    #[tokio::test]
    async fn duplicate_child_codes_conflict() {
        let store = InMemoryStore::new();
        let mut session = store.session().await.expect("session");
        let action = MenuAction {
            menu_id: "m1".to_string(),
            code: "add".to_string(),
            name: "Add".to_string(),
        };
        session.create_menu_action(&action).await.expect("first");
        assert!(matches!(
            session.create_menu_action(&action).await,
            Err(StoreError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn nested_begin_is_rejected() {
        let store = InMemoryStore::new();
        let mut session = store.session().await.expect("session");
        session.begin().await.expect("begin");
        assert!(matches!(
            session.begin().await,
            Err(StoreError::Transaction(_))
        ));
        session.rollback().await.expect("rollback");
        assert!(session.commit().await.is_err());
    }
}

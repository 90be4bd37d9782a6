//! Postgres-backed implementation of the admin store.
//!
//! # What this module is
//! Implements [`AdminStore`] and [`Session`] on top of `sqlx` for durable,
//! shared deployments. Seven tables back the domain: `menus`, `menu_actions`,
//! `menu_resources`, `roles`, `role_menus`, `users` and `user_roles`.
//!
//! # Key invariants
//! - `menus.parent_path` holds the slash-joined ancestor ids; subtree lookups
//!   match `parent_path = p OR parent_path LIKE p || '/%'` so a prefix never
//!   matches half an id.
//! - `role_menus.actions` and `role_menus.resources` hold comma-joined codes.
//! - Every entity table carries a `row_id BIGSERIAL` used as the insertion
//!   order tie-breaker in listings.
//!
//! # Concurrency model
//! - Idle sessions borrow a pooled connection per call.
//! - A session with an open transaction routes every call through it; isolation
//!   and lock waits are Postgres' own.
//!
//! # Operational notes
//! - Migrations run at startup via `sqlx::migrate!("./migrations")`.
//! - Database URLs may contain credentials; they are never logged.
use super::{AdminStore, Session, StoreError, StoreResult};
use crate::config::PostgresConfig;
use crate::model::role::{join_codes, split_codes};
use crate::model::{
    AncestorPath, Menu, MenuAction, MenuFilter, MenuResource, Pagination, QueryResult, Role,
    RoleFilter, RoleMenu, User, UserFilter, UserRole, UserStatus,
};
use anyhow::{Context, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::pool::PoolConnection;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{FromRow, PgConnection, PgPool, Postgres, QueryBuilder, Transaction};
use std::ops::{Deref, DerefMut};
use std::str::FromStr;
use std::time::Duration;

const MENU_COLUMNS: &str = "row_id, id, name, sequence, icon, router, hidden, parent_id, \
     parent_path, creator, created_at, updated_at";
const ROLE_COLUMNS: &str = "row_id, id, name, sequence, memo, creator, created_at, updated_at";
const USER_COLUMNS: &str = "row_id, id, username, real_name, password_hash, email, phone, \
     status, creator, created_at, updated_at";

/// Durable admin store backed by Postgres.
///
/// # Example
/// ```rust,no_run
/// use admin::config::PostgresConfig;
/// use admin::store::postgres::PostgresStore;
///
/// async fn open(pg: PostgresConfig) {
///     let _ = PostgresStore::connect(&pg).await;
/// }
/// ```
pub struct PostgresStore {
    pool: PgPool,
}

#[derive(Debug, Clone, FromRow)]
struct DbMenu {
    row_id: i64,
    id: String,
    name: String,
    sequence: i32,
    icon: String,
    router: String,
    hidden: bool,
    parent_id: String,
    parent_path: String,
    creator: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
struct DbMenuAction {
    menu_id: String,
    code: String,
    name: String,
}

#[derive(Debug, Clone, FromRow)]
struct DbMenuResource {
    menu_id: String,
    code: String,
    name: String,
    method: String,
    path: String,
}

#[derive(Debug, Clone, FromRow)]
struct DbRole {
    row_id: i64,
    id: String,
    name: String,
    sequence: i32,
    memo: String,
    creator: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// Grant row; code lists are stored comma-joined.
#[derive(Debug, Clone, FromRow)]
struct DbRoleMenu {
    role_id: String,
    menu_id: String,
    actions: String,
    resources: String,
}

#[derive(Debug, Clone, FromRow)]
struct DbUser {
    row_id: i64,
    id: String,
    username: String,
    real_name: String,
    password_hash: String,
    email: String,
    phone: String,
    status: i16,
    creator: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
struct DbUserRole {
    user_id: String,
    role_id: String,
}

impl PostgresStore {
    /// Connect to Postgres and apply embedded migrations.
    ///
    /// # Errors
    /// - Connection, migration, or pool setup failures.
    pub async fn connect(pg: &PostgresConfig) -> StoreResult<Self> {
        Self::connect_internal(pg, true).await
    }

    /// Connect without running migrations, for tests that manage the schema.
    #[cfg(any(test, feature = "pg-tests"))]
    pub async fn connect_without_migrations(pg: &PostgresConfig) -> StoreResult<Self> {
        Self::connect_internal(pg, false).await
    }

    async fn connect_internal(pg: &PostgresConfig, run_migrations: bool) -> StoreResult<Self> {
        // Bound both physical connects and pool waits so a dead database fails fast.
        let connect_options =
            PgConnectOptions::from_str(&pg.url).context("parse postgres connection url")?;
        let connect = PgPoolOptions::new()
            .max_connections(pg.max_connections)
            .acquire_timeout(Duration::from_millis(pg.acquire_timeout_ms))
            .connect_with(connect_options);
        let pool = tokio::time::timeout(Duration::from_millis(pg.connect_timeout_ms), connect)
            .await
            .map_err(|_| anyhow!("connect postgres pool: timed out"))?
            .context("connect postgres pool")?;

        if run_migrations {
            sqlx::migrate!("./migrations")
                .run(&pool)
                .await
                .context("run migrations")?;
        }

        Ok(Self { pool })
    }
}

#[async_trait]
impl AdminStore for PostgresStore {
    async fn session(&self) -> StoreResult<Box<dyn Session>> {
        Ok(Box::new(PgSession {
            pool: self.pool.clone(),
            tx: None,
        }))
    }

    async fn health_check(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(db_err("health check"))?;
        Ok(())
    }

    fn is_durable(&self) -> bool {
        true
    }

    fn backend_name(&self) -> &'static str {
        "postgres"
    }
}

pub struct PgSession {
    pool: PgPool,
    tx: Option<Transaction<'static, Postgres>>,
}

/// Connection a statement runs on: the open transaction, or a pooled one.
enum Conn<'a> {
    Tx(&'a mut PgConnection),
    Pooled(PoolConnection<Postgres>),
}

impl Deref for Conn<'_> {
    type Target = PgConnection;

    fn deref(&self) -> &PgConnection {
        match self {
            Conn::Tx(conn) => &**conn,
            Conn::Pooled(conn) => &**conn,
        }
    }
}

impl DerefMut for Conn<'_> {
    fn deref_mut(&mut self) -> &mut PgConnection {
        match self {
            Conn::Tx(conn) => &mut **conn,
            Conn::Pooled(conn) => &mut **conn,
        }
    }
}

impl PgSession {
    async fn conn(&mut self) -> StoreResult<Conn<'_>> {
        match &mut self.tx {
            Some(tx) => Ok(Conn::Tx(&mut **tx)),
            None => {
                let conn = self.pool.acquire().await.map_err(db_err("acquire connection"))?;
                Ok(Conn::Pooled(conn))
            }
        }
    }

    async fn execute(
        &mut self,
        op: &'static str,
        query: sqlx::query::Query<'_, Postgres, sqlx::postgres::PgArguments>,
    ) -> StoreResult<u64> {
        let mut conn = self.conn().await?;
        let result = query.execute(&mut *conn).await.map_err(db_err(op))?;
        Ok(result.rows_affected())
    }

    /// Like [`Self::execute`], reporting `NotFound` when no row matched.
    async fn execute_one(
        &mut self,
        op: &'static str,
        what: String,
        query: sqlx::query::Query<'_, Postgres, sqlx::postgres::PgArguments>,
    ) -> StoreResult<()> {
        if self.execute(op, query).await? == 0 {
            return Err(StoreError::NotFound(what));
        }
        Ok(())
    }

    async fn paged<T, Db, F>(
        &mut self,
        op: &'static str,
        table: &'static str,
        columns: &'static str,
        order: &'static str,
        push_filter: F,
        pagination: Option<Pagination>,
    ) -> StoreResult<QueryResult<T>>
    where
        Db: for<'r> FromRow<'r, sqlx::postgres::PgRow> + Send + Unpin,
        F: Fn(&mut QueryBuilder<'static, Postgres>) + Send + Sync,
        T: TryFrom<Db, Error = StoreError>,
    {
        let mut conn = self.conn().await?;
        let total = match pagination {
            Some(_) => {
                let mut count = QueryBuilder::new(format!("SELECT COUNT(*) FROM {table} WHERE TRUE"));
                push_filter(&mut count);
                let total = count
                    .build_query_scalar::<i64>()
                    .fetch_one(&mut *conn)
                    .await
                    .map_err(db_err(op))?;
                total.max(0) as u64
            }
            None => 0,
        };

        let mut select = QueryBuilder::new(format!("SELECT {columns} FROM {table} WHERE TRUE"));
        push_filter(&mut select);
        select.push(format!(" ORDER BY {order}"));
        if let Some((offset, limit)) = pagination.and_then(|p| p.window()) {
            select.push(" LIMIT ");
            select.push_bind(limit as i64);
            select.push(" OFFSET ");
            select.push_bind(offset as i64);
        }
        let rows: Vec<Db> = select
            .build_query_as()
            .fetch_all(&mut *conn)
            .await
            .map_err(db_err(op))?;
        let data = rows
            .into_iter()
            .map(T::try_from)
            .collect::<StoreResult<Vec<T>>>()?;
        Ok(QueryResult::with_total(data, total, pagination))
    }
}

#[async_trait]
impl Session for PgSession {
    fn in_transaction(&self) -> bool {
        self.tx.is_some()
    }

    async fn begin(&mut self) -> StoreResult<()> {
        if self.tx.is_some() {
            return Err(StoreError::Transaction("transaction already open"));
        }
        let tx = self.pool.begin().await.map_err(db_err("begin transaction"))?;
        self.tx = Some(tx);
        Ok(())
    }

    async fn commit(&mut self) -> StoreResult<()> {
        let tx = self
            .tx
            .take()
            .ok_or(StoreError::Transaction("no open transaction"))?;
        tx.commit().await.map_err(db_err("commit transaction"))?;
        Ok(())
    }

    async fn rollback(&mut self) -> StoreResult<()> {
        let tx = self
            .tx
            .take()
            .ok_or(StoreError::Transaction("no open transaction"))?;
        tx.rollback().await.map_err(db_err("rollback transaction"))?;
        Ok(())
    }

    async fn query_menus(
        &mut self,
        filter: &MenuFilter,
        pagination: Option<Pagination>,
    ) -> StoreResult<QueryResult<Menu>> {
        let filter = filter.clone();
        self.paged::<Menu, DbMenu, _>(
            "query menus",
            "menus",
            MENU_COLUMNS,
            "sequence DESC, row_id DESC",
            move |qb| push_menu_filter(qb, &filter),
            pagination,
        )
        .await
    }

    async fn get_menu(&mut self, id: &str) -> StoreResult<Option<Menu>> {
        let mut conn = self.conn().await?;
        let row: Option<DbMenu> =
            sqlx::query_as(&format!("SELECT {MENU_COLUMNS} FROM menus WHERE id = $1"))
                .bind(id)
                .fetch_optional(&mut *conn)
                .await
                .map_err(db_err("get menu"))?;
        row.map(Menu::try_from).transpose()
    }

    async fn create_menu(&mut self, menu: &Menu) -> StoreResult<()> {
        let query = sqlx::query(
            r#"INSERT INTO menus (id, name, sequence, icon, router, hidden, parent_id, parent_path, creator, created_at, updated_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)"#,
        )
        .bind(&menu.id)
        .bind(&menu.name)
        .bind(menu.sequence)
        .bind(&menu.icon)
        .bind(&menu.router)
        .bind(menu.hidden)
        .bind(&menu.parent_id)
        .bind(menu.parent_path.to_storage())
        .bind(&menu.creator)
        .bind(menu.created_at)
        .bind(menu.updated_at);
        self.execute("insert menu", query).await.map(|_| ())
    }

    async fn update_menu(&mut self, menu: &Menu) -> StoreResult<()> {
        let query = sqlx::query(
            r#"UPDATE menus
               SET name = $2, sequence = $3, icon = $4, router = $5, hidden = $6,
                   parent_id = $7, parent_path = $8, updated_at = $9
               WHERE id = $1"#,
        )
        .bind(&menu.id)
        .bind(&menu.name)
        .bind(menu.sequence)
        .bind(&menu.icon)
        .bind(&menu.router)
        .bind(menu.hidden)
        .bind(&menu.parent_id)
        .bind(menu.parent_path.to_storage())
        .bind(menu.updated_at);
        self.execute_one("update menu", format!("menu {}", menu.id), query)
            .await
    }

    async fn update_menu_parent_path(
        &mut self,
        id: &str,
        path: &AncestorPath,
    ) -> StoreResult<()> {
        let query = sqlx::query("UPDATE menus SET parent_path = $2 WHERE id = $1")
            .bind(id)
            .bind(path.to_storage());
        self.execute_one("update menu parent path", format!("menu {id}"), query)
            .await
    }

    async fn delete_menu(&mut self, id: &str) -> StoreResult<()> {
        let query = sqlx::query("DELETE FROM menus WHERE id = $1").bind(id);
        self.execute("delete menu", query).await.map(|_| ())
    }

    async fn list_menu_actions(&mut self, menu_ids: &[String]) -> StoreResult<Vec<MenuAction>> {
        let mut conn = self.conn().await?;
        let rows: Vec<DbMenuAction> = sqlx::query_as(
            "SELECT menu_id, code, name FROM menu_actions WHERE menu_id = ANY($1) ORDER BY row_id",
        )
        .bind(menu_ids)
        .fetch_all(&mut *conn)
        .await
        .map_err(db_err("list menu actions"))?;
        Ok(rows
            .into_iter()
            .map(|row| MenuAction {
                menu_id: row.menu_id,
                code: row.code,
                name: row.name,
            })
            .collect())
    }

    async fn create_menu_action(&mut self, action: &MenuAction) -> StoreResult<()> {
        let query = sqlx::query("INSERT INTO menu_actions (menu_id, code, name) VALUES ($1, $2, $3)")
            .bind(&action.menu_id)
            .bind(&action.code)
            .bind(&action.name);
        self.execute("insert menu action", query).await.map(|_| ())
    }

    async fn update_menu_action(&mut self, action: &MenuAction) -> StoreResult<()> {
        let query = sqlx::query("UPDATE menu_actions SET name = $3 WHERE menu_id = $1 AND code = $2")
            .bind(&action.menu_id)
            .bind(&action.code)
            .bind(&action.name);
        self.execute_one(
            "update menu action",
            format!("action {}", action.code),
            query,
        )
        .await
    }

    async fn delete_menu_action(&mut self, menu_id: &str, code: &str) -> StoreResult<()> {
        let query = sqlx::query("DELETE FROM menu_actions WHERE menu_id = $1 AND code = $2")
            .bind(menu_id)
            .bind(code);
        self.execute("delete menu action", query).await.map(|_| ())
    }

    async fn delete_menu_actions(&mut self, menu_id: &str) -> StoreResult<()> {
        let query = sqlx::query("DELETE FROM menu_actions WHERE menu_id = $1").bind(menu_id);
        self.execute("delete menu actions", query).await.map(|_| ())
    }

    async fn list_menu_resources(
        &mut self,
        menu_ids: &[String],
    ) -> StoreResult<Vec<MenuResource>> {
        let mut conn = self.conn().await?;
        let rows: Vec<DbMenuResource> = sqlx::query_as(
            "SELECT menu_id, code, name, method, path FROM menu_resources WHERE menu_id = ANY($1) ORDER BY row_id",
        )
        .bind(menu_ids)
        .fetch_all(&mut *conn)
        .await
        .map_err(db_err("list menu resources"))?;
        Ok(rows
            .into_iter()
            .map(|row| MenuResource {
                menu_id: row.menu_id,
                code: row.code,
                name: row.name,
                method: row.method,
                path: row.path,
            })
            .collect())
    }

    async fn create_menu_resource(&mut self, resource: &MenuResource) -> StoreResult<()> {
        let query = sqlx::query(
            "INSERT INTO menu_resources (menu_id, code, name, method, path) VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(&resource.menu_id)
        .bind(&resource.code)
        .bind(&resource.name)
        .bind(&resource.method)
        .bind(&resource.path);
        self.execute("insert menu resource", query).await.map(|_| ())
    }

    async fn update_menu_resource(&mut self, resource: &MenuResource) -> StoreResult<()> {
        let query = sqlx::query(
            "UPDATE menu_resources SET name = $3, method = $4, path = $5 WHERE menu_id = $1 AND code = $2",
        )
        .bind(&resource.menu_id)
        .bind(&resource.code)
        .bind(&resource.name)
        .bind(&resource.method)
        .bind(&resource.path);
        self.execute_one(
            "update menu resource",
            format!("resource {}", resource.code),
            query,
        )
        .await
    }

    async fn delete_menu_resource(&mut self, menu_id: &str, code: &str) -> StoreResult<()> {
        let query = sqlx::query("DELETE FROM menu_resources WHERE menu_id = $1 AND code = $2")
            .bind(menu_id)
            .bind(code);
        self.execute("delete menu resource", query).await.map(|_| ())
    }

    async fn delete_menu_resources(&mut self, menu_id: &str) -> StoreResult<()> {
        let query = sqlx::query("DELETE FROM menu_resources WHERE menu_id = $1").bind(menu_id);
        self.execute("delete menu resources", query).await.map(|_| ())
    }

    async fn query_roles(
        &mut self,
        filter: &RoleFilter,
        pagination: Option<Pagination>,
    ) -> StoreResult<QueryResult<Role>> {
        let filter = filter.clone();
        self.paged::<Role, DbRole, _>(
            "query roles",
            "roles",
            ROLE_COLUMNS,
            "sequence DESC, row_id DESC",
            move |qb| push_role_filter(qb, &filter),
            pagination,
        )
        .await
    }

    async fn get_role(&mut self, id: &str) -> StoreResult<Option<Role>> {
        let mut conn = self.conn().await?;
        let row: Option<DbRole> =
            sqlx::query_as(&format!("SELECT {ROLE_COLUMNS} FROM roles WHERE id = $1"))
                .bind(id)
                .fetch_optional(&mut *conn)
                .await
                .map_err(db_err("get role"))?;
        row.map(Role::try_from).transpose()
    }

    async fn create_role(&mut self, role: &Role) -> StoreResult<()> {
        let query = sqlx::query(
            r#"INSERT INTO roles (id, name, sequence, memo, creator, created_at, updated_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7)"#,
        )
        .bind(&role.id)
        .bind(&role.name)
        .bind(role.sequence)
        .bind(&role.memo)
        .bind(&role.creator)
        .bind(role.created_at)
        .bind(role.updated_at);
        self.execute("insert role", query).await.map(|_| ())
    }

    async fn update_role(&mut self, role: &Role) -> StoreResult<()> {
        let query = sqlx::query(
            "UPDATE roles SET name = $2, sequence = $3, memo = $4, updated_at = $5 WHERE id = $1",
        )
        .bind(&role.id)
        .bind(&role.name)
        .bind(role.sequence)
        .bind(&role.memo)
        .bind(role.updated_at);
        self.execute_one("update role", format!("role {}", role.id), query)
            .await
    }

    async fn delete_role(&mut self, id: &str) -> StoreResult<()> {
        let query = sqlx::query("DELETE FROM roles WHERE id = $1").bind(id);
        self.execute("delete role", query).await.map(|_| ())
    }

    async fn list_role_menus(&mut self, role_ids: &[String]) -> StoreResult<Vec<RoleMenu>> {
        let mut conn = self.conn().await?;
        let rows: Vec<DbRoleMenu> = sqlx::query_as(
            "SELECT role_id, menu_id, actions, resources FROM role_menus WHERE role_id = ANY($1) ORDER BY row_id",
        )
        .bind(role_ids)
        .fetch_all(&mut *conn)
        .await
        .map_err(db_err("list role menus"))?;
        Ok(rows.into_iter().map(RoleMenu::from).collect())
    }

    async fn roles_granting_menu(&mut self, menu_id: &str) -> StoreResult<Vec<String>> {
        let mut conn = self.conn().await?;
        let ids: Vec<String> =
            sqlx::query_scalar("SELECT role_id FROM role_menus WHERE menu_id = $1 ORDER BY row_id")
                .bind(menu_id)
                .fetch_all(&mut *conn)
                .await
                .map_err(db_err("list roles granting menu"))?;
        Ok(ids)
    }

    async fn create_role_menu(&mut self, grant: &RoleMenu) -> StoreResult<()> {
        let query = sqlx::query(
            "INSERT INTO role_menus (role_id, menu_id, actions, resources) VALUES ($1, $2, $3, $4)",
        )
        .bind(&grant.role_id)
        .bind(&grant.menu_id)
        .bind(join_codes(&grant.actions))
        .bind(join_codes(&grant.resources));
        self.execute("insert role menu", query).await.map(|_| ())
    }

    async fn update_role_menu(&mut self, grant: &RoleMenu) -> StoreResult<()> {
        let query = sqlx::query(
            "UPDATE role_menus SET actions = $3, resources = $4 WHERE role_id = $1 AND menu_id = $2",
        )
        .bind(&grant.role_id)
        .bind(&grant.menu_id)
        .bind(join_codes(&grant.actions))
        .bind(join_codes(&grant.resources));
        self.execute_one(
            "update role menu",
            format!("grant {}", grant.menu_id),
            query,
        )
        .await
    }

    async fn delete_role_menu(&mut self, role_id: &str, menu_id: &str) -> StoreResult<()> {
        let query = sqlx::query("DELETE FROM role_menus WHERE role_id = $1 AND menu_id = $2")
            .bind(role_id)
            .bind(menu_id);
        self.execute("delete role menu", query).await.map(|_| ())
    }

    async fn delete_role_menus(&mut self, role_id: &str) -> StoreResult<()> {
        let query = sqlx::query("DELETE FROM role_menus WHERE role_id = $1").bind(role_id);
        self.execute("delete role menus", query).await.map(|_| ())
    }

    async fn query_users(
        &mut self,
        filter: &UserFilter,
        pagination: Option<Pagination>,
    ) -> StoreResult<QueryResult<User>> {
        let filter = filter.clone();
        self.paged::<User, DbUser, _>(
            "query users",
            "users",
            USER_COLUMNS,
            "row_id DESC",
            move |qb| push_user_filter(qb, &filter),
            pagination,
        )
        .await
    }

    async fn get_user(&mut self, id: &str) -> StoreResult<Option<User>> {
        let mut conn = self.conn().await?;
        let row: Option<DbUser> =
            sqlx::query_as(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
                .bind(id)
                .fetch_optional(&mut *conn)
                .await
                .map_err(db_err("get user"))?;
        row.map(User::try_from).transpose()
    }

    async fn create_user(&mut self, user: &User) -> StoreResult<()> {
        let query = sqlx::query(
            r#"INSERT INTO users (id, username, real_name, password_hash, email, phone, status, creator, created_at, updated_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)"#,
        )
        .bind(&user.id)
        .bind(&user.username)
        .bind(&user.real_name)
        .bind(&user.password_hash)
        .bind(&user.email)
        .bind(&user.phone)
        .bind(user.status.code())
        .bind(&user.creator)
        .bind(user.created_at)
        .bind(user.updated_at);
        self.execute("insert user", query).await.map(|_| ())
    }

    async fn update_user(&mut self, user: &User) -> StoreResult<()> {
        let query = sqlx::query(
            r#"UPDATE users
               SET username = $2, real_name = $3, email = $4, phone = $5, updated_at = $6
               WHERE id = $1"#,
        )
        .bind(&user.id)
        .bind(&user.username)
        .bind(&user.real_name)
        .bind(&user.email)
        .bind(&user.phone)
        .bind(user.updated_at);
        self.execute_one("update user", format!("user {}", user.id), query)
            .await
    }

    async fn update_user_status(&mut self, id: &str, status: UserStatus) -> StoreResult<()> {
        let query = sqlx::query("UPDATE users SET status = $2, updated_at = now() WHERE id = $1")
            .bind(id)
            .bind(status.code());
        self.execute_one("update user status", format!("user {id}"), query)
            .await
    }

    async fn update_user_password(&mut self, id: &str, password_hash: &str) -> StoreResult<()> {
        let query =
            sqlx::query("UPDATE users SET password_hash = $2, updated_at = now() WHERE id = $1")
                .bind(id)
                .bind(password_hash);
        self.execute_one("update user password", format!("user {id}"), query)
            .await
    }

    async fn delete_user(&mut self, id: &str) -> StoreResult<()> {
        let query = sqlx::query("DELETE FROM users WHERE id = $1").bind(id);
        self.execute("delete user", query).await.map(|_| ())
    }

    async fn list_user_roles(&mut self, user_ids: &[String]) -> StoreResult<Vec<UserRole>> {
        let mut conn = self.conn().await?;
        let rows: Vec<DbUserRole> = sqlx::query_as(
            "SELECT user_id, role_id FROM user_roles WHERE user_id = ANY($1) ORDER BY row_id",
        )
        .bind(user_ids)
        .fetch_all(&mut *conn)
        .await
        .map_err(db_err("list user roles"))?;
        Ok(rows
            .into_iter()
            .map(|row| UserRole {
                user_id: row.user_id,
                role_id: row.role_id,
            })
            .collect())
    }

    async fn create_user_role(&mut self, edge: &UserRole) -> StoreResult<()> {
        let query = sqlx::query("INSERT INTO user_roles (user_id, role_id) VALUES ($1, $2)")
            .bind(&edge.user_id)
            .bind(&edge.role_id);
        self.execute("insert user role", query).await.map(|_| ())
    }

    async fn delete_user_role(&mut self, user_id: &str, role_id: &str) -> StoreResult<()> {
        let query = sqlx::query("DELETE FROM user_roles WHERE user_id = $1 AND role_id = $2")
            .bind(user_id)
            .bind(role_id);
        self.execute("delete user role", query).await.map(|_| ())
    }

    async fn delete_user_roles(&mut self, user_id: &str) -> StoreResult<()> {
        let query = sqlx::query("DELETE FROM user_roles WHERE user_id = $1").bind(user_id);
        self.execute("delete user roles", query).await.map(|_| ())
    }

    async fn delete_role_users(&mut self, role_id: &str) -> StoreResult<()> {
        let query = sqlx::query("DELETE FROM user_roles WHERE role_id = $1").bind(role_id);
        self.execute("delete role users", query).await.map(|_| ())
    }
}

fn push_menu_filter(qb: &mut QueryBuilder<'static, Postgres>, filter: &MenuFilter) {
    if let Some(ids) = &filter.ids {
        qb.push(" AND id = ANY(");
        qb.push_bind(ids.clone());
        qb.push(")");
    }
    if let Some(like) = &filter.like_name {
        qb.push(" AND name LIKE ");
        qb.push_bind(format!("%{}%", escape_like(like)));
    }
    if let Some(parent_id) = &filter.parent_id {
        qb.push(" AND parent_id = ");
        qb.push_bind(parent_id.clone());
    }
    if let Some(prefix) = filter.prefix_parent_path.as_ref().filter(|p| !p.is_root()) {
        let stored = prefix.to_storage();
        qb.push(" AND (parent_path = ");
        qb.push_bind(stored.clone());
        qb.push(" OR parent_path LIKE ");
        qb.push_bind(format!("{}/%", escape_like(&stored)));
        qb.push(")");
    }
    if let Some(hidden) = filter.hidden {
        qb.push(" AND hidden = ");
        qb.push_bind(hidden);
    }
}

fn push_role_filter(qb: &mut QueryBuilder<'static, Postgres>, filter: &RoleFilter) {
    if let Some(ids) = &filter.ids {
        qb.push(" AND id = ANY(");
        qb.push_bind(ids.clone());
        qb.push(")");
    }
    if let Some(name) = &filter.name {
        qb.push(" AND name = ");
        qb.push_bind(name.clone());
    }
    if let Some(like) = &filter.like_name {
        qb.push(" AND name LIKE ");
        qb.push_bind(format!("%{}%", escape_like(like)));
    }
    if let Some(user_id) = &filter.user_id {
        qb.push(" AND id IN (SELECT role_id FROM user_roles WHERE user_id = ");
        qb.push_bind(user_id.clone());
        qb.push(")");
    }
}

fn push_user_filter(qb: &mut QueryBuilder<'static, Postgres>, filter: &UserFilter) {
    if let Some(ids) = &filter.ids {
        qb.push(" AND id = ANY(");
        qb.push_bind(ids.clone());
        qb.push(")");
    }
    if let Some(username) = &filter.username {
        qb.push(" AND username = ");
        qb.push_bind(username.clone());
    }
    if let Some(like) = &filter.like_username {
        qb.push(" AND username LIKE ");
        qb.push_bind(format!("%{}%", escape_like(like)));
    }
    if let Some(like) = &filter.like_real_name {
        qb.push(" AND real_name LIKE ");
        qb.push_bind(format!("%{}%", escape_like(like)));
    }
    if let Some(status) = filter.status {
        qb.push(" AND status = ");
        qb.push_bind(status.code());
    }
    if let Some(role_ids) = &filter.role_ids {
        qb.push(" AND id IN (SELECT user_id FROM user_roles WHERE role_id = ANY(");
        qb.push_bind(role_ids.clone());
        qb.push("))");
    }
}

/// Escape `LIKE` metacharacters; Postgres' default escape character is `\`.
fn escape_like(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for ch in raw.chars() {
        if matches!(ch, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

/// Label a driver error with the operation that failed. Unique violations become conflicts.
fn db_err(op: &'static str) -> impl FnOnce(sqlx::Error) -> StoreError {
    move |err| {
        if is_unique_violation(&err) {
            return StoreError::Conflict(op.to_string());
        }
        StoreError::Unexpected(anyhow::Error::new(err).context(op))
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    if let sqlx::Error::Database(db_err) = err {
        return db_err.code().map(|code| code == "23505").unwrap_or(false);
    }
    false
}

impl TryFrom<DbMenu> for Menu {
    type Error = StoreError;

    fn try_from(row: DbMenu) -> StoreResult<Self> {
        Ok(Menu {
            id: row.id,
            name: row.name,
            sequence: row.sequence,
            icon: row.icon,
            router: row.router,
            hidden: row.hidden,
            parent_id: row.parent_id,
            parent_path: AncestorPath::parse(&row.parent_path),
            creator: row.creator,
            created_at: row.created_at,
            updated_at: row.updated_at,
            row_id: row.row_id,
            actions: Vec::new(),
            resources: Vec::new(),
        })
    }
}

impl TryFrom<DbRole> for Role {
    type Error = StoreError;

    fn try_from(row: DbRole) -> StoreResult<Self> {
        Ok(Role {
            id: row.id,
            name: row.name,
            sequence: row.sequence,
            memo: row.memo,
            creator: row.creator,
            created_at: row.created_at,
            updated_at: row.updated_at,
            row_id: row.row_id,
            menus: Vec::new(),
        })
    }
}

impl From<DbRoleMenu> for RoleMenu {
    fn from(row: DbRoleMenu) -> Self {
        RoleMenu {
            role_id: row.role_id,
            menu_id: row.menu_id,
            actions: split_codes(&row.actions),
            resources: split_codes(&row.resources),
        }
    }
}

impl TryFrom<DbUser> for User {
    type Error = StoreError;

    fn try_from(row: DbUser) -> StoreResult<Self> {
        let status = UserStatus::from_code(row.status)
            .ok_or_else(|| anyhow!("unknown user status {} for user {}", row.status, row.id))?;
        Ok(User {
            id: row.id,
            username: row.username,
            real_name: row.real_name,
            password_hash: row.password_hash,
            email: row.email,
            phone: row.phone,
            status,
            creator: row.creator,
            created_at: row.created_at,
            updated_at: row.updated_at,
            row_id: row.row_id,
            roles: Vec::new(),
        })
    }
}

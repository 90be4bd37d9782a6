//! Menu tree maintenance.
//!
//! # Purpose
//! Creates, updates, moves and deletes menu nodes together with their action
//! and resource children, keeping every node's [`AncestorPath`] equal to its
//! parent's path plus the parent's id.
//!
//! # Key invariants and assumptions
//! - A reparent rewrites the moved node and every descendant inside one
//!   transaction; a partial move is never committed.
//! - Deletion is refused while any node names the target as its parent.
//! - Action and resource codes are unique within one menu.
//! - Roles granting a changed menu are re-projected after commit.
use crate::context::OpContext;
use crate::model::role::is_storable_code;
use crate::model::{
    AncestorPath, Menu, MenuFilter, MenuInput, MenuSeed, MenuTree, Pagination, QueryOptions,
    QueryResult, build_forest,
};
use crate::service::diff::{diff_by_key, first_duplicate};
use crate::service::policy::PolicyProjector;
use crate::service::tx::run_in_transaction;
use crate::service::user::active_user;
use crate::service::{ServiceResult, forbidden, not_found, validation};
use crate::store::{AdminStore, Session};
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

#[derive(Clone)]
pub struct MenuService {
    store: Arc<dyn AdminStore>,
    projector: PolicyProjector,
}

impl MenuService {
    pub fn new(store: Arc<dyn AdminStore>, projector: PolicyProjector) -> Self {
        Self { store, projector }
    }

    pub async fn get(&self, ctx: &OpContext, id: &str, options: QueryOptions) -> ServiceResult<Menu> {
        let mut session = self.store.session().await?;
        let menu = ctx.run(session.get_menu(id)).await??;
        let Some(menu) = menu else {
            return Err(not_found(format!("menu {id} not found")));
        };
        let mut menus = vec![menu];
        ctx.run(hydrate(session.as_mut(), &mut menus, options))
            .await??;
        Ok(menus.remove(0))
    }

    pub async fn query(
        &self,
        ctx: &OpContext,
        filter: &MenuFilter,
        options: QueryOptions,
    ) -> ServiceResult<QueryResult<Menu>> {
        let mut session = self.store.session().await?;
        let mut result = ctx
            .run(session.query_menus(filter, options.pagination))
            .await??;
        ctx.run(hydrate(session.as_mut(), &mut result.data, options))
            .await??;
        Ok(result)
    }

    /// Matching nodes assembled into a forest, children ordered like listings.
    pub async fn query_tree(
        &self,
        ctx: &OpContext,
        filter: &MenuFilter,
        options: QueryOptions,
    ) -> ServiceResult<Vec<MenuTree>> {
        let options = QueryOptions {
            pagination: None,
            ..options
        };
        let result = self.query(ctx, filter, options).await?;
        Ok(build_forest(result.data))
    }

    /// Every non-hidden node with its actions; what root sees.
    pub async fn query_visible_tree(&self, ctx: &OpContext) -> ServiceResult<Vec<MenuTree>> {
        let filter = MenuFilter {
            hidden: Some(false),
            ..MenuFilter::default()
        };
        let options = QueryOptions {
            include_actions: true,
            ..QueryOptions::default()
        };
        self.query_tree(ctx, &filter, options).await
    }

    /// The menus `user_id` may navigate: every granted node plus its
    /// ancestors. Each node keeps only the action codes its roles grant on
    /// it, so ancestors reached only through a descendant carry no actions.
    pub async fn query_user_tree(
        &self,
        ctx: &OpContext,
        user_id: &str,
    ) -> ServiceResult<Vec<MenuTree>> {
        let mut session = self.store.session().await?;
        let menus = ctx
            .run(granted_menus(ctx, session.as_mut(), user_id))
            .await??;
        Ok(build_forest(menus))
    }

    pub async fn create(&self, ctx: &OpContext, input: MenuInput) -> ServiceResult<Menu> {
        validate_input(&input)?;
        let mut session = self.store.session().await?;
        let actor = ctx.actor.clone();
        run_in_transaction(ctx, session.as_mut(), move |s| {
            Box::pin(async move { insert_menu(s, &actor, &input).await })
        })
        .await
    }

    pub async fn update(&self, ctx: &OpContext, id: &str, input: MenuInput) -> ServiceResult<Menu> {
        if input.parent_id == id {
            return Err(validation("menu cannot be its own parent"));
        }
        validate_input(&input)?;
        let mut session = self.store.session().await?;
        let id = id.to_string();
        let menu = run_in_transaction(ctx, session.as_mut(), move |s| {
            Box::pin(async move { apply_update(s, &id, &input).await })
        })
        .await?;

        self.reproject_granting_roles(session.as_mut(), &menu.id)
            .await?;
        Ok(menu)
    }

    pub async fn delete(&self, ctx: &OpContext, id: &str) -> ServiceResult<()> {
        let mut session = self.store.session().await?;
        let menu_id = id.to_string();
        let granting = run_in_transaction(ctx, session.as_mut(), move |s| {
            Box::pin(async move {
                if s.get_menu(&menu_id).await?.is_none() {
                    return Err(not_found(format!("menu {menu_id} not found")));
                }
                let children = s
                    .query_menus(&MenuFilter::children_of(&menu_id), Some(Pagination::all()))
                    .await?;
                let child_count = children.page.map(|page| page.total).unwrap_or(0);
                if child_count > 0 {
                    return Err(validation(format!(
                        "menu {menu_id} has {child_count} child menus and cannot be deleted"
                    )));
                }
                let granting = s.roles_granting_menu(&menu_id).await?;
                s.delete_menu_actions(&menu_id).await?;
                s.delete_menu_resources(&menu_id).await?;
                s.delete_menu(&menu_id).await?;
                Ok(granting)
            })
        })
        .await?;

        for role_id in &granting {
            self.projector
                .project_role(session.as_mut(), role_id)
                .await
                .inspect_err(|err| tracing::warn!(role_id = %role_id, error = %err, "role projection failed"))?;
        }
        Ok(())
    }

    /// Populate an empty menu table from a nested seed forest. Returns the
    /// number of nodes created; a non-empty table is left untouched.
    pub async fn seed(&self, ctx: &OpContext, forest: Vec<MenuSeed>) -> ServiceResult<usize> {
        let mut session = self.store.session().await?;
        let actor = ctx.actor.clone();
        run_in_transaction(ctx, session.as_mut(), move |s| {
            Box::pin(async move {
                let existing = s
                    .query_menus(&MenuFilter::default(), Some(Pagination::page(1, 1)))
                    .await?;
                if existing.page.map(|page| page.total).unwrap_or(0) > 0 {
                    return Ok(0);
                }
                let mut created = 0;
                let mut pending: Vec<(String, MenuSeed)> = forest
                    .into_iter()
                    .rev()
                    .map(|seed| (String::new(), seed))
                    .collect();
                while let Some((parent_id, seed)) = pending.pop() {
                    let input = seed.input(&parent_id);
                    validate_input(&input)?;
                    let menu = insert_menu(s, &actor, &input).await?;
                    created += 1;
                    for child in seed.children.into_iter().rev() {
                        pending.push((menu.id.clone(), child));
                    }
                }
                Ok(created)
            })
        })
        .await
    }

    async fn reproject_granting_roles(
        &self,
        session: &mut dyn Session,
        menu_id: &str,
    ) -> ServiceResult<()> {
        self.projector
            .project_menu_grantees(session, menu_id)
            .await
            .inspect_err(|err| tracing::warn!(menu_id, error = %err, "menu grantee projection failed"))?;
        Ok(())
    }
}

fn validate_input(input: &MenuInput) -> ServiceResult<()> {
    if input.name.trim().is_empty() {
        return Err(validation("menu name is required"));
    }
    let codes = input
        .actions
        .iter()
        .map(|action| ("action", &action.code))
        .chain(input.resources.iter().map(|resource| ("resource", &resource.code)));
    for (kind, code) in codes {
        if !is_storable_code(code) {
            return Err(validation(format!("invalid {kind} code {code:?}")));
        }
    }
    if let Some(code) = first_duplicate(&input.actions, |action| action.code.clone()) {
        return Err(validation(format!("duplicate action code {code}")));
    }
    if let Some(code) = first_duplicate(&input.resources, |resource| resource.code.clone()) {
        return Err(validation(format!("duplicate resource code {code}")));
    }
    Ok(())
}

/// Path for a node placed under `parent_id`; the root path when it is empty.
async fn parent_path_for(s: &mut dyn Session, parent_id: &str) -> ServiceResult<AncestorPath> {
    if parent_id.is_empty() {
        return Ok(AncestorPath::root());
    }
    match s.get_menu(parent_id).await? {
        Some(parent) => Ok(parent.child_path()),
        None => Err(not_found(format!("parent menu {parent_id} not found"))),
    }
}

async fn insert_menu(s: &mut dyn Session, actor: &str, input: &MenuInput) -> ServiceResult<Menu> {
    let parent_path = parent_path_for(s, &input.parent_id).await?;
    let id = uuid::Uuid::new_v4().to_string();
    let now = Utc::now();
    let mut menu = Menu {
        id: id.clone(),
        name: input.name.clone(),
        sequence: input.sequence,
        icon: input.icon.clone(),
        router: input.router.clone(),
        hidden: input.hidden,
        parent_id: input.parent_id.clone(),
        parent_path,
        creator: actor.to_string(),
        created_at: now,
        updated_at: now,
        row_id: 0,
        actions: input.actions_for(&id),
        resources: input.resources_for(&id),
    };
    s.create_menu(&menu).await?;
    for action in &menu.actions {
        s.create_menu_action(action).await?;
    }
    for resource in &menu.resources {
        s.create_menu_resource(resource).await?;
    }
    if let Some(stored) = s.get_menu(&id).await? {
        menu.row_id = stored.row_id;
    }
    Ok(menu)
}

async fn apply_update(s: &mut dyn Session, id: &str, input: &MenuInput) -> ServiceResult<Menu> {
    let Some(old) = s.get_menu(id).await? else {
        return Err(not_found(format!("menu {id} not found")));
    };

    let mut menu = old.clone();
    menu.name = input.name.clone();
    menu.sequence = input.sequence;
    menu.icon = input.icon.clone();
    menu.router = input.router.clone();
    menu.hidden = input.hidden;
    menu.updated_at = Utc::now();

    if input.parent_id != old.parent_id {
        let new_path = parent_path_for(s, &input.parent_id).await?;
        let old_prefix = old.child_path();
        if new_path.starts_with(&old_prefix) {
            return Err(validation(format!(
                "menu {id} cannot move under its own descendant"
            )));
        }
        let new_prefix = new_path.child(id);
        let moved = rebase_subtree(s, &old_prefix, &new_prefix).await?;
        menu.parent_id = input.parent_id.clone();
        menu.parent_path = new_path;
        metrics::counter!("portcullis_tree_reparents_total").increment(1);
        tracing::info!(
            menu_id = id,
            from = %old.parent_path,
            to = %menu.parent_path,
            descendants = moved,
            "menu reparented"
        );
    }

    sync_children(s, id, input).await?;
    s.update_menu(&menu).await?;
    menu.actions = input.actions_for(id);
    menu.resources = input.resources_for(id);
    Ok(menu)
}

/// Rewrite the path of every node under `old_prefix` to live under `new_prefix`.
async fn rebase_subtree(
    s: &mut dyn Session,
    old_prefix: &AncestorPath,
    new_prefix: &AncestorPath,
) -> ServiceResult<usize> {
    let descendants = s
        .query_menus(&MenuFilter::subtree(old_prefix.clone()), None)
        .await?
        .data;
    let mut moved = 0;
    for node in descendants {
        if let Some(path) = node.parent_path.rebase(old_prefix, new_prefix) {
            s.update_menu_parent_path(&node.id, &path).await?;
            moved += 1;
        }
    }
    Ok(moved)
}

async fn sync_children(s: &mut dyn Session, id: &str, input: &MenuInput) -> ServiceResult<()> {
    let menu_ids = [id.to_string()];

    let current = s.list_menu_actions(&menu_ids).await?;
    let plan = diff_by_key(&current, &input.actions_for(id), |action| action.code.clone());
    for action in &plan.delete {
        s.delete_menu_action(id, &action.code).await?;
    }
    for action in &plan.update {
        s.update_menu_action(action).await?;
    }
    for action in &plan.create {
        s.create_menu_action(action).await?;
    }

    let current = s.list_menu_resources(&menu_ids).await?;
    let plan = diff_by_key(&current, &input.resources_for(id), |resource| {
        resource.code.clone()
    });
    for resource in &plan.delete {
        s.delete_menu_resource(id, &resource.code).await?;
    }
    for resource in &plan.update {
        s.update_menu_resource(resource).await?;
    }
    for resource in &plan.create {
        s.create_menu_resource(resource).await?;
    }
    Ok(())
}

async fn granted_menus(
    ctx: &OpContext,
    s: &mut dyn Session,
    user_id: &str,
) -> ServiceResult<Vec<Menu>> {
    let user = active_user(ctx, s, user_id).await?;
    let role_ids: Vec<String> = s
        .list_user_roles(&[user.id])
        .await?
        .into_iter()
        .map(|edge| edge.role_id)
        .collect();
    if role_ids.is_empty() {
        return Err(forbidden("user has no roles"));
    }

    let mut granted: HashMap<String, HashSet<String>> = HashMap::new();
    for grant in s.list_role_menus(&role_ids).await? {
        granted
            .entry(grant.menu_id)
            .or_default()
            .extend(grant.actions);
    }
    let direct = MenuFilter {
        ids: Some(granted.keys().cloned().collect()),
        ..MenuFilter::default()
    };
    let found = if granted.is_empty() {
        Vec::new()
    } else {
        s.query_menus(&direct, None).await?.data
    };
    if found.is_empty() {
        return Err(forbidden("user has no menus"));
    }

    let mut ids: HashSet<String> = HashSet::new();
    for menu in &found {
        ids.insert(menu.id.clone());
        ids.extend(menu.parent_path.ids().iter().cloned());
    }
    let all = MenuFilter {
        ids: Some(ids.into_iter().collect()),
        ..MenuFilter::default()
    };
    let mut menus = s.query_menus(&all, None).await?.data;
    let options = QueryOptions {
        include_actions: true,
        ..QueryOptions::default()
    };
    hydrate(s, &mut menus, options).await?;
    for menu in &mut menus {
        let codes = granted.get(&menu.id);
        menu.actions
            .retain(|action| codes.is_some_and(|codes| codes.contains(&action.code)));
    }
    Ok(menus)
}

async fn hydrate(
    s: &mut dyn Session,
    menus: &mut [Menu],
    options: QueryOptions,
) -> ServiceResult<()> {
    if menus.is_empty() || !(options.include_actions || options.include_resources) {
        return Ok(());
    }
    let ids: Vec<String> = menus.iter().map(|menu| menu.id.clone()).collect();
    if options.include_actions {
        let mut by_menu: HashMap<String, Vec<_>> = HashMap::new();
        for action in s.list_menu_actions(&ids).await? {
            by_menu.entry(action.menu_id.clone()).or_default().push(action);
        }
        for menu in menus.iter_mut() {
            menu.actions = by_menu.remove(&menu.id).unwrap_or_default();
        }
    }
    if options.include_resources {
        let mut by_menu: HashMap<String, Vec<_>> = HashMap::new();
        for resource in s.list_menu_resources(&ids).await? {
            by_menu
                .entry(resource.menu_id.clone())
                .or_default()
                .push(resource);
        }
        for menu in menus.iter_mut() {
            menu.resources = by_menu.remove(&menu.id).unwrap_or_default();
        }
    }
    Ok(())
}

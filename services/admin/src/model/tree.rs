//! Forest assembly for flat menu listings.
use crate::model::menu::Menu;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use utoipa::ToSchema;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct MenuTree {
    #[serde(flatten)]
    pub menu: Menu,
    pub children: Vec<MenuTree>,
}

/// Listing order: `sequence` descending, newest row first on ties.
pub fn sibling_order(a: &Menu, b: &Menu) -> Ordering {
    b.sequence
        .cmp(&a.sequence)
        .then_with(|| b.row_id.cmp(&a.row_id))
}

/// Group `menus` by parent id. Nodes whose parent is not in the list become roots,
/// so a filtered listing still yields a forest.
pub fn build_forest(mut menus: Vec<Menu>) -> Vec<MenuTree> {
    menus.sort_by(sibling_order);
    let present: HashSet<String> = menus.iter().map(|menu| menu.id.clone()).collect();
    let mut by_parent: HashMap<String, Vec<Menu>> = HashMap::new();
    let mut roots = Vec::new();
    for menu in menus {
        if menu.is_root() || !present.contains(&menu.parent_id) {
            roots.push(menu);
        } else {
            by_parent.entry(menu.parent_id.clone()).or_default().push(menu);
        }
    }
    roots
        .into_iter()
        .map(|menu| attach(menu, &mut by_parent))
        .collect()
}

fn attach(menu: Menu, by_parent: &mut HashMap<String, Vec<Menu>>) -> MenuTree {
    let children = by_parent
        .remove(&menu.id)
        .unwrap_or_default()
        .into_iter()
        .map(|child| attach(child, by_parent))
        .collect();
    MenuTree { menu, children }
}

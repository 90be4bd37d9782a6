//! Menu tree records.
use crate::model::path::AncestorPath;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Menu {
    pub id: String,
    pub name: String,
    pub sequence: i32,
    pub icon: String,
    pub router: String,
    pub hidden: bool,
    /// Empty for roots.
    pub parent_id: String,
    #[schema(value_type = String)]
    pub parent_path: AncestorPath,
    pub creator: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Insertion order, used to break ties between equal sequences.
    #[serde(skip)]
    pub row_id: i64,
    #[serde(default)]
    pub actions: Vec<MenuAction>,
    #[serde(default)]
    pub resources: Vec<MenuResource>,
}

impl Menu {
    pub fn is_root(&self) -> bool {
        self.parent_id.is_empty()
    }

    /// Path carried by this node's children.
    pub fn child_path(&self) -> AncestorPath {
        self.parent_path.child(&self.id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct MenuAction {
    #[serde(default)]
    pub menu_id: String,
    pub code: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct MenuResource {
    #[serde(default)]
    pub menu_id: String,
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub method: String,
    #[serde(default)]
    pub path: String,
}

impl MenuResource {
    /// Only resources naming both a method and a path become permissions.
    pub fn is_enforceable(&self) -> bool {
        !self.method.is_empty() && !self.path.is_empty()
    }
}

/// Caller-supplied fields for create and update.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct MenuInput {
    pub name: String,
    #[serde(default)]
    pub sequence: i32,
    #[serde(default)]
    pub icon: String,
    #[serde(default)]
    pub router: String,
    #[serde(default)]
    pub hidden: bool,
    #[serde(default)]
    pub parent_id: String,
    #[serde(default)]
    pub actions: Vec<MenuActionInput>,
    #[serde(default)]
    pub resources: Vec<MenuResourceInput>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct MenuActionInput {
    pub code: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct MenuResourceInput {
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub method: String,
    #[serde(default)]
    pub path: String,
}

impl MenuInput {
    pub fn actions_for(&self, menu_id: &str) -> Vec<MenuAction> {
        self.actions
            .iter()
            .map(|item| MenuAction {
                menu_id: menu_id.to_string(),
                code: item.code.clone(),
                name: item.name.clone(),
            })
            .collect()
    }

    pub fn resources_for(&self, menu_id: &str) -> Vec<MenuResource> {
        self.resources
            .iter()
            .map(|item| MenuResource {
                menu_id: menu_id.to_string(),
                code: item.code.clone(),
                name: item.name.clone(),
                method: item.method.clone(),
                path: item.path.clone(),
            })
            .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MenuFilter {
    pub ids: Option<Vec<String>>,
    pub like_name: Option<String>,
    /// `Some("")` selects roots.
    pub parent_id: Option<String>,
    /// Nodes whose path equals or extends this prefix.
    pub prefix_parent_path: Option<AncestorPath>,
    pub hidden: Option<bool>,
}

impl MenuFilter {
    pub fn children_of(id: &str) -> Self {
        Self {
            parent_id: Some(id.to_string()),
            ..Self::default()
        }
    }

    pub fn subtree(prefix: AncestorPath) -> Self {
        Self {
            prefix_parent_path: Some(prefix),
            ..Self::default()
        }
    }

    pub fn matches(&self, menu: &Menu) -> bool {
        if let Some(ids) = &self.ids {
            if !ids.contains(&menu.id) {
                return false;
            }
        }
        if let Some(like) = &self.like_name {
            if !menu.name.contains(like.as_str()) {
                return false;
            }
        }
        if let Some(parent_id) = &self.parent_id {
            if &menu.parent_id != parent_id {
                return false;
            }
        }
        if let Some(prefix) = &self.prefix_parent_path {
            if !menu.parent_path.starts_with(prefix) {
                return false;
            }
        }
        if let Some(hidden) = self.hidden {
            if menu.hidden != hidden {
                return false;
            }
        }
        true
    }
}

/// Nested seed document used to populate an empty menu table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuSeed {
    pub name: String,
    #[serde(default)]
    pub sequence: i32,
    #[serde(default)]
    pub icon: String,
    #[serde(default)]
    pub router: String,
    #[serde(default)]
    pub hidden: bool,
    #[serde(default)]
    pub actions: Vec<MenuActionInput>,
    #[serde(default)]
    pub resources: Vec<MenuResourceInput>,
    #[serde(default)]
    pub children: Vec<MenuSeed>,
}

impl MenuSeed {
    pub fn input(&self, parent_id: &str) -> MenuInput {
        MenuInput {
            name: self.name.clone(),
            sequence: self.sequence,
            icon: self.icon.clone(),
            router: self.router.clone(),
            hidden: self.hidden,
            parent_id: parent_id.to_string(),
            actions: self.actions.clone(),
            resources: self.resources.clone(),
        }
    }
}

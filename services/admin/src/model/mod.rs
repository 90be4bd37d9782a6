//! Domain records for menus, roles and users.
pub mod menu;
pub mod path;
pub mod query;
pub mod role;
pub mod tree;
pub mod user;

pub use menu::{
    Menu, MenuAction, MenuActionInput, MenuFilter, MenuInput, MenuResource, MenuResourceInput,
    MenuSeed,
};
pub use path::AncestorPath;
pub use query::{PageResult, Pagination, QueryOptions, QueryResult};
pub use role::{Role, RoleFilter, RoleInput, RoleMenu, RoleMenuInput};
pub use tree::{MenuTree, build_forest};
pub use user::{CurrentUser, User, UserFilter, UserInput, UserRole, UserStatus};

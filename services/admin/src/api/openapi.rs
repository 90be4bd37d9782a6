//! OpenAPI document for the admin API.
use crate::api::types::{
    CurrentPasswordRequest, ErrorResponse, HealthStatus, MembershipView, MenuListResponse, PasswordChangeRequest,
    PolicyCheckRequest, PolicyCheckResponse, PolicyRuleView, PolicyRulesResponse,
    RoleListResponse, SystemInfo, UserListResponse,
};
use crate::api::{current, menus, policy, roles, system, users};
use crate::model::{
    CurrentUser, Menu, MenuAction, MenuActionInput, MenuInput, MenuResource, MenuResourceInput, MenuTree,
    PageResult, Role, RoleInput, RoleMenu, RoleMenuInput, User, UserInput, UserRole, UserStatus,
};
use crate::service::ProjectionSummary;
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "portcullis-admin",
        version = "v1",
        description = "Menu tree, role and user administration with policy projection"
    ),
    paths(
        system::system_info,
        system::system_health,
        menus::list_menus,
        menus::menu_tree,
        menus::get_menu,
        menus::create_menu,
        menus::update_menu,
        menus::delete_menu,
        roles::list_roles,
        roles::select_roles,
        roles::get_role,
        roles::create_role,
        roles::update_role,
        roles::delete_role,
        users::list_users,
        users::get_user,
        users::create_user,
        users::update_user,
        users::delete_user,
        users::enable_user,
        users::disable_user,
        users::change_password,
        policy::reload_policy,
        policy::check_policy,
        policy::list_rules,
        current::current_user,
        current::current_menu_tree,
        current::change_own_password,
    ),
    components(schemas(
        ErrorResponse,
        HealthStatus,
        SystemInfo,
        PageResult,
        Menu,
        MenuAction,
        MenuResource,
        MenuInput,
        MenuActionInput,
        MenuResourceInput,
        MenuTree,
        MenuListResponse,
        Role,
        RoleMenu,
        RoleInput,
        RoleMenuInput,
        RoleListResponse,
        User,
        UserRole,
        UserStatus,
        UserInput,
        UserListResponse,
        PasswordChangeRequest,
        PolicyCheckRequest,
        PolicyCheckResponse,
        PolicyRuleView,
        MembershipView,
        PolicyRulesResponse,
        ProjectionSummary,
        CurrentUser,
        CurrentPasswordRequest,
    )),
    tags(
        (name = "system", description = "Health and service metadata"),
        (name = "menus", description = "Menu tree"),
        (name = "roles", description = "Roles and menu grants"),
        (name = "users", description = "Users and role assignments"),
        (name = "policy", description = "Authorization engine"),
        (name = "current", description = "Calling user's profile, menus and password")
    )
)]
pub struct ApiDoc;

mod common;
mod http_helpers;

use axum::http::StatusCode;
use common::{memory_app, read_json};
use http_helpers::{json_request, json_request_as, request_as};
use serde_json::json;
use tower::ServiceExt;

type App = axum::routing::RouterIntoService<axum::body::Body, ()>;

async fn create_menu(app: &App, body: serde_json::Value) -> serde_json::Value {
    let resp = app
        .clone()
        .oneshot(json_request("POST", "/v1/menus", body))
        .await
        .expect("create menu");
    assert_eq!(resp.status(), StatusCode::CREATED);
    read_json(resp).await
}

async fn get_menu(app: &App, id: &str) -> serde_json::Value {
    let resp = app
        .clone()
        .oneshot(request_as("GET", &format!("/v1/menus/{id}"), Some(common::ROOT)))
        .await
        .expect("get menu");
    assert_eq!(resp.status(), StatusCode::OK);
    read_json(resp).await
}

#[tokio::test]
async fn system_endpoints_are_public() {
    let (app, _) = memory_app(true).await;

    let resp = app
        .clone()
        .oneshot(request_as("GET", "/v1/system/health", None))
        .await
        .expect("health");
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(read_json(resp).await["status"], "ok");

    let resp = app
        .clone()
        .oneshot(request_as("GET", "/v1/system/info", None))
        .await
        .expect("info");
    assert_eq!(resp.status(), StatusCode::OK);
    let body = read_json(resp).await;
    assert_eq!(body["storage_backend"], "memory");
    assert_eq!(body["durable_storage"], false);
    assert_eq!(body["enforce"], true);

    let resp = app
        .oneshot(request_as("GET", "/v1/openapi.json", None))
        .await
        .expect("openapi");
    assert_eq!(resp.status(), StatusCode::OK);
    let body = read_json(resp).await;
    assert!(body["paths"]["/v1/menus"].is_object());
    assert!(body["paths"]["/v1/current/menus.tree"].is_object());
}

#[tokio::test]
async fn menu_crud_and_tree() {
    let (app, _) = memory_app(true).await;
    let root = create_menu(
        &app,
        json!({
            "name": "System",
            "sequence": 10,
            "actions": [{"code": "query", "name": "Query"}],
            "resources": [{"code": "list", "name": "List", "method": "GET", "path": "/v1/menus"}]
        }),
    )
    .await;
    let root_id = root["id"].as_str().expect("id").to_string();
    assert_eq!(root["parent_path"], "");

    let child = create_menu(&app, json!({"name": "Users", "parent_id": root_id})).await;
    let child_id = child["id"].as_str().expect("id").to_string();
    assert_eq!(child["parent_path"], root_id.as_str());

    let fetched = get_menu(&app, &root_id).await;
    assert_eq!(fetched["actions"][0]["code"], "query");
    assert_eq!(fetched["resources"][0]["path"], "/v1/menus");

    let resp = app
        .clone()
        .oneshot(request_as("GET", "/v1/menus.tree", Some(common::ROOT)))
        .await
        .expect("tree");
    assert_eq!(resp.status(), StatusCode::OK);
    let forest = read_json(resp).await;
    assert_eq!(forest.as_array().expect("forest").len(), 1);
    assert_eq!(forest[0]["children"][0]["id"], child_id.as_str());

    let resp = app
        .clone()
        .oneshot(request_as("GET", "/v1/menus?pageSize=-1", Some(common::ROOT)))
        .await
        .expect("list");
    let page = read_json(resp).await;
    assert_eq!(page["items"].as_array().expect("items").len(), 2);
    assert_eq!(page["page"]["total"], 2);

    let resp = app
        .clone()
        .oneshot(request_as(
            "GET",
            &format!("/v1/menus?current=2&pageSize=1&parentId={root_id}"),
            Some(common::ROOT),
        ))
        .await
        .expect("list page");
    let page = read_json(resp).await;
    assert!(page["items"].as_array().expect("items").is_empty());
    assert_eq!(page["page"]["total"], 1);

    let resp = app
        .clone()
        .oneshot(request_as(
            "DELETE",
            &format!("/v1/menus/{root_id}"),
            Some(common::ROOT),
        ))
        .await
        .expect("delete parent");
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(read_json(resp).await["code"], "validation_error");

    for id in [&child_id, &root_id] {
        let resp = app
            .clone()
            .oneshot(request_as(
                "DELETE",
                &format!("/v1/menus/{id}"),
                Some(common::ROOT),
            ))
            .await
            .expect("delete");
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    }

    let resp = app
        .oneshot(request_as(
            "GET",
            &format!("/v1/menus/{root_id}"),
            Some(common::ROOT),
        ))
        .await
        .expect("get deleted");
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn reparenting_rewrites_descendant_paths() {
    let (app, _) = memory_app(true).await;
    let m1 = create_menu(&app, json!({"name": "M1"})).await;
    let m1_id = m1["id"].as_str().expect("id").to_string();
    let m2 = create_menu(&app, json!({"name": "M2", "parent_id": m1_id})).await;
    let m2_id = m2["id"].as_str().expect("id").to_string();
    let m3 = create_menu(&app, json!({"name": "M3", "parent_id": m2_id})).await;
    let m3_id = m3["id"].as_str().expect("id").to_string();
    assert_eq!(m3["parent_path"], format!("{m1_id}/{m2_id}"));

    let resp = app
        .clone()
        .oneshot(json_request(
            "PUT",
            &format!("/v1/menus/{m2_id}"),
            json!({"name": "M2", "parent_id": ""}),
        ))
        .await
        .expect("move");
    assert_eq!(resp.status(), StatusCode::OK);
    let moved = read_json(resp).await;
    assert_eq!(moved["parent_path"], "");

    let m3 = get_menu(&app, &m3_id).await;
    assert_eq!(m3["parent_path"], m2_id.as_str());

    let resp = app
        .oneshot(json_request(
            "PUT",
            &format!("/v1/menus/{m2_id}"),
            json!({"name": "M2", "parent_id": m3_id}),
        ))
        .await
        .expect("cycle");
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn enforcement_follows_role_grants() {
    let (app, _) = memory_app(true).await;
    let menu = create_menu(
        &app,
        json!({
            "name": "Menus",
            "resources": [
                {"code": "list", "name": "List", "method": "GET", "path": "/v1/menus"},
                {"code": "show", "name": "Show", "method": "GET", "path": "/v1/menus/:id"}
            ]
        }),
    )
    .await;
    let menu_id = menu["id"].as_str().expect("id").to_string();

    let resp = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/v1/roles",
            json!({"name": "viewer", "menus": [{"menu_id": menu_id, "resources": ["list", "show"]}]}),
        ))
        .await
        .expect("create role");
    assert_eq!(resp.status(), StatusCode::CREATED);
    let role_id = read_json(resp).await["id"].as_str().expect("id").to_string();

    let resp = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/v1/users",
            json!({"username": "alice", "password": "s3cret", "role_ids": [role_id]}),
        ))
        .await
        .expect("create user");
    assert_eq!(resp.status(), StatusCode::CREATED);
    let user = read_json(resp).await;
    assert!(user.get("password_hash").is_none());
    let user_id = user["id"].as_str().expect("id").to_string();

    let resp = app
        .clone()
        .oneshot(request_as("GET", "/v1/menus", None))
        .await
        .expect("anonymous");
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let resp = app
        .clone()
        .oneshot(request_as("GET", "/v1/menus", Some(&user_id)))
        .await
        .expect("allowed list");
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = app
        .clone()
        .oneshot(request_as("GET", &format!("/v1/menus/{menu_id}"), Some(&user_id)))
        .await
        .expect("allowed show");
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = app
        .clone()
        .oneshot(request_as("GET", "/v1/roles", Some(&user_id)))
        .await
        .expect("denied");
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    assert_eq!(read_json(resp).await["code"], "forbidden");

    let resp = app
        .clone()
        .oneshot(request_as(
            "PATCH",
            &format!("/v1/users/{user_id}/disable"),
            Some(common::ROOT),
        ))
        .await
        .expect("disable");
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    let resp = app
        .clone()
        .oneshot(request_as("GET", "/v1/menus", Some(&user_id)))
        .await
        .expect("disabled user");
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let resp = app
        .clone()
        .oneshot(request_as(
            "PATCH",
            &format!("/v1/users/{user_id}/enable"),
            Some(common::ROOT),
        ))
        .await
        .expect("enable");
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    let resp = app
        .clone()
        .oneshot(request_as("GET", "/v1/menus", Some(&user_id)))
        .await
        .expect("re-enabled user");
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = app
        .clone()
        .oneshot(json_request(
            "PUT",
            &format!("/v1/roles/{role_id}"),
            json!({"name": "viewer", "menus": [{"menu_id": menu_id, "resources": ["show"]}]}),
        ))
        .await
        .expect("revoke list");
    assert_eq!(resp.status(), StatusCode::OK);
    let resp = app
        .clone()
        .oneshot(request_as("GET", "/v1/menus", Some(&user_id)))
        .await
        .expect("revoked");
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let resp = app
        .oneshot(request_as("GET", "/v1/roles", Some(common::ROOT)))
        .await
        .expect("root bypass");
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn enforcement_can_be_disabled() {
    let (app, _) = memory_app(false).await;
    let resp = app
        .oneshot(request_as("GET", "/v1/roles", None))
        .await
        .expect("open");
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn policy_endpoints_rebuild_and_report() {
    let (app, state) = memory_app(true).await;
    let menu = create_menu(
        &app,
        json!({
            "name": "Roles",
            "resources": [{"code": "list", "name": "List", "method": "GET", "path": "/v1/roles"}]
        }),
    )
    .await;
    let resp = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/v1/roles",
            json!({"name": "auditor", "menus": [{"menu_id": menu["id"], "resources": ["list"]}]}),
        ))
        .await
        .expect("create role");
    let role_id = read_json(resp).await["id"].as_str().expect("id").to_string();

    state.engine.remove_permissions(&role_id).await.expect("wipe");
    let check = json!({"subject": role_id, "path": "/v1/roles", "method": "GET"});
    let resp = app
        .clone()
        .oneshot(json_request("POST", "/v1/policy/check", check.clone()))
        .await
        .expect("check");
    assert_eq!(read_json(resp).await["allowed"], false);

    let resp = app
        .clone()
        .oneshot(json_request("POST", "/v1/policy/reload", json!({})))
        .await
        .expect("reload");
    assert_eq!(resp.status(), StatusCode::OK);
    let summary = read_json(resp).await;
    assert_eq!(summary["roles"], 1);
    assert_eq!(summary["permissions"], 1);

    let resp = app
        .clone()
        .oneshot(json_request("POST", "/v1/policy/check", check))
        .await
        .expect("check again");
    assert_eq!(read_json(resp).await["allowed"], true);

    let resp = app
        .oneshot(request_as("GET", "/v1/policy/rules", Some(common::ROOT)))
        .await
        .expect("rules");
    let rules = read_json(resp).await;
    assert_eq!(rules["permissions"][0]["subject"], role_id.as_str());
    assert_eq!(rules["permissions"][0]["path"], "/v1/roles");
}

#[tokio::test]
async fn validation_errors_surface_as_bad_request() {
    let (app, _) = memory_app(true).await;
    let resp = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/v1/users",
            json!({"username": "root", "password": "x"}),
        ))
        .await
        .expect("reserved");
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/v1/menus",
            json!({"name": "Orphan", "parent_id": "missing"}),
        ))
        .await
        .expect("orphan");
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let resp = app
        .oneshot(json_request(
            "POST",
            "/v1/roles",
            json!({"name": "ghost", "menus": [{"menu_id": "missing"}]}),
        ))
        .await
        .expect("missing grant");
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn current_endpoints_act_on_the_caller() {
    let (app, _) = memory_app(true).await;
    let top = create_menu(&app, json!({"name": "Admin"})).await;
    let top_id = top["id"].as_str().expect("id").to_string();
    let leaf = create_menu(
        &app,
        json!({
            "name": "Users",
            "parent_id": top_id,
            "actions": [
                {"code": "add", "name": "Add"},
                {"code": "del", "name": "Delete"}
            ]
        }),
    )
    .await;
    let leaf_id = leaf["id"].as_str().expect("id").to_string();
    create_menu(&app, json!({"name": "Secret", "hidden": true})).await;

    let resp = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/v1/roles",
            json!({"name": "clerk", "menus": [{"menu_id": leaf_id, "actions": ["add"]}]}),
        ))
        .await
        .expect("create role");
    assert_eq!(resp.status(), StatusCode::CREATED);
    let role_id = read_json(resp).await["id"].as_str().expect("id").to_string();

    let mut ids = Vec::new();
    for (username, roles) in [("alice", vec![role_id]), ("bob", Vec::new())] {
        let resp = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/v1/users",
                json!({"username": username, "password": "s3cret", "role_ids": roles}),
            ))
            .await
            .expect("create user");
        assert_eq!(resp.status(), StatusCode::CREATED);
        ids.push(read_json(resp).await["id"].as_str().expect("id").to_string());
    }
    let (alice, bob) = (&ids[0], &ids[1]);

    let resp = app
        .clone()
        .oneshot(request_as("GET", "/v1/current/user", None))
        .await
        .expect("anonymous");
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let resp = app
        .clone()
        .oneshot(request_as("GET", "/v1/current/user", Some(alice)))
        .await
        .expect("profile");
    assert_eq!(resp.status(), StatusCode::OK);
    let me = read_json(resp).await;
    assert_eq!(me["username"], "alice");
    assert_eq!(me["role_names"], json!(["clerk"]));

    let resp = app
        .clone()
        .oneshot(request_as("GET", "/v1/current/menus.tree", Some(alice)))
        .await
        .expect("alice tree");
    assert_eq!(resp.status(), StatusCode::OK);
    let tree = read_json(resp).await;
    assert_eq!(tree.as_array().expect("forest").len(), 1);
    assert_eq!(tree[0]["id"], top_id.as_str());
    assert_eq!(tree[0]["actions"], json!([]));
    assert_eq!(tree[0]["children"][0]["id"], leaf_id.as_str());
    assert_eq!(tree[0]["children"][0]["actions"][0]["code"], "add");
    assert_eq!(tree[0]["children"][0]["actions"].as_array().expect("actions").len(), 1);

    let resp = app
        .clone()
        .oneshot(request_as("GET", "/v1/current/menus.tree", Some(bob)))
        .await
        .expect("bob tree");
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let resp = app
        .clone()
        .oneshot(request_as("GET", "/v1/current/menus.tree", Some(common::ROOT)))
        .await
        .expect("root tree");
    assert_eq!(resp.status(), StatusCode::OK);
    let tree = read_json(resp).await;
    let names: Vec<&str> = tree
        .as_array()
        .expect("forest")
        .iter()
        .filter_map(|node| node["name"].as_str())
        .collect();
    assert_eq!(names, ["Admin"]);

    let resp = app
        .clone()
        .oneshot(json_request_as(
            "PUT",
            "/v1/current/password",
            alice,
            json!({"old_password": "wrong", "new_password": "next"}),
        ))
        .await
        .expect("wrong password");
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = app
        .clone()
        .oneshot(json_request_as(
            "PUT",
            "/v1/current/password",
            alice,
            json!({"old_password": "s3cret", "new_password": "next"}),
        ))
        .await
        .expect("change password");
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);

    let resp = app
        .clone()
        .oneshot(json_request(
            "PUT",
            "/v1/current/password",
            json!({"old_password": "x", "new_password": "y"}),
        ))
        .await
        .expect("root password");
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

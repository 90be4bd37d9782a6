use casbin::prelude::DefaultModel;

// Roles are plain subjects: a user inherits every rule granted to a role it is a member of.
const MODEL: &str = r#"
[request_definition]
r = sub, obj, act

[policy_definition]
p = sub, obj, act

[role_definition]
g = _, _

[policy_effect]
e = some(where (p.eft == allow))

[matchers]
m = (r.sub == p.sub || g(r.sub, p.sub)) && keyMatch2(r.obj, p.obj) && r.act == p.act
"#;

pub fn casbin_model_string() -> &'static str {
    MODEL
}

pub async fn casbin_model() -> casbin::Result<DefaultModel> {
    DefaultModel::from_str(MODEL).await
}

use serde::{Deserialize, Serialize};

/// A permission rule: `subject` may call `method` on `path`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PolicyRule {
    pub subject: String,
    pub path: String,
    pub method: String,
}

/// A membership edge: `user` inherits the rules of `role`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Membership {
    pub user: String,
    pub role: String,
}

/// Sorted copy of everything the engine currently holds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSnapshot {
    pub permissions: Vec<PolicyRule>,
    pub memberships: Vec<Membership>,
}

impl PolicyRule {
    pub(crate) fn from_row(row: Vec<String>) -> Option<Self> {
        let mut fields = row.into_iter();
        Some(Self {
            subject: fields.next()?,
            path: fields.next()?,
            method: fields.next()?,
        })
    }
}

impl Membership {
    pub(crate) fn from_row(row: Vec<String>) -> Option<Self> {
        let mut fields = row.into_iter();
        Some(Self {
            user: fields.next()?,
            role: fields.next()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_with_missing_fields_are_rejected() {
        assert!(PolicyRule::from_row(vec!["r1".into(), "/x".into()]).is_none());
        assert!(Membership::from_row(vec!["u1".into()]).is_none());
        let rule = PolicyRule::from_row(vec!["r1".into(), "/x".into(), "GET".into()])
            .expect("rule");
        assert_eq!(rule.method, "GET");
    }
}

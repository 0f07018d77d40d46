// per-connection safety policy and the allow / deny / protect decision

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::classify::{Classified, StatementKind, Target};
use super::predicate::PredicateShape;

/// What happens to an error once the statement has been cleaned up.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorMode {
    /// hand the error back to the caller
    #[default]
    Propagate,
    /// log it and report a skipped statement instead
    Swallow,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Policy {
    pub allow_dropping: bool,
    pub check_delete_statements: bool,
    /// run the shadow check even when the WHERE clause looks selective
    pub verify_selective_deletes: bool,
    pub banned: BTreeSet<StatementKind>,
    pub error_mode: ErrorMode,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            allow_dropping: false,
            check_delete_statements: true,
            verify_selective_deletes: true,
            banned: BTreeSet::new(),
            error_mode: ErrorMode::Propagate,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", content = "kind", rename_all = "snake_case")]
pub enum DenyReason {
    DropDisabled,
    Banned(StatementKind),
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DropDisabled => f.write_str("dropping is disabled on this database"),
            Self::Banned(kind) => write!(f, "{kind} statements are banned on this database"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(DenyReason),
    /// run through the shadow-copy check before touching the real table
    Protect,
}

impl Policy {
    pub fn decide(&self, statement: &Classified) -> Decision {
        decide(
            statement.kind(),
            statement.target(),
            statement.shape(),
            self,
        )
    }
}

pub fn decide(
    kind: StatementKind,
    target: Option<&Target>,
    shape: Option<PredicateShape>,
    policy: &Policy,
) -> Decision {
    if policy.banned.contains(&kind) {
        return Decision::Deny(DenyReason::Banned(kind));
    }

    match kind {
        StatementKind::Drop if !policy.allow_dropping => Decision::Deny(DenyReason::DropDisabled),
        StatementKind::Delete if !policy.allow_dropping && policy.check_delete_statements => {
            // no target means we can't tell what it hits, so never let it through unchecked
            match (target, shape) {
                (None, _) => Decision::Protect,
                (_, Some(PredicateShape::Selective)) if !policy.verify_selective_deletes => {
                    Decision::Allow
                }
                _ => Decision::Protect,
            }
        }
        _ => Decision::Allow,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_safe() {
        let policy = Policy::default();
        assert!(!policy.allow_dropping);
        assert!(policy.check_delete_statements);
        assert!(policy.banned.is_empty());
        assert_eq!(policy.error_mode, ErrorMode::Propagate);
    }

    #[test]
    fn partial_json_fills_in_defaults() {
        let policy: Policy = serde_json::from_str(r#"{"banned": ["INSERT"]}"#).unwrap();
        assert!(policy.banned.contains(&StatementKind::Insert));
        assert!(policy.check_delete_statements);
    }
}

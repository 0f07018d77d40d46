// tests for the allow / deny / protect decision

use sqlward::{Decision, DenyReason, Policy, StatementKind, classify};

fn decide(policy: &Policy, sql: &str) -> Decision {
    policy.decide(&classify(sql).unwrap())
}

#[test]
fn test_reads_and_writes_are_allowed() {
    let policy = Policy::default();
    for sql in [
        "SELECT * FROM users",
        "INSERT INTO users VALUES (3, 'c')",
        "UPDATE users SET name = 'x'",
        "UPDATE users SET name = 'x' WHERE 1 = 1",
        "CREATE TABLE t (id INTEGER)",
    ] {
        assert_eq!(decide(&policy, sql), Decision::Allow, "{sql}");
    }
}

#[test]
fn test_drop_denied_by_default() {
    let policy = Policy::default();
    assert_eq!(
        decide(&policy, "DROP TABLE users"),
        Decision::Deny(DenyReason::DropDisabled)
    );
}

#[test]
fn test_drop_allowed_when_enabled() {
    let policy = Policy {
        allow_dropping: true,
        ..Policy::default()
    };
    assert_eq!(decide(&policy, "DROP TABLE users"), Decision::Allow);
}

#[test]
fn test_banned_kind_checked_first() {
    let mut policy = Policy::default();
    policy.banned.insert(StatementKind::Select);
    assert_eq!(
        decide(&policy, "SELECT 1"),
        Decision::Deny(DenyReason::Banned(StatementKind::Select))
    );

    // a banned DROP reports the ban, not the drop setting
    policy.banned.insert(StatementKind::Drop);
    assert_eq!(
        decide(&policy, "DROP TABLE users"),
        Decision::Deny(DenyReason::Banned(StatementKind::Drop))
    );
}

#[test]
fn test_unguarded_deletes_are_protected() {
    let policy = Policy::default();
    assert_eq!(decide(&policy, "DELETE FROM users"), Decision::Protect);
    assert_eq!(decide(&policy, "DELETE FROM users WHERE 1=1"), Decision::Protect);
}

#[test]
fn test_selective_delete_verified_unless_turned_off() {
    let mut policy = Policy::default();
    assert_eq!(decide(&policy, "DELETE FROM users WHERE id = 1"), Decision::Protect);

    policy.verify_selective_deletes = false;
    assert_eq!(decide(&policy, "DELETE FROM users WHERE id = 1"), Decision::Allow);
    assert_eq!(decide(&policy, "DELETE FROM users WHERE 1=1"), Decision::Protect);
}

#[test]
fn test_delete_without_target_is_protected() {
    let policy = Policy {
        verify_selective_deletes: false,
        ..Policy::default()
    };
    assert_eq!(decide(&policy, "DELETE FROM WHERE id = 1"), Decision::Protect);
}

#[test]
fn test_delete_checking_off() {
    let policy = Policy {
        check_delete_statements: false,
        ..Policy::default()
    };
    assert_eq!(decide(&policy, "DELETE FROM users"), Decision::Allow);
}

#[test]
fn test_allow_dropping_turns_off_delete_protection() {
    let policy = Policy {
        allow_dropping: true,
        ..Policy::default()
    };
    assert_eq!(decide(&policy, "DELETE FROM users"), Decision::Allow);
}

#[test]
fn test_deny_reason_messages() {
    assert!(DenyReason::DropDisabled.to_string().contains("dropping"));
    assert!(
        DenyReason::Banned(StatementKind::Insert)
            .to_string()
            .contains("INSERT")
    );
}

// tests for statement classification and where clause analysis

use sqlward::{
    Error, PredicateShape, StatementKind, classify, is_always_true_where, is_dangerous_delete,
    is_delete_without_where, is_drop_query, split,
};

fn shape(sql: &str) -> Option<PredicateShape> {
    classify(sql).unwrap().shape()
}

#[test]
fn test_select_has_no_target() {
    let c = classify("SELECT * FROM users WHERE 1 = 1").unwrap();
    assert_eq!(c.kind(), StatementKind::Select);
    assert!(c.target().is_none());
    assert!(c.shape().is_none());
}

#[test]
fn test_kind_is_case_insensitive_and_skips_comments() {
    let c = classify("  -- remove one\n /* really */ delete from users where id = 1").unwrap();
    assert_eq!(c.kind(), StatementKind::Delete);
    assert_eq!(c.target().unwrap().name, "users");
    assert_eq!(c.sql(), "delete from users where id = 1");
}

#[test]
fn test_insert_and_replace() {
    assert_eq!(
        classify("INSERT INTO users VALUES (1, 'a')").unwrap().kind(),
        StatementKind::Insert
    );
    assert_eq!(
        classify("REPLACE INTO users VALUES (1, 'a')").unwrap().kind(),
        StatementKind::Insert
    );
}

#[test]
fn test_create_alter_other() {
    assert_eq!(
        classify("CREATE TABLE t (id INTEGER)").unwrap().kind(),
        StatementKind::Create
    );
    assert_eq!(
        classify("ALTER TABLE t ADD COLUMN name TEXT").unwrap().kind(),
        StatementKind::Alter
    );
    assert_eq!(classify("PRAGMA user_version").unwrap().kind(), StatementKind::Other);
}

#[test]
fn test_with_prefix_uses_main_verb() {
    let c = classify(
        "WITH old AS (SELECT id FROM users WHERE id < 3) \
         DELETE FROM users WHERE id IN (SELECT id FROM old)",
    )
    .unwrap();
    assert_eq!(c.kind(), StatementKind::Delete);
    assert_eq!(c.target().unwrap().name, "users");
    assert_eq!(c.shape(), Some(PredicateShape::Selective));
}

#[test]
fn test_delete_without_where_is_absent() {
    assert_eq!(shape("DELETE FROM users"), Some(PredicateShape::Absent));
}

#[test]
fn test_delete_target_schema_qualified() {
    let c = classify("DELETE FROM main.users WHERE id = 1").unwrap();
    let target = c.target().unwrap();
    assert_eq!(target.schema.as_deref(), Some("main"));
    assert_eq!(target.name, "users");
    assert_eq!(target.text(), "main.users");
}

#[test]
fn test_delete_missing_target() {
    let c = classify("DELETE FROM WHERE id = 1").unwrap();
    assert_eq!(c.kind(), StatementKind::Delete);
    assert!(c.target().is_none());
}

#[test]
fn test_where_clause_stops_at_returning() {
    let c = classify("DELETE FROM users WHERE id = 1 RETURNING name").unwrap();
    assert_eq!(c.predicate().unwrap().text(), "id = 1");
}

#[test]
fn test_drop_targets() {
    let c = classify("DROP TABLE IF EXISTS users").unwrap();
    assert_eq!(c.kind(), StatementKind::Drop);
    assert_eq!(c.target().unwrap().name, "users");

    let c = classify("drop view recent_orders").unwrap();
    assert_eq!(c.target().unwrap().name, "recent_orders");

    let c = classify("DROP TABLE").unwrap();
    assert_eq!(c.kind(), StatementKind::Drop);
    assert!(c.target().is_none());
}

#[test]
fn test_tautologies() {
    for sql in [
        "DELETE FROM users WHERE 1=1",
        "DELETE FROM users WHERE 1 == 1",
        "DELETE FROM users WHERE 'x'='x'",
        "DELETE FROM users WHERE TRUE",
        "DELETE FROM users WHERE 1",
        "DELETE FROM users WHERE (1 = 1)",
        "DELETE FROM users WHERE id = 3 OR 1 = 1",
        "DELETE FROM users WHERE 1 = 1 AND 2 = 2",
        "DELETE FROM users WHERE 1 <> 2",
        "DELETE FROM users WHERE -1 < 0",
        "DELETE FROM users WHERE NULL IS NULL",
        "DELETE FROM users WHERE NOT 0",
        "DELETE FROM users WHERE 9007199254740993 = 9007199254740993",
        "DELETE FROM users WHERE 1 = 1.0",
        "DELETE FROM users WHERE 2 > 1.5",
    ] {
        assert_eq!(shape(sql), Some(PredicateShape::Tautological), "{sql}");
    }
}

#[test]
fn test_selective_predicates() {
    for sql in [
        "DELETE FROM users WHERE id = 1",
        "DELETE FROM users WHERE id = id",
        "DELETE FROM users WHERE ? = ?",
        "DELETE FROM users WHERE 1 = 1 AND id = 2",
        "DELETE FROM users WHERE id BETWEEN 1 AND 5",
        "DELETE FROM users WHERE 'a' = 'b'",
        "DELETE FROM users WHERE 0",
        "DELETE FROM users WHERE NULL = NULL",
        "DELETE FROM users WHERE (id = 1) OR (id = 2)",
        "DELETE FROM users WHERE 9007199254740993 = 9007199254740992",
        "DELETE FROM users WHERE 9007199254740993 = 9007199254740992.0",
        "DELETE FROM users WHERE 1 = 1.5",
    ] {
        assert_eq!(shape(sql), Some(PredicateShape::Selective), "{sql}");
    }
}

#[test]
fn test_update_gets_a_shape_but_no_target() {
    let c = classify("UPDATE users SET name = 'x' WHERE 1 = 1").unwrap();
    assert_eq!(c.kind(), StatementKind::Update);
    assert!(c.target().is_none());
    assert_eq!(c.shape(), Some(PredicateShape::Tautological));
}

#[test]
fn test_multiple_statements_rejected() {
    let err = classify("SELECT 1; SELECT 2").unwrap_err();
    assert!(matches!(err, Error::MultipleStatements(2)));
}

#[test]
fn test_trailing_semicolon_is_one_statement() {
    assert_eq!(classify("SELECT 1;").unwrap().sql(), "SELECT 1");
}

#[test]
fn test_empty_input() {
    assert!(classify("  -- nothing here\n").unwrap().is_empty());
    assert!(split(";;").unwrap().is_empty());
}

#[test]
fn test_semicolon_inside_string() {
    let statements = split("INSERT INTO t VALUES ('a;b'); SELECT 1").unwrap();
    assert_eq!(statements.len(), 2);
    assert_eq!(statements[0].sql(), "INSERT INTO t VALUES ('a;b')");
}

#[test]
fn test_trigger_body_stays_whole() {
    let statements = split(
        "CREATE TRIGGER tr AFTER INSERT ON t BEGIN UPDATE t SET x = 1; END; SELECT 1",
    )
    .unwrap();
    assert_eq!(statements.len(), 2);
    assert_eq!(statements[0].kind(), StatementKind::Create);
    assert_eq!(statements[1].kind(), StatementKind::Select);
}

#[test]
fn test_unterminated_string_is_ambiguous() {
    let err = classify("DELETE FROM users WHERE name = 'oops").unwrap_err();
    assert!(matches!(err, Error::ClassificationAmbiguous(_)));
}

#[test]
fn test_placeholders_counted() {
    assert_eq!(classify("DELETE FROM users WHERE id = ? OR name = ?").unwrap().placeholders(), 2);
    assert_eq!(classify("SELECT 1").unwrap().placeholders(), 0);
}

#[test]
fn test_retarget_replaces_only_the_table() {
    let c = classify("DELETE FROM users WHERE name = 'users' AND users.id = 1").unwrap();
    assert_eq!(
        c.retarget("shadow").unwrap(),
        "DELETE FROM shadow WHERE name = 'users' AND shadow.id = 1"
    );
}

#[test]
fn test_retarget_leaves_subquery_over_same_table() {
    let c = classify("DELETE FROM users WHERE id = (SELECT max(users.id) FROM users)").unwrap();
    assert_eq!(
        c.retarget("shadow").unwrap(),
        "DELETE FROM shadow WHERE id = (SELECT max(users.id) FROM users)"
    );
}

#[test]
fn test_retarget_correlated_subquery() {
    let c = classify(
        "DELETE FROM users WHERE EXISTS (SELECT 1 FROM orders WHERE orders.uid = users.id)",
    )
    .unwrap();
    assert_eq!(
        c.retarget("shadow").unwrap(),
        "DELETE FROM shadow WHERE EXISTS (SELECT 1 FROM orders WHERE orders.uid = shadow.id)"
    );

    // an aliased inner copy doesn't hide the outer name
    let c = classify(
        "DELETE FROM users WHERE id IN (SELECT u.id FROM users u WHERE u.name = users.name)",
    )
    .unwrap();
    assert_eq!(
        c.retarget("shadow").unwrap(),
        "DELETE FROM shadow WHERE id IN (SELECT u.id FROM users u WHERE u.name = shadow.name)"
    );
}

#[test]
fn test_retarget_without_target() {
    let c = classify("SELECT * FROM users").unwrap();
    assert!(c.retarget("shadow").is_none());
}

#[test]
fn test_kind_from_str() {
    assert_eq!("delete".parse::<StatementKind>().unwrap(), StatementKind::Delete);
    assert_eq!(" Drop ".parse::<StatementKind>().unwrap(), StatementKind::Drop);
    assert!("bogus".parse::<StatementKind>().is_err());
}

#[test]
fn test_quick_checks() {
    assert!(is_drop_query("SELECT 1; DROP TABLE users"));
    assert!(!is_drop_query("SELECT 'DROP TABLE users'"));

    assert!(is_delete_without_where("DELETE FROM users"));
    assert!(!is_delete_without_where("DELETE FROM users WHERE 1=1"));

    assert!(is_always_true_where("UPDATE users SET name = 'x' WHERE 'a' = 'a'"));
    assert!(!is_always_true_where("DELETE FROM users WHERE id = 2"));

    assert!(is_dangerous_delete("DELETE FROM users WHERE 1=1"));
    assert!(is_dangerous_delete("DELETE FROM users"));
    assert!(!is_dangerous_delete("DELETE FROM users WHERE id = 2"));
}

//! End-to-end SQL scenarios, driven purely through `execute`.

use opaldb::error::ResultTest;
use opaldb::{QueryResult, RelationalDB, Value};
use tempfile::TempDir;

fn make_test_db() -> ResultTest<(RelationalDB, TempDir)> {
    let _ = env_logger::builder().is_test(true).try_init();
    let tmp = TempDir::new()?;
    let db = RelationalDB::open(tmp.path())?;
    Ok((db, tmp))
}

fn run_ok(db: &RelationalDB, sql: &str) -> QueryResult {
    let result = db.execute(sql);
    assert!(result.success, "`{sql}` failed: {}", result.message);
    result
}

fn run_err(db: &RelationalDB, sql: &str) -> QueryResult {
    let result = db.execute(sql);
    assert!(!result.success, "`{sql}` unexpectedly succeeded");
    result
}

#[test]
fn create_insert_select_with_filter_and_order() -> ResultTest<()> {
    let (db, _tmp) = make_test_db()?;
    run_ok(
        &db,
        "CREATE TABLE users (id INTEGER PRIMARY KEY, name VARCHAR(100) NOT NULL, age INTEGER);",
    );
    run_ok(&db, "INSERT INTO users (id,name,age) VALUES (1,'Alice',30);");
    run_ok(&db, "INSERT INTO users (id,name,age) VALUES (2,'Bob',25);");

    let result = run_ok(&db, "SELECT name FROM users WHERE age > 25 ORDER BY age DESC;");
    assert_eq!(result.rows.len(), 1);
    assert_eq!(result.rows[0]["name"], Value::Text("Alice".into()));
    // Projection produced exactly the asked-for column.
    assert_eq!(result.rows[0].len(), 1);
    Ok(())
}

#[test]
fn unique_violation_leaves_table_and_index_untouched() -> ResultTest<()> {
    let (db, _tmp) = make_test_db()?;
    run_ok(
        &db,
        "CREATE TABLE t (id INTEGER PRIMARY KEY, e VARCHAR(50) UNIQUE)",
    );
    run_ok(&db, "INSERT INTO t (id,e) VALUES (1,'a@x')");

    let result = run_err(&db, "INSERT INTO t (id,e) VALUES (2,'a@x')");
    assert!(
        result.message.contains("ConstraintViolation"),
        "{}",
        result.message
    );

    assert_eq!(run_ok(&db, "SELECT * FROM t").rows.len(), 1);
    assert_eq!(db.table_info("t").unwrap().row_count, 1);

    let e_stats = db
        .index_stats("t")?
        .into_iter()
        .find(|s| s.column == "e")
        .unwrap();
    assert_eq!(e_stats.total_entries, 1);
    assert_eq!(e_stats.distinct_keys, 1);
    Ok(())
}

#[test]
fn indexed_range_query() -> ResultTest<()> {
    let (db, _tmp) = make_test_db()?;
    run_ok(&db, "CREATE TABLE p (id INTEGER PRIMARY KEY, age INTEGER)");
    for (id, age) in [(1, 10), (2, 20), (3, 30), (4, 40), (5, 50)] {
        run_ok(&db, &format!("INSERT INTO p (id, age) VALUES ({id}, {age})"));
    }
    run_ok(&db, "CREATE INDEX i_age ON p(age)");

    let result = run_ok(
        &db,
        "SELECT id FROM p WHERE age >= 20 AND age < 40 ORDER BY age ASC",
    );
    let ids: Vec<Value> = result.rows.iter().map(|r| r["id"].clone()).collect();
    assert_eq!(ids, vec![Value::Int(2), Value::Int(3)]);
    Ok(())
}

#[test]
fn update_that_violates_unique_restores_row_and_index() -> ResultTest<()> {
    let (db, _tmp) = make_test_db()?;
    run_ok(
        &db,
        "CREATE TABLE u (id INTEGER PRIMARY KEY, e VARCHAR(50) UNIQUE)",
    );
    run_ok(&db, "INSERT INTO u (id,e) VALUES (1,'a')");
    run_ok(&db, "INSERT INTO u (id,e) VALUES (2,'b')");

    let result = run_err(&db, "UPDATE u SET e='b' WHERE id=1");
    assert!(
        result.message.contains("ConstraintViolation"),
        "{}",
        result.message
    );

    // Row 1 still holds 'a'.
    let row1 = run_ok(&db, "SELECT e FROM u WHERE id=1");
    assert_eq!(row1.rows[0]["e"], Value::Text("a".into()));

    // The index still maps a -> row 1 and b -> row 2.
    let by_a = run_ok(&db, "SELECT id FROM u WHERE e='a'");
    assert_eq!(by_a.rows[0]["id"], Value::Int(1));
    let by_b = run_ok(&db, "SELECT id FROM u WHERE e='b'");
    assert_eq!(by_b.rows[0]["id"], Value::Int(2));

    let e_stats = db
        .index_stats("u")?
        .into_iter()
        .find(|s| s.column == "e")
        .unwrap();
    assert_eq!(e_stats.total_entries, 2);
    Ok(())
}

#[test]
fn delete_cascades_to_indexes() -> ResultTest<()> {
    let (db, _tmp) = make_test_db()?;
    run_ok(&db, "CREATE TABLE d (id INTEGER PRIMARY KEY, name VARCHAR(20))");
    run_ok(&db, "CREATE INDEX i_n ON d(name)");
    run_ok(&db, "INSERT INTO d (id,name) VALUES (1,'x')");
    run_ok(&db, "DELETE FROM d WHERE id=1");

    assert_eq!(run_ok(&db, "SELECT * FROM d WHERE name='x'").rows.len(), 0);
    let n_stats = db
        .index_stats("d")?
        .into_iter()
        .find(|s| s.column == "name")
        .unwrap();
    assert_eq!(n_stats.total_entries, 0);
    Ok(())
}

#[test]
fn insert_coerces_text_literals_to_column_types() -> ResultTest<()> {
    let (db, _tmp) = make_test_db()?;
    run_ok(
        &db,
        "CREATE TABLE c (id INTEGER PRIMARY KEY, active BOOLEAN DEFAULT TRUE, score FLOAT)",
    );
    run_ok(&db, "INSERT INTO c (id, active, score) VALUES (1, 'true', '3.5')");

    let result = run_ok(&db, "SELECT * FROM c WHERE id=1");
    let row = &result.rows[0];
    assert_eq!(row["id"], Value::Int(1));
    assert_eq!(row["active"], Value::Bool(true));
    assert_eq!(row["score"], Value::Float(3.5));
    Ok(())
}

#[test]
fn insert_reports_every_validation_failure() -> ResultTest<()> {
    let (db, _tmp) = make_test_db()?;
    run_ok(
        &db,
        "CREATE TABLE t (id INTEGER PRIMARY KEY, name VARCHAR(10) NOT NULL, age INTEGER)",
    );

    // Missing NOT NULL name plus an uncoercible age: one rejection, both
    // failures named.
    let result = run_err(&db, "INSERT INTO t (id, age) VALUES (1, 'x')");
    assert!(result.message.contains("`name`"), "{}", result.message);
    assert!(result.message.contains("`age`"), "{}", result.message);
    assert!(
        result.message.contains("ConstraintViolation"),
        "{}",
        result.message
    );
    assert!(result.message.contains("TypeError"), "{}", result.message);
    assert_eq!(db.table_info("t").unwrap().row_count, 0);

    // A lone failure keeps its own kind, with no joining.
    let result = run_err(&db, "INSERT INTO t (id, name, age) VALUES (1, 'ok', 'x')");
    assert!(!result.message.contains(';'), "{}", result.message);
    assert!(result.message.contains("TypeError"), "{}", result.message);
    Ok(())
}

#[test]
fn update_reports_every_validation_failure() -> ResultTest<()> {
    let (db, _tmp) = make_test_db()?;
    run_ok(
        &db,
        "CREATE TABLE t (id INTEGER PRIMARY KEY, name VARCHAR(10) NOT NULL, age INTEGER)",
    );
    run_ok(&db, "INSERT INTO t (id, name, age) VALUES (1, 'Ada', 30)");

    let result = run_err(&db, "UPDATE t SET name = NULL, age = 'x' WHERE id = 1");
    assert!(result.message.contains("`name`"), "{}", result.message);
    assert!(result.message.contains("`age`"), "{}", result.message);

    // The row is untouched.
    let row = &run_ok(&db, "SELECT * FROM t WHERE id = 1").rows[0];
    assert_eq!(row["name"], Value::Text("Ada".into()));
    assert_eq!(row["age"], Value::Int(30));
    Ok(())
}

#[test]
fn defaults_fill_omitted_columns() -> ResultTest<()> {
    let (db, _tmp) = make_test_db()?;
    run_ok(
        &db,
        "CREATE TABLE s (id INTEGER PRIMARY KEY, active BOOLEAN DEFAULT TRUE, note TEXT)",
    );
    run_ok(&db, "INSERT INTO s (id) VALUES (1)");

    let row = &run_ok(&db, "SELECT * FROM s").rows[0];
    assert_eq!(row["active"], Value::Bool(true));
    assert_eq!(row["note"], Value::Null);
    Ok(())
}

#[test]
fn date_columns_round_trip_and_compare_chronologically() -> ResultTest<()> {
    let (db, _tmp) = make_test_db()?;
    run_ok(&db, "CREATE TABLE ev (id INTEGER PRIMARY KEY, day DATE)");
    run_ok(&db, "INSERT INTO ev (id, day) VALUES (1, '2025-01-15')");
    run_ok(&db, "INSERT INTO ev (id, day) VALUES (2, '2024-12-31')");

    let result = run_ok(&db, "SELECT id FROM ev WHERE day > '2025-01-01'");
    assert_eq!(result.rows.len(), 1);
    assert_eq!(result.rows[0]["id"], Value::Int(1));

    let ordered = run_ok(&db, "SELECT id FROM ev ORDER BY day ASC");
    assert_eq!(ordered.rows[0]["id"], Value::Int(2));

    run_err(&db, "INSERT INTO ev (id, day) VALUES (3, 'not-a-date')");
    Ok(())
}

#[test]
fn ddl_conflicts_and_missing_objects() -> ResultTest<()> {
    let (db, _tmp) = make_test_db()?;
    run_ok(&db, "CREATE TABLE t (id INTEGER PRIMARY KEY, v INTEGER)");

    let result = run_err(&db, "CREATE TABLE t (id INTEGER PRIMARY KEY)");
    assert!(result.message.contains("SchemaError"), "{}", result.message);

    run_err(&db, "DROP TABLE ghost");
    run_err(&db, "CREATE INDEX i_v ON ghost(v)");
    run_err(&db, "CREATE INDEX i_v ON t(ghost)");
    run_err(&db, "DROP INDEX ghost ON t");

    run_ok(&db, "CREATE INDEX i_v ON t(v)");
    let result = run_err(&db, "CREATE INDEX i_v2 ON t(v)");
    assert!(result.message.contains("SchemaError"), "{}", result.message);

    run_ok(&db, "DROP INDEX i_v ON t");
    run_err(&db, "DROP INDEX i_v ON t");
    Ok(())
}

#[test]
fn drop_table_cascades() -> ResultTest<()> {
    let (db, tmp) = make_test_db()?;
    run_ok(
        &db,
        "CREATE TABLE t (id INTEGER PRIMARY KEY, e VARCHAR(10) UNIQUE)",
    );
    run_ok(&db, "INSERT INTO t (id, e) VALUES (1, 'a')");
    run_ok(&db, "DROP TABLE t");

    run_err(&db, "SELECT * FROM t");
    assert!(db.table_info("t").is_none());
    assert!(db.indexes().is_empty());
    assert!(!tmp.path().join("t.json").exists());
    assert!(!tmp.path().join("t_indexes.json").exists());

    // The name is free again and the new table starts fresh.
    run_ok(&db, "CREATE TABLE t (id INTEGER PRIMARY KEY)");
    let result = run_ok(&db, "INSERT INTO t (id) VALUES (7)");
    assert!(result.message.contains("row id 1"), "{}", result.message);
    Ok(())
}

#[test]
fn create_unique_index_aborts_on_existing_duplicates() -> ResultTest<()> {
    let (db, _tmp) = make_test_db()?;
    run_ok(&db, "CREATE TABLE t (id INTEGER PRIMARY KEY, v INTEGER)");
    run_ok(&db, "INSERT INTO t (id, v) VALUES (1, 5)");
    run_ok(&db, "INSERT INTO t (id, v) VALUES (2, 5)");

    let result = run_err(&db, "CREATE UNIQUE INDEX i_v ON t(v)");
    assert!(result.message.contains("IndexError"), "{}", result.message);

    // Nothing was registered; a plain index on the same column still works.
    run_ok(&db, "CREATE INDEX i_v ON t(v)");
    let stats = db
        .index_stats("t")?
        .into_iter()
        .find(|s| s.column == "v")
        .unwrap();
    assert_eq!(stats.total_entries, 2);
    assert!(!stats.unique);
    Ok(())
}

#[test]
fn null_keys_are_never_indexed() -> ResultTest<()> {
    let (db, _tmp) = make_test_db()?;
    run_ok(
        &db,
        "CREATE TABLE t (id INTEGER PRIMARY KEY, e VARCHAR(10) UNIQUE)",
    );
    // Two null emails do not conflict and do not appear in the index.
    run_ok(&db, "INSERT INTO t (id, e) VALUES (1, NULL)");
    run_ok(&db, "INSERT INTO t (id, e) VALUES (2, NULL)");

    let e_stats = db
        .index_stats("t")?
        .into_iter()
        .find(|s| s.column == "e")
        .unwrap();
    assert_eq!(e_stats.total_entries, 0);
    assert_eq!(run_ok(&db, "SELECT * FROM t WHERE e IS NULL").rows.len(), 2);
    Ok(())
}

#[test]
fn update_reroutes_index_lookups() -> ResultTest<()> {
    let (db, _tmp) = make_test_db()?;
    run_ok(&db, "CREATE TABLE t (id INTEGER PRIMARY KEY, age INTEGER)");
    run_ok(&db, "CREATE INDEX i_age ON t(age)");
    run_ok(&db, "INSERT INTO t (id, age) VALUES (1, 30)");

    run_ok(&db, "UPDATE t SET age = 31 WHERE id = 1");
    assert_eq!(run_ok(&db, "SELECT * FROM t WHERE age = 30").rows.len(), 0);
    assert_eq!(run_ok(&db, "SELECT * FROM t WHERE age = 31").rows.len(), 1);
    Ok(())
}

#[test]
fn right_join_is_rejected_at_parse_time() -> ResultTest<()> {
    let (db, _tmp) = make_test_db()?;
    run_ok(&db, "CREATE TABLE a (id INTEGER PRIMARY KEY)");
    run_ok(&db, "CREATE TABLE b (id INTEGER PRIMARY KEY)");
    let result = run_err(&db, "SELECT * FROM a RIGHT JOIN b ON a.id = b.id");
    assert!(result.message.contains("ParseError"), "{}", result.message);
    Ok(())
}

#[test]
fn statement_errors_do_not_poison_the_handle() -> ResultTest<()> {
    let (db, _tmp) = make_test_db()?;
    run_err(&db, "SELEKT * FROM t");
    run_err(&db, "SELECT * FROM missing");
    run_ok(&db, "CREATE TABLE t (id INTEGER PRIMARY KEY)");
    run_ok(&db, "INSERT INTO t (id) VALUES (1)");
    assert_eq!(run_ok(&db, "SELECT * FROM t").rows.len(), 1);
    Ok(())
}

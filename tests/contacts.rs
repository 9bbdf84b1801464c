//! End-to-end scenarios against an on-disk contacts store.

use litebind::{
    ClearBindings, Command, Database, DbError, Lock, Null, OnExit, Query, Transaction, Value,
};
use rstest::{fixture, rstest};
use tempfile::TempDir;

const CONTACTS: &str = "CREATE TABLE contacts (\
    id INTEGER PRIMARY KEY, \
    name TEXT NOT NULL, \
    phone TEXT NOT NULL, \
    score REAL, \
    avatar BLOB);";

struct Store {
    // Keeps the directory alive for the test's duration.
    _dir: TempDir,
    db: Database,
}

#[fixture]
fn store() -> Store {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let db = Database::connect(dir.path().join("contacts.db"), CONTACTS)
        .expect("Failed to open contacts store");
    Store { _dir: dir, db }
}

fn count(db: &Database, name: &str) -> i32 {
    let mut q = Query::new(db, "SELECT COUNT(*) FROM contacts WHERE name = ?").unwrap();
    q.bind(1, name).unwrap();
    let mut rows = q.begin().unwrap();
    let row = rows.row().expect("COUNT(*) always yields a row");
    row.get(1).unwrap()
}

#[rstest]
fn test_insert_and_transaction_scenario(store: Store) {
    let db = &store.db;

    // Plain execution on the handle.
    db.execute("INSERT INTO contacts (name, phone) VALUES ('name_1', '0001')")
        .unwrap();

    // Uncommitted scope rolls back.
    {
        let _tx = Transaction::begin(db).unwrap();
        let mut cmd = Command::new(db, "INSERT INTO contacts (name, phone) VALUES (?, ?)").unwrap();
        cmd.bind(1, "BBBB").unwrap();
        cmd.bind(2, "0000").unwrap();
        cmd.execute().unwrap();
    }

    // Committed scope, then reset and streaming binds on the same command.
    {
        let tx = Transaction::begin(db).unwrap();
        let mut cmd = Command::new(db, "INSERT INTO contacts (name, phone) VALUES (?, ?)").unwrap();
        cmd.bind(1, "name_2").unwrap();
        cmd.bind(2, "0002").unwrap();
        cmd.execute().unwrap();

        cmd.reset(ClearBindings::Clear).unwrap();
        cmd.bind_next("name_3").unwrap().bind_next("0003").unwrap();
        cmd.execute().unwrap();

        cmd.reset(ClearBindings::Clear).unwrap();
        cmd.bind_next("name_3").unwrap().bind_next("0033").unwrap();
        cmd.execute().unwrap();
        drop(cmd);
        tx.commit().unwrap();
    }

    // Commit-on-exit scope with named placeholders.
    {
        let _tx = Transaction::new(db, OnExit::Commit, Lock::Immediate).unwrap();
        let mut cmd = Command::new(
            db,
            "INSERT INTO contacts (name, phone) VALUES (:name, :phone)",
        )
        .unwrap();
        for phone in ["0004", "0044", "0444", "4444"] {
            cmd.bind(":name", "name_4").unwrap();
            cmd.bind(":phone", phone).unwrap();
            cmd.execute().unwrap();
            cmd.reset(ClearBindings::Keep).unwrap();
        }
    }

    assert_eq!(count(db, "BBBB"), 0);
    assert_eq!(count(db, "name_1"), 1);
    assert_eq!(count(db, "name_2"), 1);
    assert_eq!(count(db, "name_3"), 2);
    assert_eq!(count(db, "name_4"), 4);
    assert_eq!(db.changes(), 1);
}

#[rstest]
fn test_changes_persist_across_reopen(store: Store) {
    let path = store.db.path().to_string();
    let Store { _dir, mut db } = store;

    db.execute("INSERT INTO contacts (name, phone) VALUES ('kept', '1')")
        .unwrap();
    db.close().unwrap();
    assert!(!db.is_open());

    // Bootstrap is skipped for an existing store; running it again would fail.
    db.open(&path, CONTACTS, None).unwrap();
    assert_eq!(count(&db, "kept"), 1);
}

#[rstest]
fn test_select_scenario(store: Store) {
    let db = &store.db;
    let mut insert = Command::new(
        db,
        "INSERT INTO contacts (name, phone, score, avatar) VALUES (?, ?, ?, ?)",
    )
    .unwrap();
    let people: [(&str, &str, Option<f64>, &[u8]); 3] = [
        ("alice", "100", Some(1.5), b"\x01\x02"),
        ("bob", "200", None, b""),
        ("carol", "300", Some(-2.0), b"\xff"),
    ];
    for (name, phone, score, avatar) in people {
        insert
            .bind_next(name)
            .unwrap()
            .bind_next(phone)
            .unwrap()
            .bind_next(score)
            .unwrap()
            .bind_next(avatar)
            .unwrap();
        insert.execute().unwrap();
        insert.reset(ClearBindings::Clear).unwrap();
    }
    drop(insert);

    let mut select = Query::new(
        db,
        "SELECT id, name, phone, score, avatar FROM contacts WHERE id >= :min ORDER BY id",
    )
    .unwrap();
    assert_eq!(
        select.column_names(),
        vec!["id", "name", "phone", "score", "avatar"]
    );
    select.bind(":min", 2).unwrap();

    let mut seen = Vec::new();
    let mut rows = select.begin().unwrap();
    while let Some(mut row) = rows.next_row().unwrap() {
        let _id: Null = row.read().unwrap();
        let name: String = row.read().unwrap();
        let phone: i32 = row.read().unwrap();
        let score: Option<f64> = row.read().unwrap();
        let avatar: Vec<u8> = row.read().unwrap();
        seen.push((name, phone, score, avatar));
    }
    assert!(rows.is_done());
    drop(rows);

    assert_eq!(
        seen,
        vec![
            ("bob".to_string(), 200, None, Vec::new()),
            ("carol".to_string(), 300, Some(-2.0), vec![0xff]),
        ]
    );

    // A second pass re-executes with the bindings still in place.
    let names = select.map_rows(|row| row.get::<String>(2)).unwrap();
    assert_eq!(names, vec!["bob", "carol"]);
}

#[rstest]
fn test_dynamic_values(store: Store) {
    let db = &store.db;
    let mut insert = Command::new(
        db,
        "INSERT INTO contacts (name, phone, score, avatar) VALUES (?, ?, ?, ?)",
    )
    .unwrap();
    insert.bind(1, Value::from("dave")).unwrap();
    insert.bind(2, Value::Integer(42)).unwrap();
    insert.bind(3, Value::Null).unwrap();
    insert.bind(4, Value::Blob(vec![7, 8, 9])).unwrap();
    insert.execute().unwrap();
    drop(insert);

    let mut q = Query::new(db, "SELECT name, phone, score, avatar FROM contacts").unwrap();
    let values = q
        .map_rows(|row| {
            Ok((
                row.read::<Value>()?,
                row.read::<Value>()?,
                row.read::<Value>()?,
                row.read::<Value>()?,
            ))
        })
        .unwrap();
    assert_eq!(
        values,
        vec![(
            Value::Text("dave".to_string()),
            // Column affinity stores the integer as text.
            Value::Text("42".to_string()),
            Value::Null,
            Value::Blob(vec![7, 8, 9]),
        )]
    );
}

#[rstest]
fn test_constraint_violation_reports_engine_message(store: Store) {
    let db = &store.db;
    let mut cmd = Command::new(db, "INSERT INTO contacts (name, phone) VALUES (?, ?)").unwrap();
    cmd.bind(1, "nobody").unwrap();
    cmd.bind(2, Null).unwrap();
    match cmd.execute() {
        Err(DbError::Execution { sql, context }) => {
            assert!(sql.starts_with("INSERT INTO contacts"));
            assert!(context.message.contains("NOT NULL"));
            assert!(context.path.ends_with("contacts.db"));
        }
        other => panic!("Expected Execution error, got {other:?}"),
    }
}

#[rstest]
fn test_unknown_named_placeholder(store: Store) {
    let mut cmd = Command::new(
        &store.db,
        "INSERT INTO contacts (name, phone) VALUES (:name, :phone)",
    )
    .unwrap();
    assert!(matches!(
        cmd.bind(":email", "x"),
        Err(DbError::UnknownPlaceholder { .. })
    ));
}

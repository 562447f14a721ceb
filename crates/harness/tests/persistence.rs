use rowforge_core::{CoreError, Criterion, Record, Row, Value};
use rowforge_engine::{BulkOptions, EngineError, OnDuplicate, Query};
use rowforge_harness::{row, TestDb};
use rowforge_storage::{Database, SqliteStorage, StorageError};
use uuid::Uuid;

fn new_order(db: &TestDb, status: &str, total: i64) -> Result<Record, CoreError> {
    Record::with_attributes(
        &db.types.orders,
        [("status", Value::from(status)), ("total", Value::from(total))],
    )
}

// ============================================================================
// Save: create and update
// ============================================================================

#[test]
fn blank_status_is_rejected_then_accepted() -> Result<(), Box<dyn std::error::Error>> {
    let mut db = TestDb::new()?;
    let mut order = new_order(&db, "", 10)?;

    assert!(!db.engine.save(&mut order)?);
    assert!(order.errors().iter().any(|e| e.starts_with("status can't be blank")));
    assert_eq!(db.count("orders")?, 0);

    order.assign_attribute("status", "paid")?;
    assert!(db.engine.save(&mut order)?);
    assert!(order.errors().is_empty());
    assert!(db.engine.record_exists(&mut order)?);
    assert_eq!(order.value("id"), &Value::Integer(1));
    assert!(!order.value("created_at").is_null());
    assert_eq!(db.count("orders")?, 1);
    Ok(())
}

#[test]
fn save_without_changes_does_not_write() -> Result<(), Box<dyn std::error::Error>> {
    let mut db = TestDb::new()?;
    let mut order = new_order(&db, "paid", 10)?;
    assert!(db.engine.save(&mut order)?);

    db.execute("UPDATE orders SET status = 'shipped'")?;
    assert!(db.engine.save(&mut order)?);

    assert_eq!(order.value("status"), &Value::from("paid"));
    let rows = db.select("SELECT status FROM orders")?;
    assert_eq!(rows[0][0].1, Value::from("shipped"));
    Ok(())
}

#[test]
fn update_writes_dirty_columns_and_reloads() -> Result<(), Box<dyn std::error::Error>> {
    let mut db = TestDb::new()?;
    let mut order = new_order(&db, "paid", 10)?;
    db.engine.save(&mut order)?;

    db.execute("UPDATE orders SET total = 99")?;
    order.assign_attribute("status", "shipped")?;
    assert_eq!(order.dirty_columns(), vec!["status".to_string()]);
    assert!(db.engine.save(&mut order)?);

    assert_eq!(order.value("status"), &Value::from("shipped"));
    assert_eq!(order.value("total"), &Value::Integer(99));
    assert!(!order.is_dirty());
    Ok(())
}

#[test]
fn stored_values_round_trip() -> Result<(), Box<dyn std::error::Error>> {
    let mut db = TestDb::new()?;
    let tags = Value::Array(vec![Value::from("rush"), Value::from("gift")]);
    let mut order = new_order(&db, "paid", 10)?;
    order.assign_attribute("tags", tags.clone())?;
    db.engine.save(&mut order)?;
    assert_eq!(order.value("tags"), &tags);

    let token = Uuid::now_v7();
    let mut user = Record::with_attributes(
        &db.types.users,
        [
            ("email", Value::from("ada@example.com")),
            ("password", Value::from("correct horse")),
            ("password_confirmation", Value::from("correct horse")),
            ("age", Value::from(36)),
            ("token", Value::from(token)),
        ],
    )?;
    assert!(db.engine.save(&mut user)?, "{:?}", user.errors());
    assert_eq!(user.value("token"), &Value::Uuid(token));
    assert_eq!(user.value("active"), &Value::Boolean(true));

    user.assign_attribute("active", false)?;
    db.engine.save(&mut user)?;
    let rows = db.select("SELECT active FROM users")?;
    assert_eq!(rows[0][0].1, Value::Integer(0));
    assert_eq!(user.value("active"), &Value::Boolean(false));
    Ok(())
}

// ============================================================================
// Existence and reload
// ============================================================================

#[test]
fn existence_stays_confirmed() -> Result<(), Box<dyn std::error::Error>> {
    let mut db = TestDb::new()?;
    let mut order = new_order(&db, "paid", 10)?;
    assert!(!db.engine.record_exists(&mut order)?);
    db.engine.save(&mut order)?;

    db.execute("DELETE FROM orders")?;
    assert!(db.engine.record_exists(&mut order)?);

    let mut twin = new_order(&db, "paid", 10)?;
    assert!(!db.engine.record_exists(&mut twin)?, "unassigned id must match NULL");
    Ok(())
}

#[test]
fn identical_keyless_record_is_not_saved_twice() -> Result<(), Box<dyn std::error::Error>> {
    let mut db = TestDb::new()?;
    let mut first = Record::with_attributes(&db.types.event_logs, [("kind", "boot")])?;
    db.engine.save(&mut first)?;

    let mut second = Record::with_attributes(&db.types.event_logs, [("kind", "boot")])?;
    assert!(db.engine.record_exists(&mut second)?);
    assert!(!second.is_dirty());
    assert!(db.engine.save(&mut second)?);
    assert_eq!(db.count("event_logs")?, 1);
    Ok(())
}

#[test]
fn composite_key_reload_reads_generated_columns() -> Result<(), Box<dyn std::error::Error>> {
    let mut db = TestDb::new()?;
    let mut membership = Record::with_attributes(&db.types.memberships, [("role", "owner")])?;
    assert!(db.engine.save(&mut membership)?);

    assert_eq!(membership.value("team_id"), &Value::Integer(1));
    assert_eq!(membership.value("user_id"), &Value::Integer(1));
    assert!(matches!(membership.value("joined_at"), Value::Text(_)));

    membership.assign_attribute("role", "admin")?;
    assert!(db.engine.save(&mut membership)?);
    let rows = db.select("SELECT role FROM memberships WHERE team_id = 1 AND user_id = 1")?;
    assert_eq!(rows[0][0].1, Value::from("admin"));
    Ok(())
}

#[test]
fn keyless_reload_of_duplicates_is_ambiguous() -> Result<(), Box<dyn std::error::Error>> {
    let mut db = TestDb::new()?;
    db.execute("INSERT INTO event_logs (kind) VALUES ('boot'), ('boot')")?;

    let mut log = Record::with_attributes(&db.types.event_logs, [("kind", "boot")])?;
    match db.engine.reload(&mut log) {
        Err(EngineError::ReloadAmbiguous { entity, matches }) => {
            assert_eq!(entity, "EventLog");
            assert_eq!(matches, 2);
        }
        other => panic!("expected ReloadAmbiguous, got {other:?}"),
    }
    Ok(())
}

#[test]
fn update_without_snapshot_is_refused() -> Result<(), Box<dyn std::error::Error>> {
    let mut db = TestDb::new()?;
    let mut log = Record::from_row(&db.types.event_logs, &Row::new())?;
    log.assign_attribute("kind", "orphan")?;

    let result = db.engine.save(&mut log);
    assert!(matches!(
        result,
        Err(EngineError::UnboundedStatement { operation: "update", .. })
    ));
    Ok(())
}

// ============================================================================
// update_column and destroy
// ============================================================================

#[test]
fn update_column_writes_one_column() -> Result<(), Box<dyn std::error::Error>> {
    let mut db = TestDb::new()?;
    let mut order = new_order(&db, "paid", 10)?;
    db.engine.save(&mut order)?;
    db.execute("UPDATE orders SET status = 'shipped'")?;

    assert!(db.engine.update_column(&mut order, "status", "paid")?);
    let rows = db.select("SELECT status FROM orders")?;
    assert_eq!(rows[0][0].1, Value::from("shipped"), "unchanged value must not write");

    assert!(db.engine.update_column(&mut order, "total", 20)?);
    let rows = db.select("SELECT status, total FROM orders")?;
    assert_eq!(rows[0][0].1, Value::from("shipped"));
    assert_eq!(rows[0][1].1, Value::Integer(20));
    assert_eq!(order.value("status"), &Value::from("shipped"));

    let unknown = db.engine.update_column(&mut order, "colour", "red");
    assert!(matches!(
        unknown,
        Err(EngineError::Core(CoreError::UnknownAttribute { .. }))
    ));
    Ok(())
}

#[test]
fn update_column_on_missing_record_fails_softly() -> Result<(), Box<dyn std::error::Error>> {
    let mut db = TestDb::new()?;
    let mut order = new_order(&db, "paid", 10)?;
    assert!(!db.engine.update_column(&mut order, "total", 20)?);
    assert_eq!(order.errors(), &["Order record does not exist.".to_string()]);
    Ok(())
}

#[test]
fn update_column_leaves_pending_attributes_unwritten() -> Result<(), Box<dyn std::error::Error>> {
    let mut db = TestDb::new()?;
    db.execute("INSERT INTO event_logs (kind, payload) VALUES ('boot', 'x')")?;
    let mut log = db
        .engine
        .find_by(&db.types.event_logs, &[("kind".to_string(), Criterion::equals("boot"))])?
        .ok_or("log not found")?;

    log.assign_attribute("payload", "y")?;
    assert!(db.engine.update_column(&mut log, "kind", "start")?);
    assert_eq!(log.value("kind"), &Value::from("start"));
    assert_eq!(log.value("payload"), &Value::from("x"), "reload discards the pending payload");
    assert!(!log.is_dirty());

    let rows = db.select("SELECT kind, payload FROM event_logs")?;
    assert_eq!(rows, vec![vec![
        ("kind".to_string(), Value::from("start")),
        ("payload".to_string(), Value::from("x")),
    ]]);
    Ok(())
}

#[test]
fn destroy_removes_the_row() -> Result<(), Box<dyn std::error::Error>> {
    let mut db = TestDb::new()?;
    let mut kept = new_order(&db, "new", 1)?;
    let mut doomed = new_order(&db, "paid", 10)?;
    db.engine.save(&mut kept)?;
    db.engine.save(&mut doomed)?;

    assert!(db.engine.destroy(&mut doomed)?);
    assert_eq!(db.count("orders")?, 1);

    let mut never_saved = new_order(&db, "draft", 0)?;
    assert!(!db.engine.destroy(&mut never_saved)?);
    assert_eq!(never_saved.errors(), &["Order record does not exist.".to_string()]);
    assert_eq!(db.count("orders")?, 1);
    Ok(())
}

// ============================================================================
// Finders
// ============================================================================

#[test]
fn find_by_loads_a_clean_record() -> Result<(), Box<dyn std::error::Error>> {
    let mut db = TestDb::new()?;
    db.engine.save(&mut new_order(&db, "paid", 10)?)?;

    let found = db
        .engine
        .find_by(&db.types.orders, &[("status".to_string(), Criterion::equals("paid"))])?
        .ok_or("order not found")?;
    assert!(found.exists());
    assert!(!found.is_dirty());
    assert_eq!(found.value("total"), &Value::Integer(10));

    let missing = db
        .engine
        .find_by(&db.types.orders, &[("status".to_string(), Criterion::equals("lost"))])?;
    assert!(missing.is_none());
    Ok(())
}

#[test]
fn find_all_filters_sorts_and_pages() -> Result<(), Box<dyn std::error::Error>> {
    let mut db = TestDb::new()?;
    for (status, total) in [("paid", 5), ("new", 12), ("paid", 20), ("void", 8), ("paid", 14)] {
        db.engine.save(&mut new_order(&db, status, total)?)?;
    }

    let query = Query::new()
        .filter("status", Criterion::any_of(["paid", "new"]))
        .between("total", 6, 30)
        .select(["id", "total"])
        .order_by("total", "DESC")
        .limit(2)
        .offset(1);
    let found = db.engine.find_all(&db.types.orders, &query)?;
    let totals: Vec<&Value> = found.iter().map(|r| r.value("total")).collect();
    assert_eq!(totals, vec![&Value::Integer(14), &Value::Integer(12)]);
    assert!(found[0].get("status").is_none());

    let tail = db
        .engine
        .find_all(&db.types.orders, &Query::new().order_by("total", "asc").offset(3))?;
    assert_eq!(tail.len(), 2);

    let bad = db
        .engine
        .find_all(&db.types.orders, &Query::new().filter("colour", Criterion::NotNull));
    assert!(matches!(bad, Err(EngineError::Core(CoreError::UnknownAttribute { .. }))));
    Ok(())
}

// ============================================================================
// Transactions and storage
// ============================================================================

#[test]
fn transaction_rolls_back_on_error() -> Result<(), Box<dyn std::error::Error>> {
    let mut db = TestDb::new()?;
    let mut first = new_order(&db, "paid", 10)?;
    let result = db.engine.transaction(|engine| {
        engine.save(&mut first)?;
        Err::<(), _>(EngineError::InvalidBulk("abandon".into()))
    });
    assert!(result.is_err());
    assert!(!db.engine.storage().in_transaction());
    assert_eq!(db.count("orders")?, 0);

    let mut second = new_order(&db, "new", 3)?;
    let saved = db.engine.transaction(|engine| engine.save(&mut second))?;
    assert!(saved);
    assert_eq!(db.count("orders")?, 1);
    Ok(())
}

#[test]
fn failing_insert_is_a_storage_error() -> Result<(), Box<dyn std::error::Error>> {
    let mut db = TestDb::new()?;
    let mut order = Record::with_attributes(
        &db.types.orders,
        [("status", Value::from("new")), ("created_at", Value::Null)],
    )?;

    let result = db.engine.save(&mut order);
    assert!(matches!(result, Err(EngineError::Storage(StorageError::Sqlite(_)))));
    assert!(!order.exists());
    assert_eq!(db.count("orders")?, 0);
    Ok(())
}

#[test]
fn failing_bulk_batch_rolls_back_earlier_batches() -> Result<(), Box<dyn std::error::Error>> {
    let mut db = TestDb::new()?;
    let products = db.types.products.clone();
    let rows: Vec<_> = (0..60)
        .map(|i| {
            let region = if i == 55 { Value::Null } else { Value::from("eu") };
            row(&[
                ("sku", Value::from(format!("sku-{i}"))),
                ("region", region),
                ("price", Value::from(i)),
            ])
        })
        .collect();

    let options = BulkOptions::new().batch_size(50).on_duplicate(OnDuplicate::Update);
    let result = db.engine.insert_all(&products, &rows, &options);
    assert!(matches!(result, Err(EngineError::Storage(_))));
    assert!(!db.engine.storage().in_transaction());
    assert_eq!(db.count("products")?, 0);
    Ok(())
}

#[test]
fn on_disk_database_is_visible_to_other_connections() -> Result<(), Box<dyn std::error::Error>> {
    let mut db = TestDb::on_disk()?;
    db.engine.save(&mut new_order(&db, "paid", 10)?)?;

    let path = db.path().ok_or("no database path")?;
    let other = SqliteStorage::open(&path)?;
    let rows = other.fetch_all("SELECT status FROM orders", &Default::default())?;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("status"), Some(&Value::from("paid")));
    Ok(())
}

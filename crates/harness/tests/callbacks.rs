use rowforge_core::{Action, CoreError, EntityType, Hook, Record, Value};
use rowforge_harness::fixtures::application_callbacks;
use rowforge_harness::TestDb;

fn trail(record: &Record) -> &str {
    record.value("trail").as_text().unwrap_or_default()
}

#[test]
fn create_runs_the_full_pipeline_in_order() -> Result<(), Box<dyn std::error::Error>> {
    let mut db = TestDb::new()?;
    let mut widget = Record::with_attributes(&db.types.widgets, [("name", "gizmo")])?;
    assert!(db.engine.save(&mut widget)?);

    assert_eq!(
        trail(&widget),
        "before_validate,after_validate,audit,before_save,before_create,after_create,after_save"
    );
    let rows = db.select("SELECT trail FROM widgets")?;
    assert_eq!(
        rows[0][0].1,
        Value::from("before_validate,after_validate,audit,before_save,before_create"),
        "changes made by before hooks are written"
    );
    Ok(())
}

#[test]
fn skip_registration_suppresses_inherited_callback_on_update() -> Result<(), Box<dyn std::error::Error>> {
    let mut db = TestDb::new()?;
    let mut widget = Record::with_attributes(&db.types.widgets, [("name", "gizmo")])?;
    db.engine.save(&mut widget)?;

    widget.assign_attributes([("name", "gadget"), ("trail", "")])?;
    assert!(db.engine.save(&mut widget)?);
    assert_eq!(
        trail(&widget),
        "before_validate,after_validate,before_save,before_update,after_update,after_save"
    );
    Ok(())
}

#[test]
fn update_column_honors_except_qualifier() -> Result<(), Box<dyn std::error::Error>> {
    let mut db = TestDb::new()?;
    let mut widget = Record::with_attributes(&db.types.widgets, [("name", "gizmo")])?;
    db.engine.save(&mut widget)?;
    db.execute("UPDATE widgets SET trail = ''")?;
    db.engine.reload(&mut widget)?;

    assert!(db.engine.update_column(&mut widget, "name", "sprocket")?);
    // Only `name` is written, so the reload discards the before-hook trail.
    assert_eq!(trail(&widget), "after_update");
    assert_eq!(widget.value("name"), &Value::from("sprocket"));
    Ok(())
}

#[test]
fn destroy_runs_destroy_hooks() -> Result<(), Box<dyn std::error::Error>> {
    let mut db = TestDb::new()?;
    let mut widget = Record::with_attributes(&db.types.widgets, [("name", "gizmo")])?;
    db.engine.save(&mut widget)?;
    widget.assign_attribute("trail", "")?;
    db.engine.save(&mut widget)?;
    db.engine.reload(&mut widget)?;

    assert!(db.engine.destroy(&mut widget)?);
    assert!(trail(&widget).ends_with(",before_destroy,after_destroy"));
    assert_eq!(db.count("widgets")?, 0);
    Ok(())
}

#[test]
fn unknown_callback_fails_at_build() {
    let result = EntityType::builder("Gadget")
        .inherit(&application_callbacks())
        .field("trail")
        .on(Hook::AfterSave, "missing")
        .build();
    match result {
        Err(CoreError::UnknownCallback { entity, hook, name }) => {
            assert_eq!(entity, "Gadget");
            assert_eq!(hook, "after_save");
            assert_eq!(name, "missing");
        }
        other => panic!("expected UnknownCallback, got {other:?}"),
    }
}

#[test]
fn inherited_callbacks_reach_every_entity() -> Result<(), Box<dyn std::error::Error>> {
    let gadgets = EntityType::builder("Gadget")
        .inherit(&application_callbacks())
        .field("trail")
        .build()?;
    let mut gadget = Record::new(&gadgets);

    let report = gadgets
        .callbacks()
        .run(Hook::BeforeSave, Action::Create, &mut gadget)?;
    assert_eq!(report.invoked, vec!["audit".to_string()]);
    assert_eq!(trail(&gadget), "audit");
    Ok(())
}

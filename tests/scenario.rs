//! End-to-end: declare, migrate, edit, dump, roll back, against the in-memory database

use trigger_forge::{
    migrations_current, Engine, ErrorKind, Executor, MemoryDatabase, Migration, MigrationGenerator,
    MigrationHistory, Registry, SchemaDumper, SilentSink, TriggerBuilder, TriggerError,
};

fn bob_counter(increment: u32) -> TriggerBuilder {
    TriggerBuilder::new()
        .on("users")
        .after(["insert"])
        .when("NEW.name = 'bob'")
        .body([format!("UPDATE groups SET bob_count = bob_count + {increment}")])
}

fn eve_counter() -> TriggerBuilder {
    TriggerBuilder::new()
        .on("users")
        .after(["delete"])
        .when("OLD.name = 'eve'")
        .body(["UPDATE groups SET eve_count = eve_count - 1"])
}

/// Generate against the history and apply; returns the number of operations
fn migrate(
    engine: Engine,
    registry: &Registry,
    history: &mut MigrationHistory,
    db: &mut MemoryDatabase,
) -> Result<usize, TriggerError> {
    let plan = MigrationGenerator::new(engine, &SilentSink)
        .generate(registry.all(), &history.applied_triggers())?;
    let operations = plan.operations.len();
    if !plan.is_empty() {
        let version = history.next_version();
        history.apply(plan.into_migration(version), db)?;
    }
    Ok(operations)
}

fn dump(
    engine: Engine,
    history: &MigrationHistory,
    db: &MemoryDatabase,
    previous: Option<&str>,
) -> String {
    SchemaDumper::new(engine)
        .with_history(history)
        .dump_from(db, previous)
        .unwrap()
}

fn version_line(dump: &str) -> u64 {
    dump.lines()
        .find_map(|line| line.strip_prefix("-- version: "))
        .unwrap()
        .parse()
        .unwrap()
}

#[test]
fn test_bob_count_edit_and_rollback_on_every_engine() {
    for engine in Engine::ALL {
        let mut registry = Registry::new();
        let mut history = MigrationHistory::new();
        let mut db = MemoryDatabase::new();

        registry.declare(bob_counter(1)).unwrap();
        registry.declare(eve_counter()).unwrap();
        assert_eq!(migrate(engine, &registry, &mut history, &mut db).unwrap(), 2, "{engine}");
        assert_eq!(db.count_matching("bob_count + 1").unwrap(), 1, "{engine}");
        assert!(migrations_current(registry.all(), &history.applied_triggers(), engine).unwrap());

        let before_edit = dump(engine, &history, &db, None);
        assert!(!before_edit.contains("-- manual trigger"), "{engine}: {before_edit}");
        assert_eq!(dump(engine, &history, &db, Some(before_edit.as_str())), before_edit);

        // Edit +1 to +2
        registry.reset();
        registry.declare(bob_counter(2)).unwrap();
        registry.declare(eve_counter()).unwrap();
        assert!(!migrations_current(registry.all(), &history.applied_triggers(), engine).unwrap());

        let plan = MigrationGenerator::new(engine, &SilentSink)
            .generate(registry.all(), &history.applied_triggers())
            .unwrap();
        assert_eq!(plan.diff.removed.len(), 1);
        assert_eq!(plan.diff.added.len(), 1);
        assert_eq!(plan.diff.removed[0].name(), plan.diff.added[0].name());
        assert!(plan.name.starts_with("update_trigger_users_after_insert_row_"));

        let version = history.next_version();
        history.apply(plan.into_migration(version), &mut db).unwrap();
        assert_eq!(db.count_matching("bob_count + 1").unwrap(), 0, "{engine}");
        assert_eq!(db.count_matching("bob_count + 2").unwrap(), 1, "{engine}");
        assert_eq!(db.count_matching("eve_count - 1").unwrap(), 1, "{engine}");

        let after_edit = dump(engine, &history, &db, Some(before_edit.as_str()));
        assert!(!after_edit.contains("-- manual trigger"), "{engine}: {after_edit}");
        assert!(after_edit.contains("bob_count + 2"));
        assert!(version_line(&after_edit) > version_line(&before_edit));
        assert_eq!(
            after_edit.matches("create_trigger ").count(),
            before_edit.matches("create_trigger ").count()
        );

        // Roll back the edit
        let rolled_back = history.rollback(&mut db).unwrap().unwrap();
        assert_eq!(rolled_back.version, version);
        assert_eq!(db.count_matching("bob_count + 1").unwrap(), 1, "{engine}");
        assert_eq!(db.count_matching("bob_count + 2").unwrap(), 0, "{engine}");
        assert_eq!(dump(engine, &history, &db, Some(after_edit.as_str())), before_edit, "{engine}");
    }
}

#[test]
fn test_edit_recreates_legacy_trigger_at_current_compatibility() {
    let engine = Engine::Lightweight;
    let mut registry = Registry::new();
    let mut history = MigrationHistory::new();
    let mut db = MemoryDatabase::new();

    registry.declare(bob_counter(1).compatibility(0)).unwrap();
    migrate(engine, &registry, &mut history, &mut db).unwrap();
    let before_edit = dump(engine, &history, &db, None);
    assert!(before_edit.contains("\"compatibility\":0"));

    // Same trigger at the current compatibility: nothing to do
    registry.reset();
    registry.declare(bob_counter(1)).unwrap();
    assert_eq!(migrate(engine, &registry, &mut history, &mut db).unwrap(), 0);

    registry.reset();
    registry.declare(bob_counter(2)).unwrap();
    assert_eq!(migrate(engine, &registry, &mut history, &mut db).unwrap(), 2);

    let after_edit = dump(engine, &history, &db, Some(before_edit.as_str()));
    assert!(after_edit.contains("\"compatibility\":1"));
    assert!(!after_edit.contains("\"compatibility\":0"));
    assert_eq!(db.count_matching("WHEN (NEW.name = 'bob')").unwrap(), 1);
}

#[test]
fn test_editing_hand_registered_trigger_replaces_it() {
    let audit = |increment: u32| {
        TriggerBuilder::new()
            .name("audit_tr")
            .on("users")
            .after(["delete"])
            .body([format!("UPDATE stats SET deletes = deletes + {increment}")])
            .build()
            .unwrap()
    };

    for engine in Engine::ALL {
        let mut registry = Registry::new();
        let mut history = MigrationHistory::new();
        let mut db = MemoryDatabase::new();

        registry.register(audit(1));
        assert_eq!(migrate(engine, &registry, &mut history, &mut db).unwrap(), 1, "{engine}");

        registry.reset();
        registry.register(audit(2));
        assert_eq!(migrate(engine, &registry, &mut history, &mut db).unwrap(), 2, "{engine}");
        assert_eq!(db.count_matching("deletes + 1").unwrap(), 0, "{engine}");
        assert_eq!(db.count_matching("deletes + 2").unwrap(), 1, "{engine}");

        history.rollback(&mut db).unwrap();
        assert_eq!(db.count_matching("deletes + 1").unwrap(), 1, "{engine}");
        assert_eq!(db.count_matching("deletes + 2").unwrap(), 0, "{engine}");
    }
}

#[test]
fn test_inline_engine_requires_groups_for_shared_slots() {
    let engine = Engine::Inline;
    let mut registry = Registry::new();
    registry.declare(bob_counter(1)).unwrap();
    registry
        .declare(
            TriggerBuilder::new()
                .on("users")
                .after(["insert"])
                .when("NEW.name = 'eve'")
                .body(["UPDATE groups SET eve_count = eve_count + 1"]),
        )
        .unwrap();

    let err = MigrationGenerator::new(engine, &SilentSink)
        .generate(registry.all(), &[])
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Generation);

    registry.reset();
    registry
        .declare(
            TriggerBuilder::new()
                .on("users")
                .after(["insert"])
                .branch(|t| {
                    t.when("NEW.name = 'bob'")
                        .body(["UPDATE groups SET bob_count = bob_count + 1"])
                })
                .branch(|t| {
                    t.when("NEW.name = 'eve'")
                        .body(["UPDATE groups SET eve_count = eve_count + 1"])
                }),
        )
        .unwrap();

    let mut history = MigrationHistory::new();
    let mut db = MemoryDatabase::new();
    assert_eq!(migrate(engine, &registry, &mut history, &mut db).unwrap(), 1);
    assert_eq!(db.trigger_names(), vec!["users_after_insert_row_tr".to_string()]);
    assert_eq!(db.count_matching("ELSEIF (NEW.name = 'eve') THEN").unwrap(), 1);

    // Same group on an engine with many triggers per slot
    let mut db = MemoryDatabase::new();
    let mut history = MigrationHistory::new();
    assert_eq!(migrate(Engine::FunctionBacked, &registry, &mut history, &mut db).unwrap(), 2);
    assert_eq!(db.trigger_names().len(), 2);
}

#[test]
fn test_manual_triggers_survive_generation_and_dump_raw() {
    let engine = Engine::Lightweight;
    let mut registry = Registry::new();
    let mut history = MigrationHistory::new();
    let mut db = MemoryDatabase::new();

    let manual = "CREATE TRIGGER audit_tr AFTER DELETE ON users\nFOR EACH ROW\nBEGIN\n    \
                  INSERT INTO audit VALUES (OLD.id);\nEND;";
    history
        .apply(
            Migration::manual(
                history.next_version(),
                "add_audit_trigger",
                engine,
                vec![manual.to_string()],
                vec!["DROP TRIGGER IF EXISTS audit_tr;".to_string()],
            ),
            &mut db,
        )
        .unwrap();

    registry.declare(bob_counter(1)).unwrap();
    assert_eq!(migrate(engine, &registry, &mut history, &mut db).unwrap(), 1);

    registry.reset();
    assert_eq!(migrate(engine, &registry, &mut history, &mut db).unwrap(), 1);
    assert_eq!(db.trigger_names(), vec!["audit_tr".to_string()]);

    let text = dump(engine, &history, &db, None);
    assert!(text.contains("-- manual trigger: audit_tr\n"));
    assert_eq!(dump(engine, &history, &db, Some(text.as_str())), text);

    history.rollback(&mut db).unwrap();
    history.rollback(&mut db).unwrap();
    history.rollback(&mut db).unwrap();
    assert!(db.trigger_names().is_empty());
    assert!(db.execute("DROP TRIGGER IF EXISTS audit_tr;").is_ok());
}

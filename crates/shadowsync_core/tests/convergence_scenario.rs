use shadowsync_core::db::open_db_in_memory;
use shadowsync_core::{
    ConditionClause, Conditions, ConvergenceOutcome, EventDispatcher, FreezeReason, LabelStore,
    Record, RecordStore, SqliteLabelStore, SqliteRecordStore,
};

#[test]
fn create_rename_then_freeze_once_label_is_shared() {
    let conn = open_db_in_memory().unwrap();
    let records = SqliteRecordStore::try_new(&conn).unwrap();
    let labels = SqliteLabelStore::try_new(&conn).unwrap();
    let mut dispatcher = EventDispatcher::new(records, labels);
    dispatcher
        .subscribe("widget", "shadow", Conditions::default())
        .unwrap();

    let mut first = Record::new("widget", "Alpha", "alpha");
    records.create_record(&first).unwrap();
    let reports = dispatcher.on_record_changed(first.id).unwrap();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].namespace, "shadow");
    let label = reports[0].outcome.label().cloned().unwrap();
    assert_eq!(label.name, "Alpha");
    assert_eq!(label.slug, "alpha");
    assert_eq!(
        records.get_pointer(first.id, "shadow").unwrap(),
        Some(label.id)
    );
    assert_eq!(
        dispatcher.query().label_for(first.id, "shadow").unwrap(),
        Some(label.clone())
    );

    first.title = "Beta".to_string();
    records.update_record(&first).unwrap();
    let reports = dispatcher.on_record_changed(first.id).unwrap();
    assert!(matches!(
        reports[0].outcome,
        ConvergenceOutcome::Applied { created: false, .. }
    ));
    assert_eq!(labels.get(label.id).unwrap().unwrap().name, "Beta");

    let second = Record::new("widget", "Second", "second");
    records.create_record(&second).unwrap();
    records.set_pointer(second.id, "shadow", label.id).unwrap();

    first.title = "Gamma".to_string();
    records.update_record(&first).unwrap();
    let reports = dispatcher.on_record_changed(first.id).unwrap();
    assert!(matches!(
        reports[0].outcome,
        ConvergenceOutcome::Frozen {
            reason: FreezeReason::SharedAuthority { references: 2 },
            ..
        }
    ));
    let stored = labels.get(label.id).unwrap().unwrap();
    assert_eq!(stored.name, "Beta");
    assert_eq!(stored.slug, "alpha");
    assert_eq!(
        dispatcher
            .query()
            .label_for(second.id, "shadow")
            .unwrap()
            .map(|label| label.id),
        Some(label.id)
    );
}

#[test]
fn record_creates_label_once_it_gains_required_membership() {
    let conn = open_db_in_memory().unwrap();
    let records = SqliteRecordStore::try_new(&conn).unwrap();
    let labels = SqliteLabelStore::try_new(&conn).unwrap();
    let mut dispatcher = EventDispatcher::new(records, labels);
    dispatcher
        .subscribe(
            "widget",
            "shadow",
            Conditions::all_of(vec![ConditionClause::new("color", &["red"])]),
        )
        .unwrap();

    let record = Record::new("widget", "Alpha", "alpha");
    records.create_record(&record).unwrap();
    let reports = dispatcher.on_record_changed(record.id).unwrap();
    assert_eq!(reports[0].outcome, ConvergenceOutcome::Skipped);
    assert!(labels.list("shadow").unwrap().is_empty());

    records
        .set_memberships(record.id, "color", &["Red".to_string()])
        .unwrap();
    let reports = dispatcher.on_memberships_changed(record.id, "color").unwrap();
    assert!(matches!(
        reports[0].outcome,
        ConvergenceOutcome::Frozen {
            created: true,
            reason: FreezeReason::InSync,
            ..
        }
    ));

    let all = labels.list("shadow").unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].name, "Alpha");
    assert_eq!(all[0].slug, "alpha");
    assert_eq!(
        dispatcher.query().label_for(record.id, "shadow").unwrap(),
        Some(all[0].clone())
    );
}

#[test]
fn same_title_records_converge_on_one_adopted_label() {
    let conn = open_db_in_memory().unwrap();
    let records = SqliteRecordStore::try_new(&conn).unwrap();
    let labels = SqliteLabelStore::try_new(&conn).unwrap();
    let mut dispatcher = EventDispatcher::new(records, labels);
    dispatcher
        .subscribe("widget", "shadow", Conditions::default())
        .unwrap();

    let first = Record::new("widget", "Alpha", "alpha");
    let second = Record::new("widget", "Alpha", "alpha-2");
    records.create_record(&first).unwrap();
    records.create_record(&second).unwrap();

    dispatcher.on_record_changed(first.id).unwrap();
    let reports = dispatcher.on_record_changed(second.id).unwrap();
    assert!(matches!(
        reports[0].outcome,
        ConvergenceOutcome::Frozen {
            created: false,
            reason: FreezeReason::SharedAuthority { references: 2 },
            ..
        }
    ));

    let all = labels.list("shadow").unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].slug, "alpha");
    assert_eq!(
        records.query_by_pointer("shadow", all[0].id).unwrap().len(),
        2
    );
}

#[test]
fn label_unfreezes_when_reference_count_returns_to_one() {
    let conn = open_db_in_memory().unwrap();
    let records = SqliteRecordStore::try_new(&conn).unwrap();
    let labels = SqliteLabelStore::try_new(&conn).unwrap();
    let mut dispatcher = EventDispatcher::new(records, labels);
    dispatcher
        .subscribe("widget", "shadow", Conditions::default())
        .unwrap();

    let mut first = Record::new("widget", "Alpha", "alpha");
    let second = Record::new("widget", "Alpha", "alpha-copy");
    records.create_record(&first).unwrap();
    records.create_record(&second).unwrap();
    dispatcher.on_record_changed(first.id).unwrap();
    dispatcher.on_record_changed(second.id).unwrap();

    dispatcher.on_record_removed(second.id).unwrap();

    first.title = "Renamed".to_string();
    records.update_record(&first).unwrap();
    let reports = dispatcher.on_record_changed(first.id).unwrap();
    assert!(matches!(
        reports[0].outcome,
        ConvergenceOutcome::Applied { .. }
    ));
    assert_eq!(labels.list("shadow").unwrap()[0].name, "Renamed");
}

#[test]
fn blank_slug_mirrors_slugified_title() {
    let conn = open_db_in_memory().unwrap();
    let records = SqliteRecordStore::try_new(&conn).unwrap();
    let labels = SqliteLabelStore::try_new(&conn).unwrap();
    let mut dispatcher = EventDispatcher::new(records, labels);
    dispatcher
        .subscribe("widget", "shadow", Conditions::default())
        .unwrap();

    let record = Record::new("widget", "Hello, World", "");
    records.create_record(&record).unwrap();
    dispatcher.on_record_changed(record.id).unwrap();
    let replay = dispatcher.on_record_changed(record.id).unwrap();

    assert_eq!(labels.list("shadow").unwrap()[0].slug, "hello-world");
    assert!(matches!(
        replay[0].outcome,
        ConvergenceOutcome::Frozen {
            created: false,
            reason: FreezeReason::InSync,
            ..
        }
    ));
}

#[test]
fn rename_onto_a_taken_name_freezes_until_the_name_is_free() {
    let conn = open_db_in_memory().unwrap();
    let records = SqliteRecordStore::try_new(&conn).unwrap();
    let labels = SqliteLabelStore::try_new(&conn).unwrap();
    let mut dispatcher = EventDispatcher::new(records, labels);
    dispatcher
        .subscribe("widget", "shadow", Conditions::default())
        .unwrap();

    let mut first = Record::new("widget", "Alpha", "alpha");
    let second = Record::new("widget", "Beta", "beta");
    records.create_record(&first).unwrap();
    records.create_record(&second).unwrap();
    dispatcher.on_record_changed(first.id).unwrap();
    dispatcher.on_record_changed(second.id).unwrap();

    first.title = "Beta".to_string();
    records.update_record(&first).unwrap();
    for _ in 0..3 {
        let reports = dispatcher.on_record_changed(first.id).unwrap();
        assert!(matches!(
            reports[0].outcome,
            ConvergenceOutcome::Frozen {
                created: false,
                reason: FreezeReason::Collision,
                ..
            }
        ));
    }
    let names: Vec<(String, String)> = labels
        .list("shadow")
        .unwrap()
        .into_iter()
        .map(|label| (label.name, label.slug))
        .collect();
    assert_eq!(
        names,
        vec![
            ("Alpha".to_string(), "alpha".to_string()),
            ("Beta".to_string(), "beta".to_string()),
        ]
    );

    records.delete_record(second.id).unwrap();
    dispatcher.on_record_removed(second.id).unwrap();
    let reports = dispatcher.on_record_changed(first.id).unwrap();
    assert!(matches!(
        reports[0].outcome,
        ConvergenceOutcome::Applied { created: false, .. }
    ));
    let remaining = labels.list("shadow").unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].name, "Beta");
    assert_eq!(remaining[0].slug, "alpha");
}

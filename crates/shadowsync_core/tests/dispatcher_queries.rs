use shadowsync_core::db::{open_db, open_db_in_memory};
use shadowsync_core::{
    ConditionClause, Conditions, EventDispatcher, Record, RecordStore, ResyncSummary,
    SqliteLabelStore, SqliteRecordStore, SubscriptionError, SyncConfig,
};

#[test]
fn related_records_filters_by_type_and_excludes_self() {
    let conn = open_db_in_memory().unwrap();
    let records = SqliteRecordStore::try_new(&conn).unwrap();
    let labels = SqliteLabelStore::try_new(&conn).unwrap();
    let mut dispatcher = EventDispatcher::new(records, labels);
    dispatcher
        .subscribe("widget", "shadow", Conditions::default())
        .unwrap();

    let widget = Record::new("widget", "Alpha", "alpha");
    let gadget = Record::new("gadget", "Alpha gadget", "alpha-gadget");
    let part = Record::new("part", "Alpha part", "alpha-part");
    for record in [&widget, &gadget, &part] {
        records.create_record(record).unwrap();
    }
    let reports = dispatcher.on_record_changed(widget.id).unwrap();
    let label = reports[0].outcome.label().cloned().unwrap();

    // Host-side tagging of other record types with the shadow label.
    records.set_pointer(gadget.id, "shadow", label.id).unwrap();
    records.set_pointer(part.id, "shadow", label.id).unwrap();

    let query = dispatcher.query();
    let gadgets = query.related_records(widget.id, "shadow", "gadget").unwrap();
    assert_eq!(gadgets.len(), 1);
    assert_eq!(gadgets[0].id, gadget.id);

    let widgets = query.related_records(widget.id, "shadow", "widget").unwrap();
    assert!(widgets.is_empty());

    let from_part = query.related_records(part.id, "shadow", "widget").unwrap();
    assert_eq!(from_part.len(), 1);
    assert_eq!(from_part[0].id, widget.id);

    assert!(query
        .related_records(widget.id, "archive", "gadget")
        .unwrap()
        .is_empty());
    assert_eq!(query.records_for(&label).unwrap().len(), 3);
}

#[test]
fn records_for_skips_pointers_of_deleted_rows() {
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
    dispatcher.on_record_changed(second.id).unwrap();
    records.delete_record(second.id).unwrap();

    let label = dispatcher
        .query()
        .label_for(first.id, "shadow")
        .unwrap()
        .unwrap();
    let live = dispatcher.query().records_for(&label).unwrap();
    assert_eq!(live.len(), 1);
    assert_eq!(live[0].id, first.id);
}

#[test]
fn resync_all_converges_existing_records_once() {
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

    let mut red = Record::new("widget", "Red", "red");
    red.add_membership("color", "red");
    let mut twin = Record::new("widget", "Red", "red-twin");
    twin.add_membership("color", "red");
    let plain = Record::new("widget", "Plain", "plain");
    let other = Record::new("gadget", "Other", "other");
    for record in [&red, &twin, &plain, &other] {
        records.create_record(record).unwrap();
    }

    let first = dispatcher.resync_all().unwrap();
    assert_eq!(first.records_visited, 3);
    assert_eq!(first.created, 1);
    assert_eq!(first.frozen, 2);
    assert_eq!(first.skipped, 1);
    assert_eq!(first.applied, 0);
    assert_eq!(first.retracted, 0);
    assert_eq!(first.failed, 0);
    assert_eq!(labels.list("shadow").unwrap().len(), 1);

    let second = dispatcher.resync_all().unwrap();
    assert_eq!(
        second,
        ResyncSummary {
            records_visited: 3,
            created: 0,
            applied: 0,
            frozen: 2,
            retracted: 0,
            skipped: 1,
            failed: 0,
        }
    );
}

#[test]
fn subscriptions_load_from_config_and_reject_malformed_specs() {
    let conn = open_db_in_memory().unwrap();
    let mut dispatcher = EventDispatcher::new(
        SqliteRecordStore::try_new(&conn).unwrap(),
        SqliteLabelStore::try_new(&conn).unwrap(),
    );

    let config = SyncConfig::from_json_str(
        r#"{
            "subscriptions": [
                { "record_type": "widget", "namespace": "shadow" },
                {
                    "record_type": "gadget",
                    "namespace": "archive",
                    "conditions": {
                        "operator": "OR",
                        "clauses": [{ "namespace": "color", "required_values": ["Red", "blue"] }]
                    }
                }
            ]
        }"#,
    )
    .unwrap();
    let handles = dispatcher.subscribe_all(&config).unwrap();
    assert_eq!(handles.len(), 2);

    let malformed = SyncConfig::from_json_str(
        r#"{
            "subscriptions": [{
                "record_type": "part",
                "namespace": "shadow",
                "conditions": { "clauses": [{ "namespace": "color", "required_values": [] }] }
            }]
        }"#,
    )
    .unwrap();
    assert!(matches!(
        dispatcher.subscribe_all(&malformed),
        Err(SubscriptionError::InvalidConditions { .. })
    ));
    assert_eq!(dispatcher.subscriptions().count(), 2);
}

#[test]
fn file_backed_database_keeps_shadow_state_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("shadow.sqlite3");
    let record = Record::new("widget", "Alpha", "alpha");

    {
        let conn = open_db(&path).unwrap();
        let records = SqliteRecordStore::try_new(&conn).unwrap();
        let mut dispatcher =
            EventDispatcher::new(records, SqliteLabelStore::try_new(&conn).unwrap());
        dispatcher
            .subscribe("widget", "shadow", Conditions::default())
            .unwrap();
        records.create_record(&record).unwrap();
        dispatcher.on_record_changed(record.id).unwrap();
    }

    let conn = open_db(&path).unwrap();
    let dispatcher = EventDispatcher::new(
        SqliteRecordStore::try_new(&conn).unwrap(),
        SqliteLabelStore::try_new(&conn).unwrap(),
    );
    let label = dispatcher
        .query()
        .label_for(record.id, "shadow")
        .unwrap()
        .unwrap();
    assert_eq!(label.name, "Alpha");
    assert_eq!(label.slug, "alpha");
}

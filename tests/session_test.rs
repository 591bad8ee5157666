use std::cell::RefCell;
use std::fs;
use std::rc::Rc;

use serde_json::{json, Value};
use tempfile::TempDir;

use schema_ide::{Command, NewAttribute, SchemaError, SchemaSession, StoreEvent};

fn schema() -> Value {
    json!({
        "$schema": "s",
        "title": "Card",
        "version": "1",
        "description": "d",
        "blockType": "b",
        "blockName": "card",
        "manualSyncRequired": false,
        "tabs": [{"name": "settings", "order": 1, "groups": [
            {"id": "content", "title": "Content", "order": 1, "subgroups": [{"name": "text", "order": 1}]},
            {"id": "media", "title": "Media", "order": 2}
        ]}],
        "attributes": {
            "heading": {"type": "string", "label": "Heading", "group": "content", "subgroup": "text", "order": 1},
            "body": {"type": "string", "label": "Body", "group": "content", "subgroup": "text", "order": 2},
            "image": {"type": "string", "label": "Image", "group": "media", "order": 1}
        }
    })
}

fn setup() -> (TempDir, std::path::PathBuf) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("card.json");
    fs::write(&path, serde_json::to_string_pretty(&schema()).unwrap()).unwrap();
    (dir, path)
}

#[test]
fn test_create_attribute_takes_next_order() {
    let (_dir, path) = setup();
    let mut session = SchemaSession::open_file(&path).unwrap();
    session
        .execute(Command::CreateAttribute(
            NewAttribute::new("caption", "content").subgroup("text"),
        ))
        .unwrap();

    let attr = session.store().attribute("caption").unwrap();
    assert_eq!(attr["order"], 3);
    assert_eq!(attr["label"], "caption");
    assert_eq!(attr["type"], "string");

    assert_eq!(session.undo().unwrap(), "Create attribute");
    assert!(session.store().attribute("caption").is_none());
}

#[test]
fn test_undo_redo_restores_document_exactly() {
    let (_dir, path) = setup();
    let mut session = SchemaSession::open_file(&path).unwrap();
    let original = session.store().to_document();

    session
        .execute(Command::RenameSubgroup {
            group: "content".into(),
            old: "text".into(),
            new: "copy".into(),
        })
        .unwrap();
    session
        .execute(Command::DeleteGroup {
            id: "media".into(),
            dest: Some("content".into()),
        })
        .unwrap();
    let edited = session.store().to_document();
    assert_eq!(session.store().attribute("heading").unwrap()["subgroup"], "copy");
    assert_eq!(session.store().attribute("image").unwrap()["group"], "content");
    assert!(!session.store().has_group("media"));

    session.undo().unwrap();
    session.undo().unwrap();
    assert_eq!(session.store().to_document(), original);
    assert_eq!(
        session.store().attributes().keys().collect::<Vec<_>>(),
        vec!["heading", "body", "image"]
    );

    session.redo().unwrap();
    session.redo().unwrap();
    assert_eq!(session.store().to_document(), edited);
}

#[test]
fn test_save_with_confirmation() {
    let (_dir, path) = setup();
    let mut session = SchemaSession::open_file(&path).unwrap();

    // 无警告时不询问
    let saved = session.save(|_| panic!("no warnings expected")).unwrap();
    assert!(saved);
    assert!(!session.is_dirty());

    // 未声明的子分组产生警告
    session
        .execute(Command::set_field(vec!["image".into()], "subgroup", json!("ghost")))
        .unwrap();
    assert!(!session.save(|warnings| {
        assert!(warnings.iter().any(|w| w.path == "attributes.image.subgroup"));
        false
    })
    .unwrap());
    assert!(session.is_dirty());

    assert!(session.save(|_| true).unwrap());
    let saved: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(saved["attributes"]["image"]["subgroup"], "ghost");
}

#[test]
fn test_save_blocked_keeps_file() {
    let (_dir, path) = setup();
    let before = fs::read_to_string(&path).unwrap();
    let mut session = SchemaSession::open_file(&path).unwrap();
    session
        .execute(Command::set_field(vec!["body".into()], "group", json!("nowhere")))
        .unwrap();

    let result = session.save(|_| true);
    assert!(matches!(result, Err(SchemaError::SaveBlocked { errors: 1 })));
    assert!(session.is_dirty());
    assert_eq!(fs::read_to_string(&path).unwrap(), before);
}

#[test]
fn test_open_clears_history_and_failure_keeps_state() {
    let (dir, path) = setup();
    let mut session = SchemaSession::open_file(&path).unwrap();
    session
        .execute(Command::DeleteAttributes { keys: vec!["image".into()] })
        .unwrap();
    assert!(session.history().can_undo());

    let bad = dir.path().join("bad.json");
    fs::write(&bad, "[1, 2").unwrap();
    assert!(session.open(&bad).is_err());
    assert!(session.history().can_undo());
    assert!(session.store().attribute("image").is_none());

    session.open(&path).unwrap();
    assert!(!session.history().can_undo());
    assert!(session.store().attribute("image").is_some());
}

#[test]
fn test_observers_are_notified() {
    let (_dir, path) = setup();
    let mut session = SchemaSession::open_file(&path).unwrap();
    let events = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&events);
    session.subscribe(move |event: &StoreEvent| sink.borrow_mut().push(event.clone()));

    session
        .execute(Command::set_field(vec!["heading".into()], "label", json!("Title")))
        .unwrap();
    session.undo().unwrap();
    assert!(!events.borrow().is_empty());
}

#[test]
fn test_open_emits_path_changed() {
    let (dir, path) = setup();
    let other = dir.path().join("other.json");
    fs::copy(&path, &other).unwrap();

    let mut session = SchemaSession::open_file(&path).unwrap();
    let events = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&events);
    session.subscribe(move |event: &StoreEvent| sink.borrow_mut().push(event.clone()));

    session.open(&other).unwrap();
    assert_eq!(
        *events.borrow(),
        vec![StoreEvent::PathChanged(other.clone()), StoreEvent::Changed]
    );
    assert_eq!(session.store().path(), other.as_path());
}

//! Preference and memo store tests: defaults, round-trips, corrupt records.

use lilly_core::persona::{Lang, Persona, Style, Tone};
use lilly_core::prefs::{PreferenceStore, Preferences, DEFAULT_SESSION};
use tempfile::tempdir;

#[test]
fn test_missing_record_loads_defaults() {
    let dir = tempdir().unwrap();
    let store = PreferenceStore::open_path(dir.path().join("prefs")).unwrap();

    let prefs = store.load().unwrap();
    assert_eq!(prefs.session, DEFAULT_SESSION);
    assert!(!prefs.private_mode);
    assert_eq!(prefs.persona, Persona::default());
}

#[test]
fn test_save_load_round_trip() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("prefs");
    {
        let store = PreferenceStore::open_path(&path).unwrap();
        let prefs = Preferences {
            persona: Persona {
                style: Style::Concise,
                tone: Tone::Pro,
                lang: Lang::English,
                tutor: true,
            },
            private_mode: true,
            session: "دراسة".to_string(),
        };
        store.save(&prefs).unwrap();
    }
    let store = PreferenceStore::open_path(&path).unwrap();
    let loaded = store.load().unwrap();
    assert_eq!(loaded.session, "دراسة");
    assert!(loaded.private_mode);
    assert_eq!(loaded.persona.style, Style::Concise);
    assert!(loaded.persona.tutor);
}

#[test]
fn test_partial_record_fills_defaults() {
    let dir = tempdir().unwrap();
    let store = PreferenceStore::open_path(dir.path().join("prefs")).unwrap();

    // An older record shape with only private_mode set still loads.
    let partial: Preferences = serde_json::from_str(r#"{"private_mode": true}"#).unwrap();
    assert!(partial.private_mode);
    assert_eq!(partial.session, DEFAULT_SESSION);
    store.save(&partial).unwrap();
    assert!(store.load().unwrap().private_mode);
}

#[test]
fn test_memos_share_the_store() {
    let dir = tempdir().unwrap();
    let store = PreferenceStore::open_path(dir.path().join("prefs")).unwrap();
    let memos = store.memos().unwrap();

    memos.add("اشتري حليب").unwrap();
    memos.add("  موعد الخميس  ").unwrap();

    let list = memos.list().unwrap();
    assert_eq!(list.len(), 2);
    assert_eq!(list[0].text, "اشتري حليب");
    // add() trims its input.
    assert_eq!(list[1].text, "موعد الخميس");
    assert!(list[0].ts <= list[1].ts);

    memos.clear().unwrap();
    assert!(memos.list().unwrap().is_empty());
}

#![cfg(feature = "file")]

use hemocare_secure_core::{
    DynKeyValueStore, FileStore, GuardConfig, KeyValueStore, Lookup, SecureCore,
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;
use tempfile::tempdir;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct BleedLog {
    site: String,
    severity: u8,
    treated: bool,
}

fn core_on(store: DynKeyValueStore) -> SecureCore {
    SecureCore::builder()
        .config(GuardConfig::default())
        .store(store)
        .build()
        .unwrap()
}

#[test]
fn values_survive_a_restart() {
    let dir = tempdir().unwrap();
    let entry = BleedLog {
        site: "left knee".into(),
        severity: 2,
        treated: true,
    };

    {
        let core = core_on(Arc::new(FileStore::new(dir.path())));
        assert!(core.store().set("hemocare_bleed_log", &entry));
    }

    let core = core_on(Arc::new(FileStore::new(dir.path())));
    assert_eq!(
        core.store().lookup::<BleedLog>("hemocare_bleed_log"),
        Lookup::Found(entry)
    );
}

#[test]
fn on_disk_values_are_ciphertext() {
    let dir = tempdir().unwrap();
    let files = Arc::new(FileStore::new(dir.path()));
    let core = core_on(files.clone());
    core.store()
        .set("hemocare_profile", &json!({"name": "Ishaan", "factor": "VIII"}));

    let raw = files.get("hemocare_profile").unwrap().unwrap();
    assert!(!raw.contains("Ishaan"));
    assert!(!raw.contains("VIII"));
}

#[test]
fn garbage_under_a_key_reads_as_default() {
    let dir = tempdir().unwrap();
    let files = Arc::new(FileStore::new(dir.path()));
    files.set("hemocare_profile", "{\"name\":\"plain\"}").unwrap();

    let core = core_on(files);
    assert_eq!(core.store().get("hemocare_profile", json!("fallback")), json!("fallback"));
    assert!(core.store().lookup::<Value>("hemocare_profile").is_corrupted());
}

#[test]
fn different_app_secret_cannot_read_values() {
    let dir = tempdir().unwrap();
    let writer = core_on(Arc::new(FileStore::new(dir.path())));
    writer.store().set("token", &"abc");

    let reader = SecureCore::builder()
        .config(GuardConfig::default().app_secret("another-build"))
        .store(Arc::new(FileStore::new(dir.path())))
        .build()
        .unwrap();
    assert_eq!(reader.store().get("token", String::from("none")), "none");
}

#[test]
fn clear_wipes_usage_and_values() {
    let dir = tempdir().unwrap();
    let files = Arc::new(FileStore::new(dir.path()));
    let core = core_on(files.clone());
    core.store().set("hemocare_profile", &json!({"a": 1}));
    core.tracker().local().record(None);

    core.store().clear().unwrap();
    assert_eq!(files.get("hemocare_profile").unwrap(), None);
    assert_eq!(files.get("hemocare_chat_usage").unwrap(), None);
}

#[test]
fn remove_is_idempotent() {
    let dir = tempdir().unwrap();
    let core = core_on(Arc::new(FileStore::new(dir.path())));
    core.store().set("k", &1);
    core.store().remove("k").unwrap();
    core.store().remove("k").unwrap();
    assert_eq!(core.store().lookup::<i32>("k"), Lookup::NotFound);
}

#[test]
fn long_keys_persist_and_read_back() {
    let dir = tempdir().unwrap();
    let key = "k".repeat(200);
    {
        let core = core_on(Arc::new(FileStore::new(dir.path())));
        assert!(core.store().set(&key, &json!({"x": 1})));
    }

    let core = core_on(Arc::new(FileStore::new(dir.path())));
    assert_eq!(core.store().get(&key, json!("default")), json!({"x": 1}));
    core.store().remove(&key).unwrap();
    assert_eq!(core.store().lookup::<Value>(&key), Lookup::NotFound);
}

#[test]
fn long_identity_usage_is_recorded() {
    let dir = tempdir().unwrap();
    let core = core_on(Arc::new(FileStore::new(dir.path())));
    let identity = "user-".repeat(60);

    assert!(core.tracker().local().record(Some(&identity)));
    assert_eq!(core.tracker().local().check(Some(&identity)).daily_count, 1);
}

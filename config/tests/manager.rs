//! End-to-end tests for the config manager against an in-memory store.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use lattice_config::{
    flatten, Config, ConfigError, ConfigWatcher, Manager, Registrable, Topic, Validatable,
};
use lattice_kvstore::{KvStore, MemStore, StoreError, TxFn};

#[derive(Debug, Clone, PartialEq, Default, Config)]
struct ServerConfig {
    host: String,
    port: u16,
}

// Validation and notification capabilities live on a separate subtree
// type so the tests can observe both paths.
#[derive(Debug, Clone, PartialEq, Default, Config)]
#[config(validate, topic)]
struct TlsConfig {
    cert: String,
    key: String,
}

impl Validatable for TlsConfig {
    fn validate(&self) -> anyhow::Result<()> {
        if self.cert.is_empty() != self.key.is_empty() {
            anyhow::bail!("cert and key must be set together");
        }
        Ok(())
    }
}

impl Registrable for TlsConfig {
    fn topic(&self) -> Topic {
        Topic::from_static("tls")
    }
}

#[derive(Debug, Clone, PartialEq, Default, Config)]
struct Nested {
    #[config(rename = "str")]
    text: String,
    number: i64,
    #[config(rename = "bool")]
    flag: bool,
}

#[derive(Debug, Clone, PartialEq, Default, Config)]
#[config(root = "test")]
struct TestConfig {
    #[config(rename = "str")]
    text: String,
    number: i64,
    #[config(rename = "bool")]
    flag: bool,
    object: Nested,
    map: HashMap<String, String>,
    array: Vec<String>,
    tls: TlsConfig,
    reference: Option<Nested>,
    #[config(skip)]
    runtime_only: String,
}

fn default_config() -> TestConfig {
    TestConfig {
        text: "str".to_string(),
        number: 123,
        flag: true,
        object: Nested::default(),
        map: HashMap::from([("key1".to_string(), "str1".to_string())]),
        array: vec!["str1".to_string()],
        tls: TlsConfig::default(),
        reference: None,
        runtime_only: String::new(),
    }
}

fn input(pairs: &[(&str, Value)]) -> BTreeMap<String, Value> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

async fn manager() -> (Arc<MemStore>, Manager<TestConfig>) {
    let store = Arc::new(MemStore::new());
    let manager = Manager::new(store.clone(), default_config()).await.unwrap();
    (store, manager)
}

#[tokio::test]
async fn test_primitive_update() {
    let (store, manager) = manager().await;

    manager
        .update(input(&[
            ("test.str", json!("newstr")),
            ("test.number", json!(456)),
            ("test.bool", json!(false)),
        ]))
        .await
        .unwrap();

    let root = manager.root_config().await;
    assert_eq!(root.text, "newstr");
    assert_eq!(root.number, 456);
    assert!(!root.flag);

    // Every changed leaf is persisted.
    assert_eq!(store.get("test.str").await.unwrap(), Some(json!("newstr")));
    assert_eq!(store.get("test.number").await.unwrap(), Some(json!(456)));
    assert_eq!(store.get("test.bool").await.unwrap(), Some(json!(false)));
}

#[tokio::test]
async fn test_nested_record_update() {
    let (_, manager) = manager().await;

    manager
        .update(input(&[
            ("test.object.str", json!("newstr")),
            ("test.object.number", json!(456)),
            ("test.object.bool", json!(false)),
        ]))
        .await
        .unwrap();

    let root = manager.root_config().await;
    assert_eq!(
        root.object,
        Nested {
            text: "newstr".to_string(),
            number: 456,
            flag: false,
        }
    );
}

#[tokio::test]
async fn test_map_append_and_replace() {
    let (store, manager) = manager().await;

    manager
        .update(input(&[
            ("test.map.key1", json!("newstr1")),
            ("test.map.key2", json!("str2")),
        ]))
        .await
        .unwrap();

    let root = manager.root_config().await;
    assert_eq!(root.map["key1"], "newstr1");
    assert_eq!(root.map["key2"], "str2");
    assert_eq!(store.get("test.map.key2").await.unwrap(), Some(json!("str2")));
}

#[tokio::test]
async fn test_sequence_append_boundary() {
    let (_, manager) = manager().await;

    manager
        .update(input(&[("test.array.1", json!("newstr"))]))
        .await
        .unwrap();
    let root = manager.root_config().await;
    assert_eq!(root.array, vec!["str1".to_string(), "newstr".to_string()]);

    // Rebuild from scratch: length 1 again, index 2 is out of range.
    let store = Arc::new(MemStore::new());
    let manager = Manager::new(store, default_config()).await.unwrap();
    let err = manager
        .update(input(&[("test.array.2", json!("x"))]))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ConfigError::IndexOutOfRange { index: 2, len: 1, .. }
    ));
    assert_eq!(manager.root_config().await.array, vec!["str1".to_string()]);
}

#[tokio::test]
async fn test_whole_subtree_replacement() {
    let (_, manager) = manager().await;

    manager
        .update(input(&[
            ("test.object", json!({"str": "s", "number": 9, "bool": true})),
            ("test.array", json!(["a", "b"])),
        ]))
        .await
        .unwrap();

    let root = manager.root_config().await;
    assert_eq!(root.object.number, 9);
    assert_eq!(root.array, vec!["a".to_string(), "b".to_string()]);
}

#[tokio::test]
async fn test_reference_is_allocated_on_demand() {
    let (_, manager) = manager().await;

    manager
        .update(input(&[("test.reference.number", json!(5))]))
        .await
        .unwrap();

    let root = manager.root_config().await;
    assert_eq!(root.reference.unwrap().number, 5);
}

#[tokio::test]
async fn test_unknown_field_is_structural_mismatch() {
    let (_, manager) = manager().await;

    let err = manager
        .update(input(&[("test.no_such", json!(1))]))
        .await
        .unwrap_err();
    assert!(matches!(err, ConfigError::StructuralMismatch { path } if path == "test.no_such"));
}

#[tokio::test]
async fn test_skipped_field_is_invisible() {
    let (_, manager) = manager().await;

    let err = manager
        .update(input(&[("test.runtime_only", json!("x"))]))
        .await
        .unwrap_err();
    assert!(matches!(err, ConfigError::StructuralMismatch { .. }));

    let flat = flatten(&manager.root_config().await);
    assert!(!flat.contains_key("test.runtime_only"));
}

#[tokio::test]
async fn test_input_without_root_name_is_invalid() {
    let (_, manager) = manager().await;

    let err = manager
        .update(input(&[("other.str", json!("x"))]))
        .await
        .unwrap_err();
    assert!(matches!(err, ConfigError::InvalidData));
}

#[tokio::test]
async fn test_validation_failure_rolls_everything_back() {
    let (store, manager) = manager().await;
    let before_root = manager.root_config().await;
    let before_store = store.get_all().await.unwrap();

    // cert without key fails TlsConfig validation; the earlier leaf in
    // the same update must be rolled back with it.
    let err = manager
        .update(input(&[
            ("test.number", json!(999)),
            ("test.tls.cert", json!("cert.pem")),
        ]))
        .await
        .unwrap_err();
    assert!(matches!(err, ConfigError::Validation { ref path, .. } if path == "test.tls"));

    assert_eq!(manager.root_config().await, before_root);
    assert_eq!(store.get_all().await.unwrap(), before_store);
}

#[tokio::test]
async fn test_no_events_published_for_failed_update() {
    let (_, manager) = manager().await;
    let mut rx = manager.subscribe_topic("tls");

    let err = manager
        .update(input(&[("test.tls.cert", json!("lonely.pem"))]))
        .await
        .unwrap_err();
    assert!(matches!(err, ConfigError::Validation { .. }));

    let outcome =
        tokio::time::timeout(std::time::Duration::from_millis(50), rx.recv()).await;
    assert!(outcome.is_err(), "failed update must not publish");
}

#[tokio::test]
async fn test_successful_update_publishes_subtree_value() {
    let (_, manager) = manager().await;
    let mut rx = manager.register(&TlsConfig::default());

    manager
        .update(input(&[
            ("test.tls.cert", json!("cert.pem")),
            ("test.tls.key", json!("key.pem")),
        ]))
        .await
        .unwrap();

    let event = rx.recv().await.expect("tls update event");
    assert_eq!(event.topic().as_str(), "tls");
    let tls = event.into_data().downcast::<TlsConfig>().unwrap();
    assert_eq!(tls.cert, "cert.pem");
    assert_eq!(tls.key, "key.pem");
}

#[tokio::test]
async fn test_config_watcher_tracks_latest_value() {
    let (_, manager) = manager().await;

    let watcher = ConfigWatcher::new(TlsConfig::default());
    let (notify_tx, mut notify_rx) = tokio::sync::mpsc::channel(4);
    let rx = manager.subscribe_topic("tls");
    watcher.listen(rx, move |tls: TlsConfig| {
        let _ = notify_tx.try_send(tls);
    });

    manager
        .update(input(&[
            ("test.tls.cert", json!("a.pem")),
            ("test.tls.key", json!("b.pem")),
        ]))
        .await
        .unwrap();

    let seen = notify_rx.recv().await.expect("callback value");
    assert_eq!(seen.cert, "a.pem");
    assert_eq!(watcher.config().cert, "a.pem");
}

#[tokio::test]
async fn test_validate_all() {
    let (_, manager) = manager().await;
    manager.validate_all().await.unwrap();

    // Sneak an invalid value in without validation, then catch it.
    manager
        .update_unvalidated(input(&[("test.tls.cert", json!("cert.pem"))]))
        .await
        .unwrap();
    let err = manager.validate_all().await.unwrap_err();
    assert!(matches!(err, ConfigError::Validation { ref path, .. } if path == "test.tls"));
}

#[tokio::test]
async fn test_construction_overlays_persisted_values() {
    let store = Arc::new(MemStore::new());
    store.set("test.number", json!(777)).await.unwrap();
    store.set("test.map.extra", json!("persisted")).await.unwrap();

    let manager = Manager::new(store.clone(), default_config()).await.unwrap();
    let root = manager.root_config().await;

    assert_eq!(root.number, 777, "persisted value wins over default");
    assert_eq!(root.text, "str", "default survives where nothing persisted");
    assert_eq!(root.map["extra"], "persisted");

    // Defaults are persisted back by the seeding update.
    assert_eq!(store.get("test.str").await.unwrap(), Some(json!("str")));
}

#[tokio::test]
async fn test_construction_fails_on_conflicting_persisted_type() {
    let store = Arc::new(MemStore::new());
    store.set("test.number", json!("not a number")).await.unwrap();

    let result = Manager::new(store, default_config()).await;
    assert!(matches!(result, Err(ConfigError::TypeMismatch { .. })));
}

#[tokio::test]
async fn test_flatten_is_canonical() {
    let config = default_config();
    let flat = flatten(&config);

    assert_eq!(flat["test.str"], json!("str"));
    assert_eq!(flat["test.number"], json!(123));
    assert_eq!(flat["test.array.0"], json!("str1"));
    assert_eq!(flat["test.map.key1"], json!("str1"));
    assert_eq!(flat["test.object.bool"], json!(false));
    // An empty reference contributes no leaves.
    assert!(!flat.contains_key("test.reference"));

    // Same content, different construction order: identical flattening.
    let mut other = default_config();
    other.map = HashMap::new();
    other.map.insert("key1".to_string(), "str1".to_string());
    assert_eq!(flatten(&other), flat);
}

/// A store whose batch write always fails, for commit-failure coverage.
struct FailingStore {
    inner: MemStore,
}

#[async_trait]
impl KvStore for FailingStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        self.inner.set(key, value).await
    }

    async fn set_many(&self, _entries: BTreeMap<String, Value>) -> Result<(), StoreError> {
        Err(StoreError::Backend("disk full".to_string()))
    }

    async fn get_all(&self) -> Result<BTreeMap<String, Value>, StoreError> {
        self.inner.get_all().await
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.inner.delete(key).await
    }

    async fn delete_all(&self) -> Result<(), StoreError> {
        self.inner.delete_all().await
    }

    async fn has(&self, key: &str) -> Result<bool, StoreError> {
        self.inner.has(key).await
    }

    async fn transaction(&self, f: TxFn) -> Result<(), StoreError> {
        self.inner.transaction(f).await
    }
}

#[tokio::test]
async fn test_store_failure_keeps_memory_unchanged() {
    // Construction itself needs a working set_many, so seed with the
    // in-memory store and swap the failing one in for the update.
    let failing = Arc::new(FailingStore {
        inner: MemStore::new(),
    });
    let result = Manager::new(failing, default_config()).await;
    assert!(result.is_err(), "seeding commit fails loudly");

    let store = Arc::new(MemStore::new());
    let manager = Manager::new(store, default_config()).await.unwrap();
    let before = manager.root_config().await;

    struct FlakyStore {
        inner: MemStore,
        fail: std::sync::atomic::AtomicBool,
    }

    #[async_trait]
    impl KvStore for FlakyStore {
        async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
            self.inner.get(key).await
        }

        async fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
            self.inner.set(key, value).await
        }

        async fn set_many(&self, entries: BTreeMap<String, Value>) -> Result<(), StoreError> {
            if self.fail.load(std::sync::atomic::Ordering::SeqCst) {
                return Err(StoreError::Backend("disk full".to_string()));
            }
            self.inner.set_many(entries).await
        }

        async fn get_all(&self) -> Result<BTreeMap<String, Value>, StoreError> {
            self.inner.get_all().await
        }

        async fn delete(&self, key: &str) -> Result<(), StoreError> {
            self.inner.delete(key).await
        }

        async fn delete_all(&self) -> Result<(), StoreError> {
            self.inner.delete_all().await
        }

        async fn has(&self, key: &str) -> Result<bool, StoreError> {
            self.inner.has(key).await
        }

        async fn transaction(&self, f: TxFn) -> Result<(), StoreError> {
            self.inner.transaction(f).await
        }
    }

    let flaky = Arc::new(FlakyStore {
        inner: MemStore::new(),
        fail: std::sync::atomic::AtomicBool::new(false),
    });
    let manager = Manager::new(flaky.clone(), default_config()).await.unwrap();
    flaky.fail.store(true, std::sync::atomic::Ordering::SeqCst);

    let err = manager
        .update(input(&[("test.number", json!(999))]))
        .await
        .unwrap_err();
    assert!(matches!(err, ConfigError::Store(_)));
    assert_eq!(manager.root_config().await, before);
}

//! 注册表生命周期集成测试
//!
//! 覆盖名称级/实例级钩子的触发次数与顺序、并发注册下的 0→1 / 1→0 唯一性、
//! 插件错误策略以及冷启动回放。

use async_trait::async_trait;
use flare_mesh_core::{
    HookErrorPolicy, InMemoryStorage, Lifecycle, MeshError, RegistryConfig, RegistryStorage,
    Result, Service, ServiceRef, ServiceRegistry,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio_test::{assert_err, assert_ok};

/// 记录每次钩子调用的插件，可配置为在某个钩子上失败
#[derive(Default)]
struct RecordingPlugin {
    name: String,
    calls: Mutex<Vec<String>>,
    fail_on: Option<&'static str>,
}

impl RecordingPlugin {
    fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            ..Default::default()
        })
    }

    fn failing(name: &str, hook: &'static str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            fail_on: Some(hook),
            ..Default::default()
        })
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn count(&self, hook: &str) -> usize {
        self.calls()
            .iter()
            .filter(|call| call.starts_with(&format!("{}:", hook)))
            .count()
    }

    fn record(&self, hook: &'static str, service: &Service) -> Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("{}:{}", hook, service.id));
        match self.fail_on {
            Some(failing) if failing == hook => {
                Err(MeshError::internal(format!("{} rejected {}", self.name, service.id)))
            }
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl Lifecycle for RecordingPlugin {
    fn name(&self) -> &str {
        &self.name
    }

    async fn register_service(&self, service: &Service) -> Result<()> {
        self.record("register_service", service)
    }

    async fn deregister_service(&self, service: &Service) -> Result<()> {
        self.record("deregister_service", service)
    }

    async fn register_instance(&self, service: &Service) -> Result<()> {
        self.record("register_instance", service)
    }

    async fn deregister_instance(&self, service: &Service) -> Result<()> {
        self.record("deregister_instance", service)
    }
}

/// 写入总是失败的存储
struct BrokenStorage;

#[async_trait]
impl RegistryStorage for BrokenStorage {
    async fn store(&self, _name: &str, _service: ServiceRef) -> Result<()> {
        Err(MeshError::storage("disk full"))
    }

    async fn remove(&self, _name: &str, _id: &str) -> Result<Option<ServiceRef>> {
        Ok(None)
    }

    async fn lookup(&self, _name: &str) -> Result<Vec<ServiceRef>> {
        Ok(Vec::new())
    }

    async fn start(&self) -> Result<Vec<String>> {
        Ok(Vec::new())
    }
}

/// 移除成功之后所有查询都失败的存储
#[derive(Default)]
struct FailAfterRemoveStorage {
    inner: InMemoryStorage,
    removed: AtomicBool,
}

#[async_trait]
impl RegistryStorage for FailAfterRemoveStorage {
    async fn store(&self, name: &str, service: ServiceRef) -> Result<()> {
        self.inner.store(name, service).await
    }

    async fn remove(&self, name: &str, id: &str) -> Result<Option<ServiceRef>> {
        let removed = self.inner.remove(name, id).await?;
        self.removed.store(true, Ordering::SeqCst);
        Ok(removed)
    }

    async fn lookup(&self, name: &str) -> Result<Vec<ServiceRef>> {
        if self.removed.load(Ordering::SeqCst) {
            return Err(MeshError::storage("connection reset"));
        }
        self.inner.lookup(name).await
    }

    async fn start(&self) -> Result<Vec<String>> {
        self.inner.start().await
    }
}

fn registry_with(config: RegistryConfig) -> Arc<ServiceRegistry> {
    Arc::new(ServiceRegistry::with_storage(
        Arc::new(InMemoryStorage::new()),
        config,
    ))
}

fn instance(id: &str) -> Service {
    Service::new(id, "orders", "127.0.0.1", 9000)
}

#[tokio::test]
async fn test_first_and_last_instance_bracket_hooks() {
    let registry = registry_with(RegistryConfig::default());
    let plugin = RecordingPlugin::new("recorder");
    registry.plugin(plugin.clone());

    assert_ok!(registry.register(instance("1")).await);
    assert_ok!(registry.register(instance("2")).await);
    assert_eq!(
        plugin.calls(),
        vec!["register_service:1", "register_instance:1", "register_instance:2"]
    );

    let removed = registry.deregister("orders", "2").await.unwrap();
    assert_eq!(removed.map(|s| s.id.clone()), Some("2".to_string()));
    let removed = registry.deregister("orders", "1").await.unwrap();
    assert!(removed.is_some());

    assert_eq!(
        plugin.calls()[3..],
        ["deregister_instance:2", "deregister_instance:1", "deregister_service:1"]
    );
    assert!(registry.lookup("orders").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_deregister_unknown_instance_fires_nothing() {
    let registry = registry_with(RegistryConfig::default());
    let plugin = RecordingPlugin::new("recorder");
    registry.plugin(plugin.clone());

    assert_ok!(registry.register(instance("1")).await);
    assert_eq!(registry.deregister("orders", "404").await.unwrap(), None);
    assert_eq!(registry.deregister("billing", "1").await.unwrap(), None);

    assert_eq!(plugin.count("deregister_instance"), 0);
    assert_eq!(plugin.count("deregister_service"), 0);
    assert_eq!(registry.lookup("orders").await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_name_reappearing_is_a_new_transition() {
    let registry = registry_with(RegistryConfig::default());
    let plugin = RecordingPlugin::new("recorder");
    registry.plugin(plugin.clone());

    assert_ok!(registry.register(instance("1")).await);
    assert_ok!(registry.deregister("orders", "1").await);
    assert_ok!(registry.register(instance("2")).await);

    assert_eq!(plugin.count("register_service"), 2);
    assert_eq!(plugin.count("deregister_service"), 1);
}

#[tokio::test]
async fn test_same_instance_registered_twice_retires_cleanly() {
    let registry = registry_with(RegistryConfig::default());
    let plugin = RecordingPlugin::new("recorder");
    registry.plugin(plugin.clone());

    assert_ok!(registry.register(instance("1")).await);
    assert_ok!(registry.register(instance("1")).await);
    assert_eq!(
        plugin.calls(),
        vec!["register_service:1", "register_instance:1", "register_instance:1"]
    );
    assert_eq!(registry.lookup("orders").await.unwrap().len(), 1);

    assert!(registry.deregister("orders", "1").await.unwrap().is_some());
    assert!(registry.lookup("orders").await.unwrap().is_empty());
    assert_eq!(plugin.count("deregister_instance"), 1);
    assert_eq!(plugin.count("deregister_service"), 1);

    // 再次注销同一实例不触发任何钩子
    assert_eq!(registry.deregister("orders", "1").await.unwrap(), None);
    assert_eq!(plugin.calls().len(), 5);
}

#[tokio::test]
async fn test_retry_after_propagated_failure_does_not_leak_service() {
    let registry = registry_with(RegistryConfig::default());
    let failing = RecordingPlugin::failing("broken", "register_instance");
    registry.plugin(failing.clone());

    // 插件失败时实例已写入，调用方重试同一实例
    assert_err!(registry.register(instance("1")).await);
    assert_err!(registry.register(instance("1")).await);
    assert_eq!(registry.lookup("orders").await.unwrap().len(), 1);

    assert_ok!(registry.deregister("orders", "1").await);
    assert!(registry.lookup("orders").await.unwrap().is_empty());
    assert_eq!(failing.count("register_service"), 1);
    assert_eq!(failing.count("deregister_service"), 1);
}

#[tokio::test]
async fn test_last_instance_retired_without_reading_storage_after_remove() {
    let storage = Arc::new(FailAfterRemoveStorage::default());
    let registry = ServiceRegistry::with_storage(storage.clone(), RegistryConfig::default());
    let plugin = RecordingPlugin::new("recorder");
    registry.plugin(plugin.clone());

    assert_ok!(registry.register(instance("1")).await);
    assert_ok!(registry.deregister("orders", "1").await);

    assert_eq!(
        plugin.calls()[2..],
        ["deregister_instance:1", "deregister_service:1"]
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_registration_fires_register_service_once() {
    const INSTANCES: usize = 32;

    let registry = registry_with(RegistryConfig::default());
    let plugin = RecordingPlugin::new("recorder");
    registry.plugin(plugin.clone());

    let handles: Vec<_> = (0..INSTANCES)
        .map(|i| {
            let registry = registry.clone();
            tokio::spawn(async move { registry.register(instance(&i.to_string())).await })
        })
        .collect();
    for handle in handles {
        assert_ok!(handle.await.unwrap());
    }

    assert_eq!(plugin.count("register_service"), 1);
    assert_eq!(plugin.count("register_instance"), INSTANCES);
    assert_eq!(registry.lookup("orders").await.unwrap().len(), INSTANCES);

    let handles: Vec<_> = (0..INSTANCES)
        .map(|i| {
            let registry = registry.clone();
            tokio::spawn(async move { registry.deregister("orders", &i.to_string()).await })
        })
        .collect();
    for handle in handles {
        assert!(handle.await.unwrap().unwrap().is_some());
    }

    assert_eq!(plugin.count("deregister_service"), 1);
    assert_eq!(plugin.count("deregister_instance"), INSTANCES);
    assert!(registry.lookup("orders").await.unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_churn_keeps_transitions_balanced() {
    let registry = registry_with(RegistryConfig::default());
    let plugin = RecordingPlugin::new("recorder");
    registry.plugin(plugin.clone());

    // 每个任务反复注册/注销自己的实例，名称在 0 和非 0 之间来回切换
    let handles: Vec<_> = (0..8)
        .map(|task| {
            let registry = registry.clone();
            tokio::spawn(async move {
                for round in 0..20 {
                    let id = format!("{}-{}", task, round);
                    registry.register(instance(&id)).await?;
                    registry.deregister("orders", &id).await?;
                }
                Ok::<_, MeshError>(())
            })
        })
        .collect();
    for handle in handles {
        assert_ok!(handle.await.unwrap());
    }

    assert!(registry.lookup("orders").await.unwrap().is_empty());
    assert_eq!(plugin.count("register_instance"), 160);
    assert_eq!(plugin.count("deregister_instance"), 160);
    assert!(plugin.count("register_service") >= 1);
    assert_eq!(
        plugin.count("register_service"),
        plugin.count("deregister_service")
    );

    // 名称级事件必须严格交替
    let transitions: Vec<String> = plugin
        .calls()
        .into_iter()
        .filter(|call| call.contains("_service:"))
        .collect();
    for (index, call) in transitions.iter().enumerate() {
        let expected = if index % 2 == 0 {
            "register_service:"
        } else {
            "deregister_service:"
        };
        assert!(call.starts_with(expected), "unexpected transition order: {:?}", transitions);
    }
}

#[tokio::test]
async fn test_plugin_failure_is_propagated_without_aborting() {
    let registry = registry_with(RegistryConfig::default());
    let failing = RecordingPlugin::failing("broken", "register_service");
    let recorder = RecordingPlugin::new("recorder");
    registry.plugin(failing.clone());
    registry.plugin(recorder.clone());

    let err = assert_err!(registry.register(instance("1")).await);
    match err {
        MeshError::Plugin { plugin, hook, .. } => {
            assert_eq!(plugin, "broken");
            assert_eq!(hook, "register_service");
        }
        other => panic!("unexpected error: {:?}", other),
    }

    // 失败插件之后的插件照常收到通知，实例也已经写入
    assert_eq!(
        recorder.calls(),
        vec!["register_service:1", "register_instance:1"]
    );
    assert_eq!(failing.count("register_instance"), 1);
    assert_eq!(registry.lookup("orders").await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_multiple_plugin_failures_are_combined() {
    let registry = registry_with(RegistryConfig::default());
    registry.plugin(RecordingPlugin::failing("alpha", "register_instance"));
    registry.plugin(RecordingPlugin::failing("beta", "register_instance"));

    let err = assert_err!(registry.register(instance("1")).await);
    let MeshError::Combined(errors) = &err else {
        panic!("expected combined error, got {:?}", err);
    };
    assert_eq!(errors.len(), 2);

    let message = err.to_string();
    assert!(message.contains("alpha rejected 1"));
    assert!(message.contains("beta rejected 1"));
}

#[tokio::test]
async fn test_log_policy_swallows_plugin_failures() {
    let registry = registry_with(RegistryConfig {
        hook_error_policy: HookErrorPolicy::Log,
        ..Default::default()
    });
    let failing = RecordingPlugin::failing("broken", "deregister_service");
    registry.plugin(failing.clone());

    assert_ok!(registry.register(instance("1")).await);
    let removed = assert_ok!(registry.deregister("orders", "1").await);
    assert!(removed.is_some());
    assert_eq!(failing.count("deregister_service"), 1);
}

#[tokio::test]
async fn test_storage_failure_aborts_and_rolls_back_service_hook() {
    let registry = Arc::new(ServiceRegistry::with_storage(
        Arc::new(BrokenStorage),
        RegistryConfig::default(),
    ));
    let plugin = RecordingPlugin::new("recorder");
    registry.plugin(plugin.clone());

    let err = assert_err!(registry.register(instance("1")).await);
    assert_eq!(err, MeshError::storage("disk full"));

    assert_eq!(
        plugin.calls(),
        vec!["register_service:1", "deregister_service:1"]
    );
}

#[tokio::test]
async fn test_start_replays_persisted_instances() {
    let storage = Arc::new(InMemoryStorage::with_services([
        Arc::new(Service::new("o1", "orders", "10.0.0.1", 80)),
        Arc::new(Service::new("o2", "orders", "10.0.0.2", 80)),
        Arc::new(Service::new("b1", "billing", "10.0.0.3", 80)),
    ]));
    let registry = ServiceRegistry::with_storage(storage, RegistryConfig::default());
    let plugin = RecordingPlugin::new("recorder");
    registry.plugin(plugin.clone());

    assert_ok!(registry.start().await);

    // 服务名按字母序回放，每个名称一次名称级通知
    assert_eq!(
        plugin.calls(),
        vec![
            "register_service:b1",
            "register_instance:b1",
            "register_service:o1",
            "register_instance:o1",
            "register_instance:o2",
        ]
    );

    // 回放之后的注册不会再次触发名称级通知
    assert_ok!(registry.register(Service::new("o3", "orders", "10.0.0.4", 80)).await);
    assert_eq!(plugin.count("register_service"), 2);
}

#[tokio::test]
async fn test_start_without_replay() {
    let storage = Arc::new(InMemoryStorage::with_services([Arc::new(Service::new(
        "o1", "orders", "10.0.0.1", 80,
    ))]));
    let registry = ServiceRegistry::with_storage(
        storage,
        RegistryConfig {
            replay_on_start: false,
            ..Default::default()
        },
    );
    let plugin = RecordingPlugin::new("recorder");
    registry.plugin(plugin.clone());

    assert_ok!(registry.start().await);
    assert!(plugin.calls().is_empty());
    assert_eq!(registry.lookup("orders").await.unwrap().len(), 1);
}

//! End-to-end bridge scenarios against the fake runtime

use jvm_bridge_core::testing::FakeRuntime;
use jvm_bridge_core::{Bridge, BridgeError, ClassSlot, ResolutionStrategy, VmInitArgs};
use std::sync::Arc;

#[test]
fn test_vm_absent_until_initialized_then_stable() {
    let bridge = Bridge::new(FakeRuntime::new());
    assert!(bridge.vm().is_none());

    bridge.spawn(None).unwrap();
    let vm = bridge.vm().unwrap();
    for _ in 0..3 {
        assert_eq!(bridge.vm(), Some(vm));
    }
}

#[test]
fn test_environment_is_idempotent_per_thread() {
    let bridge = Arc::new(Bridge::new(FakeRuntime::new()));
    bridge.spawn(None).unwrap();

    let worker = {
        let bridge = Arc::clone(&bridge);
        std::thread::spawn(move || {
            let first = bridge.env().unwrap();
            (0..10).all(|_| bridge.env().unwrap() == first)
        })
    };
    assert!(worker.join().unwrap());

    // Creating thread came from spawn, worker attached once.
    assert_eq!(bridge.runtime().attach_count(), 1);
}

#[test]
fn test_no_vm_means_no_environment_and_no_attach() {
    let bridge = Bridge::new(FakeRuntime::new());

    assert!(matches!(bridge.env(), Err(BridgeError::Uninitialized)));
    assert!(matches!(
        bridge.load_class("pkg.Known"),
        Err(BridgeError::Uninitialized)
    ));
    assert_eq!(bridge.runtime().attach_count(), 0);
}

#[test]
fn test_repeated_loads_refer_to_same_class() {
    let bridge = Bridge::new(FakeRuntime::new());
    bridge.spawn(None).unwrap();
    let known = bridge.runtime().define_class("pkg/Known");

    // Without memoization both lookups run and succeed.
    let a = bridge.load_class("pkg.Known").unwrap();
    let b = bridge.load_class("pkg.Known").unwrap();
    assert!(bridge.runtime().same_object(a, b));
    assert_eq!(bridge.runtime().find_class_calls().len(), 2);

    // With a slot the second call is served from the cache.
    let slot = ClassSlot::new();
    let c = bridge.load_class_into(&slot, "pkg.Known").unwrap();
    let d = bridge.load_class_into(&slot, "pkg.Known").unwrap();
    assert_eq!(c, d);
    assert!(bridge.runtime().same_object(c, known));
    assert_eq!(bridge.runtime().find_class_calls().len(), 3);
}

#[test]
fn test_unknown_class_leaves_describable_fault() {
    let bridge = Bridge::new(FakeRuntime::new());
    bridge.spawn(None).unwrap();

    let err = bridge.load_class("does.not.Exist").unwrap_err();
    assert_eq!(err.to_string(), "Class not found: does.not.Exist");

    let fault = bridge.pending_fault().unwrap();
    assert!(bridge.runtime().is_throwable(fault));
    assert_eq!(bridge.runtime().describe_count(), 1);
}

#[test]
fn test_standalone_spawn_scenario() {
    let bridge = Bridge::new(FakeRuntime::new());

    let env = bridge.spawn(None).unwrap();
    let vm = bridge.vm().unwrap();
    assert_eq!(bridge.env().unwrap(), env);

    let again = bridge.spawn(Some(&VmInitArgs::default().option("-Xmx64m")));
    assert!(matches!(again, Err(BridgeError::AlreadyRunning)));
    assert_eq!(bridge.vm(), Some(vm));
    assert_eq!(bridge.runtime().create_calls(), 1);
}

#[test]
fn test_creating_thread_is_never_detached() {
    let bridge = Bridge::new(FakeRuntime::new());
    let env = bridge.spawn(None).unwrap();

    assert!(!bridge.detach_current_thread());
    assert_eq!(bridge.runtime().detach_count(), 0);
    assert_eq!(bridge.env().unwrap(), env);
    assert_eq!(bridge.runtime().attach_count(), 0);
}

#[test]
fn test_host_thread_is_never_detached() {
    let runtime = FakeRuntime::new();
    let (context, loader) = runtime.host_objects();
    let host_env = runtime.host_env();
    let bridge = Bridge::new(runtime);
    bridge
        .initialize_embedded(host_env, Some(context), Some(loader))
        .unwrap();

    assert!(!bridge.detach_current_thread());
    assert_eq!(bridge.runtime().detach_count(), 0);
    assert_eq!(bridge.env().unwrap(), host_env);
}

#[test]
fn test_managed_host_scenario() {
    let runtime = FakeRuntime::new();
    let (context, loader) = runtime.host_objects();
    let host_env = runtime.host_env();
    let bridge = Bridge::new(runtime);

    bridge
        .initialize_embedded(host_env, Some(context), Some(loader))
        .unwrap();

    let registered_loader = bridge.class_loader().unwrap();
    let registered_context = bridge.embedding_context().unwrap();
    assert!(bridge.runtime().same_object(registered_loader, loader));
    assert!(bridge.runtime().same_object(registered_context, context));
    assert!(matches!(
        bridge.strategy(),
        ResolutionStrategy::ClassLoader(_)
    ));

    // The host thread keeps the environment it handed over.
    assert_eq!(bridge.env().unwrap(), host_env);

    let plugin = bridge.runtime().define_loader_class("dev.example.Plugin");
    assert_eq!(bridge.load_class("dev.example.Plugin").unwrap(), plugin);
    assert_eq!(bridge.runtime().loader_calls(), vec!["dev.example.Plugin"]);
    assert!(bridge.runtime().find_class_calls().is_empty());
}

#[test]
fn test_worker_threads_resolve_through_host_classloader() {
    let runtime = FakeRuntime::new();
    let (context, loader) = runtime.host_objects();
    let host_env = runtime.host_env();
    let bridge = Arc::new(Bridge::new(runtime));
    bridge
        .initialize_embedded(host_env, Some(context), Some(loader))
        .unwrap();
    bridge.runtime().define_loader_class("dev.example.Worker");

    let slot = Arc::new(ClassSlot::new());
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let bridge = Arc::clone(&bridge);
            let slot = Arc::clone(&slot);
            std::thread::spawn(move || {
                let class = bridge.load_class_into(&slot, "dev.example.Worker").unwrap();
                bridge.detach_current_thread();
                class
            })
        })
        .collect();

    let classes: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert!(classes.iter().all(|c| *c == classes[0]));
    assert_eq!(slot.get(), Some(classes[0]));
    assert_eq!(bridge.runtime().attach_count(), 4);
    assert_eq!(bridge.runtime().detach_count(), 4);
}

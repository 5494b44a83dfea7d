mod common;

use std::sync::{Arc, mpsc};
use std::thread;

use common::{FakeBackend, FakeDevice, FakeHostFactory, wait_until};
use parking_lot::Mutex;
use mc_capture::{
    CaptureError, CaptureRegion, CaptureSettings, HookRegistry, HookRouter, WorkerState,
};

fn registry(backend: &FakeBackend, factory: &FakeHostFactory) -> HookRegistry {
    HookRegistry::new(
        backend.clone(),
        Arc::new(factory.clone()),
        CaptureSettings::default(),
    )
}

const REGION: CaptureRegion = CaptureRegion {
    left: 0,
    top: 0,
    right: 64,
    bottom: 64,
};

#[test]
fn test_create_requires_init() {
    let backend = FakeBackend::new();
    let factory = FakeHostFactory::new();
    let registry = registry(&backend, &factory);

    assert!(matches!(
        registry.create_magnifier(),
        Err(CaptureError::NotInitialized)
    ));
    assert_eq!(factory.host_count(), 0);
}

#[test]
fn test_init_is_idempotent() {
    let backend = FakeBackend::new();
    let factory = FakeHostFactory::new();
    let registry = registry(&backend, &factory);

    registry.init().unwrap();
    registry.init().unwrap();
    assert!(registry.is_initialized());
    assert_eq!(backend.installs(), 1);
    assert!(backend.router().is_some());
}

#[test]
fn test_failed_init_leaves_registry_unusable() {
    let backend = FakeBackend::new();
    backend.set_fail(true);
    let factory = FakeHostFactory::new();
    let registry = registry(&backend, &factory);

    assert!(matches!(registry.init(), Err(CaptureError::Hook(_))));
    assert!(!registry.is_initialized());
    assert!(registry.create_magnifier().is_err());

    // Nothing to undo after a failed init.
    registry.uninit();
    assert_eq!(backend.uninstalls(), 0);
}

#[test]
fn test_create_and_destroy_magnifier() {
    let backend = FakeBackend::new();
    let factory = FakeHostFactory::new();
    let registry = registry(&backend, &factory);
    registry.init().unwrap();

    let worker = registry.create_magnifier().unwrap();
    assert_eq!(worker.state(), WorkerState::Running);
    assert_eq!(registry.worker_count(), 1);
    let thread = worker.thread_id().unwrap();
    assert!(registry.directory().lookup(thread).is_some());

    registry.destroy_magnifier(&worker);
    assert_eq!(worker.state(), WorkerState::Stopped);
    assert_eq!(registry.worker_count(), 0);
    assert!(registry.directory().lookup(thread).is_none());

    // Destroying twice is harmless.
    registry.destroy_magnifier(&worker);
}

#[test]
fn test_uninit_stops_every_worker() {
    let backend = FakeBackend::new();
    let factory = FakeHostFactory::new();
    let registry = registry(&backend, &factory);
    registry.init().unwrap();

    let workers: Vec<_> = (0..3).map(|_| registry.create_magnifier().unwrap()).collect();
    assert_eq!(registry.worker_count(), 3);

    registry.uninit();
    assert!(!registry.is_initialized());
    assert_eq!(registry.worker_count(), 0);
    assert!(workers.iter().all(|w| w.state() == WorkerState::Stopped));
    assert_eq!(backend.uninstalls(), 1);
    assert!(backend.router().is_none());

    registry.uninit();
    assert_eq!(backend.uninstalls(), 1);
}

#[test]
fn test_uninit_does_not_block_state_queries() {
    let backend = FakeBackend::new();
    let factory = FakeHostFactory::new();
    let registry = Arc::new(registry(&backend, &factory));
    registry.init().unwrap();
    let worker = registry.create_magnifier().unwrap();

    // Park the worker thread inside a tick so stopping it has to wait.
    let (release_tx, release_rx) = mpsc::channel::<()>();
    let release_rx = Mutex::new(release_rx);
    factory.set_on_render(move |_| {
        let _ = release_rx.lock().recv();
    });
    worker.set_capture_region(REGION);
    factory.tick(0);
    assert!(wait_until(|| !factory.renders(0).is_empty()));

    let shutdown = {
        let registry = Arc::clone(&registry);
        thread::spawn(move || registry.uninit())
    };

    assert!(wait_until(|| !registry.is_initialized()));
    assert!(matches!(
        registry.create_magnifier(),
        Err(CaptureError::NotInitialized)
    ));
    assert!(wait_until(|| worker.state() == WorkerState::Stopping));

    release_tx.send(()).unwrap();
    shutdown.join().unwrap();
    assert_eq!(worker.state(), WorkerState::Stopped);
    assert_eq!(factory.host_count(), 1);
    assert_eq!(backend.uninstalls(), 1);
}

#[test]
fn test_drop_uninitializes() {
    let backend = FakeBackend::new();
    let factory = FakeHostFactory::new();
    let worker = {
        let registry = registry(&backend, &factory);
        registry.init().unwrap();
        registry.create_magnifier().unwrap()
    };

    assert_eq!(worker.state(), WorkerState::Stopped);
    assert_eq!(backend.uninstalls(), 1);
}

#[test]
fn test_callbacks_route_to_calling_thread_only() {
    let backend = FakeBackend::new();
    let factory = FakeHostFactory::new();
    let registry = registry(&backend, &factory);
    registry.init().unwrap();

    let device = Arc::new(FakeDevice::new(9, 4, 2));
    let (b, d) = (backend.clone(), Arc::clone(&device));
    factory.set_on_render(move |_| {
        if let Some(router) = b.router() {
            router.on_present(d.as_ref());
        }
    });

    let first = registry.create_magnifier().unwrap();
    let second = registry.create_magnifier().unwrap();
    first.set_capture_region(REGION);
    second.set_capture_region(REGION);

    // Host 0 belongs to the first worker.
    factory.tick(0);
    assert!(wait_until(|| first.frames_published() == 1));
    assert_eq!(second.frames_published(), 0);
    assert!(first.pop_video().frame.is_some());
    assert!(second.pop_video().frame.is_none());

    factory.tick(1);
    assert!(wait_until(|| second.frames_published() == 1));
    assert_eq!(first.frames_published(), 1);

    // Calls from an unregistered thread pass through.
    let router = backend.router().unwrap();
    router.on_present(device.as_ref());
    router.on_reset();
    assert_eq!(first.frames_published() + second.frames_published(), 2);
    assert_eq!(device.stagings_created(), 2);

    registry.uninit();
}

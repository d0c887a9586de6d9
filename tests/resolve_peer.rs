mod common;

use common::*;
use svclink::peer::PeerManager;
use svclink::registry::CoreRegistry;
use svclink::{CacheKey, Error, Interface, ServiceId, TransportError};

#[test]
fn sibling_service_resolves_through_its_peer_manager() {
    let world = World::new();
    let _core = world.start(CORE);
    let c = world.start(PEER_C);
    let _d = world.start_peer(PEER_D);
    let main = world.start(MAIN);

    let from_main = greeter(&main, D_GREETER);
    assert_eq!(from_main.greet("main").expect("greet"), "hello main from com.example:d");
    let from_c = greeter(&c, D_GREETER);
    assert_eq!(from_c.greet("c").expect("greet"), "hello c from com.example:d");

    assert_eq!(
        from_main.instance().expect("instance"),
        from_c.instance().expect("instance")
    );
    assert_eq!(world.created(D_GREETER), 1);
    assert!(main
        .cache()
        .contains(&CacheKey::Process(PEER_D.to_string())));
}

#[test]
fn named_service_resolves_in_its_peer() {
    let world = World::new();
    let _core = world.start(CORE);
    let _d = world.start_peer(PEER_D);
    let main = world.start(MAIN);

    let named = main
        .get::<GreeterClient>(NAMED_D_GREETER)
        .expect("valid")
        .expect("available");
    assert_eq!(named.greet("e").expect("greet"), "hello e from com.example:d");
    assert!(main
        .cache()
        .contains(&CacheKey::Service(ServiceId::from(NAMED_D_GREETER))));
}

#[test]
fn unregistered_peer_is_unavailable() {
    let world = World::new();
    let _core = world.start(CORE);
    let main = world.start(MAIN);

    assert!(main.get_service(D_GREETER).expect("valid").is_none());
    assert!(main.get_other_service_manager(PEER_D).is_none());
    assert_eq!(world.created(D_GREETER), 0);

    // A process that started but never reached the registry is invisible too.
    let _d = world.start(PEER_D);
    assert!(main.get_service(D_GREETER).expect("valid").is_none());
}

#[test]
fn peer_without_core_is_unavailable() {
    let world = World::new();
    let _d = world.start(PEER_D);
    let main = world.start(MAIN);
    assert!(main.get_service(D_GREETER).expect("valid").is_none());
}

#[test]
fn root_registry_forwards_to_peers() {
    let world = World::new();
    let core = world.start(CORE);
    let _d = world.start_peer(PEER_D);

    let root = core.root_registry().expect("core hosts the registry");
    let handle = root
        .get_core_service(&ServiceId::Num(D_GREETER))
        .expect("valid")
        .expect("forwarded");
    let forwarded = GreeterClient::from_binder(handle);
    assert_eq!(forwarded.greet("root").expect("greet"), "hello root from com.example:d");

    // The core process itself resolves peer services the same way.
    let via_manager = greeter(&core, D_GREETER);
    assert_eq!(via_manager.greet("core").expect("greet"), "hello core from com.example:d");
}

#[test]
fn peer_manager_rejects_services_it_does_not_implement() {
    let world = World::new();
    let _core = world.start(CORE);
    let _d = world.start_peer(PEER_D);
    let main = world.start(MAIN);

    let manager = main
        .get_other_service_manager(PEER_D)
        .expect("d registered");
    assert!(manager
        .get_service(&ServiceId::Num(D_GREETER))
        .expect("implemented in d")
        .is_some());

    // Not installed at all.
    assert!(matches!(
        manager.get_service(&ServiceId::Num(42)),
        Err(Error::Transport(TransportError::Remote(_)))
    ));
    // Installed, but implemented in the core process.
    match manager.get_service(&ServiceId::Num(CORE_GREETER)) {
        Err(Error::Transport(TransportError::Remote(message))) => {
            assert!(message.contains("com.example:core"), "{message}");
        }
        other => panic!("unexpected {:?}", other.map(|h| h.is_some())),
    }
}

#[test]
fn peer_death_evicts_and_unregisters() {
    let world = World::new();
    let core = world.start(CORE);
    let _d = world.start_peer(PEER_D);
    let main = world.start(MAIN);

    let held = greeter(&main, D_GREETER);
    let before = held.instance().expect("instance");
    let service_key = CacheKey::Service(ServiceId::Num(D_GREETER));
    let process_key = CacheKey::Process(PEER_D.to_string());
    assert!(main.cache().contains(&service_key));
    assert!(main.cache().contains(&process_key));

    world.kill(PEER_D);

    assert!(!main.cache().contains(&service_key));
    assert!(!main.cache().contains(&process_key));
    let root = core.root_registry().expect("core hosts the registry");
    assert_eq!(root.registered_processes(), vec![MAIN.to_string()]);
    assert!(root.get_other_manager(PEER_D).expect("lookup").is_none());
    assert!(held.greet("gone").is_err());
    assert!(main.get_service(D_GREETER).expect("valid").is_none());

    let _d = world.start_peer(PEER_D);
    let fresh = main
        .get::<GreeterClient>(D_GREETER)
        .expect("valid")
        .expect("available again");
    assert_ne!(fresh.instance().expect("instance"), before);
    assert_eq!(world.created(D_GREETER), 2);
}

#[test]
fn dead_peer_manager_is_not_cached_before_its_death_is_delivered() {
    for _ in 0..50 {
        let world = World::new();
        let _core = world.start(CORE);
        let _d = world.start_peer(PEER_D);
        let main = world.start(MAIN);

        // No flush: the registry may still list the dead manager.
        assert!(world.fabric.kill(PEER_D));
        assert!(main.get_other_service_manager(PEER_D).is_none());
        assert!(!main.cache().contains(&CacheKey::Process(PEER_D.to_string())));
        assert!(main.get_service(D_GREETER).expect("valid").is_none());
        assert!(main.cache().is_empty());
        world.fabric.flush_notifications();
    }
}

#[test]
fn reconnecting_keeps_one_registration() {
    let world = World::new();
    let core = world.start(CORE);
    let d = world.start_peer(PEER_D);
    let root = core.root_registry().expect("core hosts the registry");
    let first = root.get_other_manager(PEER_D).expect("lookup").expect("registered");

    // Reconnecting installs the same handle again; that is a no-op.
    d.shutdown();
    d.core().registry().expect("reconnect");
    let second = root.get_other_manager(PEER_D).expect("lookup").expect("registered");
    assert!(svclink::ipc::same_handle(&first, &second));
    assert_eq!(root.registered_processes(), vec![PEER_D.to_string()]);
}

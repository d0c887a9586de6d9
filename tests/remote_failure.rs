mod common;

use common::*;
use svclink::{Error, TransportError};

#[test]
fn panicking_service_fails_only_that_call() {
    let world = World::new();
    let _core = world.start(CORE);
    let main = world.start(MAIN);
    let greeter = greeter(&main, CORE_GREETER);

    match greeter.explode() {
        Err(Error::Transport(TransportError::Failed(message))) => {
            assert!(message.contains("exploded"), "{message}");
        }
        other => panic!("unexpected {other:?}"),
    }

    // Neither the caller nor the core process went down.
    assert!(world.fabric.is_running(CORE));
    assert_eq!(greeter.greet("still").expect("greet"), "hello still from com.example:core");
    assert!(main.get_service(CORE_GREETER).expect("valid").is_some());
}

#[test]
fn service_errors_surface_as_remote_errors() {
    let world = World::new();
    let _core = world.start(CORE);
    let _d = world.start_peer(PEER_D);
    let main = world.start(MAIN);

    for id in [CORE_GREETER, D_GREETER] {
        let greeter = greeter(&main, id);
        match greeter.reject() {
            Err(Error::Transport(TransportError::Remote(message))) => {
                assert!(message.contains("rejected"), "{message}");
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}

#[test]
fn local_panics_are_contained_too() {
    let world = World::new();
    let main = world.start(MAIN);
    let greeter = greeter(&main, MAIN_GREETER);

    assert!(matches!(
        greeter.explode(),
        Err(Error::Transport(TransportError::Failed(_)))
    ));
    assert!(greeter.greet("after").is_ok());
}

#[test]
fn failed_resolution_is_not_cached() {
    let world = World::new();
    let main = world.start(MAIN);

    for _ in 0..3 {
        assert!(main.get_service(CORE_GREETER).expect("valid").is_none());
    }
    assert!(main.cache().is_empty());
    assert_eq!(world.fabric.discovery_calls(), 3);
}

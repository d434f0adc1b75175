//! Behaviour-driven tests for the embedded server lifecycle.

use std::sync::Arc;

use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};

use super::{FakeInstall, FileConnector, FileStore, READY_SCRIPT, file_server};
use crate::client::DocumentStore;
use crate::error::EmbeddedError;
use crate::server::EmbeddedServer;

// ---------------------------------------------------------------------------
// Test world
// ---------------------------------------------------------------------------

#[derive(Default)]
struct TestWorld {
    server: Option<EmbeddedServer<FileConnector>>,
    install: Option<FakeInstall>,
    stores: Vec<Result<Arc<FileStore>, EmbeddedError>>,
    start_outcome: Option<Result<(), EmbeddedError>>,
}

#[fixture]
fn world() -> TestWorld {
    TestWorld::default()
}

fn server(world: &TestWorld) -> &EmbeddedServer<FileConnector> {
    world.server.as_ref().expect("no embedded server")
}

fn opened_stores(world: &TestWorld) -> Vec<&Arc<FileStore>> {
    world
        .stores
        .iter()
        .map(|outcome| outcome.as_ref().expect("expected store request to succeed"))
        .collect()
}

// ---------------------------------------------------------------------------
// Given steps
// ---------------------------------------------------------------------------

#[given("an embedded server that has not been started")]
fn given_idle_server(world: &mut TestWorld) {
    world.server = Some(file_server());
}

#[given("a running embedded server")]
fn given_running_server(world: &mut TestWorld) {
    let install = FakeInstall::new(READY_SCRIPT);
    let embedded = file_server();
    embedded.start(&install.options()).expect("start server");
    world.install = Some(install);
    world.server = Some(embedded);
}

// ---------------------------------------------------------------------------
// When steps
// ---------------------------------------------------------------------------

#[when("a store is requested for {name}")]
fn when_store_requested(world: &mut TestWorld, name: String) {
    let outcome = server(world).get_store(name.trim_matches('"'));
    world.stores.push(outcome);
}

#[when("the server is started again")]
fn when_started_again(world: &mut TestWorld) {
    let options = world.install.as_ref().expect("no install").options();
    let outcome = server(world).start(&options);
    world.start_outcome = Some(outcome);
}

#[when("the server is closed")]
fn when_closed(world: &mut TestWorld) {
    server(world).close();
}

// ---------------------------------------------------------------------------
// Then steps
// ---------------------------------------------------------------------------

#[then("the request fails because the server is not started")]
fn then_not_started(world: &mut TestWorld) {
    assert!(matches!(
        world.stores.last(),
        Some(Err(EmbeddedError::NotStarted))
    ));
}

#[then("the start fails because the server already started")]
fn then_already_started(world: &mut TestWorld) {
    assert!(matches!(
        world.start_outcome,
        Some(Err(EmbeddedError::AlreadyStarted))
    ));
}

#[then("the connector opened {count} store")]
fn then_connects(world: &mut TestWorld, count: usize) {
    assert_eq!(server(world).connector().connects(), count);
}

#[then("every request received the same store")]
fn then_same_store(world: &mut TestWorld) {
    let stores = opened_stores(world);
    let first = stores.first().expect("at least one store");
    assert!(stores.iter().all(|store| Arc::ptr_eq(store, first)));
}

#[then("the server stopped gracefully")]
fn then_stopped(world: &mut TestWorld) {
    assert!(
        world
            .install
            .as_ref()
            .expect("no install")
            .stopped_gracefully()
    );
}

#[then("every cached store is closed")]
fn then_stores_closed(world: &mut TestWorld) {
    assert!(opened_stores(world).iter().all(|store| store.is_closed()));
}

// ---------------------------------------------------------------------------
// Scenario registration
// ---------------------------------------------------------------------------

#[scenario(
    path = "tests/features/embedded_lifecycle.feature",
    name = "Stores cannot be requested before the server starts"
)]
fn use_before_start(world: TestWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/embedded_lifecycle.feature",
    name = "Starting a running server is rejected"
)]
fn double_start(world: TestWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/embedded_lifecycle.feature",
    name = "Repeated requests share one store"
)]
fn shared_store(world: TestWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/embedded_lifecycle.feature",
    name = "Closing stops the server and its stores"
)]
fn close_stops_everything(world: TestWorld) {
    let _ = world;
}

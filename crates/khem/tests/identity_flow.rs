//! End-to-end behavior of the identity flow against real stores.

use std::sync::Arc;

use khem::storage::DEFAULT_BUSY_TIMEOUT;
use khem::{
    Identity, IdentityController, KeyValueStore, MemoryStore, Notification, Phase, SaveOutcome,
    SqliteStore, ValidationError, USERNAME_KEY,
};
use proptest::prelude::*;
use tokio::sync::mpsc::{self, UnboundedReceiver};

async fn session(
    store: Arc<dyn KeyValueStore>,
) -> (IdentityController, UnboundedReceiver<Notification>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let controller = IdentityController::new(store).with_notifications(tx);
    controller.initialize().await;
    (controller, rx)
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("failed to build runtime")
}

proptest! {
    #[test]
    fn blank_names_never_reach_the_store(input in "[ \t\n\r\u{a0}\u{2003}]{0,16}") {
        let store = Arc::new(MemoryStore::new());
        let (outcome, notification) = runtime().block_on(async {
            let (controller, mut rx) = session(store.clone()).await;
            controller.on_change(input.clone());
            (controller.submit().await, rx.try_recv().ok())
        });

        prop_assert_eq!(outcome, SaveOutcome::Invalid(ValidationError::Empty));
        prop_assert!(store.writes().is_empty());
        prop_assert_eq!(notification, Some(Notification::ValidationFailed));
    }

    #[test]
    fn valid_names_are_written_once_trimmed(input in "[ \t]{0,4}[A-Za-z0-9][A-Za-z0-9 '-]{0,30}[ \t]{0,4}") {
        let store = Arc::new(MemoryStore::new());
        let outcome = runtime().block_on(async {
            let (controller, _rx) = session(store.clone()).await;
            controller.on_change(input.clone());
            controller.submit().await
        });

        let trimmed = input.trim().to_string();
        prop_assert!(outcome.is_saved());
        prop_assert_eq!(store.writes(), vec![(USERNAME_KEY.to_string(), trimmed)]);
    }
}

#[tokio::test]
async fn saved_name_seeds_the_next_session() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("khem.db");

    {
        let store = Arc::new(SqliteStore::open(&path, DEFAULT_BUSY_TIMEOUT).unwrap());
        let (controller, _rx) = session(store.clone()).await;
        assert_eq!(controller.buffer(), "");
        controller.on_change("Rami");
        assert!(controller.submit().await.is_saved());
    }

    let store = Arc::new(SqliteStore::open(&path, DEFAULT_BUSY_TIMEOUT).unwrap());
    assert_eq!(
        store.get(USERNAME_KEY).await.unwrap(),
        Some("Rami".to_string())
    );
    let (controller, _rx) = session(store).await;
    assert_eq!(controller.buffer(), "Rami");
}

#[tokio::test]
async fn saving_twice_repeats_the_same_write() {
    let store = Arc::new(MemoryStore::new());
    let (controller, mut rx) = session(store.clone()).await;
    controller.on_change("Rami");

    let first = controller.submit().await;
    let second = controller.submit().await;

    assert_eq!(first, second);
    let write = (USERNAME_KEY.to_string(), "Rami".to_string());
    assert_eq!(store.writes(), vec![write.clone(), write]);
    let expected = Notification::SaveSucceeded(Identity::parse("Rami").unwrap());
    assert_eq!(rx.try_recv().unwrap(), expected);
    assert_eq!(rx.try_recv().unwrap(), expected);
}

#[tokio::test]
async fn unreadable_store_starts_with_empty_buffer() {
    let store = Arc::new(MemoryStore::with_entry(USERNAME_KEY, "Rami"));
    store.set_fail_reads(true);

    let (controller, mut rx) = session(store.clone()).await;

    assert_eq!(controller.phase(), Phase::Ready);
    assert_eq!(controller.buffer(), "");
    assert!(rx.try_recv().is_err());

    // The user can still type and save a new name.
    controller.on_change("Khem Walker");
    assert!(controller.submit().await.is_saved());
    assert_eq!(store.value(USERNAME_KEY), Some("Khem Walker".to_string()));
}

#[tokio::test]
async fn padded_name_is_saved_trimmed() {
    let store = Arc::new(MemoryStore::new());
    let (controller, mut rx) = session(store.clone()).await;
    controller.on_change("  Khem Walker  ");

    controller.submit().await;

    assert_eq!(
        store.writes(),
        vec![(USERNAME_KEY.to_string(), "Khem Walker".to_string())]
    );
    assert_eq!(
        rx.try_recv().unwrap().to_string(),
        "Username saved: Khem Walker"
    );
}

#[tokio::test]
async fn whitespace_name_is_rejected() {
    let store = Arc::new(MemoryStore::new());
    let (controller, mut rx) = session(store.clone()).await;
    controller.on_change("   ");

    controller.submit().await;

    assert!(store.writes().is_empty());
    assert_eq!(
        rx.try_recv().unwrap().to_string(),
        "Please enter a valid username."
    );
}

#[tokio::test]
async fn write_failure_keeps_buffer_and_reports() {
    let store = Arc::new(MemoryStore::new());
    store.set_fail_writes(true);

    let (controller, mut rx) = session(store.clone()).await;
    controller.on_change(" Rami ");
    let outcome = controller.submit().await;

    assert!(matches!(outcome, SaveOutcome::Failed(_)));
    assert_eq!(controller.phase(), Phase::Ready);
    assert_eq!(controller.buffer(), " Rami ");
    assert_eq!(
        rx.try_recv().unwrap().to_string(),
        "Could not save username. Please try again."
    );
    assert_eq!(store.value(USERNAME_KEY), None);
}

#[tokio::test]
async fn byte_order_mark_alone_is_rejected() {
    let store = Arc::new(MemoryStore::new());
    let (controller, mut rx) = session(store.clone()).await;
    controller.on_change("\u{feff} \u{feff}");

    assert_eq!(
        controller.submit().await,
        SaveOutcome::Invalid(ValidationError::Empty)
    );
    assert!(store.writes().is_empty());
    assert_eq!(
        rx.try_recv().unwrap().to_string(),
        "Please enter a valid username."
    );
}

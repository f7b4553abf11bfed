//! The unsubscribe side channel driven through the real axum router.

use std::sync::{Arc, Mutex};

use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::{TimeZone, Utc};
use tower::ServiceExt;

use keywatch_core::adapters::memory::MemoryStore;
use keywatch_core::adapters::mock::{MockMailer, MockTimeSource};
use keywatch_core::domain::entities::UserStatus;
use keywatch_core::domain::value_objects::{EmailAddress, PhoneNumber, RegistrationMessage};
use keywatch_core::ports::outbound::Storage;
use keywatch_core::service::{Scheduler, SignupProcessor};
use keywatch_gateway::router;

/// Registers one subscriber and returns the shared store plus the minted
/// unsubscribe token, the way the daemon wires the gateway.
fn registered_store() -> (Arc<Mutex<MemoryStore>>, String) {
    let mut store = MemoryStore::new();
    let signup = SignupProcessor::new(
        MockTimeSource::new(Utc.timestamp_opt(1_000_000, 0).unwrap()),
        60,
        "http://keywatch.example.com/",
    )
    .unwrap();

    let outcome = signup
        .register(
            &mut store,
            &MockMailer::new(),
            &RegistrationMessage {
                phone_number: PhoneNumber::new("+15555550100").unwrap(),
                email: EmailAddress::new("a@example.com").unwrap(),
            },
        )
        .unwrap();

    let token = outcome.email.unsubscribe_token.clone();
    (Arc::new(Mutex::new(store)), token)
}

async fn get(store: Arc<Mutex<MemoryStore>>, uri: &str) -> StatusCode {
    router(store)
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap()
        .status()
}

#[tokio::test]
async fn test_welcome_link_token_deactivates_the_account() {
    let (store, token) = registered_store();

    let status = get(Arc::clone(&store), &format!("/?t={token}")).await;
    assert_eq!(status, StatusCode::OK);

    let mut guard = store.lock().unwrap();
    let email = guard.email_by_token(&token).unwrap().unwrap();
    assert_eq!(
        guard.user(email.user_id).unwrap().unwrap().status,
        UserStatus::Deactivated
    );

    // The active-user sweep no longer selects this account.
    let scheduler = Scheduler::new(
        MockTimeSource::new(Utc.timestamp_opt(2_000_000, 0).unwrap()),
        60,
    )
    .unwrap();
    assert!(scheduler.run(&mut *guard).unwrap().is_empty());
}

#[tokio::test]
async fn test_clicking_the_link_twice_stays_successful() {
    let (store, token) = registered_store();

    assert_eq!(
        get(Arc::clone(&store), &format!("/?t={token}")).await,
        StatusCode::OK
    );
    assert_eq!(
        get(Arc::clone(&store), &format!("/?t={token}")).await,
        StatusCode::OK
    );
}

#[tokio::test]
async fn test_guessing_tokens_never_mutates_state() {
    let (store, token) = registered_store();

    assert_eq!(
        get(Arc::clone(&store), "/?t=1700000000AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA").await,
        StatusCode::BAD_REQUEST
    );

    let guard = store.lock().unwrap();
    let email = guard.email_by_token(&token).unwrap().unwrap();
    assert!(guard.user(email.user_id).unwrap().unwrap().is_active());
}

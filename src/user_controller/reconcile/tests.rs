use super::*;
use crate::testing::{FakeClient, Verb, Write, conflict, not_found, unavailable};

fn user(ns: &str, name: &str, id: i64, username: &str, password: &str) -> User {
    let mut user = User::new(
        name,
        UserSpec {
            id,
            username: username.into(),
            password: password.into(),
        },
    );
    user.metadata.namespace = Some(ns.into());
    user
}

fn reconciler(client: &FakeClient) -> UserReconciler<FakeClient> {
    UserReconciler::new(client.clone(), CancellationToken::new())
}

fn payload(client: &FakeClient, key: &ObjectKey) -> BTreeMap<String, String> {
    client
        .object::<Secret>(key)
        .and_then(|s| s.string_data)
        .expect("secret with stringData")
}

fn expected(id: &str, username: &str, password: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        ("id".to_string(), id.to_string()),
        ("username".to_string(), username.to_string()),
        ("password".to_string(), password.to_string()),
    ])
}

#[test]
fn projection_copies_fields_verbatim() {
    let spec = UserSpec {
        id: -42,
        username: " Mixed Case ".into(),
        password: "p@ss\n".into(),
    };
    assert_eq!(string_data(&spec), expected("-42", " Mixed Case ", "p@ss\n"));
}

#[test]
fn projection_keeps_the_user_key() {
    let key = ObjectKey::new("ops", "bob");
    let secret = secret_for(
        &key,
        &UserSpec {
            id: 12,
            ..UserSpec::default()
        },
    );
    assert_eq!(secret.metadata.namespace.as_deref(), Some("ops"));
    assert_eq!(secret.metadata.name.as_deref(), Some("bob"));
    assert_eq!(secret.metadata.resource_version, None);
    assert_eq!(secret.data, None);
}

#[tokio::test]
async fn creates_secret_and_deletes_user() {
    let client = FakeClient::new();
    client.insert(user("default", "alice", 7, "alice", "s")).unwrap();
    let key = ObjectKey::new("default", "alice");

    let outcome = reconciler(&client).reconcile(&key).await.unwrap();

    assert_eq!(outcome, Outcome::SecretCreated);
    assert_eq!(outcome.action(), Action::await_change());
    assert_eq!(payload(&client, &key), expected("7", "alice", "s"));
    assert!(!client.contains::<User>(&key));
}

#[tokio::test]
async fn refreshes_stale_secret() {
    let client = FakeClient::new();
    client.insert(user("ops", "bob", 12, "bob", "p2")).unwrap();
    let key = ObjectKey::new("ops", "bob");
    let mut stale = secret_for(
        &key,
        &UserSpec {
            id: 1,
            username: "old".into(),
            password: "old".into(),
        },
    );
    stale.metadata.labels = Some(BTreeMap::from([("team".into(), "ops".into())]));
    client.insert(stale).unwrap();

    let outcome = reconciler(&client).reconcile(&key).await.unwrap();

    assert_eq!(outcome, Outcome::SecretUpdated);
    assert_eq!(payload(&client, &key), expected("12", "bob", "p2"));
    assert!(!client.contains::<User>(&key));
    assert_eq!(
        client.writes(),
        vec![
            Write {
                verb: Verb::Replace,
                kind: "Secret".into(),
                key: key.clone(),
            },
            Write {
                verb: Verb::Delete,
                kind: "User".into(),
                key: key.clone(),
            },
        ]
    );
}

#[tokio::test]
async fn missing_user_is_terminal_without_writes() {
    let client = FakeClient::new();
    let key = ObjectKey::new("default", "ghost");

    let outcome = reconciler(&client).reconcile(&key).await.unwrap();

    assert_eq!(outcome, Outcome::UserAbsent);
    assert_eq!(outcome.action(), Action::await_change());
    assert!(client.writes().is_empty());
}

#[tokio::test]
async fn user_read_failure_is_returned_for_requeue() {
    let client = FakeClient::new();
    client.insert(user("default", "alice", 7, "alice", "s")).unwrap();
    client.fail_next::<User>(Verb::Get, unavailable());
    let key = ObjectKey::new("default", "alice");

    let err = reconciler(&client).reconcile(&key).await.unwrap_err();

    assert_eq!(err.kind(), crate::ErrorKind::Transient);
    assert!(err.requeue());
    assert!(client.writes().is_empty());
    assert!(client.contains::<User>(&key));
}

#[tokio::test]
async fn secret_read_failure_skips_projection() {
    let client = FakeClient::new();
    client.insert(user("default", "alice", 7, "alice", "s")).unwrap();
    client.fail_next::<Secret>(Verb::Get, unavailable());
    let key = ObjectKey::new("default", "alice");

    let err = reconciler(&client).reconcile(&key).await.unwrap_err();

    assert!(err.requeue());
    assert!(client.writes().is_empty());
    assert!(!client.contains::<Secret>(&key));
}

#[tokio::test]
async fn user_vanishing_before_delete_is_swallowed() {
    let client = FakeClient::new();
    client.insert(user("default", "alice", 7, "alice", "s")).unwrap();
    let key = ObjectKey::new("default", "alice");
    client.fail_next::<User>(Verb::Delete, not_found("User", &key));

    let outcome = reconciler(&client).reconcile(&key).await.unwrap();

    assert_eq!(outcome, Outcome::SecretCreated);
    assert_eq!(payload(&client, &key), expected("7", "alice", "s"));
}

#[tokio::test]
async fn delete_failure_is_returned() {
    let client = FakeClient::new();
    client.insert(user("default", "alice", 7, "alice", "s")).unwrap();
    let key = ObjectKey::new("default", "alice");
    client.fail_next::<User>(Verb::Delete, unavailable());

    let err = reconciler(&client).reconcile(&key).await.unwrap_err();
    assert!(err.requeue());
    assert!(client.contains::<User>(&key));

    // the retry finds the secret and refreshes it before deleting the user
    let outcome = reconciler(&client).reconcile(&key).await.unwrap();
    assert_eq!(outcome, Outcome::SecretUpdated);
    assert!(!client.contains::<User>(&key));
}

#[tokio::test]
async fn create_conflict_is_retryable() {
    let client = FakeClient::new();
    client.insert(user("default", "alice", 7, "alice", "s")).unwrap();
    let key = ObjectKey::new("default", "alice");
    client.fail_next::<Secret>(Verb::Create, conflict("Secret", &key));

    let err = reconciler(&client).reconcile(&key).await.unwrap_err();

    assert_eq!(err.kind(), crate::ErrorKind::Transient);
    assert!(client.contains::<User>(&key));
}

#[tokio::test]
async fn update_conflict_is_retryable_and_converges() {
    let client = FakeClient::new();
    client.insert(user("ops", "bob", 12, "bob", "p2")).unwrap();
    let key = ObjectKey::new("ops", "bob");
    client.insert(secret_for(&key, &UserSpec::default())).unwrap();
    client.fail_next::<Secret>(Verb::Replace, conflict("Secret", &key));

    let err = reconciler(&client).reconcile(&key).await.unwrap_err();
    assert!(is_conflict(&err));
    assert!(client.contains::<User>(&key));

    let outcome = reconciler(&client).reconcile(&key).await.unwrap();
    assert_eq!(outcome, Outcome::SecretUpdated);
    assert_eq!(payload(&client, &key), expected("12", "bob", "p2"));
}

#[tokio::test]
async fn repeated_reconciles_converge_to_the_same_state() {
    let client = FakeClient::new();
    client.insert(user("default", "alice", 7, "alice", "s")).unwrap();
    let key = ObjectKey::new("default", "alice");
    let reconciler = reconciler(&client);

    assert_eq!(reconciler.reconcile(&key).await.unwrap(), Outcome::SecretCreated);
    let after_first = client.object::<Secret>(&key);
    let writes = client.writes().len();

    // a coalesced or redelivered request after deletion is a no-op
    assert_eq!(reconciler.reconcile(&key).await.unwrap(), Outcome::UserAbsent);
    assert_eq!(reconciler.reconcile(&key).await.unwrap(), Outcome::UserAbsent);
    assert_eq!(client.object::<Secret>(&key), after_first);
    assert_eq!(client.writes().len(), writes);
}

#[tokio::test]
async fn keys_do_not_interfere() {
    let client = FakeClient::new();
    client.insert(user("a", "same", 1, "first", "x")).unwrap();
    client.insert(user("b", "same", 2, "second", "y")).unwrap();
    let reconciler = reconciler(&client);

    reconciler.reconcile(&ObjectKey::new("a", "same")).await.unwrap();

    assert_eq!(
        payload(&client, &ObjectKey::new("a", "same")),
        expected("1", "first", "x")
    );
    assert!(!client.contains::<Secret>(&ObjectKey::new("b", "same")));
    assert!(client.contains::<User>(&ObjectKey::new("b", "same")));
}

#[tokio::test]
async fn cancelled_reconcile_writes_nothing() {
    let client = FakeClient::new();
    client.insert(user("default", "alice", 7, "alice", "s")).unwrap();
    let shutdown = CancellationToken::new();
    shutdown.cancel();
    let reconciler = UserReconciler::new(client.clone(), shutdown);

    let err = reconciler
        .reconcile(&ObjectKey::new("default", "alice"))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Cancelled));
    assert!(!err.requeue());
    assert!(client.writes().is_empty());
}

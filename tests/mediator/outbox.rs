//! Outbox hand-off: published events land in the outbox and a relay moves
//! them on.

use std::sync::{Arc, Mutex};

use structus::outbox::{InMemoryOutbox, LogPublisher, OutboxRecorder, OutboxRelay, OutboxStatus};

use crate::support::{bank, AccountOpened, OpenAccount, OpenFlaggedAccount};

#[tokio::test]
async fn committed_events_are_relayed_from_the_outbox() {
    let bank = bank();
    let outbox = InMemoryOutbox::new();
    bank.registry().subscribe_all(OutboxRecorder::new(outbox.clone()));

    bank.mediator.send(OpenAccount::new("acc-1", "ada")).await.unwrap();

    let pending = outbox.with_status(OutboxStatus::Pending).unwrap();
    let types: Vec<&str> = pending.iter().map(|m| m.event_type.as_str()).collect();
    assert_eq!(types, vec!["account.opened", "account.welcome_email_queued"]);
    assert_eq!(pending[0].aggregate_id.as_deref(), Some("acc-1"));

    let opened: AccountOpened = pending[0].decode().unwrap();
    assert_eq!(opened.account_id, "acc-1");
    assert_eq!(opened.owner, "ada");

    let lines = Arc::new(Mutex::new(Vec::new()));
    let relay = OutboxRelay::new(LogPublisher::with_buffer(lines.clone()));
    let result = relay.relay(&outbox).await.unwrap();

    assert_eq!(result.claimed, 2);
    assert_eq!(result.completed, 2);
    assert!(outbox.with_status(OutboxStatus::Pending).unwrap().is_empty());
    assert_eq!(outbox.with_status(OutboxStatus::Published).unwrap().len(), 2);

    let lines = lines.lock().unwrap();
    assert!(lines[0].starts_with("[OUTBOX] account.opened "));
    assert!(lines[1].starts_with("[OUTBOX] account.welcome_email_queued "));
}

#[tokio::test]
async fn failed_command_leaves_the_outbox_empty() {
    let bank = bank();
    let outbox = InMemoryOutbox::new();
    bank.registry().subscribe_all(OutboxRecorder::new(outbox.clone()));

    bank.mediator
        .send(OpenFlaggedAccount { id: "acc-x".into() })
        .await
        .unwrap_err();

    assert!(outbox.is_empty());
}

//! Event publication: subscriber order, failure isolation, and the command
//! result staying untouched by subscriber failures.

use std::sync::Arc;

use structus::{
    async_trait, EventHandler, EventMetadata, HandlerError, Mediator, PublishMode,
};

use crate::support::{
    bank, bank_with, AccountOpened, BrokenMailer, Deposit, OpenAccount, PanickingAudit, Tally,
    WelcomeEmailQueued,
};

#[tokio::test]
async fn open_account_publishes_both_events_in_recording_order() {
    let bank = bank();
    bank.registry().subscribe::<WelcomeEmailQueued, _>(BrokenMailer);

    let outcome = bank
        .mediator
        .send_with_report(OpenAccount::new("acc-1", "ada"))
        .await
        .unwrap();

    assert_eq!(outcome.output, "acc-1");
    assert_eq!(
        bank.log.entries(),
        vec![
            "account.opened@acc-1",
            "account.welcome_email_queued@acc-1"
        ]
    );
    assert_eq!(outcome.publication.published, 2);
    assert_eq!(
        outcome.publication.failed_event_types(),
        vec!["account.welcome_email_queued"]
    );
    assert_eq!(
        outcome.publication.failures[0].failed_subscribers(),
        vec!["mailer"]
    );
    assert!(bank.store.balance("acc-1").is_some());
}

#[tokio::test]
async fn failing_subscriber_does_not_fail_send() {
    let bank = bank();
    bank.registry().subscribe::<WelcomeEmailQueued, _>(BrokenMailer);

    let id = bank.mediator.send(OpenAccount::new("acc-1", "ada")).await;
    assert_eq!(id.unwrap(), "acc-1");
}

#[tokio::test]
async fn one_failing_subscriber_among_three_runs_the_other_two() {
    let bank = bank();
    let first = Tally::new("first");
    let last = Tally::new("last");
    bank.registry().subscribe::<WelcomeEmailQueued, _>(first.clone());
    bank.registry().subscribe::<WelcomeEmailQueued, _>(BrokenMailer);
    bank.registry().subscribe::<WelcomeEmailQueued, _>(last.clone());

    let outcome = bank
        .mediator
        .send_with_report(OpenAccount::new("acc-1", "ada"))
        .await
        .unwrap();

    assert_eq!(first.hits(), 1);
    assert_eq!(last.hits(), 1);
    assert_eq!(outcome.publication.failures.len(), 1);
    assert_eq!(outcome.output, "acc-1");
}

#[tokio::test]
async fn panicking_subscriber_is_contained() {
    let bank = bank();
    let after = Tally::new("after");
    bank.registry().subscribe::<AccountOpened, _>(PanickingAudit);
    bank.registry().subscribe::<AccountOpened, _>(after.clone());

    let outcome = bank
        .mediator
        .send_with_report(OpenAccount::new("acc-1", "ada"))
        .await
        .unwrap();

    assert_eq!(after.hits(), 1);
    let failure = &outcome.publication.failures[0].failures[0];
    assert_eq!(failure.subscriber, "audit");
    assert!(matches!(
        &failure.error,
        HandlerError::Panicked(message) if message.contains("audit trail corrupted for acc-1")
    ));
    assert_eq!(bank.log.types().len(), 2);
}

#[tokio::test]
async fn concurrent_mode_keeps_failure_isolation() {
    let bank = bank_with(Mediator::builder().publish_mode(PublishMode::Concurrent));
    let tally = Tally::new("tally");
    bank.registry().subscribe::<WelcomeEmailQueued, _>(BrokenMailer);
    bank.registry().subscribe::<WelcomeEmailQueued, _>(tally.clone());
    bank.registry().subscribe::<AccountOpened, _>(PanickingAudit);

    let outcome = bank
        .mediator
        .send_with_report(OpenAccount::new("acc-1", "ada"))
        .await
        .unwrap();

    assert_eq!(bank.mediator.publish_mode(), PublishMode::Concurrent);
    assert_eq!(tally.hits(), 1);
    assert_eq!(
        outcome.publication.failed_event_types(),
        vec!["account.opened", "account.welcome_email_queued"]
    );
    assert_eq!(
        bank.log.types(),
        vec!["account.opened", "account.welcome_email_queued"]
    );
}

#[tokio::test]
async fn direct_publish_reports_aggregated_failure() {
    let bank = bank();
    let tally = Tally::new("tally");
    bank.registry().subscribe::<WelcomeEmailQueued, _>(BrokenMailer);
    bank.registry().subscribe::<WelcomeEmailQueued, _>(tally.clone());

    let event = WelcomeEmailQueued {
        metadata: EventMetadata::for_aggregate("acc-9"),
        account_id: "acc-9".into(),
        email: "ada@example.com".into(),
    };
    let err = bank.mediator.publish(&event).await.unwrap_err();

    assert_eq!(err.event_type, "account.welcome_email_queued");
    assert_eq!(err.failed_subscribers(), vec!["mailer"]);
    assert!(err.to_string().contains("mailer (rejected: smtp unavailable)"));
    assert_eq!(tally.hits(), 1);
    assert_eq!(bank.log.entries(), vec!["account.welcome_email_queued@acc-9"]);
}

#[tokio::test]
async fn event_without_subscribers_is_a_no_op() {
    let mediator = Mediator::new(Arc::default());
    let event = AccountOpened {
        metadata: EventMetadata::new(),
        account_id: "acc-1".into(),
        owner: "ada".into(),
    };

    assert!(mediator.publish(&event).await.is_ok());
}

#[tokio::test]
async fn unsubscribed_handler_stops_receiving() {
    let bank = bank();
    let tally = Tally::new("tally");
    let id = bank.registry().subscribe::<AccountOpened, _>(tally.clone());

    bank.open("acc-1", "ada").await;
    assert!(bank.registry().unsubscribe(id));
    bank.open("acc-2", "grace").await;

    assert_eq!(tally.hits(), 1);
    assert_eq!(bank.registry().subscriber_count::<AccountOpened>(), 0);
}

/// Credits every new account with a welcome bonus by sending a command of
/// its own.
struct WelcomeBonus {
    mediator: Mediator,
}

#[async_trait]
impl EventHandler<AccountOpened> for WelcomeBonus {
    async fn handle(&self, event: &AccountOpened) -> Result<(), HandlerError> {
        self.mediator
            .send(Deposit::new(&event.account_id, 10))
            .await
            .map(|_| ())
            .map_err(HandlerError::other)
    }
}

#[tokio::test]
async fn subscriber_may_dispatch_a_nested_command() {
    let bank = bank();
    bank.registry().subscribe::<AccountOpened, _>(WelcomeBonus {
        mediator: bank.mediator.clone(),
    });

    let outcome = bank
        .mediator
        .send_with_report(OpenAccount::new("acc-1", "ada"))
        .await
        .unwrap();

    assert!(outcome.publication.is_clean());
    assert_eq!(bank.store.balance("acc-1"), Some(10));
    // The bonus is published by its own command, while the opening event is
    // still being delivered.
    assert_eq!(
        bank.log.types(),
        vec![
            "account.deposited",
            "account.opened",
            "account.welcome_email_queued"
        ]
    );
}

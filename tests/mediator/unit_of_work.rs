//! Unit of work: touch-order publication, atomicity on failure, exactly-once
//! publication across clones and retries, and explicit tracking outside the
//! dispatch task.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use structus::{
    async_trait, AggregateRoot, Command, CommandHandler, EventHandler, HandlerError, Mediator,
    Next, PipelineBehavior, PipelineContext, Response, UnitOfWork, UnitOfWorkState,
};

use crate::support::{
    bank, bank_with, Account, AccountStore, Bank, Deposit, Deposited, OpenAccount,
    OpenFlaggedAccount, Transfer,
};

/// Keeps the amount of every published deposit.
#[derive(Clone, Default)]
struct DepositAmounts(Arc<Mutex<Vec<i64>>>);

impl DepositAmounts {
    fn amounts(&self) -> Vec<i64> {
        self.0.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventHandler<Deposited> for DepositAmounts {
    async fn handle(&self, event: &Deposited) -> Result<(), HandlerError> {
        self.0.lock().unwrap().push(event.amount);
        Ok(())
    }
}

/// Deposits into `second`, then `first`, then `second` again, all on loaded
/// instances held for the whole command.
struct Interleave {
    first: String,
    second: String,
}

impl Command for Interleave {
    type Output = ();
}

struct InterleaveHandler {
    store: AccountStore,
}

#[async_trait]
impl CommandHandler for InterleaveHandler {
    type Command = Interleave;

    async fn handle(&self, command: &Interleave, _: &UnitOfWork) -> Result<(), HandlerError> {
        let mut second = self.store.load(&command.second)?;
        let mut first = self.store.load(&command.first)?;

        second.deposit(1)?;
        first.deposit(2)?;
        second.deposit(3)?;

        self.store.save(&first);
        self.store.save(&second);
        Ok(())
    }
}

#[tokio::test]
async fn events_follow_first_touch_order_across_aggregates() {
    let bank = bank();
    bank.registry()
        .register_command(InterleaveHandler {
            store: bank.store.clone(),
        })
        .unwrap();
    bank.open("acc-a", "ada").await;
    bank.open("acc-b", "grace").await;
    let opened = bank.log.entries().len();

    bank.mediator
        .send(Interleave {
            first: "acc-a".into(),
            second: "acc-b".into(),
        })
        .await
        .unwrap();

    assert_eq!(
        bank.log.entries()[opened..].to_vec(),
        vec![
            "account.deposited@acc-b",
            "account.deposited@acc-b",
            "account.deposited@acc-a"
        ]
    );
}

/// Deposits, then keeps working on a clone of the account.
struct DepositThenCopy {
    account_id: String,
}

impl Command for DepositThenCopy {
    type Output = ();
}

struct DepositThenCopyHandler {
    store: AccountStore,
}

#[async_trait]
impl CommandHandler for DepositThenCopyHandler {
    type Command = DepositThenCopy;

    async fn handle(&self, command: &DepositThenCopy, _: &UnitOfWork) -> Result<(), HandlerError> {
        let mut account = self.store.load(&command.account_id)?;
        account.deposit(5)?;

        let mut copy = account.clone();
        assert!(!copy.has_pending_events());
        copy.deposit(7)?;

        self.store.save(&copy);
        Ok(())
    }
}

#[tokio::test]
async fn cloned_aggregate_publishes_each_event_once() {
    let bank = bank();
    let amounts = DepositAmounts::default();
    bank.registry().subscribe::<Deposited, _>(amounts.clone());
    bank.registry()
        .register_command(DepositThenCopyHandler {
            store: bank.store.clone(),
        })
        .unwrap();
    bank.open("acc-1", "ada").await;

    let outcome = bank
        .mediator
        .send_with_report(DepositThenCopy {
            account_id: "acc-1".into(),
        })
        .await
        .unwrap();

    assert_eq!(outcome.publication.published, 2);
    assert_eq!(amounts.amounts(), vec![5, 7]);
    assert_eq!(bank.store.balance("acc-1"), Some(12));
}

/// Runs the rest of the chain again when it fails, up to `attempts` times.
struct RetryOnFailure {
    attempts: usize,
}

#[async_trait]
impl PipelineBehavior for RetryOnFailure {
    async fn handle(
        &self,
        _ctx: &PipelineContext<'_>,
        next: Next<'_>,
    ) -> Result<Response, HandlerError> {
        let mut result = next.run().await;
        for _ in 1..self.attempts {
            if result.is_ok() {
                break;
            }
            result = next.run().await;
        }
        result
    }
}

/// Deposits ten times the call number, failing every call before
/// `succeed_on`.
struct UnsteadyDeposit {
    account_id: String,
}

impl Command for UnsteadyDeposit {
    type Output = i64;
}

struct UnsteadyDepositHandler {
    store: AccountStore,
    calls: Arc<AtomicUsize>,
    succeed_on: usize,
}

#[async_trait]
impl CommandHandler for UnsteadyDepositHandler {
    type Command = UnsteadyDeposit;

    async fn handle(&self, command: &UnsteadyDeposit, _: &UnitOfWork) -> Result<i64, HandlerError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let mut account = self.store.load(&command.account_id)?;
        account.deposit(call as i64 * 10)?;
        if call < self.succeed_on {
            return Err(HandlerError::Rejected(format!("ledger busy on call {call}")));
        }
        self.store.save(&account);
        Ok(account.balance)
    }
}

fn unsteady_bank(succeed_on: usize) -> (Bank, DepositAmounts, Arc<AtomicUsize>) {
    let bank = bank_with(Mediator::builder().behavior(RetryOnFailure { attempts: 2 }));
    let amounts = DepositAmounts::default();
    let calls = Arc::new(AtomicUsize::new(0));
    bank.registry().subscribe::<Deposited, _>(amounts.clone());
    bank.registry()
        .register_command(UnsteadyDepositHandler {
            store: bank.store.clone(),
            calls: Arc::clone(&calls),
            succeed_on,
        })
        .unwrap();
    (bank, amounts, calls)
}

#[tokio::test]
async fn retried_command_publishes_only_the_successful_attempt() {
    let (bank, amounts, calls) = unsteady_bank(2);
    bank.open("acc-1", "ada").await;

    let outcome = bank
        .mediator
        .send_with_report(UnsteadyDeposit {
            account_id: "acc-1".into(),
        })
        .await
        .unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(outcome.output, 20);
    assert_eq!(outcome.publication.published, 1);
    assert_eq!(amounts.amounts(), vec![20]);
}

#[tokio::test]
async fn command_failing_every_attempt_publishes_nothing() {
    let (bank, amounts, calls) = unsteady_bank(3);
    bank.open("acc-1", "ada").await;
    let before = bank.log.entries().len();

    let err = bank
        .mediator
        .send(UnsteadyDeposit {
            account_id: "acc-1".into(),
        })
        .await
        .unwrap_err();

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert!(matches!(
        err.handler_error(),
        Some(HandlerError::Rejected(reason)) if reason.contains("call 2")
    ));
    assert!(amounts.amounts().is_empty());
    assert_eq!(bank.log.entries().len(), before);
    assert_eq!(bank.store.balance("acc-1"), Some(0));
}

#[tokio::test]
async fn transfer_publishes_withdrawal_then_deposit() {
    let bank = bank();
    bank.open("acc-1", "ada").await;
    bank.open("acc-2", "grace").await;
    bank.mediator
        .send(Deposit::new("acc-1", 50))
        .await
        .unwrap();
    let before = bank.log.entries().len();

    let outcome = bank
        .mediator
        .send_with_report(Transfer::new("acc-1", "acc-2", 20))
        .await
        .unwrap();

    assert_eq!(outcome.publication.published, 2);
    assert!(outcome.publication.is_clean());
    assert_eq!(
        bank.log.entries()[before..].to_vec(),
        vec!["account.withdrawn@acc-1", "account.deposited@acc-2"]
    );
    assert_eq!(bank.store.balance("acc-1"), Some(30));
    assert_eq!(bank.store.balance("acc-2"), Some(20));
}

#[tokio::test]
async fn failed_command_publishes_nothing() {
    let bank = bank();

    let err = bank
        .mediator
        .send_with_report(OpenFlaggedAccount { id: "acc-x".into() })
        .await
        .unwrap_err();

    assert!(matches!(
        err.handler_error(),
        Some(HandlerError::Rejected(reason)) if reason == "compliance check failed"
    ));
    assert!(bank.log.is_empty());
}

#[tokio::test]
async fn transfer_to_missing_account_publishes_no_withdrawal() {
    let bank = bank();
    bank.open("acc-1", "ada").await;
    bank.mediator
        .send(Deposit::new("acc-1", 50))
        .await
        .unwrap();
    let before = bank.log.entries().len();

    let err = bank
        .mediator
        .send(Transfer::new("acc-1", "nowhere", 20))
        .await
        .unwrap_err();

    assert!(matches!(err.handler_error(), Some(HandlerError::NotFound(id)) if id == "nowhere"));
    assert_eq!(bank.log.entries().len(), before);
    assert_eq!(bank.store.balance("acc-1"), Some(50));
}

/// Deposits on a spawned task, where the dispatch's unit of work is not
/// installed, and enlists the account explicitly afterwards.
struct BackgroundDeposit {
    account_id: String,
}

impl Command for BackgroundDeposit {
    type Output = usize;
}

struct BackgroundDepositHandler {
    store: AccountStore,
}

#[async_trait]
impl CommandHandler for BackgroundDepositHandler {
    type Command = BackgroundDeposit;

    async fn handle(
        &self,
        command: &BackgroundDeposit,
        uow: &UnitOfWork,
    ) -> Result<usize, HandlerError> {
        let account = self.store.load(&command.account_id)?;
        let (account, seen_in_task) = tokio::spawn(async move {
            let mut account = account;
            let seen = UnitOfWork::current().is_some();
            account.deposit(7).map(|_| (account, seen))
        })
        .await
        .map_err(HandlerError::other)??;
        assert!(!seen_in_task);

        let before = uow.tracked_count();
        uow.track(&account);
        self.store.save(&account);
        Ok(uow.tracked_count() - before)
    }
}

#[tokio::test]
async fn explicitly_tracked_aggregate_is_published() {
    let bank = bank();
    bank.registry()
        .register_command(BackgroundDepositHandler {
            store: bank.store.clone(),
        })
        .unwrap();
    bank.open("acc-1", "ada").await;
    let before = bank.log.entries().len();

    let enlisted = bank
        .mediator
        .send(BackgroundDeposit {
            account_id: "acc-1".into(),
        })
        .await
        .unwrap();

    assert_eq!(enlisted, 1);
    assert_eq!(
        bank.log.entries()[before..].to_vec(),
        vec!["account.deposited@acc-1"]
    );
}

/// Captures the unit of work it ran under.
struct Inspect;

impl Command for Inspect {
    type Output = bool;
}

struct InspectHandler {
    seen: Arc<Mutex<Option<UnitOfWork>>>,
}

#[async_trait]
impl CommandHandler for InspectHandler {
    type Command = Inspect;

    async fn handle(&self, _: &Inspect, uow: &UnitOfWork) -> Result<bool, HandlerError> {
        *self.seen.lock().unwrap() = Some(uow.clone());
        let current = UnitOfWork::current().map(|current| current.id());
        Ok(current == Some(uow.id()) && uow.state() == UnitOfWorkState::Tracking)
    }
}

#[tokio::test]
async fn handler_runs_inside_its_own_unit_of_work() {
    let bank = bank();
    let seen = Arc::new(Mutex::new(None));
    bank.registry()
        .register_command(InspectHandler { seen: seen.clone() })
        .unwrap();

    assert!(bank.mediator.send(Inspect).await.unwrap());
    assert!(UnitOfWork::current().is_none());

    let first = seen.lock().unwrap().take().unwrap();
    assert_eq!(first.state(), UnitOfWorkState::Closed);
    assert!(!first.is_read_only());

    bank.mediator.send(Inspect).await.unwrap();
    let second = seen.lock().unwrap().take().unwrap();
    assert_ne!(first.id(), second.id());
}

#[tokio::test]
async fn report_counts_every_published_event() {
    let bank = bank();

    let outcome = bank
        .mediator
        .send_with_report(OpenAccount::new("acc-1", "ada"))
        .await
        .unwrap();
    assert_eq!(outcome.publication.published, 2);
    assert!(outcome.publication.failures.is_empty());

    let outcome = bank
        .mediator
        .send_with_report(Deposit::new("acc-1", 5))
        .await
        .unwrap();
    assert_eq!(outcome.output, 5);
    assert_eq!(outcome.publication.published, 1);
}

#[test]
fn loaded_account_has_nothing_pending() {
    let store = AccountStore::new();
    let account = Account::open("acc-1", "ada", "ada@example.com");
    assert_eq!(account.pending_event_count(), 2);
    store.save(&account);

    assert_eq!(store.load("acc-1").unwrap().pending_event_count(), 0);
}

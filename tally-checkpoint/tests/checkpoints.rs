mod common;

use anyhow::Result;
use chrono::{DateTime, Utc};
use tally_checkpoint::{
    validate_partition, CheckpointError, CheckpointStore, CheckpointUnit, LockPlan,
};
use tally_core::time::{self, TimeSpan};
use tally_core::{AccountId, BalanceTriple, CommodityId, ReconcileState};
use tally_events::CheckpointEvent;
use tally_ledger::{Account, LedgerSource, Transaction};

use common::{at, Book, USD};

const STATES: [ReconcileState; 5] = [
    ReconcileState::New,
    ReconcileState::Cleared,
    ReconcileState::Reconciled,
    ReconcileState::Frozen,
    ReconcileState::Void,
];

/// Ten bursts of four postings, one burst per minute.
fn seed_bursts(book: &Book, account: AccountId) -> Result<()> {
    for i in 0..40i64 {
        let secs = (i / 4) * 60 + (i % 4);
        let sign = if i % 3 == 0 { -1 } else { 1 };
        book.record_with_state(
            account,
            secs,
            sign * (i + 1) * 100,
            STATES[(i % 5) as usize],
        )?;
    }
    Ok(())
}

fn resolved(book: &Book, account: &AccountId, as_of: DateTime<Utc>) -> Result<BalanceTriple> {
    let account = book.engine.resolve_account(account, as_of)?;
    let balances = account
        .starting_balances
        .expect("resolver writes starting balances");
    assert_eq!(balances.balance.denom, 100);
    Ok(BalanceTriple::new(
        balances.balance.num,
        balances.cleared.num,
        balances.reconciled.num,
    ))
}

fn direct(book: &Book, account: &AccountId, as_of: DateTime<Utc>) -> Result<BalanceTriple> {
    Ok(book
        .ledger
        .aggregate_postings(account, &CommodityId::from(USD), TimeSpan::until(as_of))?)
}

fn sample_dates(book: &Book, account: &AccountId) -> Result<Vec<DateTime<Utc>>> {
    let mut dates: Vec<_> = (-30..=660).step_by(7).map(at).collect();
    for checkpoint in book.engine.checkpoints(account)? {
        dates.push(checkpoint.span.start);
        dates.push(checkpoint.span.end);
    }
    dates.push(time::earliest() - chrono::Duration::days(1));
    Ok(dates)
}

#[test]
fn empty_account_gets_single_zero_checkpoint() -> Result<()> {
    let book = Book::with_density(3)?;
    let account = book.account("Checking")?;

    assert_eq!(book.engine.rebuild_checkpoints(&account.id)?, 1);

    let checkpoints = book.engine.checkpoints(&account.id)?;
    assert_eq!(checkpoints.len(), 1);
    assert_eq!(checkpoints[0].span, TimeSpan::everything());
    assert!(checkpoints[0].totals.is_zero());
    assert!(checkpoints[0].is_open_ended());
    assert_eq!(checkpoints[0].commodity, CommodityId::from(USD));
    Ok(())
}

#[test]
fn rebuilt_intervals_partition_the_timeline() -> Result<()> {
    let book = Book::with_density(3)?;
    let account = book.account("Checking")?;
    seed_bursts(&book, account.id)?;

    let count = book.engine.rebuild_checkpoints(&account.id)?;
    let checkpoints = book.engine.checkpoints(&account.id)?;
    assert_eq!(count, checkpoints.len());
    assert!(count > 1);

    let spans: Vec<_> = checkpoints.iter().map(|c| c.span).collect();
    validate_partition(&spans)?;
    assert_eq!(checkpoints.iter().filter(|c| c.is_open_ended()).count(), 1);

    // cached sums add up to the whole history
    let total = checkpoints
        .iter()
        .fold(BalanceTriple::ZERO, |acc, c| acc + c.totals);
    assert_eq!(total, direct(&book, &account.id, time::latest())?);
    Ok(())
}

#[test]
fn resolved_balance_matches_direct_aggregate_at_every_date() -> Result<()> {
    let book = Book::with_density(3)?;
    let account = book.account("Checking")?;
    seed_bursts(&book, account.id)?;
    book.engine.rebuild_checkpoints(&account.id)?;

    for as_of in sample_dates(&book, &account.id)? {
        assert_eq!(
            resolved(&book, &account.id, as_of)?,
            direct(&book, &account.id, as_of)?,
            "mismatch as of {as_of}"
        );
    }
    Ok(())
}

#[test]
fn balance_past_latest_sentinel_counts_final_checkpoint_once() -> Result<()> {
    let book = Book::with_density(3)?;
    let account = book.account("Checking")?;
    for secs in [0, 1, 2, 3, 4, 100, 101, 102, 103] {
        book.record(account.id, secs, 100)?;
    }
    book.engine.rebuild_checkpoints(&account.id)?;

    for as_of in [
        time::latest(),
        time::latest() + chrono::Duration::milliseconds(500),
        chrono::DateTime::<Utc>::MAX_UTC,
    ] {
        assert_eq!(resolved(&book, &account.id, as_of)?.balance, 900);
    }
    Ok(())
}

#[test]
fn postings_outside_sentinel_range_never_reach_checkpoints() -> Result<()> {
    let book = Book::with_density(3)?;
    let account = book.account("Checking")?;
    book.engine.rebuild_checkpoints(&account.id)?;

    let ancient = time::earliest() - chrono::Duration::days(365 * 50);
    let txn = Transaction::new(ancient, "before records began").with_split(
        account.id,
        700,
        ReconcileState::New,
    );
    assert!(book.post(&txn).is_err());
    assert!(book.ledger.transaction(&txn.id).is_err());
    assert!(resolved(&book, &account.id, at(0))?.is_zero());
    Ok(())
}

#[test]
fn rebuilding_twice_is_idempotent() -> Result<()> {
    let book = Book::with_density(3)?;
    let account = book.account("Checking")?;
    seed_bursts(&book, account.id)?;

    book.engine.rebuild_checkpoints(&account.id)?;
    let first = book.engine.checkpoints(&account.id)?;
    book.engine.rebuild_checkpoints(&account.id)?;
    let second = book.engine.checkpoints(&account.id)?;
    assert_eq!(first, second);
    Ok(())
}

#[test]
fn incremental_update_counts_new_posting_exactly_once() -> Result<()> {
    let book = Book::with_density(3)?;
    let account = book.account("Checking")?;
    seed_bursts(&book, account.id)?;
    book.engine.rebuild_checkpoints(&account.id)?;

    let before = resolved(&book, &account.id, at(600))?;
    let txn = Transaction::new(at(150), "late entry").with_split(
        account.id,
        12_345,
        ReconcileState::Reconciled,
    );
    assert_eq!(book.post(&txn)?, 1);

    let after = resolved(&book, &account.id, at(600))?;
    assert_eq!(after, before + BalanceTriple::new(12_345, 12_345, 12_345));
    for as_of in sample_dates(&book, &account.id)? {
        assert_eq!(
            resolved(&book, &account.id, as_of)?,
            direct(&book, &account.id, as_of)?
        );
    }

    // a full rebuild may move boundaries but never the balances
    let dates = sample_dates(&book, &account.id)?;
    let incremental: Vec<_> = dates
        .iter()
        .map(|d| resolved(&book, &account.id, *d))
        .collect::<Result<_>>()?;
    book.engine.rebuild_checkpoints(&account.id)?;
    let rebuilt: Vec<_> = dates
        .iter()
        .map(|d| resolved(&book, &account.id, *d))
        .collect::<Result<_>>()?;
    assert_eq!(incremental, rebuilt);
    Ok(())
}

#[test]
fn boundary_falls_inside_gap_after_cluster() -> Result<()> {
    let book = Book::with_density(3)?;
    let account = book.account("Checking")?;
    for secs in [0, 1, 2, 3, 4, 100, 101, 102, 103] {
        book.record(account.id, secs, 100)?;
    }
    book.engine.rebuild_checkpoints(&account.id)?;

    let checkpoints = book.engine.checkpoints(&account.id)?;
    assert!(checkpoints.len() >= 2);
    let boundary = checkpoints[0].span.end;
    assert!(boundary > at(4) && boundary < at(100));
    assert_eq!(checkpoints[0].totals.balance, 500);
    Ok(())
}

#[test]
fn dense_postings_collapse_to_one_checkpoint() -> Result<()> {
    let book = Book::with_density(5)?;
    let account = book.account("Checking")?;
    for secs in 0..10 {
        book.record(account.id, secs, 1)?;
    }
    assert_eq!(book.engine.rebuild_checkpoints(&account.id)?, 1);
    let checkpoints = book.engine.checkpoints(&account.id)?;
    assert_eq!(checkpoints[0].totals.balance, 10);
    Ok(())
}

#[test]
fn balance_before_first_boundary_uses_only_partial_sum() -> Result<()> {
    let book = Book::with_density(3)?;
    let account = book.account("Checking")?;
    seed_bursts(&book, account.id)?;
    book.engine.rebuild_checkpoints(&account.id)?;

    let as_of = at(2);
    let summary =
        book.engine
            .store()
            .summary_before(&account.id, &CommodityId::from(USD), as_of)?;
    assert!(summary.totals.is_zero());
    assert_eq!(summary.resume_from, time::earliest());
    assert_eq!(
        resolved(&book, &account.id, as_of)?,
        direct(&book, &account.id, as_of)?
    );
    Ok(())
}

#[test]
fn transaction_update_refreshes_every_touched_account() -> Result<()> {
    let book = Book::with_density(3)?;
    let checking = book.account("Checking")?;
    let savings = book.account("Savings")?;
    seed_bursts(&book, checking.id)?;
    seed_bursts(&book, savings.id)?;
    book.engine.rebuild_group(None)?;

    let transfer = Transaction::new(at(200), "transfer")
        .with_split(checking.id, -5_000, ReconcileState::Cleared)
        .with_split(savings.id, 5_000, ReconcileState::New);
    assert_eq!(book.post(&transfer)?, 2);

    for account in [&checking, &savings] {
        assert_eq!(
            resolved(&book, &account.id, at(650))?,
            direct(&book, &account.id, at(650))?
        );
    }
    Ok(())
}

#[test]
fn updates_without_checkpoints_are_no_ops() -> Result<()> {
    let book = Book::with_density(3)?;
    let account = book.account("Checking")?;
    let txn = Transaction::new(at(10), "first").with_split(account.id, 700, ReconcileState::New);

    assert_eq!(book.post(&txn)?, 0);
    assert_eq!(book.engine.update_checkpoint_at(&account.id, at(10))?, 0);
    assert!(book.engine.checkpoints(&account.id)?.is_empty());
    // the partial phase covers the whole history
    assert_eq!(resolved(&book, &account.id, at(20))?.balance, 700);
    Ok(())
}

#[test]
fn explicit_timestamp_update_repairs_stale_checkpoint() -> Result<()> {
    let book = Book::with_density(3)?;
    let account = book.account("Checking")?;
    for secs in [0, 1, 2, 3, 4, 100, 101, 102, 103] {
        book.record(account.id, secs, 100)?;
    }
    book.engine.rebuild_checkpoints(&account.id)?;

    // recorded behind the checkpoints' back
    book.record(account.id, 2, 42)?;
    let stale = resolved(&book, &account.id, at(200))?;
    assert_eq!(stale.balance, 900);

    assert_eq!(book.engine.update_checkpoint_at(&account.id, at(2))?, 1);
    assert_eq!(resolved(&book, &account.id, at(200))?.balance, 942);
    Ok(())
}

#[test]
fn removed_transaction_is_dropped_from_checkpoints() -> Result<()> {
    let book = Book::with_density(3)?;
    let account = book.account("Checking")?;
    seed_bursts(&book, account.id)?;
    book.engine.rebuild_checkpoints(&account.id)?;
    let txn =
        Transaction::new(at(130), "mistake").with_split(account.id, 99_900, ReconcileState::New);
    book.post(&txn)?;

    let placements = book.ledger.remove_transaction(&txn.id)?;
    assert_eq!(book.engine.update_checkpoints_at(&placements)?, 1);
    for as_of in sample_dates(&book, &account.id)? {
        assert_eq!(
            resolved(&book, &account.id, as_of)?,
            direct(&book, &account.id, as_of)?
        );
    }
    Ok(())
}

#[test]
fn account_without_commodity_is_a_configuration_error() -> Result<()> {
    let book = Book::with_density(3)?;
    let mut orphan = Account::new("Placeholder", None);
    book.ledger.add_account(&orphan)?;

    let err = book.engine.rebuild_checkpoints(&orphan.id).unwrap_err();
    assert!(matches!(err, CheckpointError::MissingCommodity(id) if id == orphan.id));
    assert!(book.engine.checkpoints(&orphan.id)?.is_empty());

    let err = book.engine.resolve_balance(&mut orphan, at(0)).unwrap_err();
    assert!(matches!(err, CheckpointError::MissingCommodity(_)));
    assert!(orphan.starting_balances.is_none());
    Ok(())
}

#[test]
fn failed_unit_of_work_leaves_previous_set_intact() -> Result<()> {
    let book = Book::with_density(3)?;
    let account = book.account("Checking")?;
    seed_bursts(&book, account.id)?;
    book.engine.rebuild_checkpoints(&account.id)?;
    let before = book.engine.checkpoints(&account.id)?;

    let result: Result<(), CheckpointError> = book.engine.store().transact(
        &LockPlan::rebuild(account.id),
        |unit: &mut dyn CheckpointUnit| {
            unit.delete_account(&account.id)?;
            Err(CheckpointError::Storage("connection lost".into()))
        },
    );
    assert!(result.is_err());
    assert_eq!(book.engine.checkpoints(&account.id)?, before);
    Ok(())
}

#[test]
fn group_rebuild_skips_accounts_without_commodity() -> Result<()> {
    let book = Book::with_density(3)?;
    let assets = Account::new("Assets", None);
    book.ledger.add_account(&assets)?;
    let checking = Account::new("Checking", Some(CommodityId::from(USD))).with_parent(assets.id);
    let savings = Account::new("Savings", Some(CommodityId::from(USD))).with_parent(assets.id);
    book.ledger.add_account(&checking)?;
    book.ledger.add_account(&savings)?;
    seed_bursts(&book, checking.id)?;

    let outcome = book.engine.rebuild_group(Some(&assets.id))?;
    assert_eq!(outcome.rebuilt.len(), 2);
    assert!(outcome.skipped.is_empty());

    let whole_book = book.engine.rebuild_group(None)?;
    assert_eq!(whole_book.skipped, vec![assets.id]);

    let balances = book.engine.resolve_group_balances(None, at(700))?;
    assert_eq!(balances.len(), 3);
    for account in balances {
        if account.id == assets.id {
            assert!(account.starting_balances.is_none());
        } else {
            let resolved = account.starting_balances.expect("resolved balance");
            assert_eq!(
                resolved.balance.num,
                direct(&book, &account.id, at(700))?.balance
            );
        }
    }
    Ok(())
}

#[test]
fn committed_changes_are_announced() -> Result<()> {
    let book = Book::with_density(3)?;
    let account = book.account("Checking")?;
    let mut events = book.engine.subscribe();

    book.engine.rebuild_checkpoints(&account.id)?;
    let txn = Transaction::new(at(5), "coffee").with_split(account.id, -450, ReconcileState::New);
    book.post(&txn)?;

    let received = events.drain();
    assert_eq!(received.len(), 2);
    assert!(matches!(&received[0], CheckpointEvent::Rebuilt(e) if e.checkpoints == 1));
    assert!(matches!(
        &received[1],
        CheckpointEvent::TransactionRefreshed(e) if e.transaction == txn.id && e.rows == 1
    ));
    Ok(())
}

#[test]
fn concurrent_writers_on_different_accounts() -> Result<()> {
    let book = Book::with_density(2)?;
    let accounts: Vec<_> = (0..4)
        .map(|i| book.account(&format!("Account {i}")))
        .collect::<Result<_>>()?;

    std::thread::scope(|scope| -> Result<()> {
        let book = &book;
        let workers: Vec<_> = accounts
            .iter()
            .map(|account| {
                scope.spawn(move || -> Result<()> {
                    book.engine.rebuild_checkpoints(&account.id)?;
                    for i in 0..12 {
                        let txn = Transaction::new(at(i * 30), "worker").with_split(
                            account.id,
                            i + 1,
                            ReconcileState::Cleared,
                        );
                        book.post(&txn)?;
                    }
                    book.engine.rebuild_checkpoints(&account.id)?;
                    Ok(())
                })
            })
            .collect();
        for worker in workers {
            worker.join().expect("worker panicked")?;
        }
        Ok(())
    })?;

    for account in &accounts {
        let spans: Vec<_> = book
            .engine
            .checkpoints(&account.id)?
            .iter()
            .map(|c| c.span)
            .collect();
        validate_partition(&spans)?;
        assert_eq!(resolved(&book, &account.id, at(1_000))?.balance, 78);
    }
    Ok(())
}

//! End-to-end runs of the volume state machine against in-memory accounts
//!
//! Run with: cargo test --test volume_test

mod common;

use std::time::Duration;

use bridge_volume::chains::{avalanche, bsc};
use bridge_volume::error::BotError;
use bridge_volume::volume::{Leg, Stage, VolumeRun, PASS};

use common::*;

fn harness_with(overrides: &[(&str, &str)], exchange: FakeExchange) -> Harness {
    Harness::new(test_config(overrides), single_chain_registry(), exchange)
}

/// Wallet holding `stable` USDT on BSC and on the hub
fn funded_accounts(stable: u64) -> FakeAccounts {
    FakeAccounts::new(vec![FakeEvm::funded(bsc("http://fake"), stable)], FakeHub::funded(stable))
}

#[tokio::test]
async fn test_empty_wallet_tops_up_stable_then_gas() {
    let harness = Harness::default_bsc();
    let mut evm = FakeEvm::funded(bsc("http://fake"), 0);
    evm.stable = ScriptedBalance::new(vec![tokens(0, 18), tokens(0, 18), tokens(1500, 18)]);
    evm.native = ScriptedBalance::new(vec![tokens(0, 18), tokens(0, 18), tokens(1, 16)]);
    let accounts = FakeAccounts::new(vec![evm], FakeHub::funded(1500));
    let fake = accounts.evm_on("BSC");

    let mut run = VolumeRun::new(&harness.ctx, &accounts, deposit_address(), 3000);

    assert_eq!(run.step().await.unwrap(), Stage::TopUpStable);
    assert_eq!(fake.stable.reads(), 1);
    assert_eq!(harness.exchange.count(), 0);

    assert_eq!(run.step().await.unwrap(), Stage::BridgingOut);
    assert_eq!(harness.exchange.count(), 1);
    assert_eq!(fake.stable.reads(), 3);
    {
        let requests = harness.exchange.requests.lock().unwrap();
        assert_eq!(requests[0].coin, "USDT");
        assert_eq!(requests[0].network, "BSC");
        assert_eq!(requests[0].address, evm_address().to_string());
        assert!(requests[0].amount >= 1001.0 && requests[0].amount <= 2001.0);
    }
    assert!(run.messages().iter().any(|m| m.starts_with(PASS) && m.contains("withdraw USDT")));

    // Zero native gas forces a gas withdrawal before the first bridge
    assert_eq!(run.step().await.unwrap(), Stage::Cooldown(Leg::Out));
    assert_eq!(harness.exchange.coins(), vec!["USDT", "BNB"]);
    assert_eq!(fake.bridge.calls(), 1);
    assert_eq!(fake.bridged.lock().unwrap()[0].1, tokens(1500, 18));
}

#[tokio::test]
async fn test_rejected_stable_withdrawal_is_retried() {
    let harness = harness_with(&[], FakeExchange::rejecting(2));
    let mut evm = FakeEvm::funded(bsc("http://fake"), 0);
    evm.stable = ScriptedBalance::new(vec![tokens(0, 18), tokens(1500, 18)]);
    let accounts = FakeAccounts::new(vec![evm], FakeHub::funded(0));

    let mut run = VolumeRun::new(&harness.ctx, &accounts, deposit_address(), 3000);
    run.step().await.unwrap();

    assert_eq!(run.step().await.unwrap(), Stage::BridgingOut);
    assert_eq!(harness.exchange.count(), 3);
    let sleeps = harness.sleeper.all();
    assert_eq!(sleeps.len(), 2);
    assert!(sleeps
        .iter()
        .all(|d| *d >= Duration::from_secs(30) && *d <= Duration::from_secs(60)));
}

#[tokio::test]
async fn test_stable_withdrawal_gives_up_after_three_rejections() {
    let harness = harness_with(&[], FakeExchange::rejecting(10));
    let evm = FakeEvm::funded(bsc("http://fake"), 0);
    let accounts = FakeAccounts::new(vec![evm], FakeHub::funded(0));

    let mut run = VolumeRun::new(&harness.ctx, &accounts, deposit_address(), 3000);
    run.step().await.unwrap();

    let err = run.step().await.unwrap_err();
    assert!(matches!(err, BotError::WithdrawFailed { .. }));
    assert_eq!(harness.exchange.count(), 3);
}

#[tokio::test]
async fn test_single_cycle_credits_both_legs() {
    let harness = harness_with(&[("STABLE_WITHDRAW_USD", "900,1000")], FakeExchange::default());
    let accounts = funded_accounts(1000);

    let mut run = VolumeRun::new(&harness.ctx, &accounts, deposit_address(), 1);
    let state = run.run().await.unwrap();

    assert_eq!(state.cycles, 1);
    assert_eq!(state.accumulated_volume, 2000);
    assert_eq!(run.stage(), Stage::Done);
    assert_eq!(harness.exchange.count(), 0);
}

#[tokio::test]
async fn test_run_stops_once_target_reached() {
    let harness = harness_with(&[("STABLE_WITHDRAW_USD", "900,1000")], FakeExchange::default());
    let accounts = funded_accounts(1000);
    let fake = accounts.evm_on("BSC");

    let mut run = VolumeRun::new(&harness.ctx, &accounts, deposit_address(), 3000);
    let state = run.run().await.unwrap();

    assert_eq!(state.cycles, 2);
    assert_eq!(state.accumulated_volume, 4000);
    assert_eq!(fake.bridge.calls(), 2);
    assert_eq!(accounts.hub.attempts.lock().unwrap().len(), 2);

    let transfers = fake.transfers.lock().unwrap();
    assert_eq!(transfers.len(), 1);
    assert_eq!(transfers[0], (deposit_address(), tokens(1000, 18)));

    // Two cooldowns per cycle, nothing else waits
    let sleeps = harness.sleeper.all();
    assert_eq!(sleeps.len(), 4);
    assert!(sleeps
        .iter()
        .all(|d| *d >= Duration::from_secs(120) && *d <= Duration::from_secs(240)));

    let last = run.messages().last().unwrap();
    assert!(last.contains("wallet completed 4000 USDT volume"));
}

#[tokio::test]
async fn test_deposit_tops_up_gas_on_insufficient_funds() {
    let harness = harness_with(&[("STABLE_WITHDRAW_USD", "900,1000")], FakeExchange::default());
    let mut evm = FakeEvm::funded(bsc("http://fake"), 1000);
    // Gas check before bridging, read after the failed deposit, then the withdrawal landing
    evm.native = ScriptedBalance::new(vec![tokens(1, 18), tokens(1, 15), tokens(1, 17)]);
    evm.transfer = Script::ok("0xtransfer".to_string())
        .then(Err(BotError::InsufficientFunds("insufficient funds for gas".to_string())));
    let accounts = FakeAccounts::new(vec![evm], FakeHub::funded(1000));
    let fake = accounts.evm_on("BSC");

    let mut run = VolumeRun::new(&harness.ctx, &accounts, deposit_address(), 1);
    run.run().await.unwrap();

    assert_eq!(harness.exchange.coins(), vec!["BNB"]);
    assert_eq!(fake.transfer.calls(), 2);
    assert_eq!(fake.transfers.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_deposit_gives_up_after_three_failures() {
    let harness = harness_with(&[("STABLE_WITHDRAW_USD", "900,1000")], FakeExchange::default());
    let mut evm = FakeEvm::funded(bsc("http://fake"), 1000);
    evm.transfer = Script::always_err(
        String::new(),
        BotError::TransactionReverted {
            tx_hash: "0xdead".to_string(),
        },
    );
    let accounts = FakeAccounts::new(vec![evm], FakeHub::funded(1000));
    let fake = accounts.evm_on("BSC");

    let mut run = VolumeRun::new(&harness.ctx, &accounts, deposit_address(), 1);
    let err = run.run().await.unwrap_err();

    assert!(matches!(err, BotError::TransactionReverted { .. }));
    assert_eq!(fake.transfer.calls(), 3);
    assert_eq!(run.stage(), Stage::Depositing);
    assert_eq!(run.state().accumulated_volume, 2000);
}

#[tokio::test]
async fn test_deposit_lands_on_last_destination_chain() {
    let harness = Harness::new(
        test_config(&[("STABLE_WITHDRAW_USD", "900,1000")]),
        two_chain_registry(),
        FakeExchange::default(),
    );
    let accounts = FakeAccounts::new(
        vec![
            FakeEvm::funded(bsc("http://fake"), 1000),
            FakeEvm::funded(avalanche("http://fake"), 1000),
        ],
        FakeHub::funded(1000),
    );

    let mut run = VolumeRun::new(&harness.ctx, &accounts, deposit_address(), 1);
    let state = run.run().await.unwrap();

    let destination = accounts.hub.attempts.lock().unwrap()[0].0.clone();
    assert_eq!(state.current_chain.name, destination);
    for (name, evm) in &accounts.evm {
        let expected = usize::from(*name == destination);
        assert_eq!(evm.transfers.lock().unwrap().len(), expected, "{name}");
    }
}

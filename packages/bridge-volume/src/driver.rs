//! Run driver
//!
//! Processes wallet records one at a time in random order. A failed wallet
//! is logged, reported and left in the record file for the next run.

use std::sync::Arc;

use rand::seq::SliceRandom;
use tracing::{error, info};

use crate::accounts::Accounts;
use crate::context::BotContext;
use crate::error::BotError;
use crate::evm::parse_address;
use crate::notify::Notifier;
use crate::volume::VolumeRun;
use crate::wallets::{WalletRecord, WalletStore};

/// Prefix of the progress line reporting a failed run
pub const FAIL: &str = "❌";

/// Builds the chain accounts for one wallet record
pub type AccountsFactory =
    Box<dyn Fn(&WalletRecord) -> Result<Arc<dyn Accounts>, BotError> + Send + Sync>;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub completed: usize,
    pub failed: usize,
    pub total_volume: u64,
}

pub struct Driver {
    ctx: BotContext,
    store: WalletStore,
    notifier: Option<Arc<dyn Notifier>>,
    accounts: AccountsFactory,
}

impl Driver {
    pub fn new(ctx: BotContext, store: WalletStore, accounts: AccountsFactory) -> Self {
        Self {
            ctx,
            store,
            notifier: None,
            accounts,
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub async fn run(&self) -> Result<RunSummary, BotError> {
        let mut records = self.store.load()?;
        records.shuffle(&mut rand::thread_rng());

        let total = records.len();
        let mut summary = RunSummary::default();

        for (idx, record) in records.iter().enumerate() {
            info!(wallet = idx + 1, total, deposit = %record.deposit_address, "Processing wallet");

            let (result, messages) = self.run_wallet(record).await;
            let mut report = messages.join("\n");

            match result {
                Ok(volume) => {
                    summary.completed += 1;
                    summary.total_volume += volume;
                    if let Err(e) = self.store.mark_completed(record) {
                        error!(error = %e, "Failed to mark wallet completed");
                    }
                }
                Err(e) => {
                    summary.failed += 1;
                    error!(deposit = %record.deposit_address, error = %e, "Wallet run failed");
                    if !report.is_empty() {
                        report.push('\n');
                    }
                    report.push_str(&format!("{} {}", FAIL, e));
                }
            }

            if let Some(notifier) = &self.notifier {
                notifier.notify(&report).await;
            }

            if idx + 1 < total {
                let delay = self.ctx.config.volume.sleep_between_accounts_secs.delay();
                info!(wait_secs = delay.as_secs(), "Sleeping before next wallet");
                self.ctx.sleeper().sleep(delay).await;
            }
        }

        info!(
            completed = summary.completed,
            failed = summary.failed,
            total_volume = summary.total_volume,
            "Run finished"
        );
        Ok(summary)
    }

    /// Run one wallet; the progress lines are returned even on failure.
    async fn run_wallet(&self, record: &WalletRecord) -> (Result<u64, BotError>, Vec<String>) {
        let accounts = match (self.accounts)(record) {
            Ok(accounts) => accounts,
            Err(e) => return (Err(e), Vec::new()),
        };
        let deposit = match parse_address(&record.deposit_address) {
            Ok(address) => address,
            Err(e) => return (Err(e), Vec::new()),
        };

        let mut run = VolumeRun::with_random_target(&self.ctx, accounts.as_ref(), deposit);
        let result = run.run().await.map(|state| state.accumulated_volume);
        (result, run.messages().to_vec())
    }
}

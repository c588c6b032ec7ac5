//! In-memory fakes for the bot's capability traits

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use alloy::primitives::{Address, B256, U256};
use async_trait::async_trait;

use bridge_volume::accounts::Accounts;
use bridge_volume::chains::{avalanche, bsc, Chain, ChainRegistry, HubChain, TokenDescriptor, TokenKind, DEFAULT_APTOS_REST_URL};
use bridge_volume::config::Config;
use bridge_volume::context::BotContext;
use bridge_volume::error::BotError;
use bridge_volume::evm::EvmAccount;
use bridge_volume::exchange::{CentralizedExchange, ExchangeKind, WithdrawRequest};
use bridge_volume::funding::Funding;
use bridge_volume::hub::HubAccount;
use bridge_volume::notify::Notifier;
use bridge_volume::pacing::Sleeper;
use bridge_volume::price::PriceFeed;

pub const HUB_ADDRESS: &str = "0xabababababababababababababababababababababababababababababababab";

pub fn evm_address() -> Address {
    "0x00000000000000000000000000000000000000e1".parse().unwrap()
}

pub fn deposit_address() -> Address {
    "0x00000000000000000000000000000000000000d1".parse().unwrap()
}

/// `amount` whole tokens in raw units
pub fn tokens(amount: u64, decimals: u8) -> U256 {
    U256::from(amount) * U256::from(10u64).pow(U256::from(decimals))
}

#[derive(Default)]
pub struct RecordingSleeper {
    pub sleeps: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn count(&self) -> usize {
        self.sleeps.lock().unwrap().len()
    }

    pub fn all(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap().clone()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.sleeps.lock().unwrap().push(duration);
    }
}

/// Returns queued values in order, then repeats the last one
pub struct ScriptedBalance {
    values: Mutex<VecDeque<U256>>,
    last: Mutex<U256>,
    reads: AtomicU32,
}

impl ScriptedBalance {
    pub fn new(values: Vec<U256>) -> Self {
        let last = values.last().copied().unwrap_or(U256::ZERO);
        Self {
            values: Mutex::new(values.into()),
            last: Mutex::new(last),
            reads: AtomicU32::new(0),
        }
    }

    pub fn constant(value: U256) -> Self {
        Self::new(vec![value])
    }

    pub fn next(&self) -> U256 {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let mut values = self.values.lock().unwrap();
        match values.pop_front() {
            Some(v) => {
                *self.last.lock().unwrap() = v;
                v
            }
            None => *self.last.lock().unwrap(),
        }
    }

    pub fn reads(&self) -> u32 {
        self.reads.load(Ordering::SeqCst)
    }
}

/// Queued results, `Ok(default)` once exhausted
pub struct Script<T: Clone> {
    queue: Mutex<VecDeque<Result<T, BotError>>>,
    default: T,
    calls: AtomicU32,
}

impl<T: Clone> Script<T> {
    pub fn ok(default: T) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            default,
            calls: AtomicU32::new(0),
        }
    }

    pub fn then(self, result: Result<T, BotError>) -> Self {
        self.queue.lock().unwrap().push_back(result);
        self
    }

    pub fn always_err(default: T, error: BotError) -> Self {
        let script = Self::ok(default);
        for _ in 0..100 {
            script.queue.lock().unwrap().push_back(Err(error.clone()));
        }
        script
    }

    pub fn next(&self) -> Result<T, BotError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.queue
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(self.default.clone()))
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

pub struct FakeEvm {
    pub chain: Chain,
    pub address: Address,
    pub native: ScriptedBalance,
    pub stable: ScriptedBalance,
    pub allowance: Mutex<U256>,
    pub approve: Script<String>,
    pub approvals: Mutex<Vec<U256>>,
    pub bridge: Script<String>,
    pub bridged: Mutex<Vec<(B256, U256)>>,
    pub transfer: Script<String>,
    pub transfers: Mutex<Vec<(Address, U256)>>,
}

impl FakeEvm {
    /// Funded account: 1 native token, `stable` whole stablecoins, unlimited allowance
    pub fn funded(chain: Chain, stable: u64) -> Self {
        let native = tokens(1, chain.native.decimals);
        let stable = tokens(stable, chain.stable.decimals);
        Self {
            chain,
            address: evm_address(),
            native: ScriptedBalance::constant(native),
            stable: ScriptedBalance::constant(stable),
            allowance: Mutex::new(U256::MAX),
            approve: Script::ok("0xapprove".to_string()),
            approvals: Mutex::new(Vec::new()),
            bridge: Script::ok("0xbridge".to_string()),
            bridged: Mutex::new(Vec::new()),
            transfer: Script::ok("0xtransfer".to_string()),
            transfers: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl EvmAccount for FakeEvm {
    fn address(&self) -> Address {
        self.address
    }

    fn chain(&self) -> &Chain {
        &self.chain
    }

    async fn native_balance(&self) -> Result<U256, BotError> {
        Ok(self.native.next())
    }

    async fn token_balance(&self, token: &TokenDescriptor) -> Result<U256, BotError> {
        if token.kind == TokenKind::Native {
            Ok(self.native.next())
        } else {
            Ok(self.stable.next())
        }
    }

    async fn allowance(&self, _token: &TokenDescriptor, _spender: Address) -> Result<U256, BotError> {
        Ok(*self.allowance.lock().unwrap())
    }

    async fn approve(
        &self,
        _token: &TokenDescriptor,
        _spender: Address,
        amount: U256,
    ) -> Result<String, BotError> {
        let result = self.approve.next();
        if result.is_ok() {
            self.approvals.lock().unwrap().push(amount);
            *self.allowance.lock().unwrap() = amount;
        }
        result
    }

    async fn bridge_to_hub(
        &self,
        _token: &TokenDescriptor,
        recipient: B256,
        amount: U256,
        _airdrop: U256,
    ) -> Result<String, BotError> {
        let result = self.bridge.next();
        if result.is_ok() {
            self.bridged.lock().unwrap().push((recipient, amount));
        }
        result
    }

    async fn transfer(
        &self,
        _token: &TokenDescriptor,
        to: Address,
        amount: U256,
    ) -> Result<String, BotError> {
        let result = self.transfer.next();
        if result.is_ok() {
            self.transfers.lock().unwrap().push((to, amount));
        }
        result
    }
}

pub struct FakeHub {
    pub native: ScriptedBalance,
    pub stable: ScriptedBalance,
    pub send: Script<String>,
    /// (destination chain, recipient, amount, fee) per attempt
    pub attempts: Mutex<Vec<(String, Address, U256, u64)>>,
}

impl FakeHub {
    /// 1 APT and `stable` whole hub stablecoins
    pub fn funded(stable: u64) -> Self {
        Self {
            native: ScriptedBalance::constant(tokens(1, 8)),
            stable: ScriptedBalance::constant(tokens(stable, 6)),
            send: Script::ok("0xhubtx".to_string()),
            attempts: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl HubAccount for FakeHub {
    fn address(&self) -> &str {
        HUB_ADDRESS
    }

    async fn coin_balance(&self, coin: &TokenDescriptor) -> Result<U256, BotError> {
        if coin.ticker == "APT" {
            Ok(self.native.next())
        } else {
            Ok(self.stable.next())
        }
    }

    async fn send_to_evm(
        &self,
        destination: &Chain,
        recipient: Address,
        amount: U256,
        fee_octas: u64,
    ) -> Result<String, BotError> {
        self.attempts
            .lock()
            .unwrap()
            .push((destination.name.clone(), recipient, amount, fee_octas));
        self.send.next()
    }
}

pub struct FakeAccounts {
    pub evm: HashMap<String, Arc<FakeEvm>>,
    pub hub: Arc<FakeHub>,
}

impl FakeAccounts {
    pub fn new(evm: Vec<FakeEvm>, hub: FakeHub) -> Self {
        Self {
            evm: evm
                .into_iter()
                .map(|e| (e.chain.name.clone(), Arc::new(e)))
                .collect(),
            hub: Arc::new(hub),
        }
    }

    pub fn evm_on(&self, chain: &str) -> Arc<FakeEvm> {
        self.evm[chain].clone()
    }
}

impl Accounts for FakeAccounts {
    fn evm(&self, chain: &Chain) -> Result<Arc<dyn EvmAccount>, BotError> {
        self.evm
            .get(&chain.name)
            .map(|e| e.clone() as Arc<dyn EvmAccount>)
            .ok_or_else(|| BotError::UnknownChain(chain.name.clone()))
    }

    fn hub(&self) -> Arc<dyn HubAccount> {
        self.hub.clone()
    }
}

#[derive(Default)]
pub struct FakeExchange {
    pub requests: Mutex<Vec<WithdrawRequest>>,
    pub rejections: AtomicU32,
}

impl FakeExchange {
    pub fn rejecting(times: u32) -> Self {
        Self {
            requests: Mutex::new(Vec::new()),
            rejections: AtomicU32::new(times),
        }
    }

    pub fn count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn coins(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.coin.clone())
            .collect()
    }
}

#[async_trait]
impl CentralizedExchange for FakeExchange {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn withdraw(&self, request: &WithdrawRequest) -> Result<(), BotError> {
        self.requests.lock().unwrap().push(request.clone());
        if self.rejections.load(Ordering::SeqCst) > 0 {
            self.rejections.fetch_sub(1, Ordering::SeqCst);
            return Err(BotError::WithdrawFailed {
                exchange: "fake",
                reason: "insufficient exchange balance".to_string(),
            });
        }
        Ok(())
    }

    async fn quote_withdrawal_fee(&self, _coin: &str, _network: &str) -> Option<f64> {
        Some(0.0)
    }
}

pub struct FixedPrice(pub f64);

#[async_trait]
impl PriceFeed for FixedPrice {
    async fn spot_usd(&self, _ticker: &str) -> Result<f64, BotError> {
        Ok(self.0)
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    pub messages: Mutex<Vec<String>>,
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, message: &str) {
        self.messages.lock().unwrap().push(message.to_string());
    }
}

pub fn test_config(overrides: &[(&str, &str)]) -> Arc<Config> {
    let mut vars: HashMap<String, String> = [
        ("BINANCE_API_KEY", "key"),
        ("BINANCE_SECRET", "secret"),
        ("OKX_API_KEY", "key"),
        ("OKX_SECRET", "secret"),
        ("OKX_PASSPHRASE", "pass"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();
    for (k, v) in overrides {
        vars.insert(k.to_string(), v.to_string());
    }
    Arc::new(Config::from_source(|k| vars.get(k).cloned()).unwrap())
}

/// Registry with BSC as the only bridge chain
pub fn single_chain_registry() -> Arc<ChainRegistry> {
    Arc::new(
        ChainRegistry::new(vec![bsc("http://fake")], HubChain::aptos(DEFAULT_APTOS_REST_URL)).unwrap(),
    )
}

/// BSC and Avalanche behind the Aptos hub
pub fn two_chain_registry() -> Arc<ChainRegistry> {
    Arc::new(
        ChainRegistry::new(
            vec![bsc("http://fake"), avalanche("http://fake")],
            HubChain::aptos(DEFAULT_APTOS_REST_URL),
        )
        .unwrap(),
    )
}

pub struct Harness {
    pub ctx: BotContext,
    pub exchange: Arc<FakeExchange>,
    pub sleeper: Arc<RecordingSleeper>,
}

impl Harness {
    pub fn new(config: Arc<Config>, registry: Arc<ChainRegistry>, exchange: FakeExchange) -> Self {
        let exchange = Arc::new(exchange);
        let sleeper = Arc::new(RecordingSleeper::default());
        let funding = Funding::new(config.clone(), Arc::new(FixedPrice(1.0)), sleeper.clone())
            .with_exchange(ExchangeKind::Binance, exchange.clone())
            .with_exchange(ExchangeKind::Okx, exchange.clone());
        let ctx = BotContext::new(config, registry, Arc::new(funding), sleeper.clone());
        Self {
            ctx,
            exchange,
            sleeper,
        }
    }

    pub fn default_bsc() -> Self {
        Self::new(test_config(&[]), single_chain_registry(), FakeExchange::default())
    }
}

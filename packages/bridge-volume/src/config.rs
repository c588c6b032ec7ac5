//! Run configuration
//!
//! Loaded once from `.env` and the environment, validated, then shared
//! read-only as `Arc<Config>` for the lifetime of the process.

use std::collections::HashMap;
use std::env;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use eyre::{eyre, Result, WrapErr};

use crate::chains::DEFAULT_APTOS_REST_URL;
use crate::exchange::ExchangeKind;
use crate::pacing::RandomRange;
use crate::price::DEFAULT_PRICE_FEED_URL;
use crate::redact::Redacted;
use crate::wallets::WalletSource;

/// Networks the funding tables are keyed by (upper-cased chain names)
pub const KNOWN_NETWORKS: &[&str] = &["BSC", "AVALANCHE", "APTOS"];

#[derive(Debug, Clone)]
pub struct Config {
    pub wallets: WalletSource,
    pub volume: VolumeConfig,
    pub funding: FundingConfig,
    pub bridge: BridgeConfig,
    pub binance: Option<BinanceConfig>,
    pub okx: Option<OkxConfig>,
    pub notifications: NotificationConfig,
    pub network: NetworkConfig,
}

/// Volume targets and pacing between steps
#[derive(Debug, Clone)]
pub struct VolumeConfig {
    /// Target notional per wallet, drawn once per run
    pub target_volume_usd: RandomRange<u64>,
    /// Stablecoin balance a bridge leg waits for before moving funds
    pub min_stable_balance: f64,
    pub sleep_between_accounts_secs: RandomRange<u64>,
    pub sleep_between_bridges_secs: RandomRange<u64>,
}

/// Exchange withdrawal sizing, keyed by upper-cased network name
#[derive(Debug, Clone)]
pub struct FundingConfig {
    pub stable_withdraw_usd: RandomRange<f64>,
    pub gas_withdraw_usd: HashMap<String, RandomRange<f64>>,
    pub min_gas_balance: HashMap<String, f64>,
    pub withdraw_exchange: HashMap<String, ExchangeKind>,
}

impl FundingConfig {
    pub fn min_gas_for(&self, network: &str) -> Option<f64> {
        self.min_gas_balance.get(&network.to_uppercase()).copied()
    }

    pub fn gas_withdraw_range_for(&self, network: &str) -> Option<RandomRange<f64>> {
        self.gas_withdraw_usd.get(&network.to_uppercase()).copied()
    }

    pub fn exchange_for(&self, network: &str) -> ExchangeKind {
        self.withdraw_exchange
            .get(&network.to_uppercase())
            .copied()
            .unwrap_or_else(|| default_exchange(network))
    }
}

/// Bridge call tuning
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Upper bound of the random approval multiplier (lower bound is 1)
    pub approval_multiplier_max: f64,
    /// Native fee attached to the first hub bridge attempt, in octas
    pub hub_bridge_fee_octas: u64,
    /// Added to the hub bridge fee on every retry
    pub hub_bridge_fee_step_octas: u64,
    /// Hub gas airdropped along with a bridge-in, in USD (0 disables)
    pub hub_airdrop_usd: f64,
}

#[derive(Clone)]
pub struct BinanceConfig {
    pub api_key: Redacted<String>,
    pub secret: Redacted<String>,
    pub proxy: Option<String>,
}

/// Custom Debug so a proxy URL with credentials never reaches the logs.
impl fmt::Debug for BinanceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BinanceConfig")
            .field("api_key", &self.api_key)
            .field("secret", &self.secret)
            .field("proxy", &self.proxy.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[derive(Clone)]
pub struct OkxConfig {
    pub api_key: Redacted<String>,
    pub secret: Redacted<String>,
    pub passphrase: Redacted<String>,
    pub proxy: Option<String>,
}

impl fmt::Debug for OkxConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OkxConfig")
            .field("api_key", &self.api_key)
            .field("secret", &self.secret)
            .field("passphrase", &self.passphrase)
            .field("proxy", &self.proxy.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[derive(Debug, Clone, Default)]
pub struct NotificationConfig {
    pub telegram_token: Redacted<String>,
    /// `None` disables notifications
    pub chat_id: Option<i64>,
}

impl NotificationConfig {
    pub fn is_enabled(&self) -> bool {
        !self.telegram_token.is_empty() && self.chat_id.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// Per-chain RPC overrides keyed by upper-cased chain name
    pub rpc_overrides: HashMap<String, String>,
    pub hub_rest_url: String,
    pub price_feed_url: String,
}

fn default_exchange(network: &str) -> ExchangeKind {
    if network.eq_ignore_ascii_case("aptos") {
        ExchangeKind::Okx
    } else {
        ExchangeKind::Binance
    }
}

fn default_min_gas(network: &str) -> f64 {
    match network {
        "BSC" => 0.00205,
        "AVALANCHE" => 0.02,
        "APTOS" => 0.11,
        _ => 0.0,
    }
}

fn default_gas_withdraw(network: &str) -> RandomRange<f64> {
    match network {
        "AVALANCHE" => RandomRange::new(1.3, 2.0),
        _ => RandomRange::new(1.5, 2.0),
    }
}

impl Config {
    /// Load configuration from `.env` (if present) and the environment
    pub fn load() -> Result<Self> {
        Self::load_from_file(".env")
    }

    /// Load from a specific .env file path
    pub fn load_from_file(path: &str) -> Result<Self> {
        if Path::new(path).exists() {
            dotenvy::from_filename(path)
                .wrap_err_with(|| format!("Failed to load .env file from {}", path))?;
            tracing::debug!(path, "Loaded .env file");
        }
        Self::from_source(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup
    pub fn from_source<F>(get: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| get(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let wallets = match (
            get("EVM_KEYS_FILE"),
            get("HUB_KEYS_FILE"),
            get("DEPOSIT_ADDRESSES_FILE"),
        ) {
            (Some(evm), Some(hub), Some(deposit)) => WalletSource::Split {
                evm_keys: PathBuf::from(evm),
                hub_keys: PathBuf::from(hub),
                deposit_addresses: PathBuf::from(deposit),
            },
            (None, None, None) => WalletSource::Combined(PathBuf::from(
                get("WALLETS_FILE").unwrap_or_else(|| "data/wallets.csv".to_string()),
            )),
            _ => {
                return Err(eyre!(
                    "EVM_KEYS_FILE, HUB_KEYS_FILE and DEPOSIT_ADDRESSES_FILE must be set together"
                ))
            }
        };

        let volume = VolumeConfig {
            target_volume_usd: parse_or(&get, "TARGET_VOLUME_USD", RandomRange::new(2000, 4000))?,
            min_stable_balance: parse_or(&get, "MIN_STABLE_BALANCE", 500.0)?,
            sleep_between_accounts_secs: parse_or(
                &get,
                "SLEEP_BETWEEN_ACCOUNTS",
                RandomRange::new(10, 100),
            )?,
            sleep_between_bridges_secs: parse_or(
                &get,
                "SLEEP_BETWEEN_BRIDGES",
                RandomRange::new(120, 240),
            )?,
        };

        let mut gas_withdraw_usd = HashMap::new();
        let mut min_gas_balance = HashMap::new();
        let mut withdraw_exchange = HashMap::new();
        for network in KNOWN_NETWORKS {
            gas_withdraw_usd.insert(
                network.to_string(),
                parse_or(
                    &get,
                    &format!("GAS_WITHDRAW_USD_{}", network),
                    default_gas_withdraw(network),
                )?,
            );
            min_gas_balance.insert(
                network.to_string(),
                parse_or(&get, &format!("MIN_GAS_{}", network), default_min_gas(network))?,
            );
            withdraw_exchange.insert(
                network.to_string(),
                parse_or(
                    &get,
                    &format!("WITHDRAW_EXCHANGE_{}", network),
                    default_exchange(network),
                )?,
            );
        }

        let funding = FundingConfig {
            stable_withdraw_usd: parse_or(
                &get,
                "STABLE_WITHDRAW_USD",
                RandomRange::new(1001.0, 2001.0),
            )?,
            gas_withdraw_usd,
            min_gas_balance,
            withdraw_exchange,
        };

        let bridge = BridgeConfig {
            approval_multiplier_max: parse_or(&get, "APPROVAL_MULTIPLIER_MAX", 3.0)?,
            hub_bridge_fee_octas: parse_or(&get, "HUB_BRIDGE_FEE_OCTAS", 11_000_000)?,
            hub_bridge_fee_step_octas: parse_or(&get, "HUB_BRIDGE_FEE_STEP_OCTAS", 1_100_000)?,
            hub_airdrop_usd: parse_or(&get, "HUB_AIRDROP_USD", 0.0)?,
        };

        let binance = match (get("BINANCE_API_KEY"), get("BINANCE_SECRET")) {
            (Some(api_key), Some(secret)) => Some(BinanceConfig {
                api_key: api_key.into(),
                secret: secret.into(),
                proxy: get("BINANCE_PROXY"),
            }),
            _ => None,
        };

        let okx = match (get("OKX_API_KEY"), get("OKX_SECRET"), get("OKX_PASSPHRASE")) {
            (Some(api_key), Some(secret), Some(passphrase)) => Some(OkxConfig {
                api_key: api_key.into(),
                secret: secret.into(),
                passphrase: passphrase.into(),
                proxy: get("OKX_PROXY"),
            }),
            _ => None,
        };

        // A missing, unparsable or -1 chat id disables notifications
        let notifications = NotificationConfig {
            telegram_token: get("TG_TOKEN").unwrap_or_default().into(),
            chat_id: get("TG_CHAT_ID")
                .and_then(|v| v.parse::<i64>().ok())
                .filter(|id| *id != -1),
        };

        let rpc_overrides = KNOWN_NETWORKS
            .iter()
            .filter_map(|n| get(&format!("RPC_URL_{}", n)).map(|url| (n.to_string(), url)))
            .collect();

        let network = NetworkConfig {
            rpc_overrides,
            hub_rest_url: get("HUB_REST_URL").unwrap_or_else(|| DEFAULT_APTOS_REST_URL.to_string()),
            price_feed_url: get("PRICE_FEED_URL")
                .unwrap_or_else(|| DEFAULT_PRICE_FEED_URL.to_string()),
        };

        let config = Config {
            wallets,
            volume,
            funding,
            bridge,
            binance,
            okx,
            notifications,
            network,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        for (key, value) in self.float_settings() {
            if !value.is_finite() {
                return Err(eyre!("{} must be a finite number, got {}", key, value));
            }
        }

        if self.volume.min_stable_balance <= 0.0 {
            return Err(eyre!("MIN_STABLE_BALANCE must be positive"));
        }

        if self.volume.target_volume_usd.max == 0 {
            return Err(eyre!("TARGET_VOLUME_USD upper bound must be positive"));
        }

        if self.funding.stable_withdraw_usd.min <= 0.0 {
            return Err(eyre!("STABLE_WITHDRAW_USD must be positive"));
        }

        if self.bridge.approval_multiplier_max < 1.0 {
            return Err(eyre!("APPROVAL_MULTIPLIER_MAX cannot be below 1"));
        }

        for network in KNOWN_NETWORKS {
            match self.funding.exchange_for(network) {
                ExchangeKind::Binance if self.binance.is_none() => {
                    return Err(eyre!(
                        "{} withdrawals use Binance but BINANCE_API_KEY/BINANCE_SECRET are not set",
                        network
                    ));
                }
                ExchangeKind::Okx if self.okx.is_none() => {
                    return Err(eyre!(
                        "{} withdrawals use OKX but OKX_API_KEY/OKX_SECRET/OKX_PASSPHRASE are not set",
                        network
                    ));
                }
                _ => {}
            }
        }

        Ok(())
    }
}

impl Config {
    /// Every float setting, labelled with the variable it came from
    fn float_settings(&self) -> Vec<(String, f64)> {
        let mut values = vec![
            ("MIN_STABLE_BALANCE".to_string(), self.volume.min_stable_balance),
            ("STABLE_WITHDRAW_USD".to_string(), self.funding.stable_withdraw_usd.min),
            ("STABLE_WITHDRAW_USD".to_string(), self.funding.stable_withdraw_usd.max),
            ("APPROVAL_MULTIPLIER_MAX".to_string(), self.bridge.approval_multiplier_max),
            ("HUB_AIRDROP_USD".to_string(), self.bridge.hub_airdrop_usd),
        ];
        for (network, range) in &self.funding.gas_withdraw_usd {
            let key = format!("GAS_WITHDRAW_USD_{}", network);
            values.push((key.clone(), range.min));
            values.push((key, range.max));
        }
        for (network, min_gas) in &self.funding.min_gas_balance {
            values.push((format!("MIN_GAS_{}", network), *min_gas));
        }
        values
    }
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw
            .parse()
            .map_err(|e| eyre!("{} has an invalid value '{}': {}", key, raw, e)),
        None => Ok(default),
    }
}

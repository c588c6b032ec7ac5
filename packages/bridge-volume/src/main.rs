use std::sync::Arc;

use eyre::WrapErr;

use bridge_volume::accounts::{Accounts, LiveAccounts};
use bridge_volume::chains::ChainRegistry;
use bridge_volume::config::Config;
use bridge_volume::context::BotContext;
use bridge_volume::driver::Driver;
use bridge_volume::exchange::{BinanceClient, ExchangeKind, OkxClient};
use bridge_volume::funding::Funding;
use bridge_volume::notify::TelegramNotifier;
use bridge_volume::pacing::TokioSleeper;
use bridge_volume::price::CryptoComparePriceFeed;
use bridge_volume::wallets::{WalletRecord, WalletStore};

fn main() -> eyre::Result<()> {
    color_eyre::install()?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async_main())
}

async fn async_main() -> eyre::Result<()> {
    init_logging();

    tracing::info!("Starting bridge volume bot");

    let config = Arc::new(Config::load()?);
    let registry = Arc::new(
        ChainRegistry::mainnet(&config.network.rpc_overrides, &config.network.hub_rest_url)
            .wrap_err("Failed to build chain registry")?,
    );
    tracing::info!(
        chains = ?registry.network_names(),
        wallets = ?config.wallets,
        target_volume = %config.volume.target_volume_usd,
        "Configuration loaded"
    );

    let sleeper = Arc::new(TokioSleeper);
    let prices = Arc::new(CryptoComparePriceFeed::new(&config.network.price_feed_url)?);

    let mut funding = Funding::new(config.clone(), prices, sleeper.clone());
    if let Some(binance) = &config.binance {
        funding = funding.with_exchange(
            ExchangeKind::Binance,
            Arc::new(BinanceClient::new(binance.clone())?),
        );
    }
    if let Some(okx) = &config.okx {
        funding = funding.with_exchange(ExchangeKind::Okx, Arc::new(OkxClient::new(okx.clone())?));
    }

    let ctx = BotContext::new(config.clone(), registry.clone(), Arc::new(funding), sleeper);

    let hub = registry.hub().clone();
    let mut driver = Driver::new(
        ctx,
        WalletStore::new(config.wallets.clone()),
        Box::new(move |record: &WalletRecord| {
            let accounts: Arc<dyn Accounts> = Arc::new(LiveAccounts::new(
                &record.evm_key,
                &record.hub_key,
                hub.clone(),
            )?);
            Ok(accounts)
        }),
    );
    if let Some(notifier) = TelegramNotifier::from_config(&config.notifications) {
        driver = driver.with_notifier(Arc::new(notifier));
    }

    tokio::select! {
        result = driver.run() => {
            let summary = result?;
            tracing::info!(
                completed = summary.completed,
                failed = summary.failed,
                total_volume = summary.total_volume,
                "Completed run"
            );
        }
        _ = wait_for_shutdown_signal() => {
            tracing::warn!("Run interrupted, the current wallet stays pending");
        }
    }

    tracing::info!("Bridge volume bot stopped");
    Ok(())
}

/// Initialize tracing/logging with structured output
fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,bridge_volume=debug"));

    let json = std::env::var("LOG_FORMAT").map(|v| v == "json").unwrap_or(false);
    if json {
        tracing_subscriber::registry()
            .with(fmt::layer().json().with_target(true))
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_target(true))
            .with(filter)
            .init();
    }
}

/// Wait for shutdown signals (SIGINT/SIGTERM)
async fn wait_for_shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }
}

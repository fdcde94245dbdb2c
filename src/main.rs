use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::info;

use stockhawk::bot::Bot;
use stockhawk::browser::ChromeSession;
use stockhawk::config::AppConfig;
use stockhawk::driver::{DriverTimings, PurchaseDriver};
use stockhawk::notify::{DiscordChannel, LogChannel, Notifier, NotifyChannel, PushoverChannel};
use stockhawk::retry::RetryPolicy;
use stockhawk::scraper::StockScraper;
use stockhawk::secrets::{get_json, EnvSecretManager, PaymentCard, StoreCredentials};

/// Watches vendor stock and buys prioritized GPU models as they appear.
#[derive(Debug, Parser)]
#[command(name = "stockhawk", version, about)]
struct Cli {
    /// Buyer profile; selects which credential set is loaded.
    buyer: String,

    /// Models to buy, most wanted first.
    #[arg(required = true)]
    buy_priority: Vec<String>,

    /// Stop after this many successful purchases.
    #[arg(long, default_value_t = 1)]
    buy_limit: usize,

    /// Base wait in seconds for page elements during checkout.
    #[arg(long, default_value_t = 2)]
    timeout: u64,

    /// Push transport for alerts.
    #[arg(long, value_enum, default_value = "log")]
    notifier: NotifierKind,
}

#[derive(Debug, Clone, clap::ValueEnum)]
enum NotifierKind {
    Discord,
    Pushover,
    Log,
}

fn check_priority(buy_priority: &[String], buy_limit: usize, known_models: &[String]) -> Result<()> {
    for (i, model) in buy_priority.iter().enumerate() {
        if !known_models.contains(model) {
            bail!(
                "unknown model '{}'; known models are: {}",
                model,
                known_models.join(", ")
            );
        }
        if buy_priority[..i].contains(model) {
            bail!("model '{}' appears twice in the priority list", model);
        }
    }
    // Each model is bought at most once, so a limit beyond the list length
    // could never be met and the loop would poll forever
    if buy_limit > buy_priority.len() {
        bail!(
            "buy limit {} exceeds the {} prioritized model(s)",
            buy_limit,
            buy_priority.len()
        );
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("stockhawk=debug".parse()?),
        )
        .init();

    let cli = Cli::parse();
    let config = AppConfig::from_env().context("loading configuration")?;
    check_priority(&cli.buy_priority, cli.buy_limit, &config.known_models())?;

    info!(
        buyer = %cli.buyer,
        buy_limit = cli.buy_limit,
        "Starting stockhawk for {:?}",
        cli.buy_priority
    );

    let secrets = EnvSecretManager::new(&cli.buyer);
    let channel: Box<dyn NotifyChannel> = match cli.notifier {
        NotifierKind::Discord => Box::new(
            DiscordChannel::from_secrets(&secrets)
                .await
                .context("loading discord secret")?,
        ),
        NotifierKind::Pushover => Box::new(
            PushoverChannel::from_secrets(&secrets)
                .await
                .context("loading pushover secret")?,
        ),
        NotifierKind::Log => Box::new(LogChannel),
    };
    let notifier = Arc::new(Notifier::new(channel));

    let credentials: StoreCredentials = get_json(&secrets, "store")
        .await
        .context("loading store credentials")?;
    let card: PaymentCard = get_json(&secrets, "card")
        .await
        .context("loading payment card")?;

    let session = Arc::new(ChromeSession::launch(&config.browser).context("launching browser")?);
    let driver = PurchaseDriver::new(
        session,
        Arc::clone(&notifier),
        credentials,
        card,
        config.store.clone(),
        RetryPolicy::default(),
        DriverTimings::from_step(Duration::from_secs(cli.timeout)),
    );

    driver.accept_cookies().await.context("cookie consent")?;
    driver.login().await.context("store login")?;

    let scraper = StockScraper::new(config.scraper.clone(), Arc::clone(&notifier))
        .context("building scraper")?;

    let mut bot = Bot::new(
        Box::new(scraper),
        Box::new(driver),
        Arc::clone(&notifier),
        cli.buy_priority,
        cli.buy_limit,
        &config.bot,
    );

    tokio::select! {
        _ = bot.run() => {
            info!("Purchase budget met, exiting");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down...");
        }
    }

    Ok(())
}

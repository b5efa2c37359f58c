//! fxdesk CLI
//!
//! Runs one desk usecase per invocation; the login session persists in the
//! data directory between runs.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use fxdesk_engine::{DeskConfig, RateView, TradeDesk};

mod render;

/// Currency and crypto portfolio trading simulator
#[derive(Parser, Debug)]
#[command(name = "fxdesk", version)]
#[command(about = "Currency and crypto portfolio trading simulator")]
struct Args {
    /// Configuration file (defaults to ./fxdesk.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a user and its portfolio
    Register {
        #[arg(long)]
        username: String,
        #[arg(long)]
        password: String,
    },
    /// Log in; later commands act for this user
    Login {
        #[arg(long)]
        username: String,
        #[arg(long)]
        password: String,
    },
    Logout,
    /// Show the logged-in user
    Whoami,
    /// Buy a currency with the base currency
    Buy {
        #[arg(long)]
        currency: String,
        #[arg(long)]
        amount: Decimal,
    },
    /// Sell a currency for the base currency
    Sell {
        #[arg(long)]
        currency: String,
        #[arg(long)]
        amount: Decimal,
    },
    /// Show holdings and their value
    ShowPortfolio {
        /// Valuation currency
        #[arg(long)]
        base: Option<String>,
    },
    /// Fetch fresh rates from every source, or one
    UpdateRates {
        #[arg(long)]
        source: Option<String>,
    },
    /// Show cached rates
    ShowRates {
        /// Only the N highest rates
        #[arg(long, conflicts_with = "currency")]
        top: Option<usize>,
        /// Only pairs involving this currency
        #[arg(long)]
        currency: Option<String>,
    },
    /// Show recorded rates, newest first
    ShowHistory {
        #[arg(long)]
        currency: Option<String>,
        #[arg(long, default_value = "20")]
        limit: usize,
    },
    /// Refresh rates in the background until stopped
    Schedule {
        /// Run duration in seconds (0 = until Ctrl+C)
        #[arg(long, default_value = "0")]
        duration: u64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = DeskConfig::load(args.config.as_deref())?;
    init_logging(args.json, &config.log_level);

    let desk = TradeDesk::open(config)?;
    let result = run(&desk, args.command).await;
    desk.shutdown().await;
    result
}

fn init_logging(json: bool, default_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let (plain, json) = if json {
        (None, Some(fmt::layer().json().with_writer(std::io::stderr)))
    } else {
        (Some(fmt::layer().with_writer(std::io::stderr)), None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(plain)
        .with(json)
        .init();
}

fn rate_view(top: Option<usize>, currency: Option<String>) -> RateView {
    match (top, currency) {
        (Some(n), _) => RateView::Top(n),
        (None, Some(code)) => RateView::Currency(code),
        (None, None) => RateView::All,
    }
}

async fn run(desk: &TradeDesk, command: Command) -> anyhow::Result<()> {
    let base = desk.base().code().to_string();

    match command {
        Command::Register { username, password } => {
            let user = desk.register(&username, &password).await?;
            println!(
                "Registered '{}' (id {}) with {} {}",
                user.username,
                user.id,
                desk.config().initial_balance,
                base
            );
        }
        Command::Login { username, password } => {
            let session = desk.login(&username, &password).await?;
            println!("Logged in as '{}'", session.username);
        }
        Command::Logout => match desk.logout().await? {
            Some(session) => println!("Logged out '{}'", session.username),
            None => println!("Nobody was logged in"),
        },
        Command::Whoami => match desk.whoami()? {
            Some(session) => println!("{} (id {})", session.username, session.user_id),
            None => println!("Not logged in"),
        },
        Command::Buy { currency, amount } => {
            let receipt = desk.buy(&currency, amount).await?;
            println!("{}", render::receipt(&receipt, &base));
        }
        Command::Sell { currency, amount } => {
            let receipt = desk.sell(&currency, amount).await?;
            println!("{}", render::receipt(&receipt, &base));
        }
        Command::ShowPortfolio { base } => {
            let (_, valuation) = desk.show_portfolio(base.as_deref()).await?;
            println!("{}", render::valuation(&valuation));
        }
        Command::UpdateRates { source } => {
            let report = desk.update_rates(source.as_deref()).await?;
            println!("{}", render::refresh_report(&report));
            if report.success_count() == 0 && report.failure_count() > 0 {
                anyhow::bail!("no rate could be updated");
            }
        }
        Command::ShowRates { top, currency } => {
            let rates = desk.show_rates(rate_view(top, currency)).await?;
            println!("{}", render::rates(&rates));
        }
        Command::ShowHistory { currency, limit } => {
            let records = desk.show_history(currency.as_deref(), limit).await?;
            println!("{}", render::history(&records));
        }
        Command::Schedule { duration } => schedule(desk, duration).await?,
    }

    Ok(())
}

async fn schedule(desk: &TradeDesk, duration: u64) -> anyhow::Result<()> {
    desk.start_scheduler().await?;
    info!(
        fiat_interval_secs = desk.config().fiat_refresh_interval_seconds,
        crypto_interval_secs = desk.config().crypto_refresh_interval_seconds,
        "Scheduler running; press Ctrl+C to stop"
    );

    if duration > 0 {
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_secs(duration)) => {
                info!(duration_secs = duration, "Run duration elapsed");
            }
            signal = tokio::signal::ctrl_c() => {
                signal?;
                info!("Shutdown signal received");
            }
        }
    } else {
        tokio::signal::ctrl_c().await?;
        info!("Shutdown signal received");
    }

    Ok(())
}

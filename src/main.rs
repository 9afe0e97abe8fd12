//! # SubTrack CLI
//!
//! Usage:
//!   subtrack init                         # Write a default config
//!   subtrack tick                         # One reminder pass now
//!   subtrack tick --dry-run               # Show what would be sent
//!   subtrack run --interval-secs 60       # Reminder loop
//!   subtrack lunar 2024-02-10             # Solar → lunar
//!   subtrack lunar 2023-2-1 --to-solar --leap
//!   subtrack next-due 2024-01-31 1 month --reference 2024-03-15
//!   subtrack import subs.json | export subs.json
//!   subtrack remove <id>
//!   subtrack failures --limit 20
//!   subtrack test-notify [--channel bark]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use subtrack_calendar::lunar::{self, LunarDate};
use subtrack_calendar::{lunar_to_solar, next_due_date, solar_date_to_lunar};
use subtrack_core::config::NotificationConfig;
use subtrack_core::types::solar_date;
use subtrack_core::{Period, PeriodUnit, SubTrackConfig, SubTrackError};
use subtrack_scheduler::{
    FailureLog, MemoryStore, NotificationDispatcher, RateLimiter, ReminderEngine, SqliteStore,
    SubscriptionFile, TickReport, run_every,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "subtrack", version, about = "📅 SubTrack — subscription expiry reminders")]
struct Cli {
    /// Config file (default ~/.subtrack/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write a default config file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Run one reminder pass
    Tick {
        /// Pretend the current instant is this RFC 3339 timestamp
        #[arg(long)]
        at: Option<String>,
        /// Scan a copy of the store and send nothing
        #[arg(long)]
        dry_run: bool,
    },
    /// Run reminder passes periodically
    Run {
        /// Seconds between passes
        #[arg(long, default_value = "60")]
        interval_secs: u64,
    },
    /// Convert between solar and lunar dates
    Lunar {
        /// YYYY-MM-DD (solar, or lunar with --to-solar)
        date: String,
        /// Treat DATE as a lunar date and print the solar date
        #[arg(long)]
        to_solar: bool,
        /// The lunar month is the leap month (with --to-solar)
        #[arg(long)]
        leap: bool,
    },
    /// Compute the next due date of a recurring subscription
    NextDue {
        /// Current expiry date (YYYY-MM-DD)
        expiry: String,
        /// Period length
        value: i32,
        /// day, month or year
        unit: PeriodUnit,
        /// Step through the lunar calendar
        #[arg(long)]
        lunar: bool,
        /// Reference date (default: today)
        #[arg(long)]
        reference: Option<String>,
    },
    /// Import subscriptions from a JSON file
    Import { file: PathBuf },
    /// Export all subscriptions to a JSON file
    Export { file: PathBuf },
    /// Delete a subscription
    Remove { id: String },
    /// Show recent failed dispatches
    Failures {
        #[arg(long, default_value = "20")]
        limit: usize,
    },
    /// Send a test message through every enabled channel
    TestNotify {
        /// Only this channel (must be configured)
        #[arg(long)]
        channel: Option<String>,
    },
}

fn load_config(path: Option<&Path>) -> Result<SubTrackConfig> {
    let config = match path {
        Some(p) => SubTrackConfig::load_from(p)?,
        None => SubTrackConfig::load()?,
    };
    Ok(config)
}

fn open_store(config: &SubTrackConfig) -> Result<Arc<SqliteStore>> {
    let path = config.storage.resolved_db_path();
    let store = SqliteStore::open(&path)
        .with_context(|| format!("opening store at {}", path.display()))?;
    Ok(Arc::new(store))
}

fn build_dispatcher(config: &SubTrackConfig, store: Arc<SqliteStore>) -> NotificationDispatcher {
    let client = reqwest::Client::new();
    let senders = subtrack_channels::build_senders(&config.notification, client);
    NotificationDispatcher::new(senders, &config.notification).with_audit(FailureLog::new(store))
}

fn parse_date(raw: &str) -> Result<NaiveDate> {
    solar_date::parse(raw).with_context(|| format!("'{raw}' is not a YYYY-MM-DD date"))
}

fn print_tick(report: &TickReport) {
    println!(
        "⏰ {} — {} due, {} notified",
        report.local_time.format("%Y-%m-%d %H:%M"),
        report.due,
        report.notified.len()
    );
    for d in &report.notified {
        println!(
            "   • {} ({}): {}",
            d.subscription.name,
            d.subscription.expiry_date,
            subtrack_scheduler::notify::status_line(d.days_until)
        );
    }
    if let Some(dispatch) = &report.dispatch {
        for o in &dispatch.outcomes {
            println!("   {} {}", if o.success { "✅" } else { "❌" }, o.channel);
        }
    }
}

async fn tick_once(config_path: Option<&Path>, now: DateTime<Utc>) -> subtrack_core::Result<TickReport> {
    // Config and channels are rebuilt on every pass.
    let config = load_config(config_path).map_err(|e| SubTrackError::config(e.to_string()))?;
    let store = open_store(&config).map_err(|e| SubTrackError::store(e.to_string()))?;
    match store.purge_expired_counters() {
        Ok(0) => {}
        Ok(n) => tracing::debug!("🧹 Purged {n} expired counters"),
        Err(e) => tracing::warn!("⚠️ Counter purge failed: {e}"),
    }
    let dispatcher = build_dispatcher(&config, store.clone());
    ReminderEngine::new(&config, store, dispatcher).tick(now).await
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "subtrack=debug,subtrack_scheduler=debug,subtrack_channels=debug"
    } else {
        "subtrack=info,subtrack_scheduler=info,subtrack_channels=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .init();

    let config_path = cli.config.as_deref();

    match cli.command {
        Command::Init { force } => {
            let path = config_path.map(Path::to_path_buf).unwrap_or_else(SubTrackConfig::default_path);
            if path.exists() && !force {
                bail!("{} already exists (use --force to overwrite)", path.display());
            }
            SubTrackConfig::default().save_to(&path)?;
            println!("✅ Config written to {}", path.display());
        }

        Command::Tick { at, dry_run } => {
            let now = match at {
                Some(raw) => DateTime::parse_from_rfc3339(&raw)
                    .with_context(|| format!("'{raw}' is not an RFC 3339 timestamp"))?
                    .with_timezone(&Utc),
                None => Utc::now(),
            };
            let report = if dry_run {
                let config = load_config(config_path)?;
                let copy = Arc::new(MemoryStore::with_subscriptions(open_store(&config)?.list_all()?));
                let silent = NotificationDispatcher::new(Vec::new(), &NotificationConfig::default());
                ReminderEngine::new(&config, copy, silent).tick(now).await?
            } else {
                tick_once(config_path, now).await?
            };
            print_tick(&report);
        }

        Command::Run { interval_secs } => {
            let config_path = cli.config.clone();
            run_every(interval_secs, move || {
                let config_path = config_path.clone();
                async move { tick_once(config_path.as_deref(), Utc::now()).await }
            })
            .await;
        }

        Command::Lunar { date, to_solar, leap } => {
            if to_solar {
                let parts: Vec<u32> = date
                    .split('-')
                    .map(|p| p.trim().parse::<u32>())
                    .collect::<std::result::Result<_, _>>()
                    .with_context(|| format!("'{date}' is not YYYY-MM-DD"))?;
                let &[year, month, day] = parts.as_slice() else {
                    bail!("'{date}' is not YYYY-MM-DD");
                };
                let lunar_date = LunarDate::new(year as i32, month, day, leap);
                let solar = lunar_to_solar(&lunar_date)?;
                let days = lunar::days_from_today(&lunar_date)?;
                println!("{lunar_date} → {solar} ({})", subtrack_scheduler::notify::status_line(days));
            } else {
                let solar = parse_date(&date)?;
                let l = solar_date_to_lunar(solar)?;
                println!(
                    "{solar} → {l} ({}年, {})",
                    lunar::gan_zhi_year(l.year),
                    lunar::zodiac(l.year)
                );
            }
        }

        Command::NextDue { expiry, value, unit, lunar, reference } => {
            let expiry = parse_date(&expiry)?;
            let reference = match reference {
                Some(raw) => parse_date(&raw)?,
                None => Utc::now().date_naive(),
            };
            let next = next_due_date(expiry, Period::new(value, unit), lunar, reference);
            println!("{next}");
        }

        Command::Import { file } => {
            let config = load_config(config_path)?;
            let store = open_store(&config)?;
            let n = SubscriptionFile::import(&file, store.as_ref()).await?;
            println!("📥 Imported {n} subscriptions");
        }

        Command::Export { file } => {
            let config = load_config(config_path)?;
            let subs = open_store(&config)?.list_all()?;
            SubscriptionFile::save(&file, &subs)?;
            println!("💾 Exported {} subscriptions to {}", subs.len(), file.display());
        }

        Command::Remove { id } => {
            let config = load_config(config_path)?;
            if open_store(&config)?.delete(&id)? {
                println!("🗑️ Removed '{id}'");
            } else {
                bail!("no subscription with id '{id}'");
            }
        }

        Command::Failures { limit } => {
            let config = load_config(config_path)?;
            let entries = FailureLog::new(open_store(&config)?).recent(limit).await?;
            if entries.is_empty() {
                println!("No failed dispatches recorded.");
            }
            for e in entries {
                let failed: Vec<&str> = e.failures.iter().map(|o| o.channel.as_str()).collect();
                let ok: Vec<&str> = e.successes.iter().map(|o| o.channel.as_str()).collect();
                println!(
                    "{}  {}  [{}]  failed: {}  ok: {}",
                    e.timestamp.format("%Y-%m-%d %H:%M:%S"),
                    e.title,
                    e.tag.as_deref().unwrap_or("-"),
                    failed.join(","),
                    ok.join(",")
                );
            }
        }

        Command::TestNotify { channel } => {
            let mut config = load_config(config_path)?;
            if let Some(name) = channel {
                config.notification.enabled_notifiers = vec![name];
            }
            let store = open_store(&config)?;
            let limiter = RateLimiter::new(store.clone(), "test_notify", config.rate_limit.test_notify)
                .with_timeout(config.storage.store_timeout());
            let dispatcher = build_dispatcher(&config, store.clone());
            if dispatcher.channel_names().is_empty() {
                println!("🔕 No notifiers enabled in config");
                return Ok(());
            }
            let engine = ReminderEngine::new(&config, store, dispatcher);
            let report = engine.test_notify(&limiter, &whoami::username()).await?;
            for o in &report.outcomes {
                println!("{} {}", if o.success { "✅" } else { "❌" }, o.channel);
            }
        }
    }

    Ok(())
}

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use tracing::warn;

use lookout::config::Config;
use lookout::notify::{Notifier, NoopNotifier};
use lookout::pipeline::monitor::{self, RunSummary};
use lookout::sources::ReviewSource;

/// Lookout: review monitoring and alerting.
///
/// Polls the app store, the support forum, and the public review site for
/// new customer reviews, detects moderator/company replies, and posts
/// alerts to a Slack channel.
#[derive(Parser)]
#[command(name = "lookout", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the seen-set database
    Init,

    /// Run the monitors and dispatch alerts
    Run {
        /// Run a single source instead of all enabled ones
        #[arg(long, value_enum)]
        source: Option<SourceArg>,
    },

    /// Show system status (DB stats, per-source seen counts)
    Status,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum SourceArg {
    Appstore,
    Forum,
    Reviewsite,
}

impl SourceArg {
    fn source(self) -> lookout::model::Source {
        match self {
            SourceArg::Appstore => lookout::model::Source::AppStore,
            SourceArg::Forum => lookout::model::Source::Forum,
            SourceArg::Reviewsite => lookout::model::Source::ReviewSite,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if missing)
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("lookout=info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init => {
            let config = Config::load()?;
            let conn = lookout::db::initialize(&config.db_path)?;
            let table_count = lookout::db::schema::table_count(&conn)?;
            println!("Database initialized at: {}", config.db_path);
            println!("Tables created: {table_count}");
            println!("\nLookout is ready. Next step: set up your .env file");
            println!("  (see .env.example for required variables)");
            println!("\nThen run: cargo run -- run");
        }

        Commands::Run { source } => {
            let config = Config::load()?;
            let conn = lookout::db::open(&config.db_path)?;

            let notifier: Box<dyn Notifier> = if config.webhook_url.is_empty() {
                warn!("SLACK_WEBHOOK_URL not set, alerts will not be delivered");
                println!(
                    "{}",
                    "Notifications disabled (SLACK_WEBHOOK_URL not set) — dry run.".yellow()
                );
                Box::new(NoopNotifier)
            } else {
                Box::new(lookout::notify::slack::SlackNotifier::new(
                    config.webhook_url.clone(),
                ))
            };

            let mut summaries = Vec::new();
            let mut failures = Vec::new();

            for selected in selected_sources(source, &config) {
                // Any failure — missing env var, adapter construction,
                // fetch, store — stops this source only; the rest still run
                match run_source(selected, &config, &conn, notifier.as_ref()).await {
                    Ok(summary) => summaries.push(summary),
                    Err(e) => {
                        eprintln!("  {} {}", "Error:".red(), e);
                        failures.push(selected.source());
                    }
                }
            }

            println!("\n{}", "Run complete.".bold());
            for s in &summaries {
                println!(
                    "  {:<12} {} fetched, {} new, {} updated, {} notified{}",
                    s.source.display_name(),
                    s.fetched,
                    s.new,
                    s.updated,
                    s.notified,
                    if s.notify_failed > 0 {
                        format!(" ({} failed)", s.notify_failed).red().to_string()
                    } else {
                        String::new()
                    },
                );
            }
            if !failures.is_empty() {
                let names: Vec<&str> = failures.iter().map(|s| s.display_name()).collect();
                anyhow::bail!("{} source(s) failed: {}", failures.len(), names.join(", "));
            }
        }

        Commands::Status => {
            let config = Config::load()?;
            let conn = lookout::db::open(&config.db_path)?;
            lookout::status::show(&conn, &config)?;
        }
    }

    Ok(())
}

/// Which sources this invocation runs: the one named on the command line,
/// or every source enabled in configuration.
fn selected_sources(requested: Option<SourceArg>, config: &Config) -> Vec<SourceArg> {
    match requested {
        Some(one) => vec![one],
        None => {
            let mut out = Vec::new();
            if config.appstore.enabled {
                out.push(SourceArg::Appstore);
            }
            if config.forum.enabled {
                out.push(SourceArg::Forum);
            }
            if config.reviewsite.enabled {
                out.push(SourceArg::Reviewsite);
            }
            out
        }
    }
}

/// Validate one source's configuration, build its adapter, and run it.
/// Fallible end to end so the caller can treat a missing env var the same
/// as a mid-run failure: log, count, move on to the next source.
async fn run_source(
    selected: SourceArg,
    config: &Config,
    conn: &rusqlite::Connection,
    notifier: &dyn Notifier,
) -> Result<RunSummary> {
    match selected {
        SourceArg::Appstore => {
            config.require_appstore()?;
            let adapter = lookout::sources::appstore::AppStoreSource::new(
                config.appstore.app_id.clone(),
            )?;
            Ok(run_one(&adapter, conn, notifier, config.appstore.hours_back, None).await?)
        }
        SourceArg::Forum => {
            config.require_forum()?;
            let adapter = lookout::sources::forum::ForumSource::new(&config.forum)?;
            Ok(run_one(&adapter, conn, notifier, config.forum.hours_back, None).await?)
        }
        SourceArg::Reviewsite => {
            config.require_reviewsite()?;
            let adapter = lookout::sources::reviewsite::ReviewSiteSource::new(
                config.reviewsite.company.clone(),
                config.reviewsite.max_pages,
            )?;
            Ok(run_one(
                &adapter,
                conn,
                notifier,
                config.reviewsite.hours_back,
                Some(config.reviewsite.rating_threshold),
            )
            .await?)
        }
    }
}

async fn run_one(
    adapter: &dyn ReviewSource,
    conn: &rusqlite::Connection,
    notifier: &dyn Notifier,
    hours_back: i64,
    max_rating: Option<u8>,
) -> Result<RunSummary, lookout::error::RunError> {
    let source = adapter.source();
    println!("Checking {}...", source.display_name().bold());
    let summary = monitor::run(adapter, conn, notifier, hours_back, max_rating).await?;
    println!(
        "  {} {} new, {} updated",
        "✓".green(),
        summary.new,
        summary.updated,
    );
    Ok(summary)
}

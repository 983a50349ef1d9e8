use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use proxy_pool::pool::{CheckerConfig, ParserKind, PoolConfig, ProxyPool, SchedulerConfig};
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// A self-refreshing proxy pool with source crawling, health checks and rotation
#[derive(Parser)]
#[command(name = "proxy-pool")]
#[command(about = "A self-refreshing proxy pool with source crawling, health checks and rotation")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Database file path
    #[arg(short, long, default_value = "proxies.db")]
    database: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the pool with its background refresh loop
    Run {
        /// Seconds between refresh cycles
        #[arg(long, default_value = "3600")]
        interval: u64,
        /// Seconds to back off after a failed cycle
        #[arg(long, default_value = "60")]
        cooldown: u64,
        /// Number of concurrent probes
        #[arg(short = 'n', long, default_value = "10")]
        concurrency: usize,
    },
    /// Fetch candidates from all enabled sources once
    Fetch,
    /// Probe all proxies due for a check once
    Check {
        /// Number of concurrent probes
        #[arg(short = 'n', long, default_value = "10")]
        concurrency: usize,
        /// Timeout in seconds for each probe request
        #[arg(long, default_value = "10")]
        timeout: u64,
    },
    /// Print a rotation-selected working proxy
    Get,
    /// Show pool totals
    Status,
    /// Manage proxy list sources
    Sources {
        #[command(subcommand)]
        command: SourceCommands,
    },
}

#[derive(Subcommand)]
enum SourceCommands {
    /// List all registered sources
    List,
    /// Register a new source
    Add {
        /// Source URL
        url: String,
        /// Parser kind (simple_list, json, custom_format)
        #[arg(short, long, default_value = "simple_list")]
        parser: String,
    },
    /// Disable a source by URL
    Disable {
        /// Source URL
        url: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    // Default to running the pool, like a bare `proxy-pool` invocation
    let command = cli.command.unwrap_or(Commands::Run {
        interval: 3600,
        cooldown: 60,
        concurrency: 10,
    });

    match command {
        Commands::Run {
            interval,
            cooldown,
            concurrency,
        } => {
            let config = PoolConfig::new()
                .with_database_path(cli.database)
                .with_scheduler(
                    SchedulerConfig::new()
                        .with_interval(Duration::from_secs(interval))
                        .with_cooldown(Duration::from_secs(cooldown)),
                )
                .with_checker(CheckerConfig::new().with_concurrency(concurrency));

            let mut pool = ProxyPool::connect(config).await?;
            pool.start();
            info!("proxy pool running, press Ctrl-C to stop");

            tokio::signal::ctrl_c().await?;
            pool.stop().await;
        }
        Commands::Fetch => {
            let pool = connect(&cli.database).await?;
            let summary = pool.fetch_once().await?;
            println!(
                "Fetched {} sources ({} failed, {} skipped), {} new candidates",
                summary.fetched_sources,
                summary.failed_sources,
                summary.skipped_sources,
                summary.new_candidates
            );
        }
        Commands::Check {
            concurrency,
            timeout,
        } => {
            let config = PoolConfig::new().with_database_path(cli.database).with_checker(
                CheckerConfig::new()
                    .with_concurrency(concurrency)
                    .with_timeout(Duration::from_secs(timeout)),
            );
            let pool = ProxyPool::connect(config).await?;
            let summary = pool.check_once().await?;
            println!(
                "Checked {} proxies: {} working, {} failed, {} evicted",
                summary.checked, summary.working, summary.failed, summary.evicted
            );
        }
        Commands::Get => {
            let pool = connect(&cli.database).await?;
            match pool.get_proxy().await? {
                Some(url) => println!("{}", url),
                None => println!("no working proxy available"),
            }
        }
        Commands::Status => {
            let pool = connect(&cli.database).await?;
            let status = pool.status().await?;
            println!("Proxies: {} total, {} working", status.total, status.working);
            match status.sample {
                Some(sample) => println!("Fastest: {}", sample),
                None => println!("Fastest: -"),
            }
        }
        Commands::Sources { command } => {
            let pool = connect(&cli.database).await?;
            match command {
                SourceCommands::List => {
                    for source in pool.list_sources().await? {
                        let state = if source.enabled { "enabled" } else { "disabled" };
                        let last_fetch = source
                            .last_fetch
                            .map(|t| t.to_rfc3339())
                            .unwrap_or_else(|| "never".to_string());
                        println!(
                            "{} [{}] {} (last fetch: {})",
                            source.url, source.parser_kind, state, last_fetch
                        );
                    }
                }
                SourceCommands::Add { url, parser } => {
                    let kind = parse_parser_kind(&parser)?;
                    if pool.add_source(&url, kind).await? {
                        println!("Source added: {}", url);
                    } else {
                        println!("Source already registered: {}", url);
                    }
                }
                SourceCommands::Disable { url } => {
                    if pool.disable_source(&url).await? {
                        println!("Source disabled: {}", url);
                    } else {
                        eprintln!("Source not found: {}", url);
                    }
                }
            }
        }
    }

    Ok(())
}

async fn connect(database: &str) -> Result<ProxyPool> {
    ProxyPool::connect(PoolConfig::new().with_database_path(database.to_string())).await
}

fn parse_parser_kind(s: &str) -> Result<ParserKind> {
    match s.to_lowercase().as_str() {
        "simple_list" => Ok(ParserKind::SimpleList),
        "json" => Ok(ParserKind::Json),
        "custom_format" => Ok(ParserKind::CustomFormat),
        _ => Err(anyhow!(
            "Invalid parser kind: {}. Use: simple_list, json, custom_format",
            s
        )),
    }
}

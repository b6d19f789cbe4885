#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::missing_errors_doc, clippy::missing_panics_doc)]

//! CLI for draining a POP3 mailbox (read-mostly)

use clap::{Parser, Subcommand};
use popcore::{
    AccountConfig, Coordinator, FileBodyStore, HeaderLineParser, HeaderRecord, MailboxDriver,
    PopConfig, PopSession, SledHeaderStore, StdioPrompt, TlsEngine, TlsMode,
};
use std::io::Read as _;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "popcore-cli")]
#[command(about = "Drain and inspect a POP3 mailbox")]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Directory for the header/body cache; omit to run cache-less
    #[arg(long, global = true)]
    cache_dir: Option<PathBuf>,

    /// Connect timeout in seconds
    #[arg(long, global = true, default_value = "30")]
    connect_timeout: u64,
}

#[derive(Subcommand)]
enum Command {
    /// List message headers
    List {
        /// Maximum number of messages to show
        #[arg(long, default_value = "20")]
        limit: usize,
    },

    /// Show a single message body by its 0-based index
    Show {
        /// Message index, as printed by `list`
        index: usize,
    },

    /// Mark a message for deletion and drain the mailbox
    Sync {
        /// 0-based indices to delete before syncing
        #[arg(long = "delete")]
        delete: Vec<usize>,
    },
}

#[derive(serde::Serialize)]
struct HeaderView<'a> {
    index: usize,
    uidl: &'a str,
    subject: Option<&'a str>,
    from: Option<&'a str>,
    date: Option<&'a str>,
}

fn main() -> anyhow::Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("failed to install rustls crypto provider");

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    popcore::interrupt::install();

    let args = Args::parse();
    let account = AccountConfig::from_env()?;
    let config = PopConfig::default();
    let connect_timeout = Duration::from_secs(args.connect_timeout);

    let mut driver = build_driver(&account, &config, args.cache_dir.as_deref(), connect_timeout)?;
    driver.open(args.cache_dir.is_some())?;

    match &args.command {
        Command::List { limit } => cmd_list(&driver, args.json, *limit),
        Command::Show { index } => cmd_show(&mut driver, args.json, *index)?,
        Command::Sync { delete } => cmd_sync(&mut driver, &delete.clone())?,
    }

    driver.close();
    Ok(())
}

fn build_driver(
    account: &AccountConfig,
    config: &PopConfig,
    cache_dir: Option<&std::path::Path>,
    connect_timeout: Duration,
) -> anyhow::Result<MailboxDriver> {
    let tls_engine = match account.tls_mode {
        TlsMode::None => None,
        TlsMode::StartTls | TlsMode::Tls => {
            Some(TlsEngine::new(config, Arc::new(StdioPrompt))?)
        }
    };

    let cache = match cache_dir {
        Some(dir) => {
            let headers = SledHeaderStore::open(dir.join("hcache"))?;
            let bodies = FileBodyStore::open(dir.join("bodies"))?;
            Some(Coordinator::new(Box::new(headers), Box::new(bodies)))
        }
        None => None,
    };

    let session = PopSession::new(
        account.clone(),
        config.clone(),
        tls_engine,
        Box::new(HeaderLineParser),
        cache,
    );

    let path = format!("pop://{}@{}:{}", account.user, account.host, account.port);
    Ok(MailboxDriver::new(session, path, connect_timeout))
}

fn cmd_list(driver: &MailboxDriver, json: bool, limit: usize) {
    let headers: Vec<&HeaderRecord> = driver.headers().iter().filter(|r| !r.is_stale()).take(limit).collect();

    if json {
        let views: Vec<HeaderView<'_>> = headers
            .iter()
            .map(|r| HeaderView {
                index: r.index,
                uidl: &r.uidl,
                subject: r.env.subject.as_deref(),
                from: r.env.from.as_deref(),
                date: r.env.date.as_deref(),
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&views).unwrap_or_default());
        return;
    }

    if headers.is_empty() {
        println!("No messages.");
        return;
    }

    println!("{:<4} {:<30} {:<30} {}", "IDX", "From", "Date", "Subject");
    println!("{}", "-".repeat(100));
    for r in &headers {
        println!(
            "{:<4} {:<30} {:<30} {}",
            r.index,
            r.env.from.as_deref().unwrap_or("-"),
            r.env.date.as_deref().unwrap_or("-"),
            r.env.subject.as_deref().unwrap_or("-"),
        );
    }
    println!("\n{} message(s)", headers.len());
}

fn cmd_show(driver: &mut MailboxDriver, json: bool, index: usize) -> anyhow::Result<()> {
    let mut body = String::new();
    driver.open_message(index)?.read_to_string(&mut body)?;
    driver.close_message();

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({ "index": index, "body": body }))?
        );
    } else {
        println!("{body}");
    }
    Ok(())
}

fn cmd_sync(driver: &mut MailboxDriver, delete: &[usize]) -> anyhow::Result<()> {
    for &index in delete {
        driver.mark_deleted(index, true);
    }
    driver.sync()?;
    println!("synced: {} message(s) deleted", delete.len());
    Ok(())
}

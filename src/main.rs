use std::path::PathBuf;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use mediasync::config::SyncConfig;
use mediasync::platform::PlatformClient;
use mediasync::selector;
use mediasync::session::SessionStore;
use mediasync::syncer;
use mediasync::telemetry;

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Download new media from a messaging conversation into per-chat folders"
)]
struct Args {
    /// Platform API id issued for this application
    #[arg(long)]
    api_id: i32,

    /// Platform API hash issued for this application
    #[arg(long)]
    api_hash: String,

    /// Session name for persistent login
    #[arg(long, default_value = "media_sync")]
    session: String,

    /// Gateway base URL (defaults to MEDIASYNC_BASE_URL)
    #[arg(long)]
    base_url: Option<String>,

    /// Id or username of the conversation to sync
    #[arg(long, conflicts_with = "list_chats")]
    channel: Option<String>,

    /// List all chats/channels and pick one interactively
    #[arg(long)]
    list_chats: bool,

    /// Base directory for downloads
    #[arg(long, default_value = "downloads")]
    output_dir: PathBuf,

    /// Maximum number of messages to scan (default: entire history)
    #[arg(long)]
    limit: Option<usize>,

    /// Messages fetched per gateway page
    #[arg(long)]
    page_size: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<()> {
    telemetry::init_tracing();
    let args = Args::parse();

    if args.channel.is_none() && !args.list_chats {
        Args::command()
            .error(
                clap::error::ErrorKind::MissingRequiredArgument,
                "either --channel or --list-chats must be provided",
            )
            .exit();
    }

    let config = SyncConfig::resolve(
        args.api_id,
        args.api_hash,
        args.session,
        args.base_url,
        args.output_dir,
        args.page_size,
    );

    let sessions = SessionStore::open_default();
    let client = PlatformClient::connect(&config, &sessions).await?;
    let me = client.me().await?;
    println!("Logged in as: {}", me.display_name());

    let conversation = match &args.channel {
        Some(selector) => client.resolve_target(selector).await?,
        None => {
            let dialogs = client.list_dialogs().await?;
            match selector::choose_conversation(&dialogs)? {
                Some(conversation) => conversation,
                None => {
                    println!("Operation cancelled.");
                    std::process::exit(1);
                }
            }
        }
    };
    println!(
        "Syncing '{}' ({}) into {}",
        conversation.name,
        conversation.id,
        config.output_root.display()
    );

    let report = syncer::sync_conversation(
        &client,
        &conversation,
        &config.output_root,
        args.limit,
        config.page_size,
    )
    .await?;

    if report.failed > 0 {
        println!(
            "Done with {} failures (will retry next run). Total new files downloaded: {}",
            report.failed, report.downloaded
        );
    } else {
        println!("Done. Total new files downloaded: {}", report.downloaded);
    }
    Ok(())
}

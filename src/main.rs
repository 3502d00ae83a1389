use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use chore_sync::config::{AppConfig, DEFAULT_PORT};
use chore_sync::db::Database;
use chore_sync::evidence::FileEvidenceSource;
use chore_sync::household::{add_chore, Household};
use chore_sync::identity::{FileKeyValueStore, IdentityStore};
use chore_sync::models::{Chore, Profile, Role};
use chore_sync::proof::{PipelineStage, ProofOutcome};
use chore_sync::repository::{HttpChoreRepository, SqliteChoreRepository};
use chore_sync::storage::{HttpObjectStore, LocalObjectStore};
use chore_sync::sync::SyncState;
use chore_sync::view::ChoreSummary;
use chore_sync::{api, ChoreError};

#[derive(Parser)]
#[command(name = "chores")]
#[command(about = "Shared family chore lists with photo proof")]
struct Cli {
    /// API root of the chore server (overrides CHORES_URL)
    #[arg(long, global = true)]
    url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the chore server
    Serve {
        /// Port for the HTTP API
        #[arg(short, long, default_value_t = DEFAULT_PORT)]
        port: u16,
    },
    /// Save your profile on this device
    Join {
        /// Your display name
        #[arg(long)]
        name: String,
        /// The family code shared by your household
        #[arg(long)]
        family: String,
        /// parent or child
        #[arg(long, value_parser = parse_role)]
        role: Role,
    },
    /// Show the profile saved on this device
    Whoami,
    /// Forget the profile on this device
    Switch,
    /// Print your chores once
    List,
    /// Follow your chores live until interrupted
    Watch,
    /// Add a chore (parents)
    Add {
        #[arg(long)]
        title: String,
        /// Name of the family member who should do it
        #[arg(long)]
        assign: String,
    },
    /// Complete a chore with a photo (children)
    Complete {
        /// Chore id as shown by `list`
        id: String,
        /// Photo to attach; prompts when omitted
        #[arg(long)]
        photo: Option<PathBuf>,
    },
}

fn parse_role(s: &str) -> Result<Role, String> {
    Role::from_str(s).ok_or_else(|| format!("unknown role `{s}` (expected parent or child)"))
}

/// Logs go to stderr so command output on stdout stays clean.
fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| "chore_sync=info,tower_http=info".into()),
    );

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let mut config = AppConfig::from_env()?;
    if let Some(url) = cli.url {
        config.api_url = url;
    }

    match cli.command {
        Commands::Serve { port } => serve(&config, port).await,
        Commands::Join { name, family, role } => {
            let profile = Profile::new(&name, &family, role)
                .map_err(ChoreError::from)
                .map_err(notice)?;
            let mut identity = open_identity(&config)?;
            identity.save(profile).map_err(ChoreError::from).map_err(notice)?;
            if let Some(profile) = identity.current() {
                println!(
                    "Joined family {} as {} ({})",
                    profile.family_code, profile.display_name, profile.role
                );
            }
            Ok(())
        }
        Commands::Whoami => {
            match open_identity(&config)?.current() {
                Some(profile) => println!(
                    "{} ({}) in family {}",
                    profile.display_name, profile.role, profile.family_code
                ),
                None => println!("No profile on this device. Use `chores join`."),
            }
            Ok(())
        }
        Commands::Switch => {
            open_identity(&config)?
                .clear()
                .map_err(ChoreError::from)
                .map_err(notice)?;
            println!("Profile cleared.");
            Ok(())
        }
        Commands::Add { title, assign } => {
            let identity = open_identity(&config)?;
            let repo = HttpChoreRepository::new(&config.api_url);
            let chore = add_chore(&repo, identity.current(), &title, &assign)
                .await
                .map_err(notice)?;
            println!("Added {} for {} [{}]", chore.title, chore.assigned_to, chore.id);
            Ok(())
        }
        Commands::List => {
            let household = start_household(&config)?;
            let view = household.engine().settled().await;
            if let SyncState::Error(reason) = &view.state {
                eprintln!("{}", ChoreError::Subscription(reason.clone()).notice());
            }
            print_chores(&view.visible());
            Ok(())
        }
        Commands::Watch => {
            watch(&start_household(&config)?).await;
            Ok(())
        }
        Commands::Complete { id, photo } => complete(&config, &id, photo).await,
    }
}

fn open_identity(config: &AppConfig) -> anyhow::Result<IdentityStore<FileKeyValueStore>> {
    IdentityStore::open(FileKeyValueStore::new(config.profile_path()))
        .map_err(ChoreError::from)
        .map_err(notice)
}

/// Restore the saved profile and subscribe to its family's chores.
fn start_household(
    config: &AppConfig,
) -> anyhow::Result<Household<HttpChoreRepository, FileKeyValueStore>> {
    let repo = Arc::new(HttpChoreRepository::new(&config.api_url));
    let storage = FileKeyValueStore::new(config.profile_path());
    Household::start(repo, storage).map_err(notice)
}

async fn complete(config: &AppConfig, id: &str, photo: Option<PathBuf>) -> anyhow::Result<()> {
    let household = start_household(config)?;
    household.engine().settled().await;

    let evidence = match photo {
        Some(path) => FileEvidenceSource::with_path(path),
        None => FileEvidenceSource::interactive(),
    };
    let store = Arc::new(HttpObjectStore::new(&config.api_url));
    let coordinator = household.coordinator(store, evidence);

    let outcome = household
        .complete_chore(&coordinator, id, |stage| match stage {
            PipelineStage::Uploading => eprintln!("Uploading photo..."),
            PipelineStage::Writing => eprintln!("Marking chore as done..."),
            _ => {}
        })
        .await
        .map_err(notice)?;

    match outcome {
        ProofOutcome::Completed { proof, .. } => println!("Done! Proof: {}", proof.url),
        ProofOutcome::Cancelled => println!("Cancelled."),
    }
    Ok(())
}

async fn serve(config: &AppConfig, port: u16) -> anyhow::Result<()> {
    tracing::info!("Starting chore server on port {}", port);

    let db = Database::open(config.database_path())?;
    db.migrate()?;

    let proofs = LocalObjectStore::new(config.proofs_dir(), config.proof_base_url(port));
    tracing::info!(root = %proofs.root().display(), "Storing proof photos");
    let state = api::AppState::new(SqliteChoreRepository::new(db), proofs);
    let app = api::create_router(state);

    let listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{}", port))
        .await
        .with_context(|| format!("Failed to bind port {}", port))?;
    tracing::info!("Chore server listening on http://127.0.0.1:{}", port);

    axum::serve(listener, app).await?;
    Ok(())
}

async fn watch(household: &Household<HttpChoreRepository, FileKeyValueStore>) {
    let mut updates = household.engine().watch();
    loop {
        {
            let view = updates.borrow_and_update().clone();
            match &view.state {
                SyncState::Idle => {
                    println!("No profile on this device. Use `chores join`.");
                    return;
                }
                SyncState::Subscribing => println!("Loading chores..."),
                SyncState::Synced => print_chores(&view.visible()),
                SyncState::Error(reason) => {
                    eprintln!("{}", ChoreError::Subscription(reason.clone()).notice());
                    print_chores(&view.visible());
                }
            }
        }

        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    return;
                }
            }
            _ = tokio::signal::ctrl_c() => return,
        }
    }
}

fn print_chores(chores: &[Chore]) {
    let summary = ChoreSummary::of(chores);
    println!(
        "{} pending, {} completed",
        summary.pending, summary.completed
    );
    for chore in chores {
        let mark = if chore.is_completed() { "x" } else { " " };
        println!("[{}] {}  {} -> {}", mark, chore.id, chore.title, chore.assigned_to);
        if let Some(url) = &chore.photo_url {
            println!("      proof: {}", url);
        }
    }
}

/// Report a failure the way the member should see it, keeping the cause in
/// the log.
fn notice(e: ChoreError) -> anyhow::Error {
    tracing::debug!(error = %e, "Command failed");
    anyhow::anyhow!(e.notice())
}

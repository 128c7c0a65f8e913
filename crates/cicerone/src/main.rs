mod gate;

use anyhow::{Context, bail};
use cicerone_engine::api::GuideApiClient;
use cicerone_engine::config::{ConfigLoader, EngineConfig};
use cicerone_engine::manager::GuideManager;
use cicerone_engine::planner::GuidePlanner;
use cicerone_engine::planner::transport::HttpChatTransport;
use cicerone_engine::protocol::GuideStatus;
use cicerone_engine::session_store::SessionStore;
use cicerone_h::backend::HeadlessBackend;
use cicerone_engine::backend::Backend;
use clap::Parser;
use gate::StdinGate;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use url::Url;

#[derive(Parser, Debug)]
#[command(author, version, about = "Guided web automation driven by a remote planner")]
struct Args {
    /// Page to start the guide on
    url: String,

    /// What the guide should accomplish
    #[arg(long)]
    instructions: Option<String>,

    /// Guide backend origin (defaults to the configured api_origin)
    #[arg(long)]
    api_origin: Option<String>,

    /// Bearer token for the guide backend
    #[arg(long)]
    token: String,

    /// Conversation slug to attach the session to
    #[arg(long)]
    conversation: Option<String>,

    /// Run the browser headed so the guide is watchable
    #[arg(long)]
    visible: bool,

    /// Resume the previously stored guide session instead of starting fresh
    #[arg(long)]
    resume: bool,

    /// Config file (defaults to ./cicerone.yaml, then ~/.cicerone/config.yaml)
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();

    let config: EngineConfig = match &args.config {
        Some(path) => ConfigLoader::load_from(path).await?,
        None => ConfigLoader::load_default().await?,
    };

    let origin = args
        .api_origin
        .clone()
        .unwrap_or_else(|| config.api_origin.clone());
    let origin = Url::parse(&origin).with_context(|| format!("invalid API origin: {origin}"))?;
    let chat_endpoint = origin.join("/api/guide/action")?;

    let api = Arc::new(GuideApiClient::new(origin, args.token.clone()));
    let transport = HttpChatTransport::new(chat_endpoint, args.token.clone());

    let mut backend = HeadlessBackend::new_with_visibility(args.visible);
    backend.launch().await?;
    backend.navigate(&args.url).await?;

    let manager = GuideManager::new(backend, api.clone(), &config);

    let store = SessionStore::default_path().map(SessionStore::new);

    let mut planner = if args.resume {
        let store = store.context("cannot resume: no home directory for the session store")?;
        let stored = store
            .load()
            .await?
            .context("cannot resume: no stored guide session")?;
        tracing::info!(
            "Resuming guide session {} ({} steps)",
            stored.credentials.session_id,
            stored.steps.len()
        );
        GuidePlanner::resuming(
            manager,
            transport,
            Box::new(StdinGate),
            api,
            &config,
            stored,
            args.conversation.clone(),
        )
        .with_session_store(store)
    } else {
        let Some(instructions) = args.instructions.clone() else {
            bail!("--instructions is required unless resuming");
        };
        let mut planner = GuidePlanner::new(
            manager,
            transport,
            Box::new(StdinGate),
            api,
            &config,
            args.token.clone(),
            instructions,
            args.conversation.clone(),
        );
        if let Some(store) = store {
            planner = planner.with_session_store(store);
        }
        planner
    };

    // Ctrl-C is the "just tell me how" affordance: stop driving the page
    // and let the conversation fall back to text instructions.
    let (cancel_tx, cancel_rx) = tokio::sync::oneshot::channel();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = cancel_tx.send(());
        }
    });

    let outcome = planner.run(cancel_rx).await;

    match &outcome {
        Ok(outcome) => {
            println!();
            for step in planner.steps() {
                let marker = if step.completed { "x" } else { " " };
                println!("[{marker}] {}", step.description);
            }
            match outcome.status {
                GuideStatus::Done => println!(
                    "\nGuide finished: {}",
                    outcome.message.as_deref().unwrap_or("done")
                ),
                GuideStatus::Cancelled => println!(
                    "\nGuide cancelled: {}",
                    outcome.message.as_deref().unwrap_or("cancelled")
                ),
                status => println!(
                    "\nGuide ended ({status:?}): {}",
                    outcome.message.as_deref().unwrap_or("no message")
                ),
            }
        }
        Err(e) => tracing::error!("guide failed: {e}"),
    }

    let mut manager = planner.into_manager();
    manager.destroy().await;
    manager.backend_mut().close().await?;

    outcome.map(|_| ()).map_err(Into::into)
}

mod cli;
mod ui;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use serde_json::json;
use tracing::{info, warn};

use cli::{Cli, Command};
use stageline::admin;
use stageline::{
    HttpNotifier, ItemStatus, ItemStore, LogNotifier, MemoryStore, Notifier, StageEngine,
    StagelineConfig,
};

// Placeholder target for items whose completions are only logged.
const LOG_ONLY_CALLBACK: &str = "http://localhost/stageline/callback";

type Engine<N> = StageEngine<MemoryStore, N>;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    stageline::logging::init(cli.verbose);

    let mut config = match &cli.config {
        Some(path) => StagelineConfig::load_from(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => StagelineConfig::load()?,
    };
    if let Some(profile) = cli.profile {
        config.profile = profile.into();
    }

    match cli.command {
        Command::Run {
            items,
            callback_url,
        } => match callback_url {
            Some(url) => run(&config, HttpNotifier::new(), items, &url).await,
            None => run(&config, LogNotifier, items, LOG_ONLY_CALLBACK).await,
        },
        Command::Demo { callback_url } => match callback_url {
            Some(url) => demo(&config, HttpNotifier::new(), &url).await,
            None => demo(&config, LogNotifier, LOG_ONLY_CALLBACK).await,
        },
        Command::Config => print_config(&config),
    }
}

fn build_engine<N>(config: &StagelineConfig, notifier: N) -> Result<Arc<Engine<N>>>
where
    N: Notifier + 'static,
{
    let mut engine = StageEngine::new(
        Arc::new(MemoryStore::new()),
        Arc::new(notifier),
        config.plan().context("invalid stage list")?,
        config.settings(),
    );
    if let Some(node_id) = &config.node_id {
        engine = engine.with_node_id(node_id.as_str());
    }
    Ok(Arc::new(engine))
}

/// Enqueue `items` demo items and process them until the store is drained,
/// every pending callback is settled, or Ctrl-C arrives.
async fn run<N>(config: &StagelineConfig, notifier: N, items: u32, callback_url: &str) -> Result<()>
where
    N: Notifier + 'static,
{
    let engine = build_engine(config, notifier)?;
    for sequence in 1..=items {
        engine
            .enqueue(json!({ "sequence": sequence }), callback_url)
            .await?;
    }
    info!(node = %engine.node_id(), items, "queue seeded");

    engine.start();
    let drained = wait_until_drained(&engine).await?;
    engine.stop();

    if !drained {
        warn!("interrupted, stopping engine");
    }
    let summary = admin::summary(engine.store().as_ref()).await?;
    ui::print_summary(&summary);
    Ok(())
}

async fn wait_until_drained<N>(engine: &Arc<Engine<N>>) -> Result<bool>
where
    N: Notifier + 'static,
{
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut poll = tokio::time::interval(engine.settings().tick_interval);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => return Ok(false),
            _ = poll.tick() => {}
        }

        let summary = admin::summary(engine.store().as_ref()).await?;
        if summary.pending == 0
            && summary.processing == 0
            && engine.cursor().await.callbacks.is_empty()
        {
            return Ok(true);
        }
    }
}

/// Follow a single item through the pipeline with a progress bar.
async fn demo<N>(config: &StagelineConfig, notifier: N, callback_url: &str) -> Result<()>
where
    N: Notifier + 'static,
{
    let engine = build_engine(config, notifier)?;
    let item = engine.enqueue(json!({ "demo": true }), callback_url).await?;
    let progress = ui::ItemProgress::start(&item.id, engine.plan());

    engine.start();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut poll = tokio::time::interval(engine.settings().tick_interval);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                engine.stop();
                progress.abandon("interrupted");
                return Ok(());
            }
            _ = poll.tick() => {}
        }

        let Some(current) = engine.store().find_by_id(&item.id).await? else {
            engine.stop();
            progress.abandon("item disappeared from the store");
            return Ok(());
        };
        progress.update(&current);
        if current.status == ItemStatus::Completed {
            progress.complete(&current);
            break;
        }
    }

    // Give the completion callback a chance to settle before exiting.
    while !engine.cursor().await.callbacks.is_empty() {
        tokio::time::sleep(engine.settings().tick_interval).await;
    }
    engine.stop();
    Ok(())
}

fn print_config(config: &StagelineConfig) -> Result<()> {
    let plan = config.plan().context("invalid stage list")?;
    let settings = config.settings();

    println!("{}", toml::to_string_pretty(config)?);
    println!("# effective");
    println!("tick_interval_ms = {}", settings.tick_interval.as_millis());
    println!("jitter_ratio = {}", settings.jitter_ratio);
    println!("callback_timeout_ms = {}", settings.callback_timeout.as_millis());
    println!("nominal_item_seconds = {}", plan.total_seconds());
    Ok(())
}

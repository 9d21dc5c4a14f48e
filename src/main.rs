use anyhow::Result;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use reel_offline::config::Config;
use reel_offline::downloads::{DownloadManager, SyncSummary};
use reel_offline::tasks::{AliveFlag, TaskSpawner, ui};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("reel_offline=debug"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Starting Reel offline downloader");

    let config = Config::load()?;
    let manager = DownloadManager::new(&config)?;

    match manager.load_state() {
        Ok(count) => info!("Restored {} downloads", count),
        Err(e) => warn!("Starting with an empty queue: {:#}", e),
    }

    let (dispatcher, mut ui_loop) = ui::channel();
    let display = AliveFlag::new();

    // Progress lines are printed by the UI loop, one per 10% step
    let last_step = Arc::new(AtomicU64::new(u64::MAX));
    let progress_ui = dispatcher.clone();
    let progress_alive = display.clone();
    manager.set_progress_callback(move |downloaded, total| {
        if total == 0 {
            return;
        }
        let step = downloaded * 10 / total;
        if last_step.swap(step, Ordering::Relaxed) == step {
            return;
        }
        let print = progress_alive.guard(move |(downloaded, total): (u64, u64)| {
            info!("Downloaded {} of {} bytes", downloaded, total);
        });
        progress_ui.dispatch(move || print((downloaded, total)));
    });

    manager.start_downloads();

    let spawner = TaskSpawner::current()?;
    let worker_manager = manager.clone();
    let _drain = spawner.spawn_with_result(
        "drain-queue",
        &dispatcher,
        move |_token| async move {
            worker_manager.join_worker().await;
            worker_manager.clear_progress_callback();
            worker_manager.sync_progress_to_server().await
        },
        |summary: SyncSummary| {
            info!(
                "Queue drained, synced {} of {} watch positions",
                summary.synced, summary.attempted
            );
        },
    );
    drop(dispatcher);

    tokio::select! {
        _ = ui_loop_until_done(&mut ui_loop) => {}
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted, pausing downloads");
        }
    }

    display.kill();
    manager.clear_progress_callback();
    manager.shutdown().await?;

    info!(
        "Offline storage used: {:.1} MB",
        manager.storage_used() as f64 / (1024.0 * 1024.0)
    );
    Ok(())
}

/// Run UI callbacks until every dispatcher is gone, which happens once the
/// drain task has delivered its result and the progress callback is cleared.
async fn ui_loop_until_done(ui_loop: &mut ui::UiLoop) {
    while ui_loop.run_next().await {}
}

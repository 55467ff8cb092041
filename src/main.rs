mod alerts;
mod command;
mod config;
mod dispatch;
mod feed;
mod finnhub;
mod functions;
mod intent;
mod quotes;
mod security;
mod snapshot;
mod tui;
mod workspace;

use std::collections::HashSet;

use anyhow::anyhow;
use clap::Parser;
use tokio::task;

use crate::command::{Command, FeedCommand};
use crate::config::Preferences;
use crate::feed::{FeedHandle, FeedTask};
use crate::finnhub::MarketClient;
use crate::snapshot::SnapshotTask;
use crate::tui::TuiApp;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let param = config::CliParams::parse();
    use tokio::sync::{broadcast, mpsc, watch};

    let (tx, mut rx) = broadcast::channel::<Command>(16);
    let (feed_tx, feed_requests) = mpsc::channel::<FeedCommand>(64);
    let (symbols_tx, symbols_rx) = watch::channel(HashSet::new());

    let mut prefs = Preferences::load_or_init(&param.prefs_path)?;

    let feed_error_tx = tx.clone();
    let feed_bus_rx = tx.subscribe();
    let feed_task = FeedTask::new(&param.token, param.reconnect_delay(), tx.clone(), symbols_tx)?;
    task::spawn(async move {
        if let Err(err) = feed_task.run(feed_requests, feed_bus_rx).await {
            let _ = feed_error_tx.send(Command::Error(format!("stream feed error: {err}")));
        }
    });

    let snapshot_error_tx = tx.clone();
    let snapshot_bus_rx = tx.subscribe();
    let snapshot_task =
        SnapshotTask::new(&param.token, param.refresh_interval(), tx.clone(), symbols_rx)?;
    task::spawn(async move {
        if let Err(err) = snapshot_task.run(snapshot_bus_rx).await {
            let _ = snapshot_error_tx.send(Command::Error(format!("quote refresh error: {err}")));
        }
    });

    let alert_error_tx = tx.clone();
    let atx = tx.clone();
    let arx = tx.subscribe();
    let alert_specs = param.alerts.clone();
    task::spawn(async move {
        let mut monitor = alerts::AlertMonitor::new(alert_specs, atx, arx);
        if let Err(err) = monitor.run().await {
            let _ = alert_error_tx.send(Command::Error(format!("alert monitor error: {err}")));
        }
    });

    let client = MarketClient::new(&param.token)?;
    let mut app = TuiApp::new(
        client,
        prefs.layout,
        prefs.command_history.clone(),
        param.alerts.clone(),
        FeedHandle::new(feed_tx),
        tx.clone(),
    );
    let app_result = tokio::select! {
        result = app.run(&mut rx) => result,
        _ = tokio::signal::ctrl_c() => Ok(()),
    };
    let _ = tx.send(Command::Exit);
    app.dispose();
    app_result.map_err(|err| anyhow!(err.to_string()))?;

    // Layout and command history survive the session; nothing else does.
    prefs.layout = app.layout();
    prefs.command_history = app.command_history().to_vec();
    prefs.save()?;
    Ok(())
}

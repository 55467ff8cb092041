use std::collections::HashSet;

use tokio::sync::{broadcast, watch};
use tokio::time::{Duration, MissedTickBehavior, interval};

use crate::command::Command;
use crate::finnhub::MarketClient;

/// Periodically re-pulls REST quotes for every streamed symbol so session
/// fields (open, high, low, previous close) stay current between ticks.
/// A symbol appearing in the live set for the first time is fetched right
/// away instead of waiting out the interval.
pub struct SnapshotTask {
    client: MarketClient,
    tx: broadcast::Sender<Command>,
    symbols_rx: watch::Receiver<HashSet<String>>,
    refresh: Duration,
    tracked: HashSet<String>,
}

impl SnapshotTask {
    pub fn new(
        token: &str,
        refresh: Duration,
        tx: broadcast::Sender<Command>,
        symbols_rx: watch::Receiver<HashSet<String>>,
    ) -> Result<SnapshotTask, anyhow::Error> {
        Ok(SnapshotTask {
            client: MarketClient::new(token)?,
            tx,
            symbols_rx,
            refresh,
            tracked: HashSet::new(),
        })
    }

    pub async fn run(mut self, mut rx: broadcast::Receiver<Command>) -> Result<(), anyhow::Error> {
        let mut tick = interval(self.refresh);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = tick.tick() => {
                    let symbols = self.current_symbols();
                    self.tracked = symbols.iter().cloned().collect();
                    self.refresh_symbols(&symbols).await;
                }
                changed = self.symbols_rx.changed() => {
                    if changed.is_err() {
                        return Ok(());
                    }
                    let fresh = self.fresh_symbols();
                    self.refresh_symbols(&fresh).await;
                }
                message = rx.recv() => {
                    match message {
                        Ok(Command::Exit) | Err(broadcast::error::RecvError::Closed) => {
                            return Ok(());
                        }
                        _ => {}
                    }
                }
            }
        }
    }

    fn current_symbols(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self.symbols_rx.borrow().iter().cloned().collect();
        symbols.sort();
        symbols
    }

    /// Symbols present now that were absent at the previous observation.
    /// A symbol dropped and picked up again counts as fresh.
    fn fresh_symbols(&mut self) -> Vec<String> {
        let current: HashSet<String> = self.symbols_rx.borrow().iter().cloned().collect();
        let mut fresh: Vec<String> = current.difference(&self.tracked).cloned().collect();
        fresh.sort();
        self.tracked = current;
        fresh
    }

    async fn refresh_symbols(&self, symbols: &[String]) {
        for symbol in symbols {
            match self.client.fetch_quote(symbol).await {
                Ok(quote) => {
                    // Unknown symbols come back as all zeros; nothing worth caching.
                    if quote.timestamp == 0 {
                        continue;
                    }
                    let _ = self.tx.send(Command::QuoteSnapshot(quote));
                }
                Err(err) => {
                    let _ = self.tx.send(Command::Error(format!(
                        "quote refresh failed for {symbol}: {err}"
                    )));
                }
            }
        }
    }
}

use std::collections::{HashMap, HashSet};

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use reqwest::Client;
use reqwest_websocket::{Message, WebSocket};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::{Duration, sleep};

use crate::command::{Command, FeedCommand, FeedStatus};
use crate::finnhub::{self, StreamMessage, StreamRequest};

/// Reference counts per symbol. The wire only hears about 0↔1 transitions;
/// intermediate counts stay local.
#[derive(Debug, Default)]
pub struct SubscriptionBook {
    counts: HashMap<String, usize>,
}

impl SubscriptionBook {
    pub fn new() -> SubscriptionBook {
        SubscriptionBook::default()
    }

    /// True exactly on the 0→1 transition.
    pub fn acquire(&mut self, symbol: &str) -> bool {
        let count = self.counts.entry(symbol.to_string()).or_insert(0);
        *count += 1;
        *count == 1
    }

    /// True exactly on the 1→0 transition; releasing an unknown symbol is
    /// a no-op so the count never goes negative.
    pub fn release(&mut self, symbol: &str) -> bool {
        match self.counts.get_mut(symbol) {
            Some(count) if *count > 1 => {
                *count -= 1;
                false
            }
            Some(_) => {
                self.counts.remove(symbol);
                true
            }
            None => false,
        }
    }

    pub fn count(&self, symbol: &str) -> usize {
        self.counts.get(symbol).copied().unwrap_or(0)
    }

    /// Symbols currently held by at least one subscriber; exactly the set
    /// resent after a reconnect.
    pub fn live_symbols(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self.counts.keys().cloned().collect();
        symbols.sort();
        symbols
    }

    pub fn live_set(&self) -> HashSet<String> {
        self.counts.keys().cloned().collect()
    }
}

/// Cloneable sender half used by feed subscribers. Requests that cannot be
/// queued are reported back so callers keep their held set consistent.
#[derive(Clone)]
pub struct FeedHandle {
    tx: mpsc::Sender<FeedCommand>,
}

impl FeedHandle {
    pub fn new(tx: mpsc::Sender<FeedCommand>) -> FeedHandle {
        FeedHandle { tx }
    }

    pub fn subscribe(&self, symbol: &str) -> Result<(), TrySendError<FeedCommand>> {
        self.tx.try_send(FeedCommand::Subscribe(symbol.to_string()))
    }

    pub fn unsubscribe(&self, symbol: &str) -> Result<(), TrySendError<FeedCommand>> {
        self.tx.try_send(FeedCommand::Unsubscribe(symbol.to_string()))
    }
}

enum Flow {
    Continue,
    Exit,
}

/// Owns the one streaming connection and the subscription book. Lifecycle
/// is Disconnected → Connecting → Connected and back on any drop, with a
/// single fixed-delay retry timer pending at a time.
pub struct FeedTask {
    client: Client,
    token: String,
    book: SubscriptionBook,
    tx: broadcast::Sender<Command>,
    symbols_tx: watch::Sender<HashSet<String>>,
    reconnect_delay: Duration,
}

impl FeedTask {
    pub fn new(
        token: &str,
        reconnect_delay: Duration,
        tx: broadcast::Sender<Command>,
        symbols_tx: watch::Sender<HashSet<String>>,
    ) -> Result<FeedTask, anyhow::Error> {
        Ok(FeedTask {
            client: finnhub::build_http_client()?,
            token: token.to_string(),
            book: SubscriptionBook::new(),
            tx,
            symbols_tx,
            reconnect_delay,
        })
    }

    pub async fn run(
        mut self,
        mut requests: mpsc::Receiver<FeedCommand>,
        mut rx: broadcast::Receiver<Command>,
    ) -> Result<(), anyhow::Error> {
        loop {
            self.set_status(FeedStatus::Connecting);
            match finnhub::connect_stream(&self.client, &self.token).await {
                Ok(socket) => {
                    self.set_status(FeedStatus::Connected);
                    if let Flow::Exit = self.drive_connection(socket, &mut requests, &mut rx).await
                    {
                        return Ok(());
                    }
                }
                Err(err) => {
                    self.emit_error(format!("stream connect failed: {err}"));
                }
            }
            self.set_status(FeedStatus::Disconnected);
            if let Flow::Exit = self.wait_for_retry(&mut requests, &mut rx).await {
                return Ok(());
            }
        }
    }

    /// Pumps one live connection until it drops or the app exits. Entering
    /// here resends a subscribe for every symbol still at refcount > 0 and
    /// nothing else.
    async fn drive_connection(
        &mut self,
        socket: WebSocket,
        requests: &mut mpsc::Receiver<FeedCommand>,
        rx: &mut broadcast::Receiver<Command>,
    ) -> Flow {
        let (mut ws_tx, mut ws_rx) = socket.split();
        for symbol in self.book.live_symbols() {
            if let Err(err) = send_request(&mut ws_tx, &StreamRequest::subscribe(&symbol)).await {
                self.emit_error(format!("failed to resubscribe {symbol}: {err}"));
                return Flow::Continue;
            }
        }
        loop {
            tokio::select! {
                request = requests.recv() => {
                    let Some(request) = request else {
                        let _ = ws_tx.close().await;
                        return Flow::Exit;
                    };
                    if let Err(err) = self.apply_request(&mut ws_tx, request).await {
                        self.emit_error(format!("stream write error: {err}"));
                        return Flow::Continue;
                    }
                }
                message = ws_rx.next() => {
                    match message {
                        Some(Ok(Message::Text(text))) => self.handle_frame(&text),
                        Some(Ok(Message::Ping(payload))) => {
                            if let Err(err) = ws_tx.send(Message::Pong(payload)).await {
                                self.emit_error(format!("failed to reply pong: {err}"));
                                return Flow::Continue;
                            }
                        }
                        Some(Ok(Message::Close { code, reason })) => {
                            self.emit_error(format!(
                                "stream closed by server: code={code}, reason={reason:?}"
                            ));
                            return Flow::Continue;
                        }
                        Some(Ok(Message::Pong(_))) | Some(Ok(Message::Binary(_))) => {}
                        Some(Err(err)) => {
                            self.emit_error(format!("stream read error: {err}"));
                            return Flow::Continue;
                        }
                        None => return Flow::Continue,
                    }
                }
                message = rx.recv() => {
                    match message {
                        Ok(Command::Exit) | Err(broadcast::error::RecvError::Closed) => {
                            let _ = ws_tx.close().await;
                            return Flow::Exit;
                        }
                        _ => {}
                    }
                }
            }
        }
    }

    /// One disconnected gap: a single retry timer, during which requests
    /// keep adjusting the book so the next resync reflects them.
    async fn wait_for_retry(
        &mut self,
        requests: &mut mpsc::Receiver<FeedCommand>,
        rx: &mut broadcast::Receiver<Command>,
    ) -> Flow {
        let retry = sleep(self.reconnect_delay);
        tokio::pin!(retry);
        loop {
            tokio::select! {
                _ = &mut retry => return Flow::Continue,
                request = requests.recv() => {
                    let Some(request) = request else {
                        return Flow::Exit;
                    };
                    self.apply_request_offline(request);
                }
                message = rx.recv() => {
                    match message {
                        Ok(Command::Exit) | Err(broadcast::error::RecvError::Closed) => {
                            return Flow::Exit;
                        }
                        _ => {}
                    }
                }
            }
        }
    }

    async fn apply_request(
        &mut self,
        ws_tx: &mut SplitSink<WebSocket, Message>,
        request: FeedCommand,
    ) -> Result<(), anyhow::Error> {
        match request {
            FeedCommand::Subscribe(symbol) => {
                if self.book.acquire(&symbol) {
                    self.publish_symbols();
                    send_request(ws_tx, &StreamRequest::subscribe(&symbol)).await?;
                }
            }
            FeedCommand::Unsubscribe(symbol) => {
                if self.book.release(&symbol) {
                    self.publish_symbols();
                    send_request(ws_tx, &StreamRequest::unsubscribe(&symbol)).await?;
                }
            }
        }
        Ok(())
    }

    fn apply_request_offline(&mut self, request: FeedCommand) {
        let changed = match request {
            FeedCommand::Subscribe(symbol) => self.book.acquire(&symbol),
            FeedCommand::Unsubscribe(symbol) => self.book.release(&symbol),
        };
        if changed {
            self.publish_symbols();
        }
    }

    fn handle_frame(&self, text: &str) {
        if let Ok(message) = serde_json::from_str::<StreamMessage>(text) {
            if message.kind != "trade" {
                return;
            }
            for trade in message.data {
                let _ = self.tx.send(Command::QuoteTick(
                    trade.symbol,
                    trade.price,
                    trade.timestamp,
                ));
            }
        }
    }

    fn publish_symbols(&self) {
        let _ = self.symbols_tx.send(self.book.live_set());
    }

    fn set_status(&self, status: FeedStatus) {
        let _ = self.tx.send(Command::FeedStatus(status));
    }

    fn emit_error(&self, message: impl Into<String>) {
        let _ = self.tx.send(Command::Error(message.into()));
    }
}

async fn send_request(
    ws_tx: &mut SplitSink<WebSocket, Message>,
    request: &StreamRequest,
) -> Result<(), anyhow::Error> {
    let payload = serde_json::to_string(request)?;
    ws_tx.send(Message::Text(payload)).await?;
    Ok(())
}

use serde::{Deserialize, Serialize};

use crate::quotes::Quote;
use crate::security::Security;
use crate::workspace::PanelGroup;

/// Events on the broadcast bus shared by the TUI, the feed task, the
/// snapshot refresher and the alert monitor.
#[derive(Debug, Clone)]
pub enum Command {
    /// symbol, trade price, timestamp in epoch milliseconds
    QuoteTick(String, f64, i64),
    QuoteSnapshot(Quote),
    FeedStatus(FeedStatus),
    SecurityResolved(Resolution),
    /// symbol, human-readable alert text
    Notify(String, String),
    Error(String),
    Exit,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum FeedStatus {
    Disconnected,
    Connecting,
    Connected,
}

impl FeedStatus {
    pub fn label(&self) -> &'static str {
        match self {
            FeedStatus::Disconnected => "OFFLINE",
            FeedStatus::Connecting => "CONNECTING",
            FeedStatus::Connected => "LIVE",
        }
    }
}

/// Completion of an asynchronous security lookup dispatched from the
/// command bar. `security: None` marks a failed or empty lookup; it still
/// carries the stamp so stale older commands cannot apply after it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resolution {
    pub panel_id: String,
    pub group: PanelGroup,
    pub seq: u64,
    pub function_code: String,
    pub query: String,
    pub security: Option<Security>,
}

/// Requests to the streaming feed task.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum FeedCommand {
    Subscribe(String),
    Unsubscribe(String),
}

use std::collections::HashMap;

/// Per-panel issue stamps for asynchronously resolved commands. Resolution
/// order over the network is arbitrary; a completion may mutate its panel
/// only while it is the newest one seen, so the last-issued command wins.
#[derive(Debug, Default)]
pub struct CommandSequencer {
    issued: HashMap<String, u64>,
    completed: HashMap<String, u64>,
}

impl CommandSequencer {
    pub fn new() -> CommandSequencer {
        CommandSequencer::default()
    }

    /// Stamp for a command at dispatch time, monotonic per panel.
    pub fn issue(&mut self, panel_id: &str) -> u64 {
        let counter = self.issued.entry(panel_id.to_string()).or_insert(0);
        *counter += 1;
        *counter
    }

    /// Records the completion; false means it is stale and must be
    /// discarded without touching the panel. Failed lookups also pass
    /// through here so an older in-flight success cannot outlive them.
    pub fn try_complete(&mut self, panel_id: &str, seq: u64) -> bool {
        let newest = self.completed.entry(panel_id.to_string()).or_insert(0);
        if seq <= *newest {
            return false;
        }
        *newest = seq;
        true
    }
}

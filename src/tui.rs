use std::collections::HashMap;
use std::time::{Duration, Instant};

use chrono::{DateTime, Datelike, Timelike, Utc, Weekday};
use chrono_tz::America::New_York;
use chrono_tz::Tz;
use color_eyre::Result;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use ratatui::Frame;
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::symbols;
use ratatui::text::{Line, Span};
use ratatui::widgets::{Axis, Block, Chart, Clear, Dataset, GraphType, Paragraph, Wrap};
use tokio::sync::broadcast;
use tokio::sync::mpsc::error::TrySendError;
use unicode_width::UnicodeWidthChar;

use crate::command::{Command, FeedStatus, Resolution};
use crate::config::AlertSpec;
use crate::dispatch::CommandSequencer;
use crate::feed::FeedHandle;
use crate::finnhub::MarketClient;
use crate::functions::{self, DEFAULT_SECURITY_FUNCTION, DEFAULT_TAB_FUNCTION, FUNCTION_KEYS};
use crate::intent::{self, Intent};
use crate::quotes::{Quote, QuoteCache};
use crate::security::Security;
use crate::workspace::{LayoutMode, Panel, PanelGroup, PanelTab, Workspace};

const MAX_SERIES_POINTS: usize = 600;
const MAX_NOTIFICATIONS: usize = 20;

/// Symbols shown by the WATC screen; session-scoped, not user editable.
const DEFAULT_WATCHLIST: [&str; 15] = [
    "AAPL", "MSFT", "GOOGL", "AMZN", "NVDA", "META", "TSLA", "BRK.B", "JPM", "V", "UNH", "XOM",
    "JNJ", "WMT", "MA",
];

/// Command-line editor state: the input text, the function dropdown and
/// the history cursor. History recall keeps the unsent draft so stepping
/// back down restores it.
struct CommandBar {
    input: String,
    focused: bool,
    suggestions: Vec<&'static functions::FunctionInfo>,
    suggestion_idx: Option<usize>,
    history_idx: Option<usize>,
    draft: String,
}

impl CommandBar {
    fn new() -> CommandBar {
        CommandBar {
            input: String::new(),
            focused: false,
            suggestions: Vec::new(),
            suggestion_idx: None,
            history_idx: None,
            draft: String::new(),
        }
    }

    fn focus(&mut self) {
        self.focused = true;
        self.refresh_suggestions();
    }

    fn blur_and_clear(&mut self) {
        self.input.clear();
        self.focused = false;
        self.suggestions.clear();
        self.suggestion_idx = None;
        self.history_idx = None;
        self.draft.clear();
    }

    fn push_char(&mut self, c: char) {
        self.input.push(c);
        self.leave_history();
        self.refresh_suggestions();
    }

    fn backspace(&mut self) {
        self.input.pop();
        self.leave_history();
        self.refresh_suggestions();
    }

    fn leave_history(&mut self) {
        self.history_idx = None;
        self.draft.clear();
    }

    /// The dropdown only opens while there is text to match; an empty
    /// input leaves Up/Down free for history recall.
    fn refresh_suggestions(&mut self) {
        if self.input.trim().is_empty() {
            self.suggestions.clear();
        } else {
            self.suggestions = functions::suggestions(&self.input);
        }
        self.suggestion_idx = None;
    }

    fn move_vertical(&mut self, history: &[String], delta: isize) {
        if self.history_idx.is_some() || (self.input.is_empty() && !history.is_empty()) {
            self.move_history(history, delta);
        } else {
            self.move_suggestion(delta);
        }
    }

    fn move_suggestion(&mut self, delta: isize) {
        if self.suggestions.is_empty() {
            return;
        }
        let len = self.suggestions.len() as isize;
        let next = match self.suggestion_idx {
            None => {
                if delta > 0 {
                    0
                } else {
                    len - 1
                }
            }
            Some(idx) => (idx as isize + delta).rem_euclid(len),
        };
        self.suggestion_idx = Some(next as usize);
    }

    /// History is most-recent-first; positive delta steps toward older
    /// entries, stepping below the newest restores the draft.
    fn move_history(&mut self, history: &[String], delta: isize) {
        if history.is_empty() {
            return;
        }
        match self.history_idx {
            None => {
                if delta <= 0 {
                    return;
                }
                self.draft = self.input.clone();
                self.history_idx = Some(0);
                self.input = history[0].clone();
            }
            Some(idx) => {
                let next = idx as isize + delta;
                if next < 0 {
                    self.history_idx = None;
                    self.input = std::mem::take(&mut self.draft);
                } else {
                    let next = (next as usize).min(history.len() - 1);
                    self.history_idx = Some(next);
                    self.input = history[next].clone();
                }
            }
        }
        self.suggestions.clear();
        self.suggestion_idx = None;
    }

    fn complete_suggestion(&mut self) {
        let idx = self.suggestion_idx.unwrap_or(0);
        if let Some(info) = self.suggestions.get(idx) {
            self.input = info.code.to_string();
            self.refresh_suggestions();
        }
    }

    /// Text submitted on Enter: an explicitly highlighted suggestion wins
    /// over the raw input.
    fn executed_text(&self) -> String {
        if let Some(idx) = self.suggestion_idx {
            if let Some(info) = self.suggestions.get(idx) {
                return info.code.to_string();
            }
        }
        self.input.trim().to_string()
    }
}

pub struct TuiApp {
    workspace: Workspace,
    quotes: QuoteCache,
    series: HashMap<String, Vec<(f64, f64)>>,
    feed_status: FeedStatus,
    command_bar: CommandBar,
    sequencer: CommandSequencer,
    feed: FeedHandle,
    client: MarketClient,
    tx: broadcast::Sender<Command>,
    held: HashMap<String, usize>,
    alerts: Vec<AlertSpec>,
    notifications: Vec<String>,
    last_draw: Instant,
    min_redraw_gap: Duration,
    dirty: bool,
    status_message: Option<String>,
    status_visible_until: Option<Instant>,
    status_is_error: bool,
    exit_confirmation: bool,
}

impl TuiApp {
    pub fn new(
        client: MarketClient,
        layout: LayoutMode,
        command_history: Vec<String>,
        alerts: Vec<AlertSpec>,
        feed: FeedHandle,
        tx: broadcast::Sender<Command>,
    ) -> TuiApp {
        let min_redraw_gap = Duration::from_millis(100);
        let mut workspace = Workspace::new(layout);
        workspace.set_command_history(command_history);
        TuiApp {
            workspace,
            quotes: QuoteCache::new(),
            series: HashMap::new(),
            feed_status: FeedStatus::Disconnected,
            command_bar: CommandBar::new(),
            sequencer: CommandSequencer::new(),
            feed,
            client,
            tx,
            held: HashMap::new(),
            alerts,
            notifications: Vec::new(),
            last_draw: Instant::now() - min_redraw_gap,
            min_redraw_gap,
            dirty: true,
            status_message: None,
            status_visible_until: None,
            status_is_error: false,
            exit_confirmation: false,
        }
    }

    pub fn layout(&self) -> LayoutMode {
        self.workspace.layout()
    }

    pub fn command_history(&self) -> &[String] {
        self.workspace.command_history()
    }

    fn set_status_message(&mut self, message: impl Into<String>) {
        self.status_message = Some(message.into());
        self.status_visible_until = Some(Instant::now() + Duration::from_secs(3));
        self.status_is_error = false;
    }

    fn set_error_status_message(&mut self, message: impl Into<String>) {
        self.status_message = Some(message.into());
        self.status_visible_until = Some(Instant::now() + Duration::from_secs(5));
        self.status_is_error = true;
    }

    fn clear_status_if_allowed(&mut self) {
        if let Some(visible_until) = self.status_visible_until {
            if Instant::now() < visible_until {
                return;
            }
        }
        self.status_message = None;
        self.status_visible_until = None;
        self.status_is_error = false;
    }

    pub fn dispose(&self) {
        ratatui::restore();
    }

    pub async fn run(&mut self, rx: &mut broadcast::Receiver<Command>) -> Result<()> {
        color_eyre::install()?;
        let mut terminal = ratatui::init();
        let mut input_tick = tokio::time::interval(self.min_redraw_gap);
        terminal.draw(|frame| self.render(frame))?;
        self.last_draw = Instant::now();
        loop {
            tokio::select! {
                biased;
                _ = input_tick.tick() => {
                    if self.poll_input()? {
                        return Ok(());
                    }
                    let had_status = self.status_message.is_some();
                    self.clear_status_if_allowed();
                    if had_status && self.status_message.is_none() {
                        self.dirty = true;
                    }
                    // The session bar carries a clock, so idle frames still
                    // refresh about once a second.
                    let clock_due = self.last_draw.elapsed() >= Duration::from_secs(1);
                    if (self.dirty || clock_due)
                        && self.last_draw.elapsed() >= self.min_redraw_gap
                    {
                        terminal.draw(|frame| self.render(frame))?;
                        self.last_draw = Instant::now();
                        self.dirty = false;
                    }
                }
                result = rx.recv() => {
                    match result {
                        Ok(Command::QuoteTick(symbol, price, timestamp)) => {
                            self.on_tick(&symbol, price, timestamp);
                            if self.last_draw.elapsed() >= self.min_redraw_gap {
                                terminal.draw(|frame| self.render(frame))?;
                                self.last_draw = Instant::now();
                            }
                        }
                        Ok(Command::QuoteSnapshot(quote)) => {
                            self.on_snapshot(quote);
                            if self.last_draw.elapsed() >= self.min_redraw_gap {
                                terminal.draw(|frame| self.render(frame))?;
                                self.last_draw = Instant::now();
                            }
                        }
                        Ok(Command::FeedStatus(status)) => {
                            self.feed_status = status;
                            terminal.draw(|frame| self.render(frame))?;
                            self.last_draw = Instant::now();
                        }
                        Ok(Command::SecurityResolved(resolution)) => {
                            self.apply_resolution(resolution);
                            terminal.draw(|frame| self.render(frame))?;
                            self.last_draw = Instant::now();
                        }
                        Ok(Command::Notify(_, message)) => {
                            self.push_notification(&message);
                            self.set_status_message(message);
                            terminal.draw(|frame| self.render(frame))?;
                            self.last_draw = Instant::now();
                        }
                        Ok(Command::Error(message)) => {
                            self.set_error_status_message(message);
                            terminal.draw(|frame| self.render(frame))?;
                            self.last_draw = Instant::now();
                        }
                        Ok(Command::Exit) => return Ok(()),
                        Err(broadcast::error::RecvError::Closed) => break,
                        Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    }
                }
            }
        }
        Ok(())
    }

    fn on_tick(&mut self, symbol: &str, price: f64, timestamp: i64) {
        if !self.quotes.apply_tick(symbol, price, timestamp) {
            return;
        }
        let series = self.series.entry(symbol.to_string()).or_default();
        series.push((timestamp as f64, price));
        if series.len() > MAX_SERIES_POINTS {
            let excess = series.len() - MAX_SERIES_POINTS;
            series.drain(..excess);
        }
    }

    fn on_snapshot(&mut self, quote: Quote) {
        let symbol = quote.symbol.clone();
        let price = quote.price;
        let timestamp = quote.timestamp;
        if !self.quotes.apply_snapshot(quote) {
            return;
        }
        let series = self.series.entry(symbol).or_default();
        if series
            .last()
            .map(|(x, _)| (timestamp as f64) > *x)
            .unwrap_or(true)
        {
            series.push((timestamp as f64, price));
            if series.len() > MAX_SERIES_POINTS {
                let excess = series.len() - MAX_SERIES_POINTS;
                series.drain(..excess);
            }
        }
    }

    /// Applies a finished lookup unless a newer command on the same panel
    /// already completed. A lookup that found nothing only reports; its
    /// stamp was recorded all the same, so an older in-flight success
    /// cannot land afterwards.
    fn apply_resolution(&mut self, resolution: Resolution) {
        if !self
            .sequencer
            .try_complete(&resolution.panel_id, resolution.seq)
        {
            return;
        }
        match resolution.security {
            Some(security) => {
                self.workspace
                    .set_group_security(resolution.group, Some(security.clone()));
                self.workspace.navigate_to_function(
                    &resolution.panel_id,
                    &resolution.function_code,
                    Some(security.clone()),
                );
                self.set_status_message(format!(
                    "{} · {}",
                    security.listing_label(),
                    resolution.function_code
                ));
                self.sync_subscriptions();
            }
            None => {
                self.set_error_status_message(format!(
                    "No security found for {}",
                    resolution.query
                ));
            }
        }
    }

    fn push_notification(&mut self, message: &str) {
        let stamp = now_eastern().format("%H:%M:%S");
        self.notifications.insert(0, format!("{stamp}  {message}"));
        self.notifications.truncate(MAX_NOTIFICATIONS);
    }

    fn execute_command(&mut self) {
        let text = self.command_bar.executed_text();
        self.command_bar.blur_and_clear();
        if text.is_empty() {
            return;
        }
        self.workspace.record_command(&text);
        match intent::parse(&text) {
            Intent::Function(code) => {
                let panel_id = self.workspace.active_panel_id().to_string();
                let security = self
                    .workspace
                    .active_panel()
                    .and_then(|panel| panel.active_tab())
                    .and_then(|tab| tab.security.clone());
                self.workspace
                    .navigate_to_function(&panel_id, &code, security);
                if let Some(info) = functions::lookup(&code) {
                    self.set_status_message(format!("{} · {}", info.code, info.name));
                }
                self.sync_subscriptions();
            }
            Intent::SecurityFunction { query, code } => self.start_resolution(query, code),
            Intent::Security(query) => {
                self.start_resolution(query, DEFAULT_SECURITY_FUNCTION.to_string())
            }
            Intent::Unknown => {
                self.set_error_status_message(format!("Unrecognized command: {text}"));
            }
        }
    }

    /// Stamps the panel's sequence and fires the lookup in the background;
    /// the workspace stays untouched until the resolution comes back on
    /// the bus.
    fn start_resolution(&mut self, query: String, function_code: String) {
        let Some(panel) = self.workspace.active_panel() else {
            return;
        };
        let panel_id = panel.id.clone();
        let group = panel.group;
        let seq = self.sequencer.issue(&panel_id);
        let client = self.client.clone();
        let tx = self.tx.clone();
        self.set_status_message(format!("Searching {query}..."));
        tokio::spawn(async move {
            let security = match client.resolve_security(&query).await {
                Ok(found) => found,
                Err(err) => {
                    let _ = tx.send(Command::Error(format!("security lookup failed: {err}")));
                    None
                }
            };
            let _ = tx.send(Command::SecurityResolved(Resolution {
                panel_id,
                group,
                seq,
                function_code,
                query,
                security,
            }));
        });
    }

    /// Symbols the session currently wants streamed, counted once per
    /// holder: each visible panel's active tab security, plus the
    /// watchlist while a visible tab shows WATC.
    fn desired_symbols(&self) -> HashMap<String, usize> {
        let mut desired: HashMap<String, usize> = HashMap::new();
        let fullscreen_panel = self
            .workspace
            .fullscreen_panel_id()
            .and_then(|panel_id| self.workspace.panel(panel_id));
        let panels: Vec<&Panel> = match fullscreen_panel {
            Some(panel) => vec![panel],
            None => self.workspace.visible_panels().iter().collect(),
        };
        for panel in panels {
            let Some(tab) = panel.active_tab() else {
                continue;
            };
            if tab.function_code == "WATC" {
                for symbol in DEFAULT_WATCHLIST {
                    *desired.entry(symbol.to_string()).or_insert(0) += 1;
                }
            }
            if let Some(security) = &tab.security {
                *desired.entry(security.symbol.clone()).or_insert(0) += 1;
            }
        }
        desired
    }

    /// Reconciles held subscriptions against the desired multiset by
    /// sending one request per reference delta; the feed task collapses
    /// them to wire messages on 0/1 transitions.
    fn sync_subscriptions(&mut self) {
        let desired = self.desired_symbols();
        for (symbol, want) in &desired {
            let have = self.held.get(symbol).copied().unwrap_or(0);
            for _ in have..*want {
                match self.feed.subscribe(symbol) {
                    Ok(()) => {
                        *self.held.entry(symbol.clone()).or_insert(0) += 1;
                    }
                    Err(TrySendError::Full(_)) => {
                        self.set_error_status_message("feed request queue is full");
                        return;
                    }
                    Err(TrySendError::Closed(_)) => {
                        self.set_error_status_message("streaming feed is not running");
                        return;
                    }
                }
            }
        }
        let held_symbols: Vec<String> = self.held.keys().cloned().collect();
        for symbol in held_symbols {
            let want = desired.get(&symbol).copied().unwrap_or(0);
            let have = self.held.get(&symbol).copied().unwrap_or(0);
            for _ in want..have {
                match self.feed.unsubscribe(&symbol) {
                    Ok(()) => {
                        let remaining = match self.held.get_mut(&symbol) {
                            Some(count) => {
                                *count -= 1;
                                *count
                            }
                            None => 0,
                        };
                        if remaining == 0 {
                            self.held.remove(&symbol);
                        }
                    }
                    Err(TrySendError::Full(_)) => {
                        self.set_error_status_message("feed request queue is full");
                        return;
                    }
                    Err(TrySendError::Closed(_)) => {
                        self.set_error_status_message("streaming feed is not running");
                        return;
                    }
                }
            }
        }
    }

    fn poll_input(&mut self) -> Result<bool> {
        while event::poll(Duration::from_millis(0))? {
            match event::read()? {
                Event::Key(key) if key.kind == KeyEventKind::Press => {
                    if self.handle_key_event(key)? {
                        return Ok(true);
                    }
                }
                _ => {}
            }
        }
        Ok(false)
    }

    fn handle_key_event(&mut self, key: KeyEvent) -> Result<bool> {
        self.dirty = true;
        if self.exit_confirmation {
            return self.handle_exit_confirmation_key(key);
        }
        if key.modifiers.contains(KeyModifiers::CONTROL) {
            match key.code {
                KeyCode::Char('c') => self.prompt_exit_confirmation(),
                KeyCode::Char('1') => self.focus_panel(0),
                KeyCode::Char('2') => self.focus_panel(1),
                KeyCode::Char('3') => self.focus_panel(2),
                KeyCode::Char('4') => self.focus_panel(3),
                KeyCode::Char('l') => self.cycle_layout(),
                KeyCode::Char('w') => self.close_active_tab(),
                KeyCode::Char('t') => self.open_new_tab(),
                KeyCode::Char('f') => self.toggle_fullscreen(),
                _ => {}
            }
            return Ok(false);
        }
        match key.code {
            KeyCode::F(11) => self.toggle_fullscreen(),
            KeyCode::F(n) => self.apply_function_key(n),
            _ => {
                if self.command_bar.focused {
                    self.handle_command_bar_key(key);
                } else {
                    self.handle_workspace_key(key);
                }
            }
        }
        Ok(false)
    }

    fn handle_command_bar_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Esc => self.command_bar.blur_and_clear(),
            KeyCode::Enter => self.execute_command(),
            KeyCode::Tab => self.command_bar.complete_suggestion(),
            KeyCode::Up => {
                let history = self.workspace.command_history();
                self.command_bar.move_vertical(history, 1);
            }
            KeyCode::Down => {
                let history = self.workspace.command_history();
                self.command_bar.move_vertical(history, -1);
            }
            KeyCode::Backspace => self.command_bar.backspace(),
            KeyCode::Char(c) => self.command_bar.push_char(c),
            _ => {}
        }
    }

    fn handle_workspace_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Char('/') => self.command_bar.focus(),
            KeyCode::Char('q') | KeyCode::Char('Q') => self.prompt_exit_confirmation(),
            KeyCode::Tab => {
                let panel_id = self.workspace.active_panel_id().to_string();
                self.workspace.cycle_active_tab(&panel_id, false);
                self.sync_subscriptions();
            }
            KeyCode::BackTab => {
                let panel_id = self.workspace.active_panel_id().to_string();
                self.workspace.cycle_active_tab(&panel_id, true);
                self.sync_subscriptions();
            }
            KeyCode::Esc => {
                if self.workspace.fullscreen_panel_id().is_some() {
                    self.workspace.set_fullscreen_panel(None);
                    self.set_status_message("Fullscreen off");
                    self.sync_subscriptions();
                }
            }
            _ => {}
        }
    }

    fn focus_panel(&mut self, index: usize) {
        self.workspace.set_active_panel_index(index);
        if let Some(group) = PanelGroup::ALL.get(index) {
            self.set_status_message(format!("Panel {}", group.as_str()));
        }
    }

    fn cycle_layout(&mut self) {
        let layout = self.workspace.layout().cycle();
        self.workspace.set_layout(layout);
        self.set_status_message(format!("Layout {} (Ctrl+L)", layout.label()));
        self.sync_subscriptions();
    }

    fn close_active_tab(&mut self) {
        let panel_id = self.workspace.active_panel_id().to_string();
        let Some(tab_id) = self
            .workspace
            .active_panel()
            .map(|panel| panel.active_tab_id.clone())
        else {
            return;
        };
        self.workspace.close_tab(&panel_id, &tab_id);
        self.set_status_message("Closed tab (Ctrl+W)");
        self.sync_subscriptions();
    }

    fn open_new_tab(&mut self) {
        let panel_id = self.workspace.active_panel_id().to_string();
        self.workspace.add_tab(&panel_id, DEFAULT_TAB_FUNCTION, None);
        self.set_status_message("New tab (Ctrl+T)");
        self.sync_subscriptions();
    }

    fn toggle_fullscreen(&mut self) {
        if self.workspace.fullscreen_panel_id().is_some() {
            self.workspace.set_fullscreen_panel(None);
            self.set_status_message("Fullscreen off");
        } else {
            let panel_id = self.workspace.active_panel_id().to_string();
            self.workspace.set_fullscreen_panel(Some(panel_id));
            self.set_status_message("Fullscreen on (Ctrl+F)");
        }
        self.sync_subscriptions();
    }

    /// F1..F12 jump the active panel to the bound function, keeping the
    /// tab's current security.
    fn apply_function_key(&mut self, n: u8) {
        if n == 0 {
            return;
        }
        let Some((_, code)) = FUNCTION_KEYS.get(n as usize - 1) else {
            return;
        };
        let panel_id = self.workspace.active_panel_id().to_string();
        let security = self
            .workspace
            .active_panel()
            .and_then(|panel| panel.active_tab())
            .and_then(|tab| tab.security.clone());
        self.workspace.navigate_to_function(&panel_id, code, security);
        if let Some(info) = functions::lookup(code) {
            self.set_status_message(format!("{} · {}", info.code, info.name));
        }
        self.sync_subscriptions();
    }

    fn prompt_exit_confirmation(&mut self) {
        if self.exit_confirmation {
            return;
        }
        self.exit_confirmation = true;
    }

    fn handle_exit_confirmation_key(&mut self, key: KeyEvent) -> Result<bool> {
        if key.modifiers.contains(KeyModifiers::CONTROL) {
            if let KeyCode::Char('c') = key.code {
                self.exit_confirmation = false;
                return Ok(true);
            }
        }
        match key.code {
            KeyCode::Char('y')
            | KeyCode::Char('Y')
            | KeyCode::Char('q')
            | KeyCode::Char('Q')
            | KeyCode::Enter => {
                self.exit_confirmation = false;
                Ok(true)
            }
            KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => {
                self.exit_confirmation = false;
                self.set_status_message("Exit cancelled");
                Ok(false)
            }
            _ => Ok(false),
        }
    }

    fn render(&mut self, frame: &mut Frame) {
        let area = frame.area();
        if area.width < 40 || area.height < 10 {
            let hint = Paragraph::new("Terminal window too small")
                .style(Style::default().fg(Color::Red))
                .alignment(Alignment::Center);
            frame.render_widget(hint, area);
            return;
        }
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3),
                Constraint::Length(1),
                Constraint::Min(5),
                Constraint::Length(3),
            ])
            .split(area);
        self.render_command_bar(frame, chunks[0]);
        self.render_function_keys(frame, chunks[1]);
        self.render_panels(frame, chunks[2]);
        self.render_status(frame, chunks[3]);
        if self.command_bar.focused && !self.command_bar.suggestions.is_empty() {
            self.render_suggestions(frame, area, chunks[0]);
        }
        if self.exit_confirmation {
            self.render_exit_confirmation(frame);
        }
    }

    fn render_command_bar(&self, frame: &mut Frame, area: Rect) {
        let border_style = if self.command_bar.focused {
            Style::default().fg(Color::Yellow)
        } else {
            Style::default().fg(Color::DarkGray)
        };
        let title = match self.command_bar.history_idx {
            Some(idx) if self.command_bar.focused => format!(
                "Command · history {}/{}",
                idx + 1,
                self.workspace.command_history().len()
            ),
            _ if self.command_bar.focused => "Command".to_string(),
            _ => "Command · press / to type".to_string(),
        };
        let mut spans = Vec::new();
        if self.command_bar.input.is_empty() && !self.command_bar.focused {
            spans.push(Span::styled(
                "AAPL GP · MSFT US EQUITY DES · HELP",
                Style::default().fg(Color::DarkGray),
            ));
        } else {
            spans.push(Span::raw(self.command_bar.input.clone()));
            if self.command_bar.focused {
                spans.push(Span::styled("▌", Style::default().fg(Color::Yellow)));
            }
        }
        for group in PanelGroup::ALL {
            if let Some(security) = self.workspace.group_security(group) {
                spans.push(Span::raw("  "));
                spans.push(Span::styled(
                    format!("{}:{}", group.as_str(), security.symbol),
                    Style::default().fg(group_color(group)),
                ));
            }
        }
        let paragraph = Paragraph::new(Line::from(spans))
            .block(Block::bordered().border_style(border_style).title(title));
        frame.render_widget(paragraph, area);
    }

    fn render_function_keys(&self, frame: &mut Frame, area: Rect) {
        let mut spans = Vec::new();
        for (idx, (label, _)) in FUNCTION_KEYS.iter().enumerate() {
            spans.push(Span::styled(
                format!("F{}", idx + 1),
                Style::default()
                    .fg(Color::Yellow)
                    .add_modifier(Modifier::BOLD),
            ));
            spans.push(Span::styled(
                format!(":{label} "),
                Style::default().fg(Color::DarkGray),
            ));
        }
        frame.render_widget(Paragraph::new(Line::from(spans)), area);
    }

    fn render_suggestions(&self, frame: &mut Frame, area: Rect, command_area: Rect) {
        let top = command_area.y + command_area.height;
        let available = (area.y + area.height).saturating_sub(top);
        let height = (self.command_bar.suggestions.len() as u16 + 2).min(available);
        if height < 3 {
            return;
        }
        let width = area.width.saturating_sub(2).min(64);
        let popup = Rect::new(area.x + 1, top, width, height);
        let mut lines = Vec::new();
        for (idx, info) in self.command_bar.suggestions.iter().enumerate() {
            let mut line = Line::from(vec![
                Span::styled(
                    format!("{:<6}", info.code),
                    Style::default()
                        .fg(Color::Cyan)
                        .add_modifier(Modifier::BOLD),
                ),
                Span::raw(pad_cell(info.name, 26)),
                Span::styled(info.description, Style::default().fg(Color::DarkGray)),
            ]);
            if Some(idx) == self.command_bar.suggestion_idx {
                line = line.style(Style::default().add_modifier(Modifier::REVERSED));
            }
            lines.push(line);
        }
        let paragraph = Paragraph::new(lines).block(Block::bordered().title("Functions"));
        frame.render_widget(Clear, popup);
        frame.render_widget(paragraph, popup);
    }

    fn render_panels(&self, frame: &mut Frame, area: Rect) {
        if let Some(panel_id) = self.workspace.fullscreen_panel_id() {
            if let Some(panel) = self.workspace.panel(panel_id) {
                self.render_panel(frame, area, panel, true);
                return;
            }
        }
        let rects = layout_rects(self.workspace.layout(), area);
        for (panel, rect) in self.workspace.visible_panels().iter().zip(rects) {
            let active = panel.id == self.workspace.active_panel_id();
            self.render_panel(frame, rect, panel, active);
        }
    }

    fn render_panel(&self, frame: &mut Frame, area: Rect, panel: &Panel, active: bool) {
        if area.width < 10 || area.height < 4 {
            return;
        }
        let Some(tab) = panel.active_tab() else {
            return;
        };
        let border_style = if active {
            Style::default().fg(Color::Yellow)
        } else {
            Style::default().fg(Color::DarkGray)
        };
        let title = Line::from(vec![
            Span::styled(
                format!(" {} ", panel.group.as_str()),
                Style::default()
                    .fg(Color::Black)
                    .bg(group_color(panel.group)),
            ),
            Span::raw(" "),
            Span::styled(
                tab.title.clone(),
                Style::default().add_modifier(Modifier::BOLD),
            ),
        ]);
        let block = Block::bordered().border_style(border_style).title(title);
        let inner = block.inner(area);
        frame.render_widget(block, area);
        if inner.height < 2 {
            return;
        }
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Length(1), Constraint::Min(1)])
            .split(inner);
        self.render_tab_strip(frame, chunks[0], panel);
        let content = chunks[1];
        match tab.function_code.as_str() {
            "GP" => self.render_chart_screen(frame, content, tab),
            "DES" => self.render_description_screen(frame, content, tab),
            "HELP" => self.render_help_screen(frame, content),
            "ALRT" => self.render_alerts_screen(frame, content),
            "WATC" => self.render_watchlist_screen(frame, content),
            _ => self.render_generic_screen(frame, content, tab),
        }
    }

    fn render_tab_strip(&self, frame: &mut Frame, area: Rect, panel: &Panel) {
        let mut spans = Vec::new();
        for tab in &panel.tabs {
            let style = if tab.id == panel.active_tab_id {
                Style::default()
                    .fg(Color::Black)
                    .bg(Color::Gray)
                    .add_modifier(Modifier::BOLD)
            } else {
                Style::default().fg(Color::DarkGray)
            };
            spans.push(Span::styled(format!(" {} ", tab.title), style));
            spans.push(Span::raw(" "));
        }
        frame.render_widget(Paragraph::new(Line::from(spans)), area);
    }

    fn quote_line(&self, symbol: &str) -> Line<'static> {
        match self.quotes.get(symbol) {
            Some(quote) => {
                let change_color = if quote.change > 0.0 {
                    Color::Green
                } else if quote.change < 0.0 {
                    Color::Red
                } else {
                    Color::White
                };
                Line::from(vec![
                    Span::styled(
                        format!("{:.2}", quote.price),
                        Style::default()
                            .fg(change_color)
                            .add_modifier(Modifier::BOLD),
                    ),
                    Span::styled(
                        format!(" {:+.2} ({:+.2}%)", quote.change, quote.change_percent),
                        Style::default().fg(change_color),
                    ),
                    Span::styled(
                        format!(
                            "  O {:.2} H {:.2} L {:.2} PC {:.2}",
                            quote.open, quote.high, quote.low, quote.prev_close
                        ),
                        Style::default().fg(Color::Gray),
                    ),
                    Span::styled(
                        format!("  {} ET", clock_label(quote.timestamp)),
                        Style::default().fg(Color::DarkGray),
                    ),
                ])
            }
            None => Line::from(Span::styled(
                "awaiting quote data",
                Style::default().fg(Color::DarkGray),
            )),
        }
    }

    fn render_quote_header(&self, frame: &mut Frame, area: Rect, security: &Security) {
        let mut name_spans = vec![Span::styled(
            security.symbol.clone(),
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        )];
        name_spans.push(Span::raw(" "));
        name_spans.push(Span::styled(
            security.name.clone(),
            Style::default().fg(Color::White),
        ));
        if let Some(exchange) = &security.exchange {
            name_spans.push(Span::styled(
                format!("  {exchange}"),
                Style::default().fg(Color::DarkGray),
            ));
        }
        let lines = vec![Line::from(name_spans), self.quote_line(&security.symbol)];
        frame.render_widget(Paragraph::new(lines), area);
    }

    fn render_chart_screen(&self, frame: &mut Frame, area: Rect, tab: &PanelTab) {
        let Some(security) = &tab.security else {
            self.render_hint(frame, area, "Enter a security to chart, e.g. AAPL GP");
            return;
        };
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Length(2), Constraint::Min(3)])
            .split(area);
        self.render_quote_header(frame, chunks[0], security);
        let series = self
            .series
            .get(&security.symbol)
            .map(|points| points.as_slice())
            .unwrap_or(&[]);
        if series.len() < 2 {
            self.render_hint(frame, chunks[1], "Waiting for trades to plot");
            return;
        }
        let first_x = series[0].0;
        let last_x = series[series.len() - 1].0;
        let x_bounds = if last_x - first_x < 1.0 {
            [first_x - 1.0, first_x + 1.0]
        } else {
            [first_x, last_x]
        };
        let mut min_y = f64::INFINITY;
        let mut max_y = f64::NEG_INFINITY;
        for (_, y) in series {
            if y.is_finite() {
                min_y = min_y.min(*y);
                max_y = max_y.max(*y);
            }
        }
        if !min_y.is_finite() || !max_y.is_finite() {
            self.render_hint(frame, chunks[1], "Waiting for trades to plot");
            return;
        }
        let padding = ((max_y - min_y) * 0.05).max(0.01);
        let y_bounds = [min_y - padding, max_y + padding];
        let mid_x = (first_x + last_x) / 2.0;
        let x_labels = vec![
            Span::styled(
                clock_label(first_x as i64),
                Style::default().add_modifier(Modifier::BOLD),
            ),
            Span::raw(clock_label(mid_x as i64)),
            Span::styled(
                clock_label(last_x as i64),
                Style::default().add_modifier(Modifier::BOLD),
            ),
        ];
        let y_labels = vec![
            Span::styled(
                format!("{min_y:.2}"),
                Style::default().add_modifier(Modifier::BOLD),
            ),
            Span::raw(format!("{:.2}", (min_y + max_y) / 2.0)),
            Span::styled(
                format!("{max_y:.2}"),
                Style::default().add_modifier(Modifier::BOLD),
            ),
        ];
        let datasets = vec![
            Dataset::default()
                .name(security.symbol.clone())
                .marker(symbols::Marker::Braille)
                .graph_type(GraphType::Line)
                .style(Style::default().fg(Color::Cyan))
                .data(series),
        ];
        let chart = Chart::new(datasets)
            .x_axis(
                Axis::default()
                    .style(Style::default().fg(Color::Gray))
                    .labels(x_labels)
                    .labels_alignment(Alignment::Left)
                    .bounds(x_bounds),
            )
            .y_axis(
                Axis::default()
                    .style(Style::default().fg(Color::Gray))
                    .labels(y_labels)
                    .bounds(y_bounds),
            );
        frame.render_widget(chart, chunks[1]);
    }

    fn render_description_screen(&self, frame: &mut Frame, area: Rect, tab: &PanelTab) {
        let Some(security) = &tab.security else {
            self.render_hint(frame, area, "Enter a security to describe, e.g. AAPL DES");
            return;
        };
        let label_style = Style::default().fg(Color::DarkGray);
        let mut lines = vec![
            Line::from(vec![
                Span::styled("Symbol    ", label_style),
                Span::styled(
                    security.symbol.clone(),
                    Style::default()
                        .fg(Color::Yellow)
                        .add_modifier(Modifier::BOLD),
                ),
            ]),
            Line::from(vec![
                Span::styled("Name      ", label_style),
                Span::raw(security.name.clone()),
            ]),
            Line::from(vec![
                Span::styled("Type      ", label_style),
                Span::raw(security.kind.label()),
            ]),
            Line::from(vec![
                Span::styled("Exchange  ", label_style),
                Span::raw(
                    security
                        .exchange
                        .clone()
                        .unwrap_or_else(|| "n/a".to_string()),
                ),
            ]),
            Line::from(vec![
                Span::styled("Currency  ", label_style),
                Span::raw(
                    security
                        .currency
                        .clone()
                        .unwrap_or_else(|| "USD".to_string()),
                ),
            ]),
            Line::from(" "),
        ];
        lines.push(self.quote_line(&security.symbol));
        let paragraph = Paragraph::new(lines).wrap(Wrap { trim: true });
        frame.render_widget(paragraph, area);
    }

    fn render_help_screen(&self, frame: &mut Frame, area: Rect) {
        let mut groups: Vec<(&str, Vec<&functions::FunctionInfo>)> = Vec::new();
        for info in functions::FUNCTION_REGISTRY {
            match groups
                .iter_mut()
                .find(|(category, _)| *category == info.category)
            {
                Some((_, list)) => list.push(info),
                None => groups.push((info.category, vec![info])),
            }
        }
        let mut lines = Vec::new();
        for (category, infos) in groups {
            lines.push(Line::from(Span::styled(
                category,
                Style::default()
                    .fg(Color::Yellow)
                    .add_modifier(Modifier::BOLD),
            )));
            for info in infos {
                lines.push(Line::from(vec![
                    Span::styled(
                        format!("  {:<6}", info.code),
                        Style::default().fg(Color::Cyan),
                    ),
                    Span::raw(pad_cell(info.name, 26)),
                    Span::styled(info.description, Style::default().fg(Color::DarkGray)),
                ]));
            }
        }
        lines.push(Line::from(" "));
        lines.push(Line::from(Span::styled(
            "Keyboard",
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        )));
        for shortcut in [
            "  /           focus the command line",
            "  Ctrl+1..4   focus panel A..D",
            "  Ctrl+L      cycle layout",
            "  Ctrl+T      new tab · Ctrl+W close tab",
            "  Ctrl+F/F11  fullscreen panel",
            "  Tab         cycle tabs · F1..F12 quick functions",
            "  q           quit",
        ] {
            lines.push(Line::from(shortcut));
        }
        frame.render_widget(Paragraph::new(lines), area);
    }

    fn render_alerts_screen(&self, frame: &mut Frame, area: Rect) {
        let mut lines = vec![Line::from(Span::styled(
            "Configured bands",
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        ))];
        if self.alerts.is_empty() {
            lines.push(Line::from(Span::styled(
                "  none · start with --alert SYMBOL:LOWER:UPPER",
                Style::default().fg(Color::DarkGray),
            )));
        }
        for alert in &self.alerts {
            lines.push(Line::from(format!(
                "  {:<8}{:>12.2}{:>12.2}",
                alert.symbol, alert.lower, alert.upper
            )));
        }
        lines.push(Line::from(" "));
        lines.push(Line::from(Span::styled(
            "Recent notifications",
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        )));
        if self.notifications.is_empty() {
            lines.push(Line::from(Span::styled(
                "  none yet",
                Style::default().fg(Color::DarkGray),
            )));
        }
        for notification in &self.notifications {
            lines.push(Line::from(format!("  {notification}")));
        }
        frame.render_widget(Paragraph::new(lines), area);
    }

    fn render_watchlist_screen(&self, frame: &mut Frame, area: Rect) {
        let mut lines = vec![Line::from(Span::styled(
            format!(
                "{:<8}{:>10}{:>10}{:>9}{:>10}{:>10}",
                "SYMBOL", "LAST", "CHG", "CHG%", "HIGH", "LOW"
            ),
            Style::default().add_modifier(Modifier::BOLD),
        ))];
        for symbol in DEFAULT_WATCHLIST {
            match self.quotes.get(symbol) {
                Some(quote) => {
                    let row_color = if quote.change > 0.0 {
                        Color::Green
                    } else if quote.change < 0.0 {
                        Color::Red
                    } else {
                        Color::White
                    };
                    lines.push(Line::from(Span::styled(
                        format!(
                            "{:<8}{:>10.2}{:>+10.2}{:>+8.2}%{:>10.2}{:>10.2}",
                            symbol,
                            quote.price,
                            quote.change,
                            quote.change_percent,
                            quote.high,
                            quote.low
                        ),
                        Style::default().fg(row_color),
                    )));
                }
                None => lines.push(Line::from(Span::styled(
                    format!(
                        "{symbol:<8}{:>10}{:>10}{:>9}{:>10}{:>10}",
                        "-", "-", "-", "-", "-"
                    ),
                    Style::default().fg(Color::DarkGray),
                ))),
            }
        }
        frame.render_widget(Paragraph::new(lines), area);
    }

    fn render_generic_screen(&self, frame: &mut Frame, area: Rect, tab: &PanelTab) {
        let mut lines = Vec::new();
        match functions::lookup(&tab.function_code) {
            Some(info) => {
                lines.push(Line::from(vec![
                    Span::styled(
                        info.code,
                        Style::default()
                            .fg(Color::Yellow)
                            .add_modifier(Modifier::BOLD),
                    ),
                    Span::raw(" "),
                    Span::styled(info.name, Style::default().add_modifier(Modifier::BOLD)),
                    Span::styled(
                        format!("  {}", info.category),
                        Style::default().fg(Color::DarkGray),
                    ),
                ]));
                lines.push(Line::from(info.description));
            }
            None => {
                lines.push(Line::from(Span::styled(
                    tab.function_code.clone(),
                    Style::default().add_modifier(Modifier::BOLD),
                )));
            }
        }
        lines.push(Line::from(" "));
        match &tab.security {
            Some(security) => {
                lines.push(Line::from(security.listing_label()));
                lines.push(self.quote_line(&security.symbol));
            }
            None => lines.push(Line::from(Span::styled(
                "No security loaded for this screen",
                Style::default().fg(Color::DarkGray),
            ))),
        }
        let paragraph = Paragraph::new(lines).wrap(Wrap { trim: true });
        frame.render_widget(paragraph, area);
    }

    fn render_hint(&self, frame: &mut Frame, area: Rect, text: &str) {
        let hint = Paragraph::new(text.to_string())
            .style(Style::default().fg(Color::DarkGray))
            .wrap(Wrap { trim: true });
        frame.render_widget(hint, area);
    }

    fn render_status(&self, frame: &mut Frame, area: Rect) {
        if let Some(message) = &self.status_message {
            let color = if self.status_is_error {
                Color::Red
            } else {
                Color::Yellow
            };
            let status = Paragraph::new(message.as_str())
                .style(Style::default().fg(color))
                .alignment(Alignment::Left)
                .block(Block::bordered().title("Status"));
            frame.render_widget(status, area);
            return;
        }
        let now = now_eastern();
        let market = market_status_label(now);
        let market_color = match market {
            "OPEN" => Color::Green,
            "CLOSED" => Color::Red,
            _ => Color::Yellow,
        };
        let feed_color = match self.feed_status {
            FeedStatus::Connected => Color::Green,
            FeedStatus::Connecting => Color::Yellow,
            FeedStatus::Disconnected => Color::Red,
        };
        let active_group = self
            .workspace
            .active_panel()
            .map(|panel| panel.group.as_str())
            .unwrap_or("-");
        let separator = Span::styled(" · ", Style::default().fg(Color::DarkGray));
        let line = Line::from(vec![
            Span::styled(
                format!(" {market} "),
                Style::default().fg(Color::Black).bg(market_color),
            ),
            Span::raw(format!(" {} ET", now.format("%a %b %d  %H:%M:%S"))),
            separator.clone(),
            Span::styled(
                format!("FEED {}", self.feed_status.label()),
                Style::default().fg(feed_color),
            ),
            separator.clone(),
            Span::raw(self.workspace.layout().label()),
            separator,
            Span::raw(format!("PANEL {active_group}")),
        ]);
        let paragraph = Paragraph::new(line).block(Block::bordered().title("Session"));
        frame.render_widget(paragraph, area);
    }

    fn render_exit_confirmation(&self, frame: &mut Frame) {
        let area = frame.area();
        if area.width < 24 || area.height < 5 {
            return;
        }
        let popup_width = area.width.saturating_sub(20).min(50).max(28);
        let popup_height = 6;
        let left = area.x + (area.width.saturating_sub(popup_width)) / 2;
        let top = area.y + (area.height.saturating_sub(popup_height)) / 2;
        let popup = Rect::new(left, top, popup_width, popup_height);
        let lines = vec![
            Line::from(Span::styled(
                "Leave the terminal session?",
                Style::default()
                    .fg(Color::LightRed)
                    .add_modifier(Modifier::BOLD),
            )),
            Line::from("Y/Enter confirm · N/Esc cancel"),
            Line::from("q also confirms · Ctrl+C quits at once"),
        ];
        let paragraph = Paragraph::new(lines)
            .alignment(Alignment::Left)
            .block(Block::bordered().title("Confirm exit"));
        frame.render_widget(Clear, popup);
        frame.render_widget(paragraph, popup);
    }
}

/// Panel rectangles per layout mode, in fixed panel order. The grid hands
/// the first rect to the first visible panel and so on.
fn layout_rects(mode: LayoutMode, area: Rect) -> Vec<Rect> {
    match mode {
        LayoutMode::Single => vec![area],
        LayoutMode::Quad => {
            let rows = Layout::default()
                .direction(Direction::Vertical)
                .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
                .split(area);
            let top = Layout::default()
                .direction(Direction::Horizontal)
                .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
                .split(rows[0]);
            let bottom = Layout::default()
                .direction(Direction::Horizontal)
                .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
                .split(rows[1]);
            vec![top[0], top[1], bottom[0], bottom[1]]
        }
        LayoutMode::DualHorizontal => {
            let columns = Layout::default()
                .direction(Direction::Horizontal)
                .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
                .split(area);
            vec![columns[0], columns[1]]
        }
        LayoutMode::DualVertical => {
            let rows = Layout::default()
                .direction(Direction::Vertical)
                .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
                .split(area);
            vec![rows[0], rows[1]]
        }
        LayoutMode::TripleLeft => {
            let columns = Layout::default()
                .direction(Direction::Horizontal)
                .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
                .split(area);
            let stack = Layout::default()
                .direction(Direction::Vertical)
                .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
                .split(columns[1]);
            vec![columns[0], stack[0], stack[1]]
        }
        LayoutMode::TripleRight => {
            let columns = Layout::default()
                .direction(Direction::Horizontal)
                .constraints([Constraint::Percentage(40), Constraint::Percentage(60)])
                .split(area);
            let stack = Layout::default()
                .direction(Direction::Vertical)
                .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
                .split(columns[0]);
            vec![stack[0], stack[1], columns[1]]
        }
    }
}

fn group_color(group: PanelGroup) -> Color {
    match group {
        PanelGroup::A => Color::Yellow,
        PanelGroup::B => Color::Green,
        PanelGroup::C => Color::Cyan,
        PanelGroup::D => Color::Magenta,
    }
}

fn now_eastern() -> DateTime<Tz> {
    Utc::now().with_timezone(&New_York)
}

/// NYSE session buckets in Eastern time: regular 09:30..16:00, pre-market
/// from 04:00, post-market until 20:00, weekends closed.
fn market_status_label(now: DateTime<Tz>) -> &'static str {
    if matches!(now.weekday(), Weekday::Sat | Weekday::Sun) {
        return "CLOSED";
    }
    let minutes = now.hour() * 60 + now.minute();
    if (570..960).contains(&minutes) {
        "OPEN"
    } else if (240..570).contains(&minutes) {
        "PRE-MKT"
    } else if (960..1200).contains(&minutes) {
        "POST-MKT"
    } else {
        "CLOSED"
    }
}

fn clock_label(timestamp_ms: i64) -> String {
    if timestamp_ms <= 0 {
        return "--:--:--".to_string();
    }
    DateTime::from_timestamp_millis(timestamp_ms)
        .map(|dt| dt.with_timezone(&New_York).format("%H:%M:%S").to_string())
        .unwrap_or_else(|| "--:--:--".to_string())
}

/// Clips to the display width and pads with spaces; wide characters count
/// by their rendered width.
fn pad_cell(text: &str, width: usize) -> String {
    let mut out = String::new();
    let mut used = 0;
    for ch in text.chars() {
        let w = UnicodeWidthChar::width(ch).unwrap_or(0);
        if used + w > width {
            break;
        }
        out.push(ch);
        used += w;
    }
    while used < width {
        out.push(' ');
        used += 1;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::FeedCommand;
    use crate::security::SecurityType;
    use chrono::TimeZone;
    use tokio::sync::mpsc;

    fn security(symbol: &str) -> Security {
        Security {
            symbol: symbol.to_string(),
            name: format!("{symbol} Inc"),
            kind: SecurityType::Equity,
            exchange: None,
            currency: None,
        }
    }

    fn test_app() -> (
        TuiApp,
        mpsc::Receiver<FeedCommand>,
        broadcast::Receiver<Command>,
    ) {
        let (bus_tx, bus_rx) = broadcast::channel::<Command>(16);
        let (feed_tx, feed_rx) = mpsc::channel::<FeedCommand>(64);
        let client = MarketClient::new("test-token").expect("client should build");
        let app = TuiApp::new(
            client,
            LayoutMode::Quad,
            Vec::new(),
            Vec::new(),
            FeedHandle::new(feed_tx),
            bus_tx,
        );
        (app, feed_rx, bus_rx)
    }

    fn drain_feed(rx: &mut mpsc::Receiver<FeedCommand>) -> Vec<FeedCommand> {
        let mut out = Vec::new();
        while let Ok(request) = rx.try_recv() {
            out.push(request);
        }
        out
    }

    #[test]
    fn sync_sends_one_subscribe_per_reference() {
        let (mut app, mut feed_rx, _bus) = test_app();
        app.workspace
            .set_group_security(PanelGroup::A, Some(security("AAPL")));
        app.sync_subscriptions();
        assert_eq!(
            drain_feed(&mut feed_rx),
            [FeedCommand::Subscribe("AAPL".to_string())]
        );

        // Unchanged state stays quiet.
        app.sync_subscriptions();
        assert!(drain_feed(&mut feed_rx).is_empty());
    }

    #[test]
    fn shared_symbols_carry_one_reference_per_panel() {
        let (mut app, mut feed_rx, _bus) = test_app();
        app.workspace
            .set_group_security(PanelGroup::A, Some(security("AAPL")));
        app.workspace
            .set_group_security(PanelGroup::B, Some(security("AAPL")));
        app.sync_subscriptions();
        let requests = drain_feed(&mut feed_rx);
        assert_eq!(requests.len(), 2);
        assert!(
            requests
                .iter()
                .all(|request| *request == FeedCommand::Subscribe("AAPL".to_string()))
        );

        app.workspace.set_group_security(PanelGroup::B, None);
        app.sync_subscriptions();
        assert_eq!(
            drain_feed(&mut feed_rx),
            [FeedCommand::Unsubscribe("AAPL".to_string())]
        );
        assert_eq!(app.held.get("AAPL").copied(), Some(1));
    }

    #[test]
    fn hiding_a_panel_releases_its_symbol() {
        let (mut app, mut feed_rx, _bus) = test_app();
        app.workspace
            .set_group_security(PanelGroup::D, Some(security("TSLA")));
        app.sync_subscriptions();
        assert_eq!(
            drain_feed(&mut feed_rx),
            [FeedCommand::Subscribe("TSLA".to_string())]
        );

        app.workspace.set_layout(LayoutMode::Single);
        app.sync_subscriptions();
        assert_eq!(
            drain_feed(&mut feed_rx),
            [FeedCommand::Unsubscribe("TSLA".to_string())]
        );
        assert!(app.held.is_empty());
    }

    #[test]
    fn fullscreen_narrows_subscriptions_to_one_panel() {
        let (mut app, mut feed_rx, _bus) = test_app();
        app.workspace
            .set_group_security(PanelGroup::A, Some(security("AAPL")));
        app.workspace
            .set_group_security(PanelGroup::B, Some(security("MSFT")));
        app.sync_subscriptions();
        drain_feed(&mut feed_rx);

        let panel_a = app.workspace.panels()[0].id.clone();
        app.workspace.set_fullscreen_panel(Some(panel_a));
        app.sync_subscriptions();
        assert_eq!(
            drain_feed(&mut feed_rx),
            [FeedCommand::Unsubscribe("MSFT".to_string())]
        );
        assert_eq!(app.held.get("AAPL").copied(), Some(1));
    }

    #[test]
    fn watchlist_tab_subscribes_the_watchlist() {
        let (mut app, mut feed_rx, _bus) = test_app();
        let panel_id = app.workspace.panels()[0].id.clone();
        app.workspace.navigate_to_function(&panel_id, "WATC", None);
        app.sync_subscriptions();
        let requests = drain_feed(&mut feed_rx);
        assert_eq!(requests.len(), DEFAULT_WATCHLIST.len());
        assert!(requests.contains(&FeedCommand::Subscribe("BRK.B".to_string())));
    }

    #[test]
    fn stale_resolution_is_discarded() {
        let (mut app, _feed_rx, _bus) = test_app();
        let panel_id = app.workspace.panels()[0].id.clone();
        let seq_old = app.sequencer.issue(&panel_id);
        let seq_new = app.sequencer.issue(&panel_id);

        app.apply_resolution(Resolution {
            panel_id: panel_id.clone(),
            group: PanelGroup::A,
            seq: seq_new,
            function_code: "GP".to_string(),
            query: "NVDA".to_string(),
            security: Some(security("NVDA")),
        });
        app.apply_resolution(Resolution {
            panel_id: panel_id.clone(),
            group: PanelGroup::A,
            seq: seq_old,
            function_code: "DES".to_string(),
            query: "AAPL".to_string(),
            security: Some(security("AAPL")),
        });

        let panel = app.workspace.panel(&panel_id).expect("panel should exist");
        let tab = panel.active_tab().expect("active tab should exist");
        assert_eq!(tab.function_code, "GP");
        assert_eq!(
            tab.security.as_ref().map(|s| s.symbol.as_str()),
            Some("NVDA")
        );
    }

    #[test]
    fn failed_resolution_still_blocks_older_commands() {
        let (mut app, _feed_rx, _bus) = test_app();
        let panel_id = app.workspace.panels()[0].id.clone();
        let seq_old = app.sequencer.issue(&panel_id);
        let seq_new = app.sequencer.issue(&panel_id);

        app.apply_resolution(Resolution {
            panel_id: panel_id.clone(),
            group: PanelGroup::A,
            seq: seq_new,
            function_code: "DES".to_string(),
            query: "ZZZZZ".to_string(),
            security: None,
        });
        assert!(app.status_is_error);

        app.apply_resolution(Resolution {
            panel_id: panel_id.clone(),
            group: PanelGroup::A,
            seq: seq_old,
            function_code: "DES".to_string(),
            query: "AAPL".to_string(),
            security: Some(security("AAPL")),
        });
        assert!(app.workspace.group_security(PanelGroup::A).is_none());
    }

    #[test]
    fn ticks_update_series_only_after_a_snapshot() {
        let (mut app, _feed_rx, _bus) = test_app();
        app.on_tick("AAPL", 100.0, 1_000);
        assert!(app.series.get("AAPL").is_none());

        app.on_snapshot(Quote {
            symbol: "AAPL".to_string(),
            price: 100.0,
            change: 0.0,
            change_percent: 0.0,
            high: 101.0,
            low: 99.0,
            open: 99.5,
            prev_close: 100.0,
            timestamp: 1_000,
        });
        app.on_tick("AAPL", 101.0, 2_000);
        assert_eq!(app.series.get("AAPL").map(|s| s.len()), Some(2));
    }

    #[test]
    fn series_length_is_capped() {
        let (mut app, _feed_rx, _bus) = test_app();
        app.on_snapshot(Quote {
            symbol: "AAPL".to_string(),
            price: 100.0,
            change: 0.0,
            change_percent: 0.0,
            high: 101.0,
            low: 99.0,
            open: 99.5,
            prev_close: 100.0,
            timestamp: 1,
        });
        for i in 0..(MAX_SERIES_POINTS as i64 + 50) {
            app.on_tick("AAPL", 100.0 + (i % 7) as f64, 1_000 + i);
        }
        assert_eq!(
            app.series.get("AAPL").map(|s| s.len()),
            Some(MAX_SERIES_POINTS)
        );
    }

    #[test]
    fn command_bar_history_recall_keeps_the_draft() {
        let mut bar = CommandBar::new();
        let history = vec!["MSFT DES".to_string(), "AAPL GP".to_string()];
        bar.focus();
        bar.move_vertical(&history, 1);
        assert_eq!(bar.input, "MSFT DES");
        bar.move_vertical(&history, 1);
        assert_eq!(bar.input, "AAPL GP");
        // Clamped at the oldest entry.
        bar.move_vertical(&history, 1);
        assert_eq!(bar.input, "AAPL GP");
        bar.move_vertical(&history, -1);
        assert_eq!(bar.input, "MSFT DES");
        bar.move_vertical(&history, -1);
        assert_eq!(bar.input, "");
        assert!(bar.history_idx.is_none());
    }

    #[test]
    fn command_bar_suggestions_follow_typing() {
        let mut bar = CommandBar::new();
        bar.focus();
        assert!(bar.suggestions.is_empty());
        bar.push_char('G');
        bar.push_char('P');
        assert!(bar.suggestions.iter().any(|info| info.code == "GP"));
        bar.move_vertical(&[], 1);
        assert_eq!(bar.suggestion_idx, Some(0));
        assert_eq!(bar.executed_text(), bar.suggestions[0].code);
        bar.complete_suggestion();
        assert_eq!(bar.input, "GP");
    }

    #[test]
    fn layout_rects_match_visible_panel_counts() {
        let area = Rect::new(0, 0, 120, 40);
        for mode in [
            LayoutMode::Quad,
            LayoutMode::Single,
            LayoutMode::DualHorizontal,
            LayoutMode::DualVertical,
            LayoutMode::TripleLeft,
            LayoutMode::TripleRight,
        ] {
            assert_eq!(layout_rects(mode, area).len(), mode.visible_panels());
        }
    }

    #[test]
    fn market_hours_follow_the_eastern_clock() {
        let wednesday_open = New_York
            .with_ymd_and_hms(2024, 1, 3, 10, 0, 0)
            .single()
            .expect("should build datetime");
        assert_eq!(market_status_label(wednesday_open), "OPEN");

        let wednesday_pre = New_York
            .with_ymd_and_hms(2024, 1, 3, 8, 0, 0)
            .single()
            .expect("should build datetime");
        assert_eq!(market_status_label(wednesday_pre), "PRE-MKT");

        let wednesday_post = New_York
            .with_ymd_and_hms(2024, 1, 3, 17, 0, 0)
            .single()
            .expect("should build datetime");
        assert_eq!(market_status_label(wednesday_post), "POST-MKT");

        let wednesday_night = New_York
            .with_ymd_and_hms(2024, 1, 3, 23, 0, 0)
            .single()
            .expect("should build datetime");
        assert_eq!(market_status_label(wednesday_night), "CLOSED");

        let saturday_noon = New_York
            .with_ymd_and_hms(2024, 1, 6, 12, 0, 0)
            .single()
            .expect("should build datetime");
        assert_eq!(market_status_label(saturday_noon), "CLOSED");
    }
}

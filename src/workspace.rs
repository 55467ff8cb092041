use rand::Rng;
use rand::distr::Alphanumeric;
use serde::{Deserialize, Serialize};

use crate::functions::DEFAULT_TAB_FUNCTION;
use crate::security::Security;

pub const PANEL_COUNT: usize = 4;
const HISTORY_CAP: usize = 50;
const TAB_ID_LEN: usize = 8;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PanelGroup {
    A,
    B,
    C,
    D,
}

impl PanelGroup {
    pub const ALL: [PanelGroup; PANEL_COUNT] =
        [PanelGroup::A, PanelGroup::B, PanelGroup::C, PanelGroup::D];

    pub fn as_str(&self) -> &'static str {
        match self {
            PanelGroup::A => "A",
            PanelGroup::B => "B",
            PanelGroup::C => "C",
            PanelGroup::D => "D",
        }
    }

    fn index(&self) -> usize {
        match self {
            PanelGroup::A => 0,
            PanelGroup::B => 1,
            PanelGroup::C => 2,
            PanelGroup::D => 3,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum LayoutMode {
    Quad,
    Single,
    DualHorizontal,
    DualVertical,
    TripleLeft,
    TripleRight,
}

impl LayoutMode {
    /// Number of panels the grid renders; visible panels are always the
    /// first N in fixed order, the rest keep state off screen.
    pub fn visible_panels(&self) -> usize {
        match self {
            LayoutMode::Quad => 4,
            LayoutMode::Single => 1,
            LayoutMode::DualHorizontal | LayoutMode::DualVertical => 2,
            LayoutMode::TripleLeft | LayoutMode::TripleRight => 3,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            LayoutMode::Quad => "QUAD",
            LayoutMode::Single => "SINGLE",
            LayoutMode::DualHorizontal => "DUAL-H",
            LayoutMode::DualVertical => "DUAL-V",
            LayoutMode::TripleLeft => "TRIPLE-L",
            LayoutMode::TripleRight => "TRIPLE-R",
        }
    }

    pub fn cycle(&self) -> LayoutMode {
        match self {
            LayoutMode::Quad => LayoutMode::Single,
            LayoutMode::Single => LayoutMode::DualHorizontal,
            LayoutMode::DualHorizontal => LayoutMode::DualVertical,
            LayoutMode::DualVertical => LayoutMode::TripleLeft,
            LayoutMode::TripleLeft => LayoutMode::TripleRight,
            LayoutMode::TripleRight => LayoutMode::Quad,
        }
    }
}

impl Default for LayoutMode {
    fn default() -> Self {
        LayoutMode::Quad
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PanelTab {
    pub id: String,
    pub function_code: String,
    pub security: Option<Security>,
    pub title: String,
}

impl PanelTab {
    fn new(function_code: &str, security: Option<Security>) -> PanelTab {
        PanelTab {
            id: new_id(),
            title: tab_title(function_code, security.as_ref()),
            function_code: function_code.to_string(),
            security,
        }
    }

    fn fresh() -> PanelTab {
        PanelTab::new(DEFAULT_TAB_FUNCTION, None)
    }
}

#[derive(Debug, Clone)]
pub struct Panel {
    pub id: String,
    pub group: PanelGroup,
    pub tabs: Vec<PanelTab>,
    pub active_tab_id: String,
}

impl Panel {
    fn new(group: PanelGroup) -> Panel {
        let tab = PanelTab::fresh();
        Panel {
            id: new_id(),
            group,
            active_tab_id: tab.id.clone(),
            tabs: vec![tab],
        }
    }

    pub fn active_tab(&self) -> Option<&PanelTab> {
        self.tabs.iter().find(|tab| tab.id == self.active_tab_id)
    }
}

/// Session-scoped panel/tab/group state. Exactly four panels, one per
/// group, live for the whole session; every mutation keeps each panel
/// holding at least one tab with a valid active-tab id.
#[derive(Debug)]
pub struct Workspace {
    layout: LayoutMode,
    panels: Vec<Panel>,
    active_panel_id: String,
    fullscreen_panel_id: Option<String>,
    group_securities: [Option<Security>; PANEL_COUNT],
    command_history: Vec<String>,
}

impl Workspace {
    pub fn new(layout: LayoutMode) -> Workspace {
        let panels: Vec<Panel> = PanelGroup::ALL.iter().map(|g| Panel::new(*g)).collect();
        let active_panel_id = panels[0].id.clone();
        Workspace {
            layout,
            panels,
            active_panel_id,
            fullscreen_panel_id: None,
            group_securities: [None, None, None, None],
            command_history: Vec::new(),
        }
    }

    pub fn layout(&self) -> LayoutMode {
        self.layout
    }

    pub fn set_layout(&mut self, layout: LayoutMode) {
        self.layout = layout;
    }

    pub fn panels(&self) -> &[Panel] {
        &self.panels
    }

    pub fn panel(&self, panel_id: &str) -> Option<&Panel> {
        self.panels.iter().find(|panel| panel.id == panel_id)
    }

    pub fn visible_panels(&self) -> &[Panel] {
        let count = self.layout.visible_panels().min(self.panels.len());
        &self.panels[..count]
    }

    pub fn active_panel_id(&self) -> &str {
        &self.active_panel_id
    }

    pub fn active_panel(&self) -> Option<&Panel> {
        self.panels
            .iter()
            .find(|panel| panel.id == self.active_panel_id)
    }

    /// Unknown ids are ignored so the active panel always exists.
    pub fn set_active_panel(&mut self, panel_id: &str) {
        if self.panels.iter().any(|panel| panel.id == panel_id) {
            self.active_panel_id = panel_id.to_string();
        }
    }

    pub fn set_active_panel_index(&mut self, index: usize) {
        if let Some(panel) = self.panels.get(index) {
            self.active_panel_id = panel.id.clone();
        }
    }

    pub fn fullscreen_panel_id(&self) -> Option<&str> {
        self.fullscreen_panel_id.as_deref()
    }

    pub fn set_fullscreen_panel(&mut self, panel_id: Option<String>) {
        self.fullscreen_panel_id = panel_id;
    }

    pub fn add_tab(&mut self, panel_id: &str, function_code: &str, security: Option<Security>) {
        let Some(panel) = self.panel_mut(panel_id) else {
            return;
        };
        let tab = PanelTab::new(function_code, security);
        panel.active_tab_id = tab.id.clone();
        panel.tabs.push(tab);
    }

    /// Closing the only tab resets the panel to a single fresh default tab;
    /// closing the active tab hands focus to the last remaining one.
    pub fn close_tab(&mut self, panel_id: &str, tab_id: &str) {
        let Some(panel) = self.panel_mut(panel_id) else {
            return;
        };
        panel.tabs.retain(|tab| tab.id != tab_id);
        if panel.tabs.is_empty() {
            let tab = PanelTab::fresh();
            panel.active_tab_id = tab.id.clone();
            panel.tabs.push(tab);
        } else if panel.active_tab_id == tab_id {
            if let Some(last) = panel.tabs.last() {
                panel.active_tab_id = last.id.clone();
            }
        }
    }

    pub fn set_active_tab(&mut self, panel_id: &str, tab_id: &str) {
        let Some(panel) = self.panel_mut(panel_id) else {
            return;
        };
        if panel.tabs.iter().any(|tab| tab.id == tab_id) {
            panel.active_tab_id = tab_id.to_string();
        }
    }

    pub fn cycle_active_tab(&mut self, panel_id: &str, backwards: bool) {
        let Some(panel) = self.panel_mut(panel_id) else {
            return;
        };
        let len = panel.tabs.len();
        let Some(current) = panel
            .tabs
            .iter()
            .position(|tab| tab.id == panel.active_tab_id)
        else {
            return;
        };
        let next = if backwards {
            (current + len - 1) % len
        } else {
            (current + 1) % len
        };
        panel.active_tab_id = panel.tabs[next].id.clone();
    }

    /// Repoints the active tab in place; never creates a tab.
    pub fn navigate_to_function(
        &mut self,
        panel_id: &str,
        function_code: &str,
        security: Option<Security>,
    ) {
        let Some(panel) = self.panel_mut(panel_id) else {
            return;
        };
        let active_id = panel.active_tab_id.clone();
        if let Some(tab) = panel.tabs.iter_mut().find(|tab| tab.id == active_id) {
            tab.function_code = function_code.to_string();
            tab.security = security;
            tab.title = tab_title(&tab.function_code, tab.security.as_ref());
        }
    }

    pub fn group_security(&self, group: PanelGroup) -> Option<&Security> {
        self.group_securities[group.index()].as_ref()
    }

    /// One state transition: records the group's selection and retargets the
    /// active tab of every panel in the group, keeping function codes and
    /// other groups untouched.
    pub fn set_group_security(&mut self, group: PanelGroup, security: Option<Security>) {
        self.group_securities[group.index()] = security.clone();
        for panel in self.panels.iter_mut().filter(|panel| panel.group == group) {
            let active_id = panel.active_tab_id.clone();
            if let Some(tab) = panel.tabs.iter_mut().find(|tab| tab.id == active_id) {
                tab.security = security.clone();
                tab.title = tab_title(&tab.function_code, tab.security.as_ref());
            }
        }
    }

    pub fn command_history(&self) -> &[String] {
        &self.command_history
    }

    pub fn set_command_history(&mut self, history: Vec<String>) {
        self.command_history = history;
        self.command_history.truncate(HISTORY_CAP);
    }

    /// Most-recent-first, deduplicated, capped; re-issuing moves to front.
    pub fn record_command(&mut self, text: &str) {
        self.command_history.retain(|entry| entry != text);
        self.command_history.insert(0, text.to_string());
        self.command_history.truncate(HISTORY_CAP);
    }

    fn panel_mut(&mut self, panel_id: &str) -> Option<&mut Panel> {
        self.panels.iter_mut().find(|panel| panel.id == panel_id)
    }
}

impl Default for Workspace {
    fn default() -> Self {
        Workspace::new(LayoutMode::default())
    }
}

fn tab_title(function_code: &str, security: Option<&Security>) -> String {
    match security {
        Some(security) => format!("{} {}", security.symbol, function_code),
        None => function_code.to_string(),
    }
}

fn new_id() -> String {
    rand::rng()
        .sample_iter(Alphanumeric)
        .take(TAB_ID_LEN)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::SecurityType;

    fn security(symbol: &str) -> Security {
        Security {
            symbol: symbol.to_string(),
            name: format!("{symbol} Inc"),
            kind: SecurityType::Equity,
            exchange: None,
            currency: None,
        }
    }

    #[test]
    fn new_workspace_has_four_single_tab_panels() {
        let workspace = Workspace::new(LayoutMode::Quad);
        assert_eq!(workspace.panels().len(), 4);
        for (panel, group) in workspace.panels().iter().zip(PanelGroup::ALL) {
            assert_eq!(panel.group, group);
            assert_eq!(panel.tabs.len(), 1);
            let tab = panel.active_tab().expect("active tab should exist");
            assert_eq!(tab.function_code, DEFAULT_TAB_FUNCTION);
            assert!(tab.security.is_none());
            assert_eq!(tab.title, DEFAULT_TAB_FUNCTION);
        }
        assert_eq!(workspace.active_panel_id(), workspace.panels()[0].id);
        assert!(workspace.fullscreen_panel_id().is_none());
    }

    #[test]
    fn add_tab_appends_and_activates() {
        let mut workspace = Workspace::new(LayoutMode::Quad);
        let panel_id = workspace.panels()[1].id.clone();
        workspace.add_tab(&panel_id, "GP", Some(security("AAPL")));
        let panel = workspace.panel(&panel_id).expect("panel should exist");
        assert_eq!(panel.tabs.len(), 2);
        let tab = panel.active_tab().expect("active tab should exist");
        assert_eq!(tab.function_code, "GP");
        assert_eq!(tab.title, "AAPL GP");
    }

    #[test]
    fn closing_the_only_tab_resets_to_a_fresh_default() {
        let mut workspace = Workspace::new(LayoutMode::Quad);
        let panel_id = workspace.panels()[0].id.clone();
        let old_tab_id = workspace.panels()[0].tabs[0].id.clone();
        workspace.close_tab(&panel_id, &old_tab_id);
        let panel = workspace.panel(&panel_id).expect("panel should exist");
        assert_eq!(panel.tabs.len(), 1);
        let tab = panel.active_tab().expect("active tab should exist");
        assert_ne!(tab.id, old_tab_id);
        assert_eq!(tab.function_code, DEFAULT_TAB_FUNCTION);
        assert!(tab.security.is_none());
    }

    #[test]
    fn closing_the_active_tab_focuses_the_last_remaining() {
        let mut workspace = Workspace::new(LayoutMode::Quad);
        let panel_id = workspace.panels()[0].id.clone();
        workspace.add_tab(&panel_id, "GP", None);
        workspace.add_tab(&panel_id, "DES", None);
        let active = workspace.panels()[0].active_tab_id.clone();
        workspace.close_tab(&panel_id, &active);
        let panel = workspace.panel(&panel_id).expect("panel should exist");
        assert_eq!(panel.tabs.len(), 2);
        let last = panel.tabs.last().expect("tabs should be non-empty");
        assert_eq!(panel.active_tab_id, last.id);
        assert_eq!(last.function_code, "GP");
    }

    #[test]
    fn closing_an_inactive_tab_keeps_focus() {
        let mut workspace = Workspace::new(LayoutMode::Quad);
        let panel_id = workspace.panels()[0].id.clone();
        let first_tab_id = workspace.panels()[0].tabs[0].id.clone();
        workspace.add_tab(&panel_id, "GP", None);
        let active_before = workspace.panels()[0].active_tab_id.clone();
        workspace.close_tab(&panel_id, &first_tab_id);
        let panel = workspace.panel(&panel_id).expect("panel should exist");
        assert_eq!(panel.active_tab_id, active_before);
    }

    #[test]
    fn set_active_tab_ignores_unknown_ids() {
        let mut workspace = Workspace::new(LayoutMode::Quad);
        let panel_id = workspace.panels()[0].id.clone();
        let active_before = workspace.panels()[0].active_tab_id.clone();
        workspace.set_active_tab(&panel_id, "not-a-tab");
        assert_eq!(workspace.panels()[0].active_tab_id, active_before);
    }

    #[test]
    fn navigate_mutates_the_active_tab_in_place() {
        let mut workspace = Workspace::new(LayoutMode::Quad);
        let panel_id = workspace.panels()[0].id.clone();
        let tab_id = workspace.panels()[0].active_tab_id.clone();
        workspace.navigate_to_function(&panel_id, "GP", Some(security("MSFT")));
        let panel = workspace.panel(&panel_id).expect("panel should exist");
        assert_eq!(panel.tabs.len(), 1);
        let tab = panel.active_tab().expect("active tab should exist");
        assert_eq!(tab.id, tab_id);
        assert_eq!(tab.function_code, "GP");
        assert_eq!(tab.title, "MSFT GP");
    }

    #[test]
    fn group_broadcast_updates_only_matching_panels() {
        let mut workspace = Workspace::new(LayoutMode::Quad);
        // Panel A keeps TOP, second tab on panel A shows GP; panel B is group B.
        let panel_a = workspace.panels()[0].id.clone();
        workspace.add_tab(&panel_a, "GP", None);
        workspace.set_group_security(PanelGroup::A, Some(security("NVDA")));

        let panel = workspace.panel(&panel_a).expect("panel should exist");
        let tab = panel.active_tab().expect("active tab should exist");
        assert_eq!(tab.function_code, "GP");
        assert_eq!(
            tab.security.as_ref().map(|s| s.symbol.as_str()),
            Some("NVDA")
        );
        // The inactive tab keeps its old (empty) security.
        assert!(panel.tabs[0].security.is_none());

        let other = &workspace.panels()[1];
        let other_tab = other.active_tab().expect("active tab should exist");
        assert!(other_tab.security.is_none());
        assert_eq!(
            workspace
                .group_security(PanelGroup::A)
                .map(|s| s.symbol.as_str()),
            Some("NVDA")
        );
        assert!(workspace.group_security(PanelGroup::B).is_none());
    }

    #[test]
    fn history_dedupes_and_caps() {
        let mut workspace = Workspace::new(LayoutMode::Quad);
        workspace.record_command("AAPL GP");
        workspace.record_command("MSFT DES");
        workspace.record_command("AAPL GP");
        assert_eq!(workspace.command_history(), ["AAPL GP", "MSFT DES"]);

        for i in 0..60 {
            workspace.record_command(&format!("CMD{i}"));
        }
        assert_eq!(workspace.command_history().len(), 50);
        assert_eq!(workspace.command_history()[0], "CMD59");
    }

    #[test]
    fn layout_modes_expose_fixed_visible_counts() {
        let mut workspace = Workspace::new(LayoutMode::Quad);
        let cases = [
            (LayoutMode::Quad, 4),
            (LayoutMode::Single, 1),
            (LayoutMode::DualHorizontal, 2),
            (LayoutMode::DualVertical, 2),
            (LayoutMode::TripleLeft, 3),
            (LayoutMode::TripleRight, 3),
        ];
        for (mode, count) in cases {
            workspace.set_layout(mode);
            assert_eq!(workspace.visible_panels().len(), count);
            // Visible panels are always the leading panels in fixed order.
            for (visible, panel) in workspace.visible_panels().iter().zip(workspace.panels()) {
                assert_eq!(visible.id, panel.id);
            }
        }
    }

    #[test]
    fn layout_cycle_visits_every_mode() {
        let mut mode = LayoutMode::Quad;
        let mut seen = Vec::new();
        for _ in 0..6 {
            seen.push(mode);
            mode = mode.cycle();
        }
        assert_eq!(mode, LayoutMode::Quad);
        assert_eq!(seen.len(), 6);
        for i in 0..seen.len() {
            for j in i + 1..seen.len() {
                assert_ne!(seen[i], seen[j]);
            }
        }
    }

    #[test]
    fn fullscreen_flag_leaves_tab_state_untouched() {
        let mut workspace = Workspace::new(LayoutMode::Quad);
        let panel_id = workspace.panels()[2].id.clone();
        workspace.add_tab(&panel_id, "GP", Some(security("TSLA")));
        workspace.set_fullscreen_panel(Some(panel_id.clone()));
        assert_eq!(workspace.fullscreen_panel_id(), Some(panel_id.as_str()));
        workspace.set_fullscreen_panel(None);
        let panel = workspace.panel(&panel_id).expect("panel should exist");
        assert_eq!(panel.tabs.len(), 2);
        let tab = panel.active_tab().expect("active tab should exist");
        assert_eq!(tab.title, "TSLA GP");
    }

    #[test]
    fn random_add_close_sequences_keep_panels_well_formed() {
        use rand::Rng;

        let mut workspace = Workspace::new(LayoutMode::Quad);
        let mut rng = rand::rng();
        for _ in 0..300 {
            let panel_id = {
                let idx = rng.random_range(0..workspace.panels().len());
                workspace.panels()[idx].id.clone()
            };
            match rng.random_range(0..3) {
                0 => workspace.add_tab(&panel_id, "GP", None),
                1 => {
                    let panel = workspace.panel(&panel_id).expect("panel should exist");
                    let idx = rng.random_range(0..panel.tabs.len());
                    let tab_id = panel.tabs[idx].id.clone();
                    workspace.close_tab(&panel_id, &tab_id);
                }
                _ => {
                    let panel = workspace.panel(&panel_id).expect("panel should exist");
                    let idx = rng.random_range(0..panel.tabs.len());
                    let tab_id = panel.tabs[idx].id.clone();
                    workspace.set_active_tab(&panel_id, &tab_id);
                }
            }
            for panel in workspace.panels() {
                assert!(!panel.tabs.is_empty());
                assert!(panel.active_tab().is_some());
            }
        }
    }
}

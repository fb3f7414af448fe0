use std::sync::Arc;

use crate::persist::{CONTROLS_OPEN_KEY, CURRENT_TAB_KEY, KeyValueStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ControlsTab {
    #[default]
    Search,
    Columns,
    Stats,
}

impl ControlsTab {
    pub fn as_str(&self) -> &'static str {
        match self {
            ControlsTab::Search => "search",
            ControlsTab::Columns => "columns",
            ControlsTab::Stats => "stats",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "search" => Some(ControlsTab::Search),
            "columns" => Some(ControlsTab::Columns),
            "stats" => Some(ControlsTab::Stats),
            _ => None,
        }
    }
}

/// Side panel next to the table. Open state and tab survive restarts.
pub struct TableControls {
    store: Arc<dyn KeyValueStore>,
    open: bool,
    tab: ControlsTab,
}

impl TableControls {
    pub fn load(store: Arc<dyn KeyValueStore>) -> Self {
        let open = store.get_string(CONTROLS_OPEN_KEY).as_deref() == Some("true");
        let tab = store
            .get_string(CURRENT_TAB_KEY)
            .and_then(|name| ControlsTab::parse(&name))
            .unwrap_or_default();
        Self { store, open, tab }
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn tab(&self) -> ControlsTab {
        self.tab
    }

    pub fn open(&mut self) {
        self.open = true;
        self.save();
    }

    pub fn close(&mut self) {
        self.open = false;
        self.save();
    }

    pub fn toggle(&mut self) {
        if self.open {
            self.close();
        } else {
            self.open();
        }
    }

    /// Unknown tab names leave the current tab selected.
    pub fn switch_tab(&mut self, name: &str) -> bool {
        match ControlsTab::parse(name) {
            Some(tab) => {
                self.tab = tab;
                true
            }
            None => {
                tracing::debug!(tab = name, "unknown controls tab");
                false
            }
        }
    }

    fn save(&self) {
        self.store
            .set_string(CONTROLS_OPEN_KEY, if self.open { "true" } else { "false" });
        self.store.set_string(CURRENT_TAB_KEY, self.tab.as_str());
    }
}

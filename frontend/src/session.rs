use tracker_shared::{Session, SessionModule};

/// The session the table is currently showing, plus the module filter sent with
/// every data request. Owned by the table and reset whenever a new session is
/// selected.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionContext {
    session_id: Option<i64>,
    modules: Vec<SessionModule>,
}

impl SessionContext {
    pub fn new(session_id: Option<i64>) -> Self {
        Self {
            session_id,
            modules: Vec::new(),
        }
    }

    pub fn session_id(&self) -> Option<i64> {
        self.session_id
    }

    pub fn is_selected(&self) -> bool {
        self.session_id.is_some()
    }

    pub fn modules(&self) -> &[SessionModule] {
        &self.modules
    }

    pub fn module_ids(&self) -> Vec<i64> {
        self.modules.iter().map(|m| m.id).collect()
    }

    pub fn select(&mut self, session: &Session) {
        self.session_id = Some(session.id);
        self.modules.clear();
    }

    /// Replaces the module list. Returns `true` when the id filter changed.
    pub fn set_modules(&mut self, modules: Vec<SessionModule>) -> bool {
        let before = self.module_ids();
        self.modules = modules;
        before != self.module_ids()
    }
}

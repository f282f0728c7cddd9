/// Read-only notification policy consulted while ingesting messages.
pub trait SettingsProvider: Send + Sync {
    /// Whether push-style message notifications are raised at all.
    fn notifications_enabled(&self) -> bool;
}

#[derive(Debug, Clone, Copy)]
pub struct StaticSettings {
    pub notifications_enabled: bool,
}

impl Default for StaticSettings {
    fn default() -> Self {
        Self {
            notifications_enabled: true,
        }
    }
}

impl SettingsProvider for StaticSettings {
    fn notifications_enabled(&self) -> bool {
        self.notifications_enabled
    }
}

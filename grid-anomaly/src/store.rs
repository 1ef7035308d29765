use crate::window::RollingWindow;
use grid_core::WindowConfig;
use std::collections::HashMap;
use std::sync::Arc;

/// Windowed rule families. Each keeps its own window per signal identity, so a signal
/// matching two families never shares history between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WindowFamily {
    ZeroCurrent,
    ZeroPower,
    ZeroVoltage,
    PfSpikes,
    ThdSpikes,
}

/// Rolling windows of one processing unit, created on first sighting of a signal.
#[derive(Debug)]
pub struct WindowStore {
    config: WindowConfig,
    windows: HashMap<WindowFamily, HashMap<Arc<str>, RollingWindow>>,
}

impl WindowStore {
    pub fn new(config: WindowConfig) -> Self {
        Self {
            config,
            windows: HashMap::new(),
        }
    }

    /// Window for `signal_id` in `family`, together with the shared key stored in its
    /// entries.
    pub fn window_mut(&mut self, family: WindowFamily, signal_id: &str) -> (Arc<str>, &mut RollingWindow) {
        let capacity = self.config.capacity;
        let target_span = self.config.target_span();
        let family_windows = self.windows.entry(family).or_default();

        let key = family_windows
            .get_key_value(signal_id)
            .map(|(key, _)| Arc::clone(key))
            .unwrap_or_else(|| Arc::from(signal_id));
        let window = family_windows
            .entry(Arc::clone(&key))
            .or_insert_with(|| RollingWindow::new(capacity, target_span));
        (key, window)
    }

    pub fn get(&self, family: WindowFamily, signal_id: &str) -> Option<&RollingWindow> {
        self.windows.get(&family)?.get(signal_id)
    }

    /// Number of windows across all families.
    pub fn len(&self) -> usize {
        self.windows.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

//! Application state shared by all handlers

use lumen_worker::TaskRegistry;

pub struct AppState {
    pub registry: TaskRegistry,
}

impl AppState {
    pub fn new(registry: TaskRegistry) -> Self {
        Self { registry }
    }
}

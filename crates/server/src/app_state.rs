use std::sync::Arc;

use crate::agent::ResearchAgent;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) agent: Arc<dyn ResearchAgent>,
}

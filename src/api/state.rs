use std::sync::Arc;

use crate::config::Config;
use crate::intake::Intake;
use crate::observability::Metrics;
use crate::queue::RequestBroker;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub intake: Intake,
    pub broker: RequestBroker,
    pub metrics: Arc<Metrics>,
}

impl AppState {
    pub fn new(
        config: Arc<Config>,
        intake: Intake,
        broker: RequestBroker,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            config,
            intake,
            broker,
            metrics,
        }
    }

    /// Request bodies above this are refused
    pub fn max_payload_bytes(&self) -> usize {
        usize::try_from(self.config.server.max_payload_bytes.as_u64()).unwrap_or(usize::MAX)
    }
}

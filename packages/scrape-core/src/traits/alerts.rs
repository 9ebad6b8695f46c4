//! Budget alert sink.

use async_trait::async_trait;
use tracing::warn;

use crate::types::BudgetAlert;

/// Receives budget threshold crossings.
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn alert(&self, alert: &BudgetAlert);
}

/// Default sink: writes alerts to the log.
#[derive(Debug, Default, Clone)]
pub struct LogAlertSink;

#[async_trait]
impl AlertSink for LogAlertSink {
    async fn alert(&self, alert: &BudgetAlert) {
        warn!(
            scope = alert.scope.as_str(),
            key = %alert.key,
            window = alert.window.as_str(),
            level = alert.level.as_str(),
            spent_usd = %alert.spent_usd,
            ceiling_usd = %alert.ceiling_usd,
            "budget threshold crossed"
        );
    }
}

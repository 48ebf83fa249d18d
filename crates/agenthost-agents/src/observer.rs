use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, trace};

use crate::error::BrokerError;

/// A labeled multi-series data point emitted by an agent on a tick.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SeriesPoint {
    pub agent_id: String,
    pub label: String,
    pub timestamp: DateTime<Utc>,
    pub series: Vec<(String, f64)>,
}

/// Sink for agent charts and contained errors. Fire-and-forget.
pub trait Observer: Send + Sync {
    fn record(&self, point: &SeriesPoint);

    fn report_error(&self, agent_id: &str, error: &BrokerError);
}

/// Writes points and errors to the tracing subscriber.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl Observer for TracingObserver {
    fn record(&self, point: &SeriesPoint) {
        trace!(
            agent = %point.agent_id,
            label = %point.label,
            at = %point.timestamp,
            series = ?point.series,
            "Series point"
        );
    }

    fn report_error(&self, agent_id: &str, error: &BrokerError) {
        error!(agent = agent_id, error = %error, "Broker call failed");
    }
}

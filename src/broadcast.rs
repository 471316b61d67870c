use tokio::sync::broadcast;

use crate::anomaly::AnomalyAlert;
use crate::error::BroadcastError;

/// Real-time delivery target for alerts. Publishing must not block.
pub trait AlertSink: Send + Sync {
    fn publish(&self, alert: &AnomalyAlert) -> Result<(), BroadcastError>;
}

/// Fan-out over a tokio broadcast channel. Slow receivers lag and drop
/// the oldest alerts instead of blocking the pipeline.
pub struct ChannelSink {
    tx: broadcast::Sender<AnomalyAlert>,
}

impl ChannelSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AnomalyAlert> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl AlertSink for ChannelSink {
    fn publish(&self, alert: &AnomalyAlert) -> Result<(), BroadcastError> {
        self.tx
            .send(alert.clone())
            .map(|_| ())
            .map_err(|_| BroadcastError::NoSubscribers)
    }
}

/// Discards every alert.
pub struct NullSink;

impl AlertSink for NullSink {
    fn publish(&self, _alert: &AnomalyAlert) -> Result<(), BroadcastError> {
        Ok(())
    }
}

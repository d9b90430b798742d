use tokio::sync::broadcast;
use tracing::trace;

use crate::db::models::Alert;

/// Fan-out of freshly committed alerts to whoever delivers notifications.
#[derive(Debug, Clone)]
pub struct AlertBroadcaster {
    alerts_tx: broadcast::Sender<Alert>,
}

impl AlertBroadcaster {
    pub fn new(alerts_tx: broadcast::Sender<Alert>) -> Self {
        Self { alerts_tx }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (alerts_tx, _) = broadcast::channel(capacity);
        Self::new(alerts_tx)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Alert> {
        self.alerts_tx.subscribe()
    }

    /// Returns the number of subscribers that received the alert.
    pub fn publish(&self, alert: &Alert) -> usize {
        match self.alerts_tx.send(alert.clone()) {
            Ok(receivers) => receivers,
            Err(_) => {
                trace!(alert_id = alert.id, "No alert subscribers; dropping broadcast.");
                0
            }
        }
    }
}

impl Default for AlertBroadcaster {
    fn default() -> Self {
        Self::with_capacity(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::enums::{AlertType, Severity};
    use chrono::Utc;

    fn alert() -> Alert {
        Alert {
            id: 11,
            api_id: 1,
            user_id: 7,
            alert_type: AlertType::Down,
            severity: Severity::Critical,
            title: "Payments is DOWN".to_string(),
            description: None,
            is_resolved: false,
            resolved_at: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn publish_without_subscribers_is_not_an_error() {
        let broadcaster = AlertBroadcaster::default();
        assert_eq!(broadcaster.publish(&alert()), 0);
    }

    #[tokio::test]
    async fn subscribers_receive_published_alerts() {
        let broadcaster = AlertBroadcaster::with_capacity(4);
        let mut rx = broadcaster.subscribe();
        assert_eq!(broadcaster.publish(&alert()), 1);
        let received = rx.recv().await.unwrap();
        assert_eq!(received.id, 11);
        assert_eq!(received.title, "Payments is DOWN");
    }
}

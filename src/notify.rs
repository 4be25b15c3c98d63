//! Notification publishing.
//!
//! Publishing is fire-and-forget: callers never wait on delivery, and
//! consumers must tolerate duplicates.

#![allow(dead_code)]

use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::types::{ProjectId, StackId, TenantId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    /// A stack's counters or status changed.
    StackChanged {
        tenant_id: TenantId,
        project_id: ProjectId,
        stack_id: StackId,
    },
    /// A fixed stack received a new occurrence.
    StackRegressed {
        tenant_id: TenantId,
        project_id: ProjectId,
        stack_id: StackId,
    },
    /// A tenant crossed its hourly or monthly event limit.
    PlanOverage { tenant_id: TenantId, is_hourly: bool },
}

impl Notification {
    pub fn kind(&self) -> &'static str {
        match self {
            Notification::StackChanged { .. } => "stack_changed",
            Notification::StackRegressed { .. } => "stack_regressed",
            Notification::PlanOverage { .. } => "plan_overage",
        }
    }
}

pub trait Notifier: Send + Sync {
    /// Queue `notification` for delivery, optionally after `delay`.
    fn publish(&self, notification: Notification, delay: Option<Duration>);
}

/// Delivers notifications over an in-process channel. Delayed
/// notifications keep a sender alive until they are sent.
#[derive(Clone)]
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<Notification>,
}

impl ChannelNotifier {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Notifier for ChannelNotifier {
    fn publish(&self, notification: Notification, delay: Option<Duration>) {
        match delay {
            Some(delay) if !delay.is_zero() => {
                let tx = self.tx.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let _ = tx.send(notification);
                });
            }
            _ => {
                if self.tx.send(notification).is_err() {
                    debug!("notification receiver dropped");
                }
            }
        }
    }
}

/// Writes notifications to the log. The CLI's default notifier.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn publish(&self, notification: Notification, delay: Option<Duration>) {
        let payload = serde_json::to_string(&notification).unwrap_or_default();
        info!(
            kind = notification.kind(),
            delay_ms = delay.map(|d| d.as_millis() as u64).unwrap_or(0),
            payload = %payload,
            "notification"
        );
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_notifier_delivers() {
        let (notifier, mut rx) = ChannelNotifier::new();
        notifier.publish(
            Notification::PlanOverage {
                tenant_id: "t1".into(),
                is_hourly: true,
            },
            None,
        );

        let received = rx.recv().await.unwrap();
        assert_eq!(received.kind(), "plan_overage");
    }

    #[tokio::test(start_paused = true)]
    async fn test_channel_notifier_delays() {
        let (notifier, mut rx) = ChannelNotifier::new();
        notifier.publish(
            Notification::StackChanged {
                tenant_id: "t1".into(),
                project_id: "p1".into(),
                stack_id: "s1".into(),
            },
            Some(Duration::from_secs(5)),
        );

        assert!(rx.try_recv().is_err());
        let received = rx.recv().await.unwrap();
        assert_eq!(received.kind(), "stack_changed");
    }

    #[test]
    fn test_notification_serializes_with_tag() {
        let json = serde_json::to_value(Notification::PlanOverage {
            tenant_id: "t1".into(),
            is_hourly: false,
        })
        .unwrap();
        assert_eq!(json["type"], "plan_overage");
        assert_eq!(json["is_hourly"], false);
    }
}

//! Outbound user notifications.
//!
//! Payment and refund flows never call the notification collaborator inline.
//! They emit a [`NotificationEvent`] on an unbounded channel after their
//! database writes commit; a dispatcher task drains the channel and delivers.
//! A delivery failure is logged and dropped, so it can never be mistaken for
//! a payment failure.

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use uuid::Uuid;

/// One user-facing notification payload.
#[derive(Debug, Clone)]
pub struct NotificationMessage {
    pub title: String,
    pub body: String,
    pub data: Option<JsonValue>,
}

/// Event emitted after a state change commits.
#[derive(Debug, Clone)]
pub enum NotificationEvent {
    FinalPaymentRequested {
        user_id: Uuid,
        reservation_id: Uuid,
        amount: i64,
        due_in_hours: i64,
    },
    RefundProcessed {
        user_id: Uuid,
        reservation_id: Uuid,
        refund_amount: i64,
        refund_percentage: u8,
    },
    NoShowRecorded {
        user_id: Uuid,
        reservation_id: Uuid,
    },
}

impl NotificationEvent {
    pub fn user_id(&self) -> Uuid {
        match self {
            NotificationEvent::FinalPaymentRequested { user_id, .. }
            | NotificationEvent::RefundProcessed { user_id, .. }
            | NotificationEvent::NoShowRecorded { user_id, .. } => *user_id,
        }
    }

    pub fn into_message(self) -> NotificationMessage {
        match self {
            NotificationEvent::FinalPaymentRequested {
                reservation_id,
                amount,
                due_in_hours,
                ..
            } => NotificationMessage {
                title: "Final payment requested".to_string(),
                body: format!(
                    "Your service is complete. Please pay the remaining {} KRW within {} hours.",
                    amount, due_in_hours
                ),
                data: Some(serde_json::json!({
                    "reservation_id": reservation_id,
                    "amount": amount,
                })),
            },
            NotificationEvent::RefundProcessed {
                reservation_id,
                refund_amount,
                refund_percentage,
                ..
            } => NotificationMessage {
                title: "Refund processed".to_string(),
                body: format!(
                    "A refund of {} KRW ({}%) has been issued for your reservation.",
                    refund_amount, refund_percentage
                ),
                data: Some(serde_json::json!({
                    "reservation_id": reservation_id,
                    "refund_amount": refund_amount,
                })),
            },
            NotificationEvent::NoShowRecorded { reservation_id, .. } => NotificationMessage {
                title: "Missed reservation".to_string(),
                body: "Your reservation was marked as a no-show. Any applicable refund will be \
                       processed automatically."
                    .to_string(),
                data: Some(serde_json::json!({ "reservation_id": reservation_id })),
            },
        }
    }
}

/// Delivery backend contract. Implementations must not panic; a failed send
/// surfaces as an error string and is dropped by the dispatcher.
#[async_trait]
pub trait NotificationService: Send + Sync {
    async fn send_to_user(&self, user_id: Uuid, message: NotificationMessage)
        -> Result<(), String>;
}

/// Log-only backend. Stands in until a push/SMS channel is wired up.
pub struct LoggingNotificationService;

#[async_trait]
impl NotificationService for LoggingNotificationService {
    async fn send_to_user(
        &self,
        user_id: Uuid,
        message: NotificationMessage,
    ) -> Result<(), String> {
        info!(
            user_id = %user_id,
            title = %message.title,
            body = %message.body,
            "notification delivered (log backend)"
        );
        Ok(())
    }
}

/// Sender half handed to services; cloning is cheap.
pub type NotificationSender = mpsc::UnboundedSender<NotificationEvent>;

/// Create the event channel and spawn the dispatcher task. The task ends when
/// every sender is dropped.
pub fn spawn_dispatcher(
    service: std::sync::Arc<dyn NotificationService>,
) -> (NotificationSender, tokio::task::JoinHandle<()>) {
    let (tx, mut rx) = mpsc::unbounded_channel::<NotificationEvent>();
    let handle = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let user_id = event.user_id();
            let message = event.into_message();
            if let Err(reason) = service.send_to_user(user_id, message).await {
                error!(user_id = %user_id, reason = %reason, "notification delivery failed");
            }
        }
        warn!("notification dispatcher stopped: all senders dropped");
    });
    (tx, handle)
}

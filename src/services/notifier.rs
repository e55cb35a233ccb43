//! Post-commit notifications.
//!
//! The engine collects notifications while a transaction runs and hands
//! them to a [`Notifier`] only after the commit succeeded. Delivery
//! failures are logged and never affect the admission result.

use async_trait::async_trait;
use serde::Serialize;
use uuid::Uuid;

use crate::database::models::JoinRequestStatus;
use crate::error::AppError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notification {
    InviteCreated {
        invite_id: Uuid,
        team_id: Uuid,
        target_user_id: Option<Uuid>,
        target_email: Option<String>,
    },
    JoinRequestSubmitted {
        request_id: Uuid,
        team_id: Uuid,
        user_id: Uuid,
    },
    JoinRequestReviewed {
        request_id: Uuid,
        team_id: Uuid,
        user_id: Uuid,
        status: JoinRequestStatus,
    },
    MemberAdmitted {
        member_id: Uuid,
        team_id: Uuid,
        user_id: Uuid,
        display_name: Option<String>,
    },
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: &Notification) -> Result<(), AppError>;
}

/// Writes every notification to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, notification: &Notification) -> Result<(), AppError> {
        let payload = serde_json::to_string(notification)
            .map_err(|e| AppError::internal_server_error_message(e.to_string()))?;
        log::info!("Notification: {}", payload);
        Ok(())
    }
}

pub async fn dispatch(notifier: &dyn Notifier, notifications: Vec<Notification>) {
    for notification in notifications {
        if let Err(e) = notifier.notify(&notification).await {
            log::warn!("Failed to deliver notification {:?}: {}", notification, e);
        }
    }
}

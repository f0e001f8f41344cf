//! Outbound email queue and delivery

pub mod mailer;
pub mod service;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tracing::info;

use crate::database::models::EmailNotification;
use crate::error::Result;

pub use mailer::{LogMailer, Mailer, OutgoingEmail, RelayMailer};
pub use service::{NotificationService, StatusSummary};

/// Longest error message stored on a failed notification.
pub const MAX_ERROR_MESSAGE_CHARS: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum NotificationStatus {
    Pending,
    Sent,
    Failed,
}

impl NotificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationStatus::Pending => "pending",
            NotificationStatus::Sent => "sent",
            NotificationStatus::Failed => "failed",
        }
    }
}

/// Store a pending email without attempting delivery.
pub async fn queue_email(
    pool: &SqlitePool,
    to_email: &str,
    subject: &str,
    body: &str,
    html_body: Option<&str>,
) -> Result<EmailNotification> {
    let notification = sqlx::query_as::<_, EmailNotification>(
        r#"
        INSERT INTO email_notifications (to_email, subject, body, html_body, status, created_at)
        VALUES (?, ?, ?, ?, ?, ?)
        RETURNING *
        "#,
    )
    .bind(to_email)
    .bind(subject)
    .bind(body)
    .bind(html_body.unwrap_or(""))
    .bind(NotificationStatus::Pending)
    .bind(Utc::now())
    .fetch_one(pool)
    .await?;

    info!("Queued email {} to {}: {}", notification.id, to_email, subject);
    Ok(notification)
}

pub(crate) fn truncate_error(message: &str) -> String {
    message.chars().take(MAX_ERROR_MESSAGE_CHARS).collect()
}

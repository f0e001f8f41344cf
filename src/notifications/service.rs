use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use sqlx::{Row, SqlitePool};
use tracing::{debug, info, warn};

use super::mailer::{Mailer, OutgoingEmail};
use super::{truncate_error, NotificationStatus};
use crate::database::models::EmailNotification;
use crate::error::{ReportsError, Result};

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct StatusSummary {
    pub pending: i64,
    pub sent: i64,
    pub failed: i64,
    pub oldest_pending: Option<DateTime<Utc>>,
}

pub struct NotificationService {
    pool: SqlitePool,
    mailer: Arc<dyn Mailer>,
}

impl NotificationService {
    pub fn new(pool: SqlitePool, mailer: Arc<dyn Mailer>) -> Self {
        Self { pool, mailer }
    }

    pub async fn get(&self, id: i64) -> Result<EmailNotification> {
        sqlx::query_as::<_, EmailNotification>("SELECT * FROM email_notifications WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| ReportsError::not_found(format!("notification {}", id)))
    }

    /// Attempt delivery. Returns `Ok(false)` when the mailer fails; the
    /// failure is recorded on the row.
    pub async fn send(&self, notification: &EmailNotification) -> Result<bool> {
        if notification.status == NotificationStatus::Sent {
            debug!("Notification {} already sent", notification.id);
            return Ok(true);
        }

        let email = OutgoingEmail {
            to: notification.to_email.clone(),
            subject: notification.subject.clone(),
            body: notification.body.clone(),
            html_body: notification.html_body.clone(),
        };
        let now = Utc::now();

        match self.mailer.send(&email).await {
            Ok(()) => {
                sqlx::query(
                    r#"
                    UPDATE email_notifications
                    SET status = ?, sent_at = ?, last_attempt_at = ?, error_message = ''
                    WHERE id = ?
                    "#,
                )
                .bind(NotificationStatus::Sent)
                .bind(now)
                .bind(now)
                .bind(notification.id)
                .execute(&self.pool)
                .await?;
                info!("Sent notification {} to {}", notification.id, notification.to_email);
                Ok(true)
            }
            Err(e) => {
                let message = truncate_error(&e.to_string());
                sqlx::query(
                    r#"
                    UPDATE email_notifications
                    SET status = ?, error_message = ?, retry_count = retry_count + 1,
                        last_attempt_at = ?
                    WHERE id = ?
                    "#,
                )
                .bind(NotificationStatus::Failed)
                .bind(&message)
                .bind(now)
                .bind(notification.id)
                .execute(&self.pool)
                .await?;
                warn!("Failed to send notification {}: {}", notification.id, message);
                Ok(false)
            }
        }
    }

    pub async fn requeue(&self, id: i64) -> Result<()> {
        let result = sqlx::query(
            "UPDATE email_notifications SET status = ?, error_message = '' WHERE id = ?",
        )
        .bind(NotificationStatus::Pending)
        .bind(id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(ReportsError::not_found(format!("notification {}", id)));
        }
        Ok(())
    }

    /// Deliver pending notifications oldest first. With `retry_failed`, failed
    /// rows are requeued and retried as well, skipping rows that already
    /// failed `max_retries` times.
    pub async fn send_all_pending(
        &self,
        limit: Option<i64>,
        retry_failed: bool,
        max_retries: Option<i64>,
    ) -> Result<usize> {
        let retry_cap = if retry_failed { max_retries } else { None };
        let candidates = sqlx::query_as::<_, EmailNotification>(
            r#"
            SELECT * FROM email_notifications
            WHERE (status = 'pending' OR (? AND status = 'failed'))
              AND (? IS NULL OR retry_count < ?)
            ORDER BY created_at, id
            LIMIT ?
            "#,
        )
        .bind(retry_failed)
        .bind(retry_cap)
        .bind(retry_cap)
        .bind(limit.unwrap_or(-1))
        .fetch_all(&self.pool)
        .await?;

        let mut sent = 0;
        for mut notification in candidates {
            if notification.status == NotificationStatus::Failed {
                self.requeue(notification.id).await?;
                notification.status = NotificationStatus::Pending;
            }
            if self.send(&notification).await? {
                sent += 1;
            }
        }
        if sent > 0 {
            info!("Delivered {} queued notification(s)", sent);
        }
        Ok(sent)
    }

    pub async fn status_summary(&self) -> Result<StatusSummary> {
        let rows = sqlx::query(
            "SELECT status, COUNT(*) AS total FROM email_notifications GROUP BY status",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut summary = StatusSummary::default();
        for row in rows {
            let status: NotificationStatus = row.get("status");
            let total: i64 = row.get("total");
            match status {
                NotificationStatus::Pending => summary.pending = total,
                NotificationStatus::Sent => summary.sent = total,
                NotificationStatus::Failed => summary.failed = total,
            }
        }

        summary.oldest_pending = sqlx::query_scalar::<_, DateTime<Utc>>(
            r#"
            SELECT created_at FROM email_notifications
            WHERE status = 'pending'
            ORDER BY created_at, id
            LIMIT 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await?;

        Ok(summary)
    }

    /// Delete sent (and optionally failed) notifications created before the
    /// cutoff. With `dry_run` nothing is deleted and the match count is returned.
    pub async fn purge(&self, older_than_days: i64, include_failed: bool, dry_run: bool) -> Result<u64> {
        let cutoff = Utc::now() - Duration::days(older_than_days);
        let filter = "(status = 'sent' OR (? AND status = 'failed')) AND created_at < ?";

        if dry_run {
            let count = sqlx::query_scalar::<_, i64>(&format!(
                "SELECT COUNT(*) FROM email_notifications WHERE {}",
                filter
            ))
            .bind(include_failed)
            .bind(cutoff)
            .fetch_one(&self.pool)
            .await?;
            return Ok(count as u64);
        }

        let result = sqlx::query(&format!("DELETE FROM email_notifications WHERE {}", filter))
            .bind(include_failed)
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        info!(
            "Purged {} notification(s) older than {} days",
            result.rows_affected(),
            older_than_days
        );
        Ok(result.rows_affected())
    }
}

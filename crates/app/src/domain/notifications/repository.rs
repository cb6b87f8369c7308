//! Notifications Repository

use sqlx::{PgConnection, Postgres, query_scalar};
use tracing::warn;

use crate::domain::notifications::models::{NewNotification, NotificationId};

const CREATE_NOTIFICATION_SQL: &str = include_str!("sql/create_notification.sql");

#[derive(Debug, Clone, Default)]
pub(crate) struct PgNotificationsRepository;

impl PgNotificationsRepository {
    #[must_use]
    pub(crate) fn new() -> Self {
        Self
    }

    /// Insert outside any transaction; callers run this after committing.
    pub(crate) async fn create(
        &self,
        conn: &mut PgConnection,
        notification: &NewNotification,
    ) -> Result<NotificationId, sqlx::Error> {
        query_scalar::<Postgres, NotificationId>(CREATE_NOTIFICATION_SQL)
            .bind(notification.user)
            .bind(notification.kind.as_str())
            .bind(&notification.title)
            .bind(&notification.content)
            .bind(notification.related_id)
            .fetch_one(conn)
            .await
    }

    /// Best effort: a failure is logged and swallowed.
    pub(crate) async fn send(&self, conn: &mut PgConnection, notification: NewNotification) {
        if let Err(error) = self.create(conn, &notification).await {
            warn!(
                user_id = %notification.user,
                kind = notification.kind.as_str(),
                error = %error,
                "failed to record notification"
            );
        }
    }
}

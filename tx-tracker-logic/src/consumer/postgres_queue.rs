use super::queue::{Queue, QueueMessage};
use crate::settings::ConsumerSettings;
use anyhow::Context;
use async_trait::async_trait;
use chrono::{NaiveDateTime, Utc};
use futures::stream::BoxStream;
use sea_orm::{
    ActiveValue::Set, ColumnTrait, DatabaseConnection, DbBackend, EntityTrait, QueryFilter,
    Statement,
};
use std::{sync::Arc, time::Duration};
use tokio_util::sync::CancellationToken;
use tx_tracker_entity::queue_messages;

const DEFAULT_EXPIRY_MARGIN: Duration = Duration::from_secs(5);

/// Queue stored in the `queue_messages` table. Concurrent receivers never get the
/// same visible row thanks to `FOR UPDATE SKIP LOCKED`.
#[derive(Clone)]
pub struct PostgresQueue {
    db: Arc<DatabaseConnection>,
    queue: String,
    visibility_timeout: Duration,
    polling_interval: Duration,
    batch_size: u64,
    expiry_margin: Duration,
}

impl PostgresQueue {
    pub fn new(db: Arc<DatabaseConnection>, settings: &ConsumerSettings) -> Self {
        Self {
            db,
            queue: settings.queue.clone(),
            visibility_timeout: settings.visibility_timeout,
            polling_interval: settings.polling_interval,
            batch_size: settings.batch_size.max(1),
            expiry_margin: DEFAULT_EXPIRY_MARGIN.min(settings.visibility_timeout / 2),
        }
    }

    pub async fn enqueue(&self, payload: serde_json::Value) -> anyhow::Result<i64> {
        let now = Utc::now().naive_utc();
        let inserted = queue_messages::Entity::insert(queue_messages::ActiveModel {
            queue: Set(self.queue.clone()),
            payload: Set(payload),
            visible_at: Set(now),
            receive_count: Set(0),
            created_at: Set(now),
            ..Default::default()
        })
        .exec(self.db.as_ref())
        .await
        .context("enqueue message")?;
        Ok(inserted.last_insert_id)
    }

    async fn receive_batch(&self) -> anyhow::Result<Vec<queue_messages::Model>> {
        let sql = r#"
            UPDATE queue_messages
            SET visible_at = (now() at time zone 'utc') + make_interval(secs => $3),
                receive_count = receive_count + 1
            WHERE id IN (
                SELECT id FROM queue_messages
                WHERE queue = $1 AND visible_at <= (now() at time zone 'utc')
                ORDER BY id
                LIMIT $2
                FOR UPDATE SKIP LOCKED
            )
            RETURNING id, queue, payload, visible_at, receive_count, created_at
        "#;
        let mut rows = queue_messages::Entity::find()
            .from_raw_sql(Statement::from_sql_and_values(
                DbBackend::Postgres,
                sql,
                [
                    self.queue.clone().into(),
                    (self.batch_size as i64).into(),
                    self.visibility_timeout.as_secs_f64().into(),
                ],
            ))
            .all(self.db.as_ref())
            .await
            .context("receive messages")?;
        rows.sort_by_key(|row| row.id);
        Ok(rows)
    }
}

impl Queue for PostgresQueue {
    fn receive(&self, cancel: CancellationToken) -> BoxStream<'static, Box<dyn QueueMessage>> {
        let queue = self.clone();
        Box::pin(async_stream::stream! {
            while !cancel.is_cancelled() {
                let batch = match queue.receive_batch().await {
                    Ok(batch) => batch,
                    Err(err) => {
                        tracing::error!(queue = %queue.queue, err = ?err, "failed to receive messages");
                        Vec::new()
                    }
                };
                if batch.is_empty() {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(queue.polling_interval) => continue,
                    }
                }
                for row in batch {
                    yield Box::new(PostgresMessage {
                        db: queue.db.clone(),
                        receive_count: row.validated_receive_count(),
                        id: row.id,
                        deadline: row.visible_at,
                        payload: row.payload,
                        expiry_margin: queue.expiry_margin,
                    }) as Box<dyn QueueMessage>;
                }
            }
        })
    }
}

struct PostgresMessage {
    db: Arc<DatabaseConnection>,
    id: i64,
    receive_count: u32,
    payload: serde_json::Value,
    deadline: NaiveDateTime,
    expiry_margin: Duration,
}

#[async_trait]
impl QueueMessage for PostgresMessage {
    fn data(&self) -> &serde_json::Value {
        &self.payload
    }

    fn is_expired(&self) -> bool {
        let margin = chrono::Duration::from_std(self.expiry_margin).unwrap_or(chrono::Duration::zero());
        Utc::now().naive_utc() + margin >= self.deadline
    }

    async fn done(&self) -> anyhow::Result<()> {
        queue_messages::Entity::delete_many()
            .filter(queue_messages::Column::Id.eq(self.id))
            .filter(queue_messages::Column::ReceiveCount.eq(self.receive_count as i32))
            .exec(self.db.as_ref())
            .await
            .context("delete message")?;
        Ok(())
    }

    async fn failed(&self) {
        tracing::debug!(id = self.id, "message left for redelivery");
    }
}

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let sql = r#"
            CREATE TABLE "queue_messages" (
                "id" bigserial PRIMARY KEY,
                "queue" text NOT NULL,
                "payload" jsonb NOT NULL,
                "visible_at" timestamp NOT NULL DEFAULT (now() at time zone 'utc'),
                "receive_count" integer NOT NULL DEFAULT 0,
                "created_at" timestamp NOT NULL DEFAULT (now() at time zone 'utc')
            );

            CREATE INDEX "queue_messages_queue_visible_at_index" ON "queue_messages" ("queue", "visible_at", "id")
        "#;
        crate::from_sql(manager, sql).await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let sql = r#"
            DROP TABLE "queue_messages";
        "#;
        crate::from_sql(manager, sql).await
    }
}

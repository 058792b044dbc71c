use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let sql = r#"
            CREATE TABLE "documents" (
                "collection" text NOT NULL,
                "id" text NOT NULL,
                "document" jsonb NOT NULL DEFAULT '{}'::jsonb,
                "created_at" timestamp NOT NULL DEFAULT (now() at time zone 'utc'),
                "updated_at" timestamp NOT NULL DEFAULT (now() at time zone 'utc'),
                PRIMARY KEY ("collection", "id")
            );

            COMMENT ON TABLE "documents" IS 'Schemaless per-message documents grouped by collection'
        "#;
        crate::from_sql(manager, sql).await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let sql = r#"
            DROP TABLE "documents";
        "#;
        crate::from_sql(manager, sql).await
    }
}

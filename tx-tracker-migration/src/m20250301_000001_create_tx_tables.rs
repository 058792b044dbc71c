use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let sql = r#"
            CREATE TYPE "origin_tx_status" AS ENUM ('confirmed', 'internal-error');

            CREATE TYPE "target_tx_status" AS ENUM ('confirmed', 'failed-to-process', 'unknown');

            CREATE TYPE "tx_direction" AS ENUM ('origin', 'target');

            CREATE TABLE "origin_txs" (
                "id" text PRIMARY KEY,
                "vaa_id" text NOT NULL,
                "chain_id" integer NOT NULL,
                "status" origin_tx_status NOT NULL,
                "native_tx_hash" text,
                "from" text,
                "attribute" jsonb,
                "fee" jsonb,
                "processed" boolean NOT NULL DEFAULT false,
                "timestamp" timestamp,
                "created_at" timestamp NOT NULL DEFAULT (now() at time zone 'utc'),
                "updated_at" timestamp NOT NULL DEFAULT (now() at time zone 'utc')
            );

            CREATE INDEX "origin_txs_unprocessed_chain_id_index"
                ON "origin_txs" ("chain_id") WHERE NOT "processed";

            CREATE INDEX "origin_txs_native_tx_hash_index" ON "origin_txs" ("native_tx_hash");

            CREATE TABLE "target_txs" (
                "id" text PRIMARY KEY,
                "vaa_id" text,
                "chain_id" integer NOT NULL,
                "status" target_tx_status NOT NULL,
                "native_tx_hash" text NOT NULL,
                "block_height" bigint,
                "method" text,
                "from" text,
                "to" text,
                "timestamp" timestamp,
                "created_at" timestamp NOT NULL DEFAULT (now() at time zone 'utc'),
                "updated_at" timestamp NOT NULL DEFAULT (now() at time zone 'utc')
            );

            CREATE TABLE "tx_change_logs" (
                "id" bigserial PRIMARY KEY,
                "message_id" text NOT NULL,
                "direction" tx_direction NOT NULL,
                "track_id" text NOT NULL,
                "source" text NOT NULL,
                "kind" text NOT NULL,
                "created_at" timestamp NOT NULL DEFAULT (now() at time zone 'utc')
            );

            CREATE INDEX "tx_change_logs_message_id_index" ON "tx_change_logs" ("message_id", "direction");

            CREATE TABLE "vaa_id_tx_hashes" (
                "vaa_id" text PRIMARY KEY,
                "tx_hash" text NOT NULL,
                "updated_at" timestamp NOT NULL DEFAULT (now() at time zone 'utc')
            );

            COMMENT ON TABLE "origin_txs" IS 'Resolved (or partially resolved) source-chain transactions keyed by message id';

            COMMENT ON TABLE "target_txs" IS 'Destination-chain transactions that redeemed a message';

            COMMENT ON TABLE "tx_change_logs" IS 'Append-only log of every write to origin_txs and target_txs';

            COMMENT ON TABLE "vaa_id_tx_hashes" IS 'Previously observed transaction hashes keyed by chain/emitter/sequence'
        "#;
        crate::from_sql(manager, sql).await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let sql = r#"
            DROP TABLE "vaa_id_tx_hashes";
            DROP TABLE "tx_change_logs";
            DROP TABLE "target_txs";
            DROP TABLE "origin_txs";
            DROP TYPE "tx_direction";
            DROP TYPE "target_tx_status";
            DROP TYPE "origin_tx_status";
        "#;
        crate::from_sql(manager, sql).await
    }
}

pub use sea_orm_migration::prelude::*;
use sea_orm_migration::sea_orm::{Statement, TransactionTrait};

mod m20250301_000001_create_tx_tables;
mod m20250301_000002_create_documents_table;
mod m20250314_000003_create_queue_messages_table;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250301_000001_create_tx_tables::Migration),
            Box::new(m20250301_000002_create_documents_table::Migration),
            Box::new(m20250314_000003_create_queue_messages_table::Migration),
        ]
    }
}

pub async fn from_sql(manager: &SchemaManager<'_>, content: &str) -> Result<(), DbErr> {
    let statements = content
        .split(';')
        .map(str::trim)
        .filter(|statement| !statement.is_empty());
    let txn = manager.get_connection().begin().await?;
    for statement in statements {
        txn.execute(Statement::from_string(
            manager.get_database_backend(),
            statement.to_string(),
        ))
        .await
        .map_err(|e| DbErr::Migration(format!("{e}\nQuery: {statement}")))?;
    }
    txn.commit().await
}

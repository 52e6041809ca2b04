use sea_orm_migration::prelude::*;

use relief_twofactor_migration::Migrator;

#[tokio::main]
async fn main() {
    cli::run_cli(Migrator).await;
}

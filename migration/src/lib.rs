pub use sea_orm_migration::prelude::*;

mod m20250601_000001_create_user_memberships;
mod m20250601_000002_create_credits;
mod m20250601_000003_create_credit_payment_records;
mod m20250601_000004_create_orders;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250601_000001_create_user_memberships::Migration),
            Box::new(m20250601_000002_create_credits::Migration),
            Box::new(m20250601_000003_create_credit_payment_records::Migration),
            Box::new(m20250601_000004_create_orders::Migration),
        ]
    }
}

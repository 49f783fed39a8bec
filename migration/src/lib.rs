pub use sea_orm_migration::prelude::*;

mod m20260830_000001_create_users;
mod m20260830_000002_create_rides;
mod m20260830_000003_create_driver_locations;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20260830_000001_create_users::Migration),
            Box::new(m20260830_000002_create_rides::Migration),
            Box::new(m20260830_000003_create_driver_locations::Migration),
        ]
    }
}

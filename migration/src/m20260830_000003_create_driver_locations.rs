use sea_orm_migration::{prelude::*, schema::*};

use super::m20260830_000001_create_users::User;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // One current-location row per driver; every publish overwrites it.
        // No history table: only the latest position matters.
        manager
            .create_table(
                Table::create()
                    .table(DriverLocation::Table)
                    .if_not_exists()
                    .col(uuid(DriverLocation::DriverId).primary_key())
                    .col(double(DriverLocation::Latitude).not_null())
                    .col(double(DriverLocation::Longitude).not_null())
                    .col(double_null(DriverLocation::Heading))
                    .col(double_null(DriverLocation::Speed))
                    .col(double_null(DriverLocation::Accuracy))
                    .col(
                        timestamp_with_time_zone(DriverLocation::UpdatedAt)
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_driver_location_driver")
                            .from(DriverLocation::Table, DriverLocation::DriverId)
                            .to(User::Table, User::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(DriverLocation::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum DriverLocation {
    Table,
    DriverId,
    Latitude,
    Longitude,
    Heading,
    Speed,
    Accuracy,
    UpdatedAt,
}

use sea_orm_migration::{prelude::*, schema::*, sea_orm::sea_query::extension::postgres::Type};

use super::m20260830_000001_create_users::User;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Ride lifecycle status enum
        manager
            .create_type(
                Type::create()
                    .as_enum(RideStatus::Enum)
                    .values([
                        RideStatus::Searching,
                        RideStatus::Accepted,
                        RideStatus::Arrived,
                        RideStatus::InProgress,
                        RideStatus::Completed,
                        RideStatus::Cancelled,
                        RideStatus::Expired,
                    ])
                    .to_owned(),
            )
            .await?;

        // Vehicle tier enum (drives the per-km fare rate)
        manager
            .create_type(
                Type::create()
                    .as_enum(VehicleTier::Enum)
                    .values([VehicleTier::Standard, VehicleTier::Premium, VehicleTier::Xl])
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Ride::Table)
                    .if_not_exists()
                    .col(uuid(Ride::Id).primary_key())
                    .col(uuid(Ride::PassengerId).not_null())
                    .col(uuid_null(Ride::DriverId))
                    .col(double(Ride::PickupLat).not_null())
                    .col(double(Ride::PickupLng).not_null())
                    .col(double(Ride::DropoffLat).not_null())
                    .col(double(Ride::DropoffLng).not_null())
                    .col(string_len(Ride::PickupLocation, 255).not_null())
                    .col(string_len(Ride::DropoffLocation, 255).not_null())
                    .col(
                        ColumnDef::new(Ride::VehicleTier)
                            .custom(VehicleTier::Enum)
                            .not_null(),
                    )
                    .col(double(Ride::Price).not_null())
                    .col(
                        ColumnDef::new(Ride::Status)
                            .custom(RideStatus::Enum)
                            .not_null(),
                    )
                    // Driver profile snapshot taken at acceptance time, so
                    // reads never need a join against the driver row
                    .col(string_len_null(Ride::DriverName, 100))
                    .col(string_len_null(Ride::DriverCar, 100))
                    .col(string_len_null(Ride::DriverPlate, 20))
                    .col(double_null(Ride::DriverRating))
                    .col(
                        timestamp_with_time_zone(Ride::CreatedAt)
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        timestamp_with_time_zone(Ride::UpdatedAt)
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(timestamp_with_time_zone_null(Ride::AcceptedAt))
                    .col(timestamp_with_time_zone_null(Ride::StartedAt))
                    .col(timestamp_with_time_zone_null(Ride::CompletedAt))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_ride_passenger")
                            .from(Ride::Table, Ride::PassengerId)
                            .to(User::Table, User::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_ride_driver")
                            .from(Ride::Table, Ride::DriverId)
                            .to(User::Table, User::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .to_owned(),
            )
            .await?;

        // Open requests are scanned by drivers and by the timeout sweeper
        manager
            .create_index(
                Index::create()
                    .name("idx_ride_status_created_at")
                    .table(Ride::Table)
                    .col(Ride::Status)
                    .col(Ride::CreatedAt)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Ride::Table).to_owned())
            .await?;

        manager
            .drop_type(Type::drop().name(VehicleTier::Enum).to_owned())
            .await?;

        manager
            .drop_type(Type::drop().name(RideStatus::Enum).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum Ride {
    Table,
    Id,
    PassengerId,
    DriverId,
    PickupLat,
    PickupLng,
    DropoffLat,
    DropoffLng,
    PickupLocation,
    DropoffLocation,
    VehicleTier,
    Price,
    Status,
    DriverName,
    DriverCar,
    DriverPlate,
    DriverRating,
    CreatedAt,
    UpdatedAt,
    AcceptedAt,
    StartedAt,
    CompletedAt,
}

#[derive(DeriveIden)]
pub enum RideStatus {
    #[sea_orm(iden = "ride_status")]
    Enum,
    #[sea_orm(iden = "searching")]
    Searching,
    #[sea_orm(iden = "accepted")]
    Accepted,
    #[sea_orm(iden = "arrived")]
    Arrived,
    #[sea_orm(iden = "in_progress")]
    InProgress,
    #[sea_orm(iden = "completed")]
    Completed,
    #[sea_orm(iden = "cancelled")]
    Cancelled,
    #[sea_orm(iden = "expired")]
    Expired,
}

#[derive(DeriveIden)]
pub enum VehicleTier {
    #[sea_orm(iden = "vehicle_tier")]
    Enum,
    #[sea_orm(iden = "standard")]
    Standard,
    #[sea_orm(iden = "premium")]
    Premium,
    #[sea_orm(iden = "xl")]
    Xl,
}

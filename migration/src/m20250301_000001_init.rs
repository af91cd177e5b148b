use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // ========== SENSORS ==========
        manager
            .create_table(
                Table::create()
                    .table(Sensors::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Sensors::Id)
                            .uuid()
                            .not_null()
                            .primary_key()
                            .extra("DEFAULT gen_random_uuid()"),
                    )
                    .col(ColumnDef::new(Sensors::Name).string_len(128).not_null())
                    .col(ColumnDef::new(Sensors::Location).string_len(256).not_null())
                    .col(ColumnDef::new(Sensors::Latitude).double())
                    .col(ColumnDef::new(Sensors::Longitude).double())
                    .col(
                        ColumnDef::new(Sensors::InstallationDate)
                            .timestamp_with_time_zone()
                            .not_null()
                            .extra("DEFAULT NOW()"),
                    )
                    .col(ColumnDef::new(Sensors::SensorType).string_len(64).not_null())
                    .col(ColumnDef::new(Sensors::LastCalibration).timestamp_with_time_zone())
                    .col(ColumnDef::new(Sensors::BatteryLevel).integer())
                    .col(
                        ColumnDef::new(Sensors::NetworkStatus)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(Sensors::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .extra("DEFAULT NOW()"),
                    )
                    .col(
                        ColumnDef::new(Sensors::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .extra("DEFAULT NOW()"),
                    )
                    .to_owned(),
            )
            .await?;

        // ========== WATER LEVEL READINGS ==========
        manager
            .create_table(
                Table::create()
                    .table(WaterLevelReadings::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(WaterLevelReadings::Id)
                            .uuid()
                            .not_null()
                            .primary_key()
                            .extra("DEFAULT gen_random_uuid()"),
                    )
                    .col(ColumnDef::new(WaterLevelReadings::SensorId).uuid().not_null())
                    .col(ColumnDef::new(WaterLevelReadings::WaterLevel).double().not_null())
                    .col(ColumnDef::new(WaterLevelReadings::Status).string_len(16).not_null())
                    .col(
                        ColumnDef::new(WaterLevelReadings::ReadingTime)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(WaterLevelReadings::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .extra("DEFAULT NOW()"),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_water_level_readings_sensor")
                            .from(WaterLevelReadings::Table, WaterLevelReadings::SensorId)
                            .to(Sensors::Table, Sensors::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_water_level_readings_sensor_time")
                    .table(WaterLevelReadings::Table)
                    .col(WaterLevelReadings::SensorId)
                    .col(WaterLevelReadings::ReadingTime)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_water_level_readings_time")
                    .table(WaterLevelReadings::Table)
                    .col(WaterLevelReadings::ReadingTime)
                    .to_owned(),
            )
            .await?;

        // ========== CURRENT SENSOR STATUS ==========
        // One row per sensor, maintained by the ingestion side.
        manager
            .create_table(
                Table::create()
                    .table(CurrentSensorStatus::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(CurrentSensorStatus::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(CurrentSensorStatus::Name).string_len(128).not_null())
                    .col(
                        ColumnDef::new(CurrentSensorStatus::Location)
                            .string_len(256)
                            .not_null(),
                    )
                    .col(ColumnDef::new(CurrentSensorStatus::BatteryLevel).integer())
                    .col(ColumnDef::new(CurrentSensorStatus::WaterLevel).double())
                    .col(ColumnDef::new(CurrentSensorStatus::Status).string_len(16))
                    .col(ColumnDef::new(CurrentSensorStatus::ReadingTime).timestamp_with_time_zone())
                    .col(
                        ColumnDef::new(CurrentSensorStatus::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .extra("DEFAULT NOW()"),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_current_sensor_status_sensor")
                            .from(CurrentSensorStatus::Table, CurrentSensorStatus::Id)
                            .to(Sensors::Table, Sensors::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // ========== CHANGE NOTIFICATIONS ==========
        let db = manager.get_connection();

        // Payload: {"table", "type", "record", "old_record"}
        db.execute_unprepared(
            r"
            CREATE OR REPLACE FUNCTION notify_telemetry_change() RETURNS trigger AS $$
            BEGIN
                PERFORM pg_notify(
                    'telemetry_changes',
                    json_build_object(
                        'table', TG_TABLE_NAME,
                        'type', TG_OP,
                        'record', CASE WHEN TG_OP = 'DELETE' THEN NULL ELSE row_to_json(NEW) END,
                        'old_record', CASE WHEN TG_OP = 'INSERT' THEN NULL ELSE row_to_json(OLD) END
                    )::text
                );
                RETURN NULL;
            END;
            $$ LANGUAGE plpgsql
            ",
        )
        .await?;

        for table in ["sensors", "water_level_readings", "current_sensor_status"] {
            db.execute_unprepared(&format!(
                "CREATE TRIGGER {table}_notify AFTER INSERT OR UPDATE OR DELETE ON {table} \
                 FOR EACH ROW EXECUTE FUNCTION notify_telemetry_change()"
            ))
            .await?;
        }

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();

        for table in ["sensors", "water_level_readings", "current_sensor_status"] {
            db.execute_unprepared(&format!("DROP TRIGGER IF EXISTS {table}_notify ON {table}"))
                .await?;
        }
        db.execute_unprepared("DROP FUNCTION IF EXISTS notify_telemetry_change()")
            .await?;

        manager
            .drop_table(Table::drop().table(CurrentSensorStatus::Table).if_exists().to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(WaterLevelReadings::Table).if_exists().to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Sensors::Table).if_exists().to_owned())
            .await?;

        Ok(())
    }
}

#[derive(DeriveIden)]
enum Sensors {
    Table,
    Id,
    Name,
    Location,
    Latitude,
    Longitude,
    InstallationDate,
    SensorType,
    LastCalibration,
    BatteryLevel,
    NetworkStatus,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum WaterLevelReadings {
    Table,
    Id,
    SensorId,
    WaterLevel,
    Status,
    ReadingTime,
    CreatedAt,
}

#[derive(DeriveIden)]
enum CurrentSensorStatus {
    Table,
    Id,
    Name,
    Location,
    BatteryLevel,
    WaterLevel,
    Status,
    ReadingTime,
    UpdatedAt,
}

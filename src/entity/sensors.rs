use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "sensors")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub name: String,
    pub location: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub installation_date: DateTimeWithTimeZone,
    pub sensor_type: String,
    pub last_calibration: Option<DateTimeWithTimeZone>,
    pub battery_level: Option<i32>,
    pub network_status: bool,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::water_level_readings::Entity")]
    Readings,
    #[sea_orm(has_one = "super::current_sensor_status::Entity")]
    CurrentStatus,
}

impl Related<super::water_level_readings::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Readings.def()
    }
}

impl Related<super::current_sensor_status::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::CurrentStatus.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

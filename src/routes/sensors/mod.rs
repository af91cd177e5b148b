mod handlers;
mod live;
mod types;

pub use handlers::{get_sensor, get_sensor_status, list_locations, list_statuses};
pub use live::live_sensor;
pub use types::{LiveFrame, LocationsResponse};

// Re-export utoipa path structs for OpenAPI documentation
pub use handlers::{
    __path_get_sensor, __path_get_sensor_status, __path_list_locations, __path_list_statuses,
};
pub use live::__path_live_sensor;

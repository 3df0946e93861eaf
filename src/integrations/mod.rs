pub mod evse;
pub mod warnings;
pub mod weather_locations;

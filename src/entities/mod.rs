pub mod driver_location;
pub mod ride;
pub mod user;

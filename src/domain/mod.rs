//! Domain layer: entities, value objects and the ports the application
//! layer depends on.

pub mod booking;
pub mod payment;
pub mod ports;
pub mod resource;

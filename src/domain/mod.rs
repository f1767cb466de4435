//! Domain Layer
//!
//! Backend entities, value objects and the ports the application layer
//! depends on.

pub mod entities;
pub mod ports;
pub mod value_objects;

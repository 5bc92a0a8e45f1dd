//! Domain Layer
//!
//! Entities, value objects, ports and pure services. Nothing in here
//! knows about HTTP, netlink or the presentation layer.

pub mod entities;
pub mod errors;
pub mod ports;
pub mod services;
pub mod value_objects;

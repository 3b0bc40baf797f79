//! Domain layer: value objects, entities, the lifecycle table and the ports the engine talks to.

pub mod actor;
pub mod delivery;
pub mod dispute;
pub mod lifecycle;
pub mod message;
pub mod money;
pub mod notification;
pub mod order;
pub mod ports;
pub mod review;

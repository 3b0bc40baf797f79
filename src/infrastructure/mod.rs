//! Adapters behind the domain ports: order stores, notification sinks and the payment gateway.

pub mod gateway;
pub mod in_memory;
#[cfg(feature = "storage-rocksdb")]
pub mod rocksdb;

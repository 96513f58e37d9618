//! Adapters for the domain ports: storage backends and the gateway client.

pub mod gateway;
pub mod in_memory;
#[cfg(feature = "storage-rocksdb")]
pub mod rocksdb;

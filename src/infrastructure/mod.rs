//! Adapters implementing the domain ports.

pub mod in_memory;
#[cfg(feature = "cache-redis")]
pub mod redis;
#[cfg(feature = "storage-rocksdb")]
pub mod rocksdb;
pub mod telegram;
pub mod webdriver;
pub mod webhook;

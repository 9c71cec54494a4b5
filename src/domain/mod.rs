pub mod account;
pub mod catalog;
pub mod order;
pub mod ports;
pub mod session;

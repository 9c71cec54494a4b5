//! Application layer orchestrating the fulfillment pipeline.
//!
//! [`mixing::MixingEngine`] turns buyer orders into fulfillment orders,
//! [`worker::FulfillmentWorker`] claims and executes them against the storefront,
//! and [`notifier::NotificationDispatcher`] reports the outcome.

pub mod mixing;
pub mod notifier;
pub mod worker;

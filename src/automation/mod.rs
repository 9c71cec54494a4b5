//! Browser automation of the upstream storefront.
//!
//! [`client::StorefrontClient`] implements the [`Storefront`](crate::domain::ports::Storefront)
//! port on top of any [`BrowserDriver`](crate::domain::ports::BrowserDriver);
//! [`mock::MockStorefront`] is a scripted driver used by the test suites.

pub mod client;
pub mod landmarks;
pub mod mock;

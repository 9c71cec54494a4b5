//! Outer surfaces: CSV seed files in, CSV status listings out.

pub mod csv;

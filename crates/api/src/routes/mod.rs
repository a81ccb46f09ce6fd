//! HTTP routes

pub mod status;
pub mod stream;

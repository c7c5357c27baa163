//! HTTP request handlers.

pub mod health;
pub mod jobs;
pub mod uploads;

pub use health::{health, ready};

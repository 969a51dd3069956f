//! HTTP request handlers.

pub mod accounts;
pub mod admin;
pub mod content;
pub mod conversions;
pub mod health;
pub mod points;
pub mod tips;

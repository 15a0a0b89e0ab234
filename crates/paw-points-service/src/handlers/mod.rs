//! API handlers.
//!
//! Request and response bodies use camelCase field names.

pub mod accounts;
pub mod admin;
pub mod health;
pub mod points;
pub mod shop;

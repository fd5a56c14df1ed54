//! # Web API Request Handlers
//!
//! HTTP request handlers organized by functional area.

pub mod admin;
pub mod batches;
pub mod callbacks;
pub mod health;

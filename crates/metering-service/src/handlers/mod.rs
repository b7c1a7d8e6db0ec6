//! HTTP request handlers.

pub mod checkout;
pub mod credits;
pub mod generations;
pub mod health;
pub mod webhooks;

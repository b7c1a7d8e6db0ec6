//! Billing-processor integration.
//!
//! [`client`] talks to the processor's REST API for checkout and portal
//! sessions; [`types`] maps its webhook payloads onto
//! [`metering_core::BillingEvent`].

pub mod client;
pub mod types;

pub use client::{BillingClient, BillingError};

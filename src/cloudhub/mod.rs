//! MuleSoft CloudHub adapter
//!
//! Implements credential acquisition, instance discovery and log retrieval
//! against the Anypoint Platform APIs.

pub mod client;

pub use client::CloudHubClient;

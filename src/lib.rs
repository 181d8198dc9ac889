//! ZenFit entitlements - subscription tier tracking and feature gating
//!
//! This library keeps the user's subscription entitlement in a durable store,
//! reconciles it against purchases reported by an external purchase provider,
//! and answers the feature-gating questions (access level, daily quotas) that
//! the rest of the app asks on every workout or meditation.

pub mod catalog;
pub mod config;
pub mod db;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod models;
pub mod policy;
pub mod provider;
pub mod session;

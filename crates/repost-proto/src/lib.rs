//! Shared model for the repost dashboard: wire types, pure reconciliation
//! rules, destination selection, the persistent cache and settings.

pub mod cache;
pub mod config;
pub mod platform;
pub mod protocol;
pub mod reconcile;
pub mod selection;

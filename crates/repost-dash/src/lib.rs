//! Live-state sync engine and terminal dashboard for the repost backend.
//!
//! The sync half (`api`, `stream`, `poller`, `store`, `engine`, `control`)
//! keeps a local snapshot in step with the backend.  The UI half (`app` and
//! friends) renders that snapshot and turns key presses into commands.

pub mod action;
pub mod api;
pub mod app;
pub mod app_state;
pub mod component;
pub mod components;
pub mod control;
pub mod engine;
pub mod error;
pub mod focus;
pub mod poller;
pub mod store;
pub mod stream;
pub mod theme;
pub mod widgets;

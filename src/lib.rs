//! Forecast polling service.
//!
//! Polls a Dark Sky style forecast API once per configured location per
//! cycle and republishes the cleaned values as flat device states on a
//! host. See `poll` for the cycle and `parse` for the per-category state
//! layouts.

pub mod alert;
pub mod analysis;
pub mod config;
pub mod dump;
pub mod email;
pub mod host;
pub mod ingest;
pub mod logging;
pub mod model;
pub mod parse;
pub mod poll;
pub mod verify;

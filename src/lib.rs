//! Squares pool: a 10x10 football squares fundraiser.
//!
//! Buyers claim cells, an administrator draws the row and column digits,
//! and each quarter's winner is the cell at the intersection of the last
//! digits of both teams' scores.

pub mod adapters;
pub mod api;
pub mod cli;
pub mod clock;
pub mod config;
pub mod domain;
pub mod engine;
pub mod error;
pub mod logging;
pub mod persistence;
pub mod services;

pub use config::AppConfig;
pub use error::{PoolError, Result};
pub use persistence::PoolStore;
pub use services::{LiveScoreSync, PoolService};

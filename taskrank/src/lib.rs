//! TaskRank library
//!
//! Weighted-category task prioritization: category registry, scoring
//! engine, SQLite storage and the services the `taskrank` binary drives.

pub mod app;
pub mod config;
pub mod database;
pub mod error;
pub mod priority;
pub mod services;

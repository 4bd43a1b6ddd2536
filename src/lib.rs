// src/lib.rs

//! tubewatch: transit disruption watcher library.
//!
//! Polls line status sources, diffs against the previous run and notifies
//! only when something changed.

pub mod config;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod services;
pub mod storage;
pub mod utils;

//! # dbsweep
//!
//! Concurrent query dispatch across a fleet of database targets.
//!
//! `dbsweep` fans a fixed, ordered set of queries out to an arbitrarily large
//! collection of independent remote targets, executes them under a bounded
//! worker budget, and collects per-target/per-query outcomes. One target's
//! failure never affects another's.
//!
//! ## Architecture
//!
//! - [`registry`] - Thread-safe task registry, the single source of truth for
//!   connection parameters and live status
//! - [`worker`] - Per-task lifecycle: connect, run all queries, report, tear
//!   down, always finish
//! - [`pool`] - Bounded worker pool backed by a queue
//! - [`barrier`] - Completion barrier polled by the controlling process
//! - [`engine`] - Orchestration tying registry, pool, and barrier together
//!
//! External collaborators are traits:
//!
//! - [`connector::Connector`] - Opens a connection to one target and executes
//!   queries against it
//! - [`source::TaskSource`] - Supplies the target list and the query set
//! - [`sink::ResultSink`] - Durably records statuses and result rows
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use dbsweep::config::EngineConfig;
//! use dbsweep::engine::DispatchEngine;
//!
//! let engine = DispatchEngine::new(
//!     EngineConfig::default(),
//!     Arc::new(|| Box::new(MyConnector::new())),
//!     Arc::new(my_sink),
//! );
//! let summary = engine.run(&mut my_source).await?;
//! ```

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
// Common test patterns that are acceptable
#![cfg_attr(
    test,
    allow(
        clippy::field_reassign_with_default,
        clippy::float_cmp,
        clippy::cast_possible_truncation,
        clippy::cast_possible_wrap,
        unused_mut
    )
)]

/// Engine and connector error types.
pub mod error;

/// Engine and pool configuration.
pub mod config;

/// Connector trait, connection parameters, and tabular results.
pub mod connector;

/// Task source trait and query definitions.
pub mod source;

/// Result sink trait and status types.
pub mod sink;

/// Thread-safe task registry.
pub mod registry;

/// Per-task worker lifecycle.
pub mod worker;

/// Bounded worker pool.
pub mod pool;

/// Completion barrier.
pub mod barrier;

/// Dispatch engine orchestration.
pub mod engine;

/// Engine metrics counters.
pub mod metrics;

/// CSV-backed task source and result sink.
pub mod csv;

/// Testing utilities (mock connector, source, sink).
pub mod testing;

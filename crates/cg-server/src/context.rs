//! Application context.
//!
//! [`AppContext`] is the central struct shared across all route handlers via
//! Axum state. It wraps the immutable configuration and tool registry in
//! `Arc`s and owns the [`JobRegistry`] for the lifetime of the server.

use std::sync::Arc;

use cg_av::ToolRegistry;
use cg_core::config::Config;

use crate::jobs::JobRegistry;

/// Application context shared by all request handlers (via Axum state).
///
/// This is cheaply cloneable because it only holds `Arc`s.
#[derive(Clone)]
pub struct AppContext {
    /// Immutable application configuration snapshot.
    pub config: Arc<Config>,
    /// External tool registry.
    pub tools: Arc<ToolRegistry>,
    /// Asynchronous conversion jobs.
    pub jobs: JobRegistry,
}

impl AppContext {
    pub fn new(config: Config, tools: Arc<ToolRegistry>) -> Self {
        let jobs = JobRegistry::new(tools.clone(), &config.jobs);
        Self {
            config: Arc::new(config),
            tools,
            jobs,
        }
    }
}

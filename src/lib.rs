//! `taskloom`: a deterministic tool-using agent orchestrator.
//!
//! A non-deterministic planner proposes one structured action at a time;
//! this crate validates and executes that action against a fixed registry
//! of deterministic tools, while guardrails enforce forward progress,
//! deduplication, memoization, and content correctness until every mission
//! is complete or the run fails closed.
//!
//! The entry point is [`driver::Orchestrator::run`]. A caller supplies a
//! [`planner::Planner`] adapter, a [`tool::ToolRegistry`] (see
//! [`tools::register_reference_tools`] for the bundled catalogue), a
//! [`memo::SqliteMemoStore`], a [`checkpoint::SqliteCheckpointStore`], and a
//! [`config::Config`].

pub mod canonical;
pub mod checkpoint;
pub mod config;
pub mod driver;
pub mod error;
pub mod memo;
pub mod mission;
pub mod planner;
pub mod policy;
pub mod state;
pub mod tool;
pub mod tools;

pub use config::Config;
pub use driver::{Orchestrator, RunReport};
pub use error::{OrchestratorError, Result};
pub use planner::{MockPlanner, Planner};
pub use state::RunState;

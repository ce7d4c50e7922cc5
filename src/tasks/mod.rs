//! Background Tasks Module
//!
//! # Tasks
//! - Maintenance: applies queued recency updates, sweeps expired entries,
//!   enforces the key limit and compacts the index

mod maintenance;

pub(crate) use maintenance::{spawn_maintenance_task, Maintainer};

//! Background Tasks Module
//!
//! Contains background tasks that run periodically during server operation.
//!
//! # Tasks
//! - Index Repair: Drops index members whose entry has expired or vanished

mod repair;

pub use repair::spawn_repair_task;

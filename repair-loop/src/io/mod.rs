//! Side-effecting collaborators of the repair loop.

pub mod config;
pub mod iteration_log;
pub mod oracle;
pub mod process;
pub mod target;
pub mod tools;

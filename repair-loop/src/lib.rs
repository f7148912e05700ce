//! Autonomous code repair loop.
//!
//! A target file is pushed through a deterministic rewriter once, then
//! analyzed by a static analyzer and a test runner. While findings remain, a
//! patch oracle is asked for a corrected version, which is written back
//! before the next pass. The loop stops at zero findings or after a bounded
//! number of iterations.
//!
//! - **[`core`]**: Pure logic (diagnostic parsing, fix extraction, prompt
//!   rendering, loop decisions). No I/O.
//! - **[`io`]**: Processes, filesystem, configuration and the oracle client,
//!   behind traits so tests can script them.
//!
//! [`repair`] drives one target; [`batch`] runs it over a worklist.

pub mod batch;
pub mod core;
pub mod error;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod repair;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

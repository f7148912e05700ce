//! Pure building blocks of the repair loop.
//!
//! Nothing here touches the filesystem, spawns a process or talks to the
//! network: tool output bytes and oracle text go in, diagnostics, prompts and
//! decisions come out.

pub mod decide;
pub mod diagnostics;
pub mod extract;
pub mod language;
pub mod prompt;
pub mod types;

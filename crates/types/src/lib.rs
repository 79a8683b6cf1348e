//! Shared wire and persisted-row types for faultline.
//!
//! Kept deliberately free of any I/O dependency: every other crate
//! (`faultline-db`, `faultline-cache`, `faultline-jobs`, `faultline-stream`,
//! `faultline-server`) depends on this one, never the reverse.

pub mod capture;
pub mod error_group;
pub mod project;
pub mod session;
pub mod stats;
pub mod stream;

pub use capture::*;
pub use error_group::*;
pub use project::*;
pub use session::*;
pub use stats::*;
pub use stream::*;

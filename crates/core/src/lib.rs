//! Pure, I/O-free domain logic shared across faultline: the Fingerprinter
//! (§4.C), similarity scoring used by the Grouping Engine (§4.D), the
//! user-agent rollup helpers used by the Stats Aggregator (§4.G), and the
//! process-wide `Config`.

pub mod config;
pub mod fingerprint;
pub mod similarity;
pub mod useragent;

pub use config::Config;
pub use fingerprint::{Fingerprint, Fingerprinter};

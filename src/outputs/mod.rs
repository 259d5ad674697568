//! Side outputs derived from a run.
//!
//! # Submodules
//!
//! - [`json`]: per-run JSON report of fetch counts and sink outcomes
//! - [`catalog`]: sorted `platform,slist` listing built from a snapshot
//!
//! # Output Structure
//!
//! ```text
//! report_dir/
//! └── 2024-05-20/
//!     └── 080000.json
//!
//! Directory.txt               # catalog listing
//! ```

pub mod catalog;
pub mod json;

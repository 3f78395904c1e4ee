//! Output generation for pipeline runs.
//!
//! # Submodules
//!
//! - [`json`]: Writes a [`NewsResult`](crate::news::NewsResult) report for
//!   the delivery stage and for inspection
//!
//! # Output Structure
//!
//! ```text
//! json_output_dir/
//! └── 2025-05-06/
//!     ├── 080000.json
//!     └── 200000.json
//! ```

pub mod json;

//! Transformation module.
//!
//! Turns normalized records into output rows following the column table.

pub mod mapper;

pub use mapper::{map_row, map_rows};

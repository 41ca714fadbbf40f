//! Utility functions and helpers
//!
//! Parquet IO plus the logging and progress helpers shared by the loaders,
//! the extractor and the command line tool.

pub mod io;
pub mod logging;

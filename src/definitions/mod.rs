//! The study this crate extracts
//!
//! `omicron` declares the cohort; the other modules hold the tables it is
//! built from.

pub mod codelists;
pub mod dictionaries;
pub mod labels;
pub mod omicron;

pub use codelists::{INLINE_CODELISTS, STUDY_CODELISTS, load_study_codelists, register_inline};
pub use labels::{AsthmaStatus, CareHomeType, SmokingStatus};
pub use omicron::{INDEX_DATE, study_definition};

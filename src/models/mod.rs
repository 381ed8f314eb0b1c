//! Domain models for cohorts.
//!
//! # Core Concepts
//!
//! ## Owned Records
//!
//! - [`Cohort`]: A named, time-bounded group of patients. Owns its members and
//!   attributes; they are saved and purged together with it.
//! - [`CohortMember`]: Membership of one patient in one cohort, with its own
//!   void state and end date.
//! - [`CohortAttribute`]: A typed value attached to a cohort.
//!
//! ## Referenced Records
//!
//! These are looked up by uuid and never modified through a cohort:
//!
//! - [`CohortType`]: Classification of a cohort (e.g. "Community Group").
//! - [`CohortAttributeType`]: The type of a [`CohortAttribute`]; its name is the
//!   key used when searching by attributes.
//! - [`Location`]: Where the cohort is based.

mod attribute;
mod cohort;
mod cohort_type;
mod location;
mod member;

pub use attribute::*;
pub use cohort::*;
pub use cohort_type::*;
pub use location::*;
pub use member::*;

//! # Models
//!
//! The records kept by the store. Every record except [`Institution`] carries
//! the `institution_id` of the tenant that owns it.

mod assessment;
mod catalog;
mod directory;
mod schedule;

pub use assessment::{Assessment, StatusChange};
pub use catalog::{Course, Outcome};
pub use directory::{Institution, Program, User, UserView};
pub use schedule::{Offering, Section, SectionStatus, Term};

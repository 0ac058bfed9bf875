//! Trellis: the traversal planning core of a typed graph database.
//!
//! Given a conjunction of pattern constraints over variables, the planner
//! rewrites the constraints into indexable form, estimates per-step costs,
//! and selects one traversal direction per constraint by solving a
//! maximum-weight spanning arborescence over the variable graph. The output
//! is an ordered, executable [`plan::TraversalPlan`].

#![warn(missing_docs)]

pub mod constraint;
pub mod error;
pub mod fragment;
pub mod graph;
pub mod optimize;
pub mod plan;
pub mod planner;
pub mod schema;
pub mod spanning;
pub mod types;

pub use error::{PlanError, Result};
pub use plan::{PlanExplain, TraversalPlan};
pub use planner::{Planner, PlannerConfig};

//! Shared data model for the cwmon relay: resources, metric and graph
//! definitions, and the static per-kind metric catalogs.

pub mod catalog;
pub mod types;

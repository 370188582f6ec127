//! `geodiff-recon`: snapshot reconciliation and grid ranking engine.
//!
//! The engine core (`reconcile`, `attributes`, `spatial`, `ranking`,
//! `tracking`) works on pre-loaded snapshots and layers and calls geometry
//! operations through [`GeometryBackend`]. `loader`, `export` and `context`
//! are the CSV/WKT collaborators the CLI wires around it.

pub mod attributes;
pub mod backend;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod export;
pub mod geometry;
pub mod loader;
pub mod model;
pub mod ranking;
pub mod reconcile;
pub mod sanitize;
pub mod snapshot;
pub mod spatial;
pub mod summary;
pub mod tracking;
pub mod value;

pub use backend::{GeometryBackend, PlanarBackend};
pub use config::ReconConfig;
pub use context::RunContext;
pub use engine::{run, run_in};
pub use error::ReconError;
pub use geometry::{Geometry, GeometryKind};
pub use model::{ReconInput, RunReport, Side, SkippedEntity};
pub use snapshot::TabularSnapshot;
pub use value::{FieldType, Value};

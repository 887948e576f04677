//! Operating model facade for the Holon semantic operating model.
//!
//! This crate wires the event store, projection, graph, cache, and
//! availability resolver into one [`OperatingModel`], loads its
//! configuration, and maps every failure onto a stable error code.
//!
//! # Modules
//!
//! - [`model`] -- [`OperatingModel`] and its builder.
//! - [`bootstrap`] -- Opening backends from configuration.
//! - [`config`] -- Configuration loading from `holon-config.yaml` into
//!   strongly-typed structs.
//! - [`validator`] -- [`EventValidator`] pre-persistence hook.
//! - [`projected`] -- Graph reads served from the projection while degraded.
//! - [`envelope`] -- Success/error envelope and pagination.
//! - [`error`] -- [`CoreError`] and its codes.

pub mod bootstrap;
pub mod config;
pub mod envelope;
pub mod error;
pub mod model;
pub mod projected;
pub mod validator;

pub use config::{ConfigError, HolonConfig};
pub use envelope::{Envelope, ErrorBody, Page, paginate};
pub use error::CoreError;
pub use model::{OperatingModel, OperatingModelBuilder};
pub use projected::ProjectedGraph;
pub use validator::{AcceptAll, EventValidator, Rejection, ValidatorChain};

//! `taxalign-recon`: taxon name reconciliation engine.
//!
//! Pure engine crate: takes a catalog of names, a registry handle and an
//! exclusion set, returns the assembled taxonomy table with its review
//! reports. No HTTP or filesystem dependencies; the CLI supplies those.

pub mod arbiter;
pub mod config;
pub mod engine;
pub mod error;
pub mod exclusions;
pub mod export;
pub mod hierarchy;
pub mod matcher;
pub mod model;
pub mod normalize;
pub mod registry;
pub mod reports;

pub use config::TaxalignConfig;
pub use engine::run;
pub use error::{RegistryError, TaxalignError};
pub use exclusions::ExclusionSet;
pub use model::{PipelineResult, TaxonId, TaxonRecord};
pub use registry::{CatalogSource, TaxonRegistry};

//! Infrastructure layer for prompt A/B experiments
//!
//! Provides the in-memory experiment repository and the significance analyzer.

mod in_memory_repository;
pub mod statistical;

pub use in_memory_repository::InMemoryExperimentRepository;
pub use statistical::{
    analyze, cohens_h, proportion_confidence_interval, recommend, two_proportion_z_test,
    z_for_confidence_level,
};

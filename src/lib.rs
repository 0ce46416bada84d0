//! PMP Prompt Lab
//!
//! Versioned prompt templates with typed variables and composition, plus
//! A/B experiments comparing two templates:
//! - Template inclusion (`{{> other}}`) and variable inheritance with cycle detection
//! - Typed variable coercion at render time
//! - Deterministic variant assignment and per-variant metrics
//! - Significance analysis to pick a winner

pub mod cli;
pub mod config;
pub mod domain;
pub mod infrastructure;

pub use config::AppConfig;

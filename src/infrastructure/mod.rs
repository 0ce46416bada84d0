//! Infrastructure layer - repository adapters, statistics and services

pub mod experiment;
pub mod logging;
pub mod prompt;
pub mod services;

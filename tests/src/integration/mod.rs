//! Cross-crate tests over real engines, pipelines and consensus services.

mod properties;
mod scenarios;

//! # Quorum-Ledger Test Suite
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! ├── fixtures.rs        # Ledger fixtures and in-process clusters
//! └── integration/
//!     ├── scenarios.rs   # End-to-end acceptance scenarios
//!     └── properties.rs  # Cross-crate invariants
//! tests/benches/
//! └── pipeline_benchmarks.rs
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p ql-tests
//! cargo test -p ql-tests integration::scenarios
//! cargo bench -p ql-tests
//! ```

pub mod fixtures;
pub mod integration;

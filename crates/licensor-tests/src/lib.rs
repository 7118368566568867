//! Integration test infrastructure for Licensor.
//!
//! This crate provides testcontainers-based infrastructure for running the
//! storage adapters and the licensing engine against a real PostgreSQL.
//!
//! # Usage
//!
//! ```ignore
//! use licensor_tests::TestContext;
//!
//! #[tokio::test]
//! async fn test_something() {
//!     let ctx = TestContext::postgres().await.unwrap();
//!     // Use ctx.db, ctx.service, ctx.clock
//! }
//! ```

pub mod containers;
pub mod context;
pub mod fixtures;

pub use context::TestContext;
pub use fixtures::*;

/// Initialize test logging (call once per test binary).
pub fn init_test_logging() {
    use tracing_subscriber::{EnvFilter, fmt};

    let _ = fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("warn,licensor_tests=debug")),
        )
        .with_test_writer()
        .try_init();
}

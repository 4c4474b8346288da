//! Shared test support for the proposal sync workspace.
//!
//! - In-memory doubles for every store trait, with fault injection
//! - Single, shared testcontainers per test process:
//!   - PostgreSQL (port 5432)
//!   - MongoDB (port 27017)
//!   - Redis (port 6379)
//!
//! Container fixtures return `None` when Docker is unavailable so that
//! integration tests can skip instead of failing.

mod doubles;
mod fixtures;

pub use doubles::*;
pub use fixtures::*;

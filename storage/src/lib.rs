//! # Storage Layer
//!
//! Production adapters for the proposal sync engine:
//! - PostgreSQL: the relational system of record and the owner directory
//! - MongoDB: the document mirror
//! - Redis: optional cross-process per-record leases

pub mod mongodb;
pub mod postgres;
pub mod redis;

pub use self::mongodb::MongoProposalRepository;
pub use self::postgres::PostgresProposalRepository;
pub use self::redis::RedisLeaseProvider;

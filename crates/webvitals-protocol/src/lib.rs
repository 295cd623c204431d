//! Protocol definitions for Web Vitals scoring.
//!
//! This crate defines the vital enumeration and its threshold tables, the
//! sample and percentile records exchanged with the query layer, the
//! `measurements.<vital>:<op><value>` search-query syntax, and the query
//! service trait that both the in-process store and the HTTP client implement.

pub mod ids;
pub mod sample;
pub mod search;
pub mod service;
pub mod vitals;

pub use ids::*;
pub use sample::*;
pub use search::*;
pub use service::*;
pub use vitals::*;

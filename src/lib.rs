//! Activist Mirror: a psychometric quiz service.
//!
//! Eight five-choice answers are mapped to one of four archetypal roles and
//! a ranked subset of twenty-two behavioral patterns, then paired with
//! localized narrative text. The scoring and resolution engine lives under
//! [`quiz`]; persistence contracts and their SQLite/in-memory
//! implementations live under [`store`].

pub mod config;
pub mod error;
pub mod quiz;
pub mod store;
pub mod telemetry;

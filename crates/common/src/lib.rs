//! Common types, protocol definitions, and errors shared across `patient-records-vault` crates.

pub mod error;
pub mod protocol;

pub use error::ServiceError;

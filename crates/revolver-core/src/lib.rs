//! Credential rotation: rotate a secret at its source, then propagate it to
//! every sink that depends on it.
//!
//! A rotations file lists entries of one source (`from`) and any number of
//! sinks (`to`). [`runner::Runner`] drives each entry through an advance dry
//! run followed by a commit, recording every step in a [`report`] tree.

pub mod config;
pub mod error;
pub mod io;
pub mod provider;
pub mod rate_limit;
pub mod report;
pub mod runner;
pub mod schema;
pub mod secrets;

pub use error::{Result, RevolverError};

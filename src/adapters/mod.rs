//! Adapters for the external agent CLIs.

pub mod harness;

// src/config/mod.rs

//! Settings loading and validation for jobdag.
//!
//! Responsibilities:
//! - Define the TOML-backed settings model (`model.rs`).
//! - Locate and load a settings file from disk (`loader.rs`).
//! - Validate basic invariants like a known engine and non-zero timings
//!   (`validate.rs`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{load_and_validate, load_from_path, load_settings};
pub use model::{BoincSection, DagSection, LocalSection, LsfSection, RawSettings, Settings};

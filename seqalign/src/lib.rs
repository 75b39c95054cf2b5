//! seqalign library crate.
//!
//! Job orchestration for aligning sequencing reads against a reference
//! genome: download, optional downsampling, alignment, sorting, indexing and
//! publication, driven through an HTTP API.

pub mod api;
pub mod config;
pub mod downsample;
pub mod error;
pub mod job;
pub mod logging;
pub mod pipeline;
pub mod progress;
pub mod retention;
pub mod runner;
pub mod utils;

pub use error::{Error, Result};

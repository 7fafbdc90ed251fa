//! Core campaign orchestration for Backlinkoo.
//!
//! This crate ties storage, content generation and publishing together into
//! the campaign lifecycle and the end-to-end publish run (`run_campaign`).

pub mod campaign;
pub mod pipeline;

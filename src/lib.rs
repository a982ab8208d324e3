//! clipcast — chat ingestion, keyword spike detection, clip capture
//!
//! Data flow: transport bytes -> `ingest::decoder` -> filtered `ChatEvent`s
//! -> `stream::EventStream::publish` -> (batch-driven) `detector` ->
//! `clip::ClipTrigger` when the keyword threshold is crossed.

pub mod clip;
pub mod config;
pub mod detector;
pub mod ingest;
pub mod stream;
pub mod types;

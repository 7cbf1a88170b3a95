//! Parallel download engine (C7): expands a manifest into named entries and
//! fetches them concurrently with fail-fast and deadline enforcement.

mod client;
mod engine;
mod error;

pub use client::download_one;
pub use engine::{download_all, plan_downloads, DownloadEntry};
pub use error::DownloadError;

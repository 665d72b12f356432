//! # Mission Module
//!
//! Mission items and the request/response download over the active link.

pub mod download;
pub mod item;

pub use download::{DownloadOutcome, DownloadState, MissionDownload};
pub use item::MissionItem;

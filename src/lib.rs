//! Image pipeline for the course marketplace
//!
//! Validates uploaded course and avatar images, resizes and recompresses them
//! into responsive derivatives, and builds CDN transformation URLs for
//! originals that already live on the media CDN.

pub mod app;
pub mod cdn;
pub mod error;
pub mod image;
pub mod models;
pub mod negotiate;

pub use error::{Error, Result};

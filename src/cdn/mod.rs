//! CDN transformation URLs for originals hosted on the media CDN
//!
//! An alternative to local derivatives: instead of writing files, build
//! on-the-fly transformation URLs that the CDN resolves.

pub mod client;

pub use client::{generate_cloudinary_urls, CloudinaryUrlBuilder};

use crate::models::{CdnUrlOptions, ResponsiveUrls};

pub trait CdnUrlService: Send + Sync {
    fn responsive_urls(&self, public_id: &str, options: &CdnUrlOptions) -> ResponsiveUrls;
    fn transformation_url(&self, public_id: &str, transformation: &str) -> String;
}

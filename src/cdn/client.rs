use super::CdnUrlService;
use crate::models::{CdnUrlOptions, Config, ResponsiveUrls, DEFAULT_CDN_BASE_URL};
use std::collections::BTreeMap;

pub struct CloudinaryUrlBuilder {
    base_url: String,
    cloud_name: String,
}

impl CloudinaryUrlBuilder {
    pub fn new(cloud_name: String) -> Self {
        Self {
            base_url: DEFAULT_CDN_BASE_URL.to_string(),
            cloud_name,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.cloud_name.clone()).with_base_url(config.cdn_base_url.clone())
    }

    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }
}

impl CdnUrlService for CloudinaryUrlBuilder {
    fn responsive_urls(&self, public_id: &str, options: &CdnUrlOptions) -> ResponsiveUrls {
        generate_cloudinary_urls(self, public_id, options)
    }

    fn transformation_url(&self, public_id: &str, transformation: &str) -> String {
        format!(
            "{}/{}/image/upload/{}/{}",
            self.base_url,
            self.cloud_name,
            transformation,
            public_id.trim_start_matches('/')
        )
    }
}

/// Builds `w_<w>,h_<h>,c_fill,q_<quality>,f_<format>` URLs for every size and
/// format pair. No I/O.
pub fn generate_cloudinary_urls(
    cdn: &dyn CdnUrlService,
    public_id: &str,
    options: &CdnUrlOptions,
) -> ResponsiveUrls {
    let mut urls = BTreeMap::new();
    for size in &options.sizes {
        let by_format: BTreeMap<String, String> = options
            .formats
            .iter()
            .map(|format| {
                let transformation = format!(
                    "w_{},h_{},c_fill,q_{},f_{}",
                    size.width, size.height, options.quality, format
                );
                (
                    format.clone(),
                    cdn.transformation_url(public_id, &transformation),
                )
            })
            .collect();
        urls.insert(size.name.clone(), by_format);
    }
    urls
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SizeSpec;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_single_size_and_format() {
        let cdn = CloudinaryUrlBuilder::new("courses".to_string());
        let options = CdnUrlOptions {
            sizes: vec![SizeSpec::new("thumbnail", 150, 150)],
            formats: vec!["webp".to_string()],
            quality: "auto".to_string(),
        };

        let urls = cdn.responsive_urls("abc123", &options);

        assert_eq!(urls.len(), 1);
        assert_eq!(
            urls["thumbnail"]["webp"],
            "https://res.cloudinary.com/courses/image/upload/w_150,h_150,c_fill,q_auto,f_webp/abc123"
        );
    }

    #[test]
    fn test_default_options_cover_every_pair() {
        let cdn = CloudinaryUrlBuilder::new("courses".to_string());

        let urls = cdn.responsive_urls("covers/intro-to-rust", &CdnUrlOptions::default());

        let sizes: Vec<&str> = urls.keys().map(String::as_str).collect();
        assert_eq!(sizes, vec!["large", "medium", "small", "thumbnail"]);
        for by_format in urls.values() {
            let formats: Vec<&str> = by_format.keys().map(String::as_str).collect();
            assert_eq!(formats, vec!["auto", "webp"]);
        }
        assert!(urls["large"]["auto"]
            .ends_with("/w_800,h_450,c_fill,q_auto,f_auto/covers/intro-to-rust"));
        assert!(urls["small"]["webp"].contains("w_200,h_113,"));
    }

    #[test]
    fn test_custom_base_url_and_numeric_quality() {
        let cdn = CloudinaryUrlBuilder::new("demo".to_string())
            .with_base_url("https://media.example.com/".to_string());
        let options = CdnUrlOptions {
            sizes: vec![SizeSpec::new("medium", 400, 225)],
            formats: vec!["jpg".to_string()],
            quality: "70".to_string(),
        };

        let urls = cdn.responsive_urls("/avatars/42", &options);

        assert_eq!(
            urls["medium"]["jpg"],
            "https://media.example.com/demo/image/upload/w_400,h_225,c_fill,q_70,f_jpg/avatars/42"
        );
    }

    #[test]
    fn test_empty_formats_yield_empty_maps() {
        let cdn = CloudinaryUrlBuilder::new("demo".to_string());
        let options = CdnUrlOptions {
            formats: Vec::new(),
            ..CdnUrlOptions::default()
        };

        let urls = cdn.responsive_urls("abc123", &options);
        assert_eq!(urls.len(), 4);
        assert!(urls.values().all(|m| m.is_empty()));
    }
}

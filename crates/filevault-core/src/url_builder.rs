use crate::file::File;

/// Builds public URLs for stored files and their variants
pub trait UrlBuilder: Send + Sync {
    fn url(&self, file: &File) -> String;

    /// URL of a variant; empty when the variant has no path yet
    fn url_for_variant(&self, file: &File, variant: &str) -> String;
}

/// Joins a base URL with the stored path
#[derive(Debug, Clone)]
pub struct BaseUrlBuilder {
    base_url: String,
}

impl BaseUrlBuilder {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn join(&self, path: &str) -> String {
        if path.is_empty() {
            return String::new();
        }
        let path = path.replace('\\', "/");
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

impl UrlBuilder for BaseUrlBuilder {
    fn url(&self, file: &File) -> String {
        self.join(file.path())
    }

    fn url_for_variant(&self, file: &File, variant: &str) -> String {
        file.variants()
            .get(variant)
            .map(|record| self.join(&record.path))
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::variant::VariantRecord;

    #[test]
    fn test_joins_base_and_path() {
        let builder = BaseUrlBuilder::new("https://cdn.example.com/files/");
        let file = File::builder("cake.png", "local")
            .build()
            .with_path("Item/Photos/cake.png")
            .with_variant(
                "thumb",
                VariantRecord {
                    path: "Item/Photos/cake.abc.png".to_string(),
                    ..Default::default()
                },
            )
            .with_variant("large", VariantRecord::default());

        assert_eq!(
            builder.url(&file),
            "https://cdn.example.com/files/Item/Photos/cake.png"
        );
        assert_eq!(
            builder.url_for_variant(&file, "thumb"),
            "https://cdn.example.com/files/Item/Photos/cake.abc.png"
        );
        assert_eq!(builder.url_for_variant(&file, "large"), "");
        assert_eq!(builder.url_for_variant(&file, "missing"), "");
    }
}

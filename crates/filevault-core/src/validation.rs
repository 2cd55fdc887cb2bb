//! Upload validation
//!
//! [`UploadRules`] are the configured limits for incoming files; an
//! [`UploadValidator`] checks a freshly created [`File`] against them before it is
//! stored. [`RulesValidator`] covers everything that can be decided from the file
//! description alone (size, mime type, extension). Image dimension limits need the
//! image header and are checked by the processing crate.

use crate::error::{Error, Result};
use crate::file::File;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadRules {
    /// Smallest accepted file, in bytes
    pub min_size: Option<u64>,
    /// Largest accepted file, in bytes
    pub max_size: Option<u64>,
    /// Accepted mime types; empty accepts any
    pub mime_types: Vec<String>,
    /// Accepted extensions (lower-case, without dot); empty accepts any
    pub extensions: Vec<String>,
    pub min_width: Option<u32>,
    pub max_width: Option<u32>,
    pub min_height: Option<u32>,
    pub max_height: Option<u32>,
}

impl UploadRules {
    pub fn has_dimension_limits(&self) -> bool {
        self.min_width.is_some()
            || self.max_width.is_some()
            || self.min_height.is_some()
            || self.max_height.is_some()
    }

    /// Reject limits that no file could satisfy
    pub fn validate(&self) -> Result<()> {
        let ranges = [
            ("size", self.min_size, self.max_size),
            ("width", self.min_width.map(u64::from), self.max_width.map(u64::from)),
            ("height", self.min_height.map(u64::from), self.max_height.map(u64::from)),
        ];
        for (name, min, max) in ranges {
            if let (Some(min), Some(max)) = (min, max) {
                if min > max {
                    return Err(Error::Config(format!(
                        "upload min_{} ({}) is greater than max_{} ({})",
                        name, min, name, max
                    )));
                }
            }
        }
        Ok(())
    }

    /// Check width and height against the dimension limits
    pub fn check_dimensions(&self, file: &File, width: u32, height: u32) -> Result<()> {
        if let Some(min) = self.min_width.filter(|min| width < *min) {
            return Err(rejected(file, "min_width", format!("image is {}px wide, at least {}px required", width, min)));
        }
        if let Some(max) = self.max_width.filter(|max| width > *max) {
            return Err(rejected(file, "max_width", format!("image is {}px wide, at most {}px allowed", width, max)));
        }
        if let Some(min) = self.min_height.filter(|min| height < *min) {
            return Err(rejected(file, "min_height", format!("image is {}px high, at least {}px required", height, min)));
        }
        if let Some(max) = self.max_height.filter(|max| height > *max) {
            return Err(rejected(file, "max_height", format!("image is {}px high, at most {}px allowed", height, max)));
        }
        Ok(())
    }
}

pub(crate) fn rejected(file: &File, rule: &str, message: impl Into<String>) -> Error {
    Error::UploadRejected {
        filename: file.filename().to_string(),
        rule: rule.to_string(),
        message: message.into(),
    }
}

/// Decides whether a new file may be stored
pub trait UploadValidator: Send + Sync {
    /// Fails with `UploadRejected` naming the violated rule
    fn validate(&self, file: &File) -> Result<()>;
}

/// Size, mime type and extension checks
#[derive(Debug, Clone, Default)]
pub struct RulesValidator {
    rules: UploadRules,
}

impl RulesValidator {
    pub fn new(rules: UploadRules) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &UploadRules {
        &self.rules
    }
}

impl UploadValidator for RulesValidator {
    fn validate(&self, file: &File) -> Result<()> {
        let rules = &self.rules;
        let size = file.filesize();
        if let Some(min) = rules.min_size.filter(|min| size < *min) {
            return Err(rejected(file, "min_size", format!("{} bytes, at least {} required", size, min)));
        }
        if let Some(max) = rules.max_size.filter(|max| size > *max) {
            return Err(rejected(file, "max_size", format!("{} bytes, at most {} allowed", size, max)));
        }

        if !rules.mime_types.is_empty() {
            let mime_type = file.mime_type().unwrap_or_default().to_ascii_lowercase();
            if !rules.mime_types.iter().any(|m| m.eq_ignore_ascii_case(&mime_type)) {
                return Err(rejected(file, "mime_type", format!("mime type `{}` is not accepted", mime_type)));
            }
        }

        if !rules.extensions.is_empty() {
            let extension = file.extension().unwrap_or_default();
            if !rules.extensions.iter().any(|e| e.eq_ignore_ascii_case(extension)) {
                return Err(rejected(file, "extension", format!("extension `{}` is not accepted", extension)));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upload(filename: &str, size: u64, mime_type: &str) -> File {
        File::builder(filename, "local")
            .filesize(size)
            .mime_type(mime_type)
            .build()
    }

    fn rule_of(err: Error) -> String {
        match err {
            Error::UploadRejected { rule, .. } => rule,
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_no_rules_accept_everything() {
        let validator = RulesValidator::default();
        assert!(validator.validate(&upload("a.bin", 0, "application/octet-stream")).is_ok());
    }

    #[test]
    fn test_size_limits() {
        let validator = RulesValidator::new(UploadRules {
            min_size: Some(10),
            max_size: Some(100),
            ..Default::default()
        });
        assert!(validator.validate(&upload("a.png", 10, "image/png")).is_ok());
        assert!(validator.validate(&upload("a.png", 100, "image/png")).is_ok());
        assert_eq!(rule_of(validator.validate(&upload("a.png", 9, "image/png")).unwrap_err()), "min_size");
        assert_eq!(rule_of(validator.validate(&upload("a.png", 101, "image/png")).unwrap_err()), "max_size");
    }

    #[test]
    fn test_mime_type_and_extension() {
        let validator = RulesValidator::new(UploadRules {
            mime_types: vec!["image/png".to_string(), "image/jpeg".to_string()],
            extensions: vec!["png".to_string(), "jpg".to_string()],
            ..Default::default()
        });
        assert!(validator.validate(&upload("cake.PNG", 1, "IMAGE/PNG")).is_ok());
        assert_eq!(rule_of(validator.validate(&upload("a.pdf", 1, "application/pdf")).unwrap_err()), "mime_type");
        assert_eq!(rule_of(validator.validate(&upload("a.jpeg", 1, "image/jpeg")).unwrap_err()), "extension");
    }

    #[test]
    fn test_dimension_limits() {
        let rules = UploadRules {
            min_width: Some(50),
            min_height: Some(50),
            max_width: Some(400),
            ..Default::default()
        };
        let file = upload("a.png", 1, "image/png");
        assert!(rules.has_dimension_limits());
        assert!(rules.check_dimensions(&file, 400, 50).is_ok());
        assert_eq!(rule_of(rules.check_dimensions(&file, 49, 100).unwrap_err()), "min_width");
        assert_eq!(rule_of(rules.check_dimensions(&file, 401, 100).unwrap_err()), "max_width");
        assert_eq!(rule_of(rules.check_dimensions(&file, 100, 49).unwrap_err()), "min_height");
    }

    #[test]
    fn test_unsatisfiable_rules() {
        let rules = UploadRules {
            min_size: Some(10),
            max_size: Some(5),
            ..Default::default()
        };
        assert!(matches!(rules.validate(), Err(Error::Config(_))));
        assert!(UploadRules::default().validate().is_ok());
    }
}

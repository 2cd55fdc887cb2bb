use filevault_core::{Error, File, Resource, Result, RulesValidator, UploadRules, UploadValidator};
use image::ImageReader;
use std::io::Cursor;

/// [`RulesValidator`] plus the width/height limits of image uploads.
///
/// Dimensions are read from the image header of the in-flight resource; files
/// without a resource are only checked against the description rules.
#[derive(Debug, Clone, Default)]
pub struct ImageUploadValidator {
    rules: RulesValidator,
}

impl ImageUploadValidator {
    pub fn new(rules: UploadRules) -> Self {
        Self {
            rules: RulesValidator::new(rules),
        }
    }
}

fn dimensions(resource: &Resource) -> std::result::Result<(u32, u32), String> {
    match resource {
        Resource::Bytes(bytes) => ImageReader::new(Cursor::new(bytes.as_ref()))
            .with_guessed_format()
            .map_err(|e| e.to_string())?
            .into_dimensions()
            .map_err(|e| e.to_string()),
        Resource::Path(path) => image::image_dimensions(path).map_err(|e| e.to_string()),
    }
}

impl UploadValidator for ImageUploadValidator {
    fn validate(&self, file: &File) -> Result<()> {
        self.rules.validate(file)?;

        let rules = self.rules.rules();
        if !rules.has_dimension_limits()
            || !file.mime_type().is_some_and(|m| m.starts_with("image/"))
        {
            return Ok(());
        }
        let Some(resource) = file.resource() else {
            return Ok(());
        };

        let (width, height) = dimensions(resource).map_err(|message| Error::UploadRejected {
            filename: file.filename().to_string(),
            rule: "image".to_string(),
            message: format!("not a readable image: {}", message),
        })?;
        rules.check_dimensions(file, width, height)
    }
}

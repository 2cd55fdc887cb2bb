//! Image processing module
//!
//! - Variant generation (processor)
//! - Operation semantics (operations)
//! - Encoding in the original's format (encode)
//! - Dimension metadata (dimensions)
//! - Upload dimension limits (validation)

pub mod dimensions;
pub mod encode;
pub mod operations;
pub mod processor;
pub mod validation;

pub use dimensions::ImageDimensionsProcessor;
pub use encode::{encode, format_for_mime_type};
pub use operations::{CallbackRegistry, ImageCallback};
pub use processor::{ImageProcessor, NOT_PROCESSED};
pub use validation::ImageUploadValidator;

//! Filevault Processing Library
//!
//! Variant generation: the [`Processor`] chain, the image processor with its
//! operation semantics, the optimizer and the [`VariantPipeline`] that drives a file
//! from upload to stored variants.

pub mod image;
pub mod optimizer;
pub mod pipeline;
pub mod processor;
pub mod scratch;

// Re-export commonly used types
pub use self::image::{ImageCallback, ImageDimensionsProcessor, ImageProcessor, ImageUploadValidator};
pub use optimizer::Optimizer;
pub use pipeline::VariantPipeline;
pub use processor::{ProcessingError, Processor, StackProcessor};
pub use scratch::ScratchFile;

//! Processor chain
//!
//! A [`Processor`] takes a [`File`] and returns it with more state filled in
//! (variants, metadata). Processors never partially swallow errors: on failure they
//! hand back the file as far as it got, wrapped in a [`ProcessingError`].

use async_trait::async_trait;
use filevault_core::{Error, File};
use std::sync::Arc;

/// Failure while processing one file
#[derive(Debug, thiserror::Error)]
#[error("Processing file `{file_id}` failed{}: {source}", .variant.as_ref().map(|v| format!(" at variant `{}`", v)).unwrap_or_default())]
pub struct ProcessingError {
    file_id: String,
    file: Option<Box<File>>,
    variant: Option<String>,
    #[source]
    source: Error,
}

impl ProcessingError {
    /// Error carrying the file as far as it was processed
    pub fn new(file: File, variant: Option<String>, source: Error) -> Self {
        Self {
            file_id: file.uuid().to_string(),
            file: Some(Box::new(file)),
            variant,
            source,
        }
    }

    /// Error raised before there was a file to hand back; `file_id` then names the
    /// input instead (e.g. the client filename of an upload)
    pub fn without_file(file_id: impl Into<String>, source: Error) -> Self {
        Self {
            file_id: file_id.into(),
            file: None,
            variant: None,
            source,
        }
    }

    pub fn file_id(&self) -> &str {
        &self.file_id
    }

    /// The partially processed file: completed variants populated, the failing one
    /// marked with its error
    pub fn file(&self) -> Option<&File> {
        self.file.as_deref()
    }

    pub fn into_file(self) -> Option<File> {
        self.file.map(|f| *f)
    }

    pub fn variant(&self) -> Option<&str> {
        self.variant.as_deref()
    }

    pub fn error(&self) -> &Error {
        &self.source
    }

    pub fn into_error(self) -> Error {
        self.source
    }
}

#[async_trait]
pub trait Processor: Send + Sync {
    async fn process(&self, file: File) -> Result<File, ProcessingError>;

    /// Process only the named variants. Processors without a notion of variants
    /// ignore the list.
    async fn process_only(&self, file: File, _only: &[String]) -> Result<File, ProcessingError> {
        self.process(file).await
    }
}

/// Runs processors in order, stopping at the first error
#[derive(Default, Clone)]
pub struct StackProcessor {
    processors: Vec<Arc<dyn Processor>>,
}

impl StackProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(mut self, processor: Arc<dyn Processor>) -> Self {
        self.processors.push(processor);
        self
    }

    pub fn len(&self) -> usize {
        self.processors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processors.is_empty()
    }
}

#[async_trait]
impl Processor for StackProcessor {
    async fn process(&self, mut file: File) -> Result<File, ProcessingError> {
        for processor in &self.processors {
            file = processor.process(file).await?;
        }
        Ok(file)
    }

    async fn process_only(&self, mut file: File, only: &[String]) -> Result<File, ProcessingError> {
        for processor in &self.processors {
            file = processor.process_only(file, only).await?;
        }
        Ok(file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Tag(&'static str);

    #[async_trait]
    impl Processor for Tag {
        async fn process(&self, file: File) -> Result<File, ProcessingError> {
            Ok(file.with_metadata_by_key(self.0, json!(true)))
        }
    }

    struct Fail;

    #[async_trait]
    impl Processor for Fail {
        async fn process(&self, file: File) -> Result<File, ProcessingError> {
            Err(ProcessingError::new(
                file,
                Some("thumb".to_string()),
                Error::ImageProcessing("broken".to_string()),
            ))
        }
    }

    #[tokio::test]
    async fn test_stack_runs_in_order() {
        let stack = StackProcessor::new()
            .push(Arc::new(Tag("first")))
            .push(Arc::new(Tag("second")));
        let file = stack
            .process(File::builder("a.png", "local").build())
            .await
            .unwrap();
        assert_eq!(file.metadata().len(), 2);
    }

    #[tokio::test]
    async fn test_stack_stops_at_first_error() {
        let stack = StackProcessor::new()
            .push(Arc::new(Tag("first")))
            .push(Arc::new(Fail))
            .push(Arc::new(Tag("never")));
        let err = stack
            .process(File::builder("a.png", "local").build())
            .await
            .unwrap_err();

        assert_eq!(err.variant(), Some("thumb"));
        assert!(err.to_string().contains("at variant `thumb`"));
        let file = err.into_file().unwrap();
        assert!(file.metadata_by_key("first").is_some());
        assert!(file.metadata_by_key("never").is_none());
    }
}

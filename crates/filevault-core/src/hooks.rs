//! Lifecycle hooks
//!
//! The variant pipeline calls these around storing and processing a file. Each hook
//! receives the current file and returns the file to continue with, so an observer can
//! enrich it (metadata, collection, …) or veto the operation by returning an error.

use crate::error::Result;
use crate::file::File;
use async_trait::async_trait;

#[async_trait]
pub trait FileHooks: Send + Sync {
    async fn before_store(&self, file: File) -> Result<File> {
        Ok(file)
    }

    async fn after_store(&self, file: File) -> Result<File> {
        Ok(file)
    }

    async fn before_processing(&self, file: File) -> Result<File> {
        Ok(file)
    }

    async fn after_processing(&self, file: File) -> Result<File> {
        Ok(file)
    }
}

/// No-op implementation used when nobody is listening
pub struct NoOpHooks;

#[async_trait]
impl FileHooks for NoOpHooks {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    struct Tagging;

    #[async_trait]
    impl FileHooks for Tagging {
        async fn before_store(&self, file: File) -> Result<File> {
            Ok(file.add_to_collection("Tagged"))
        }

        async fn after_processing(&self, _file: File) -> Result<File> {
            Err(Error::Config("rejected".to_string()))
        }
    }

    #[tokio::test]
    async fn test_default_hooks_pass_file_through() {
        let file = File::builder("a.png", "local").build();
        let same = NoOpHooks.before_processing(file.clone()).await.unwrap();
        assert_eq!(same, file);
    }

    #[tokio::test]
    async fn test_overridden_hooks() {
        let file = File::builder("a.png", "local").build();
        let tagged = Tagging.before_store(file).await.unwrap();
        assert_eq!(tagged.collection(), Some("Tagged"));
        assert_eq!(Tagging.after_store(tagged.clone()).await.unwrap(), tagged);
        assert!(Tagging.after_processing(tagged).await.is_err());
    }
}

//! Seams for the external collaborators the pipelines drive.

use crate::error::CoreError;
use crate::types::{CommentRecord, PostRecord, PublishReceipt, PublishRequest, QuerySpec};
use async_trait::async_trait;
use std::path::{Path, PathBuf};

#[async_trait]
pub trait SourceClient: Send + Sync {
    async fn list_posts(&self, query: &QuerySpec) -> Result<Vec<PostRecord>, CoreError>;

    async fn list_comments(
        &self,
        post_id: &str,
        limit: usize,
    ) -> Result<Vec<CommentRecord>, CoreError>;
}

#[async_trait]
pub trait MediaFetcher: Send + Sync {
    /// Downloads `url` into `dest_dir`, naming the file `{stem}.{ext}`.
    async fn fetch(&self, url: &str, dest_dir: &Path, stem: &str) -> Result<PathBuf, CoreError>;
}

#[async_trait]
pub trait Summarizer: Send + Sync {
    /// Summarizes a post title and its top comment bodies in at most `max_chars` characters.
    async fn summarize(
        &self,
        title: &str,
        comments: &[String],
        max_chars: usize,
    ) -> Result<String, CoreError>;
}

#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, request: &PublishRequest) -> Result<PublishReceipt, CoreError>;
}

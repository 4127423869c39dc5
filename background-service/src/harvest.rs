//! Turns source posts into committed units.

use skyrelay_core::{
    has_resolvable_media, media_stem, rank_comments, truncate_summary, CommentRecord, CoreError,
    ErrorExt, GlobalConfig, MediaFetcher, MediaKind, PostRecord, QuerySpec, RetryPolicy,
    SourceClient, StorageError, Summarizer, SummaryError, UnitId,
};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, error, info, warn};
use unit_store::{StagedUnit, UnitStore};

/// Reddit allows at most one stickied comment per post; ask for one extra so
/// dropping it still leaves `max_comments`.
const STICKIED_ALLOWANCE: usize = 1;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct HarvestReport {
    pub created: usize,
    pub duplicates: usize,
    pub skipped: usize,
    pub failed: usize,
    pub swept: usize,
    pub aborted_queries: usize,
}

impl HarvestReport {
    fn absorb(&mut self, other: HarvestReport) {
        self.created += other.created;
        self.duplicates += other.duplicates;
        self.skipped += other.skipped;
        self.failed += other.failed;
        self.swept += other.swept;
        self.aborted_queries += other.aborted_queries;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PostOutcome {
    Created,
    Duplicate,
    Skipped,
}

pub struct HarvestPipeline {
    source: Arc<dyn SourceClient>,
    media: Arc<dyn MediaFetcher>,
    summarizer: Arc<dyn Summarizer>,
    store: Arc<dyn UnitStore>,
    retry: RetryPolicy,
    summary_max_chars: usize,
}

impl HarvestPipeline {
    pub fn new(
        source: Arc<dyn SourceClient>,
        media: Arc<dyn MediaFetcher>,
        summarizer: Arc<dyn Summarizer>,
        store: Arc<dyn UnitStore>,
        retry: RetryPolicy,
        summary_max_chars: usize,
    ) -> Self {
        Self {
            source,
            media,
            summarizer,
            store,
            retry,
            summary_max_chars,
        }
    }

    pub fn from_config(
        source: Arc<dyn SourceClient>,
        media: Arc<dyn MediaFetcher>,
        summarizer: Arc<dyn Summarizer>,
        store: Arc<dyn UnitStore>,
        config: &GlobalConfig,
    ) -> Self {
        Self::new(
            source,
            media,
            summarizer,
            store,
            RetryPolicy::from_config(config),
            config.summary_max_chars,
        )
    }

    /// One pass over every query. A failing query is logged and the next one runs.
    pub async fn harvest_all(&self, queries: &[QuerySpec]) -> HarvestReport {
        // Harvest passes never overlap, so anything still staged is stale.
        if let Err(e) = self.store.purge_staging().await {
            warn!("Could not purge staging area: {}", e);
        }

        let mut total = HarvestReport::default();
        for query in queries {
            match self.harvest(query).await {
                Ok(report) => total.absorb(report),
                Err(e) => {
                    error!("Aborting query r/{}: {}", query.source_name, e);
                    total.aborted_queries += 1;
                }
            }
        }
        info!(
            "Harvest pass finished: {} created, {} duplicates, {} skipped, {} failed, {} aborted queries",
            total.created, total.duplicates, total.skipped, total.failed, total.aborted_queries
        );
        total
    }

    /// Harvests one query; `Err` only when the post listing itself cannot be fetched.
    pub async fn harvest(&self, query: &QuerySpec) -> Result<HarvestReport, CoreError> {
        let operation = format!("list_posts r/{}", query.source_name);
        let posts = self
            .retry
            .execute(&operation, || self.source.list_posts(query))
            .await?;
        let posts = dedupe(posts);
        info!("Processing {} posts from r/{}", posts.len(), query.source_name);

        let mut report = HarvestReport::default();
        let batch_size = query.batch_size.max(1);
        let batches = posts.len().div_ceil(batch_size);
        for (index, batch) in posts.chunks(batch_size).enumerate() {
            debug!("Batch {}/{} for r/{}", index + 1, batches, query.source_name);
            for post in batch {
                let deadline = Instant::now() + query.timeout;
                match self.process_post(query, post, deadline).await {
                    Ok(PostOutcome::Created) => report.created += 1,
                    Ok(PostOutcome::Duplicate) => report.duplicates += 1,
                    Ok(PostOutcome::Skipped) => report.skipped += 1,
                    Err(e) => {
                        warn!("Failed to process post {}: {}", post.id, e);
                        report.failed += 1;
                    }
                }
            }
        }

        if query.skip_no_media {
            match self.store.sweep_empty(&query.source_name).await {
                Ok(swept) => report.swept = swept,
                Err(e) => warn!("Empty-unit sweep failed for r/{}: {}", query.source_name, e),
            }
        }

        info!(
            "r/{}: {} units created, {} duplicates, {} skipped",
            query.source_name, report.created, report.duplicates, report.skipped
        );
        Ok(report)
    }

    /// Media and comments must arrive before `deadline` or the post fails.
    /// The summary falls back to the title once the deadline passes, so a slow
    /// summarizer never costs the unit.
    async fn process_post(
        &self,
        query: &QuerySpec,
        post: &PostRecord,
        deadline: Instant,
    ) -> Result<PostOutcome, CoreError> {
        let unit_id = UnitId::new(&query.source_name, &post.id);

        if self.store.contains(&unit_id).await? {
            info!("Unit {} is already pending, skipping", unit_id);
            return Ok(PostOutcome::Duplicate);
        }
        if query.skip_no_media && !has_resolvable_media(&post.media_urls) {
            debug!("Post {} has no resolvable media, skipping", post.id);
            return Ok(PostOutcome::Skipped);
        }

        let mut staged = self.store.begin_unit(&unit_id).await?;
        if timeout_at(deadline, self.gather(query, post, &mut staged))
            .await
            .is_err()
        {
            warn!("Post {} timed out after {:?}, moving on", post.id, query.timeout);
            self.store.abort(staged).await?;
            return Err(CoreError::Timeout {
                seconds: query.timeout.as_secs(),
            });
        }
        if query.skip_no_media && staged.media.is_empty() {
            info!("No media could be fetched for {}, dropping it", unit_id);
            self.store.abort(staged).await?;
            return Ok(PostOutcome::Skipped);
        }

        let comment_bodies: Vec<String> = staged.comments.iter().map(|c| c.body.clone()).collect();
        staged.summary = Some(self.summarize(post, &comment_bodies, deadline).await);
        staged.post = Some(post.clone());

        match self.store.commit(staged).await {
            Ok(unit_id) => {
                info!("Created unit {}", unit_id);
                Ok(PostOutcome::Created)
            }
            Err(CoreError::Storage(StorageError::DuplicateUnit { unit_id })) => {
                info!("Unit {} already exists, not overwriting", unit_id);
                Ok(PostOutcome::Duplicate)
            }
            Err(e) => Err(e),
        }
    }

    async fn gather(&self, query: &QuerySpec, post: &PostRecord, staged: &mut StagedUnit) {
        self.fetch_media(post, staged).await;
        if query.download_comments && !(query.skip_no_media && staged.media.is_empty()) {
            staged.comments = self.fetch_comments(post, query.max_comments).await;
        }
    }

    /// Fetches every supported media item; failures only drop that item.
    async fn fetch_media(&self, post: &PostRecord, staged: &mut StagedUnit) {
        let media_dir = staged.media_dir();
        for (index, url) in post.media_urls.iter().enumerate() {
            if MediaKind::classify(url).is_none() {
                debug!("Unsupported media URL {}, skipping", url);
                continue;
            }
            let stem = media_stem(&post.id, index);
            let operation = format!("fetch media {}", url);
            match self
                .retry
                .execute(&operation, || self.media.fetch(url, &media_dir, &stem))
                .await
            {
                Ok(path) => staged.media.push(path),
                Err(e) => warn!("Omitting media {} of post {}: {}", url, post.id, e),
            }
        }
    }

    async fn fetch_comments(
        &self,
        post: &PostRecord,
        max_comments: usize,
    ) -> Vec<CommentRecord> {
        let operation = format!("list_comments {}", post.id);
        match self
            .retry
            .execute(&operation, || {
                self.source
                    .list_comments(&post.id, max_comments + STICKIED_ALLOWANCE)
            })
            .await
        {
            Ok(comments) => rank_comments(comments, max_comments),
            Err(e) => {
                warn!("Continuing without comments for {}: {}", post.id, e);
                Vec::new()
            }
        }
    }

    /// Never fails: falls back to the truncated title.
    async fn summarize(&self, post: &PostRecord, comments: &[String], deadline: Instant) -> String {
        let operation = format!("summarize {}", post.id);
        let attempts = self.retry.execute(&operation, || {
            self.summarizer
                .summarize(&post.title, comments, self.summary_max_chars)
        });
        let result = match timeout_at(deadline, attempts).await {
            Ok(result) => result,
            Err(_) => Err(SummaryError::RequestTimeout {
                provider: "summarizer".to_string(),
            }
            .into()),
        };

        match result {
            Ok(summary) if !summary.trim().is_empty() => {
                truncate_summary(summary.trim(), self.summary_max_chars)
            }
            Ok(_) => {
                warn!("Empty summary for {}, using the title", post.id);
                truncate_summary(&post.title, self.summary_max_chars)
            }
            Err(e) => {
                e.log_warn();
                warn!("Summary failed for {}, using the title", post.id);
                truncate_summary(&post.title, self.summary_max_chars)
            }
        }
    }
}

/// Keeps the first occurrence of each post id.
fn dedupe(posts: Vec<PostRecord>) -> Vec<PostRecord> {
    let mut seen = HashSet::new();
    posts
        .into_iter()
        .filter(|post| seen.insert(post.id.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn post(id: &str) -> PostRecord {
        PostRecord {
            id: id.to_string(),
            source_name: "pics".to_string(),
            title: id.to_string(),
            body_url: String::new(),
            selftext: None,
            author: "a".to_string(),
            created_at: Utc::now(),
            score: 0,
            media_urls: vec![],
        }
    }

    #[test]
    fn test_dedupe_keeps_first_occurrence() {
        let posts = vec![post("a"), post("b"), post("a"), post("c"), post("b")];
        let ids: Vec<String> = dedupe(posts).into_iter().map(|p| p.id).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_report_absorb() {
        let mut total = HarvestReport::default();
        total.absorb(HarvestReport {
            created: 2,
            skipped: 1,
            ..Default::default()
        });
        total.absorb(HarvestReport {
            created: 1,
            duplicates: 3,
            ..Default::default()
        });
        assert_eq!(total.created, 3);
        assert_eq!(total.duplicates, 3);
        assert_eq!(total.skipped, 1);
    }
}

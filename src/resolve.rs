//! Story identifier resolution.
//!
//! Route parameters that name a story may be its canonical id, its slug,
//! or a fragment of its title. [`resolve_story`] tries those readings in a
//! fixed order and, on a miss, returns a short list of similarly titled
//! stories the caller can suggest instead.

use uuid::Uuid;

use crate::db::models::{Story, StorySuggestion};
use crate::slug;

/// Maximum number of suggestions returned with a failed lookup.
pub const MAX_SUGGESTIONS: i64 = 5;

/// Queries the resolver needs from the story store. Every "first" query
/// returns the oldest matching story unless noted otherwise.
#[allow(async_fn_in_trait)]
pub trait StoryLookup {
    async fn by_id(&self, id: Uuid) -> Result<Option<Story>, sqlx::Error>;

    /// Story whose slug equals `slug`, or whose title matches `title_pattern`
    /// case-insensitively, or whose title equals `exact_title`. An exact slug
    /// hit ranks above an exact title hit, which ranks above a pattern hit.
    async fn by_slug_or_title(
        &self,
        slug: &str,
        title_pattern: &str,
        exact_title: &str,
    ) -> Result<Option<Story>, sqlx::Error>;

    async fn by_title_pattern(&self, pattern: &str) -> Result<Option<Story>, sqlx::Error>;

    async fn similar(
        &self,
        pattern: &str,
        limit: i64,
    ) -> Result<Vec<StorySuggestion>, sqlx::Error>;

    /// Atomically bump the view counter, returning the new value.
    async fn record_view(&self, id: Uuid) -> Result<Option<i64>, sqlx::Error>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchedBy {
    Id,
    SlugOrTitle,
    NormalizedTitle,
}

#[derive(Debug, Clone, Copy)]
pub struct ResolveOptions {
    pub count_view: bool,
    pub suggest: bool,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            count_view: true,
            suggest: true,
        }
    }
}

impl ResolveOptions {
    /// Lookup used by nested routes: no view is counted, no suggestions.
    pub fn quiet() -> Self {
        Self {
            count_view: false,
            suggest: false,
        }
    }
}

#[derive(Debug)]
pub enum Resolution {
    Found { story: Story, matched_by: MatchedBy },
    NotFound { suggestions: Vec<StorySuggestion> },
}

/// Resolve `input` to a single story.
pub async fn resolve_story<L: StoryLookup>(
    lookup: &L,
    input: &str,
    options: ResolveOptions,
) -> Result<Resolution, sqlx::Error> {
    let found = match Uuid::try_parse(input) {
        Ok(id) => {
            tracing::debug!(input = %input, "resolving story by id");
            lookup.by_id(id).await?.map(|s| (s, MatchedBy::Id))
        }
        Err(_) => find_by_slug_or_title(lookup, input).await?,
    };

    let Some((mut story, matched_by)) = found else {
        let suggestions = match slug::any_word_pattern(input) {
            Some(pattern) if options.suggest => lookup.similar(&pattern, MAX_SUGGESTIONS).await?,
            _ => Vec::new(),
        };
        tracing::debug!(
            input = %input,
            suggestions = suggestions.len(),
            "story not found"
        );
        return Ok(Resolution::NotFound { suggestions });
    };

    if options.count_view {
        if let Some(views) = lookup.record_view(story.id).await? {
            story.views = views;
        }
    }

    tracing::debug!(story_id = %story.id, matched_by = ?matched_by, "story resolved");
    Ok(Resolution::Found { story, matched_by })
}

async fn find_by_slug_or_title<L: StoryLookup>(
    lookup: &L,
    input: &str,
) -> Result<Option<(Story, MatchedBy)>, sqlx::Error> {
    let pattern = slug::title_pattern(input);
    if let Some(story) = lookup.by_slug_or_title(input, &pattern, input).await? {
        return Ok(Some((story, MatchedBy::SlugOrTitle)));
    }

    let generated = slug::slugify(input);
    if generated.is_empty() {
        return Ok(None);
    }
    tracing::debug!(input = %input, generated = %generated, "retrying with generated slug");

    let story = lookup
        .by_title_pattern(&slug::spaced_slug_pattern(&generated))
        .await?;
    Ok(story.map(|s| (s, MatchedBy::NormalizedTitle)))
}

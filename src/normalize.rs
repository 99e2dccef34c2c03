//! Mapping of provider-specific raw items into [`NewArticle`].
//!
//! Every provider's items must carry a non-blank title, url and a parseable
//! RFC 3339 publication time. Headline items additionally go through the
//! removal-placeholder filter that provider uses for withdrawn articles.

use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;

use crate::provider::guardian::GuardianResult;
use crate::provider::newsapi::NewsApiArticle;
use crate::provider::nyt::NytStory;
use crate::provider::{Provider, RawArticle};
use crate::storage::NewArticle;

/// Placeholder the headline provider puts in text fields of removed articles.
pub const REMOVED_SENTINEL: &str = "[Removed]";

/// Placeholder url the headline provider uses for removed articles.
pub const REMOVED_URL: &str = "https://removed.com";

/// Normalize one raw item; `None` means the item is discarded.
pub fn normalize(raw: RawArticle) -> Option<NewArticle> {
    match raw {
        RawArticle::Headline { category, item } => normalize_headline(item, category),
        RawArticle::Search(result) => normalize_search(result),
        RawArticle::TopStory(story) => normalize_top_story(story),
    }
}

/// Normalize a provider's whole batch, dropping discarded items.
///
/// Headline batches are shuffled so no single category leads the batch.
pub fn normalize_batch(provider: Provider, raw: Vec<RawArticle>) -> Vec<NewArticle> {
    let received = raw.len();
    let mut articles: Vec<NewArticle> = raw.into_iter().filter_map(normalize).collect();

    if provider == Provider::NewsApi {
        shuffle_headlines(&mut articles);
    }

    let discarded = received - articles.len();
    if discarded > 0 {
        tracing::debug!(provider = %provider, received, discarded, "Discarded invalid articles");
    }
    articles
}

/// Randomly permute a headline batch.
pub fn shuffle_headlines(articles: &mut [NewArticle]) {
    articles.shuffle(&mut rand::rng());
}

fn normalize_headline(item: NewsApiArticle, category: &str) -> Option<NewArticle> {
    let title = clean(item.title);
    let description = clean(item.description);
    let content = clean(item.content);
    let url = clean(item.url);

    let removed = [&title, &description, &content]
        .iter()
        .any(|field| field.as_deref() == Some(REMOVED_SENTINEL));
    if removed || url.as_deref() == Some(REMOVED_URL) {
        return None;
    }
    if description.is_none() && content.is_none() {
        return None;
    }

    Some(NewArticle {
        title: title?,
        description,
        content,
        source: Provider::NewsApi.name().to_string(),
        author: clean(item.author),
        url: url?,
        image_url: clean(item.url_to_image),
        category: Some(category.to_string()),
        published_at: parse_timestamp(item.published_at.as_deref())?,
    })
}

fn normalize_search(result: GuardianResult) -> Option<NewArticle> {
    let fields = result.fields;
    Some(NewArticle {
        title: clean(result.web_title)?,
        description: clean(fields.trail_text),
        content: clean(fields.body_text),
        source: Provider::Guardian.name().to_string(),
        author: clean(fields.byline),
        url: clean(result.web_url)?,
        image_url: clean(fields.thumbnail),
        category: clean(result.section_name),
        published_at: parse_timestamp(result.web_publication_date.as_deref())?,
    })
}

fn normalize_top_story(story: NytStory) -> Option<NewArticle> {
    let image_url = clean(story.first_image().map(str::to_string));
    let summary = clean(story.summary);
    Some(NewArticle {
        title: clean(story.title)?,
        description: summary.clone(),
        content: summary,
        source: Provider::Nyt.name().to_string(),
        author: clean(story.byline),
        url: clean(story.url)?,
        image_url,
        category: clean(story.section),
        published_at: parse_timestamp(story.published_date.as_deref())?,
    })
}

/// Trim; blank becomes `None`.
fn clean(value: Option<String>) -> Option<String> {
    let value = value?;
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else if trimmed.len() == value.len() {
        Some(value)
    } else {
        Some(trimmed.to_string())
    }
}

fn parse_timestamp(value: Option<&str>) -> Option<DateTime<Utc>> {
    let value = value?.trim();
    match DateTime::parse_from_rfc3339(value) {
        Ok(ts) => Some(ts.with_timezone(&Utc)),
        Err(e) => {
            tracing::debug!(value, error = %e, "Unparseable publication time");
            None
        }
    }
}

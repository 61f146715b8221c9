use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, error, info};

use super::{SearchCandidate, SearchProvider};

const SEARCH_URL: &str = "https://www.googleapis.com/youtube/v3/search";

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    id: ItemId,
    snippet: Snippet,
}

#[derive(Debug, Deserialize)]
struct ItemId {
    #[serde(rename = "videoId")]
    video_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Snippet {
    title: String,
    #[serde(rename = "channelTitle", default)]
    channel_title: String,
}

/// Búsqueda con YouTube Data API v3
pub struct YouTubeApiClient {
    api_key: String,
    max_results: usize,
    client: reqwest::Client,
}

impl YouTubeApiClient {
    pub fn new(api_key: String, max_results: usize) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .context("no se pudo crear el cliente HTTP")?;

        Ok(Self {
            api_key,
            max_results,
            client,
        })
    }
}

#[async_trait]
impl SearchProvider for YouTubeApiClient {
    async fn search(&self, query: &str) -> Result<Vec<SearchCandidate>> {
        debug!("🔍 Búsqueda YouTube API v3: {}", query);

        let response = self
            .client
            .get(SEARCH_URL)
            .query(&[
                ("part", "snippet"),
                ("q", query),
                ("type", "video"),
                ("maxResults", &self.max_results.to_string()),
                ("key", &self.api_key),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            error!("❌ YouTube API error: {} - {}", status, error_text);
            anyhow::bail!("YouTube API error: {}", status);
        }

        let body: SearchResponse = response.json().await?;
        let candidates = into_candidates(body);

        info!("✅ YouTube API v3: {} resultados", candidates.len());
        Ok(candidates)
    }
}

fn into_candidates(body: SearchResponse) -> Vec<SearchCandidate> {
    body.items
        .into_iter()
        .filter_map(|item| {
            let video_id = item.id.video_id?;
            Some(SearchCandidate {
                title: item.snippet.title,
                url: format!("https://www.youtube.com/watch?v={}", video_id),
                channel: item.snippet.channel_title,
            })
        })
        .collect()
}

//! `pic`: image search through the content API's Pinterest endpoint.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::bot::command::{Capabilities, Command, CommandContext, CommandDescriptor, ReplyContext};
use crate::bot::outbound::{MediaSource, Outbound};
use crate::config::Config;

const DEFAULT_COUNT: u32 = 6;
const MAX_COUNT: u32 = 20;
/// Telegram albums hold at most this many items.
const ALBUM_SIZE: usize = 10;
/// Per request: the search call and each image download.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

pub const LIMIT_NOTICE: &str = "Limiting the number of images to 20 to prevent overload.";

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    data: Vec<String>,
}

/// Parse the requested image count. Missing, invalid or non-positive
/// values fall back to the default; the bool reports clamping to the max.
fn parse_count(raw: &str) -> (u32, bool) {
    match raw.trim().parse::<i64>() {
        Ok(n) if n > MAX_COUNT as i64 => (MAX_COUNT, true),
        Ok(n) if n >= 1 => (n as u32, false),
        _ => (DEFAULT_COUNT, false),
    }
}

/// Split `"<query> - <count>"`. `None` when there is no count part.
fn split_request(input: &str) -> Option<(&str, &str)> {
    let mut parts = input.split('-');
    let query = parts.next()?.trim();
    let count = parts.next()?.trim();
    Some((query, count))
}

/// One search to run and deliver.
struct Search<'a> {
    outbound: &'a Arc<dyn Outbound>,
    config: &'a Config,
    chat_id: i64,
    /// The triggering message; replied to, and names the cache dir.
    message_id: i64,
    query: &'a str,
    count: u32,
}

pub struct Pic {
    http: reqwest::Client,
}

impl Pic {
    pub fn new() -> reqwest::Result<Self> {
        Self::with_timeout(REQUEST_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> reqwest::Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { http })
    }

    /// Run the search and report any failure in the chat. The cache
    /// directory is removed whatever happens.
    async fn search_and_send(&self, search: Search<'_>) -> anyhow::Result<()> {
        let cache_dir = search.config.data_dir.join("cache").join(search.message_id.to_string());
        let result = self.fetch_and_send(&search, &cache_dir).await;

        if cache_dir.exists()
            && let Err(e) = tokio::fs::remove_dir_all(&cache_dir).await
        {
            warn!("Failed to clean {:?}: {e}", cache_dir);
        }

        if let Err(e) = result {
            warn!("pic search for \"{}\" failed: {e:#}", search.query);
            search
                .outbound
                .reply(search.chat_id, &format!("An error occurred while fetching images: {e}"), None)
                .await?;
        }
        Ok(())
    }

    async fn fetch_and_send(&self, search: &Search<'_>, cache_dir: &Path) -> anyhow::Result<()> {
        let url = format!(
            "{}/pinterest?search={}&count={}",
            search.config.global_api,
            urlencoding::encode(search.query),
            search.count
        );
        let response: SearchResponse = self
            .http
            .get(&url)
            .send()
            .await
            .context("search request failed")?
            .error_for_status()?
            .json()
            .await
            .context("bad search response")?;

        if response.data.is_empty() {
            search
                .outbound
                .reply(search.chat_id, &format!("No images found for \"{}\".", search.query), None)
                .await?;
            return Ok(());
        }

        tokio::fs::create_dir_all(cache_dir).await?;
        let files = self.download_all(response.data, search.count as usize, cache_dir).await;
        if files.is_empty() {
            search
                .outbound
                .reply(search.chat_id, "Failed to download any images. Please try again later.", None)
                .await?;
            return Ok(());
        }

        info!("pic: sending {} images for \"{}\"", files.len(), search.query);
        let caption = format!("Here are {} Pinterest results for \"{}\"", files.len(), search.query);
        if let [file] = files.as_slice() {
            search
                .outbound
                .send_photo(search.chat_id, MediaSource::File(file.clone()), Some(&caption), Some(search.message_id))
                .await?;
            return Ok(());
        }
        for (i, album) in files.chunks(ALBUM_SIZE).enumerate() {
            let items = album.iter().cloned().map(MediaSource::File).collect();
            let caption = (i == 0).then_some(caption.as_str());
            search
                .outbound
                .send_media_group(search.chat_id, items, caption, Some(search.message_id))
                .await?;
        }
        Ok(())
    }

    /// Download concurrently; failed downloads are logged and skipped.
    /// Returned paths keep the API's result order.
    async fn download_all(&self, urls: Vec<String>, limit: usize, cache_dir: &Path) -> Vec<PathBuf> {
        let mut downloads = JoinSet::new();
        for (i, url) in urls.into_iter().take(limit).enumerate() {
            let http = self.http.clone();
            let path = cache_dir.join(format!("{}.jpg", i + 1));
            downloads.spawn(async move {
                let result = download(&http, &url, &path).await;
                (i, url, path, result)
            });
        }

        let mut files = Vec::new();
        while let Some(joined) = downloads.join_next().await {
            match joined {
                Ok((i, _, path, Ok(()))) => files.push((i, path)),
                Ok((_, url, _, Err(e))) => warn!("Error downloading image {url}: {e:#}"),
                Err(e) => warn!("Download task failed: {e}"),
            }
        }
        files.sort_by_key(|(i, _)| *i);
        files.into_iter().map(|(_, path)| path).collect()
    }
}

async fn download(http: &reqwest::Client, url: &str, path: &Path) -> anyhow::Result<()> {
    let bytes = http
        .get(url)
        .header(reqwest::header::USER_AGENT, USER_AGENT)
        .send()
        .await?
        .error_for_status()?
        .bytes()
        .await?;
    tokio::fs::write(path, &bytes).await?;
    Ok(())
}

#[async_trait]
impl Command for Pic {
    fn descriptor(&self) -> CommandDescriptor {
        CommandDescriptor::new("pic")
            .alias("pin")
            .cooldown_secs(20)
            .description("Search Pinterest and send up to 20 images.")
            .usage("pic <search query> - <number of images>\nExample: pic cat - 10")
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities { start: true, on_reply: true, ..Default::default() }
    }

    async fn start(&self, ctx: CommandContext) -> anyhow::Result<()> {
        let input = ctx.args.join(" ");
        if input.trim().is_empty() {
            ctx.reply(&format!("Usage: {}{}", ctx.config.prefix, self.descriptor().usage)).await?;
            return Ok(());
        }

        let Some((query, count)) = split_request(&input) else {
            // No count given: ask for one and pick up the answer in on_reply.
            let query = input.trim();
            let sent = ctx
                .reply(&format!("How many images of \"{query}\"? Reply to this message with a number."))
                .await?;
            ctx.expect_reply(sent, json!({ "query": query }));
            return Ok(());
        };

        if query.is_empty() {
            ctx.reply("Please provide a search query.").await?;
            return Ok(());
        }

        let (count, clamped) = parse_count(count);
        if clamped {
            ctx.reply(LIMIT_NOTICE).await?;
        }

        self.search_and_send(Search {
            outbound: &ctx.outbound,
            config: &ctx.config,
            chat_id: ctx.chat_id,
            message_id: ctx.message.message_id,
            query,
            count,
        })
        .await
    }

    async fn on_reply(&self, ctx: ReplyContext) -> anyhow::Result<()> {
        let query = ctx
            .continuation
            .context
            .get("query")
            .and_then(|q| q.as_str())
            .context("continuation without query")?
            .to_string();
        ctx.finish();

        let (count, clamped) = parse_count(&ctx.message.text);
        if clamped {
            ctx.reply(LIMIT_NOTICE).await?;
        }

        self.search_and_send(Search {
            outbound: &ctx.outbound,
            config: &ctx.config,
            chat_id: ctx.message.chat_id,
            message_id: ctx.message.message_id,
            query: &query,
            count,
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_count() {
        assert_eq!(parse_count("10"), (10, false));
        assert_eq!(parse_count(" 20 "), (20, false));
        assert_eq!(parse_count("25"), (20, true));
        assert_eq!(parse_count("0"), (6, false));
        assert_eq!(parse_count("-3"), (6, false));
        assert_eq!(parse_count("lots"), (6, false));
        assert_eq!(parse_count(""), (6, false));
    }

    #[test]
    fn test_split_request() {
        assert_eq!(split_request("cat - 25"), Some(("cat", "25")));
        assert_eq!(split_request("black cat-3"), Some(("black cat", "3")));
        assert_eq!(split_request(" - 3"), Some(("", "3")));
        assert_eq!(split_request("cat"), None);
    }
}

//! Web research: fetch pages about a topic and extract readable text
//!
//! Candidate URLs come from configured templates. Pages are fetched one at a
//! time with a browser-like User-Agent, parsed with `scraper`, and the usable
//! ones are written to `{topic_slug}_research.json` in the data directory so
//! the document index can pick them up.

use crate::config::ResearchSettings;
use crate::error::Result;
use crate::utils::string::{collapse_whitespace, slugify, take_chars};
use chrono::Utc;
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Maximum characters kept per page
pub const MAX_CONTENT_CHARS: usize = 5000;

/// Pages with this much text or less are discarded
pub const MIN_CONTENT_CHARS: usize = 100;

const CONTENT_SELECTORS: &[&str] = &[
    "main",
    "article",
    ".content",
    "#content",
    ".post-content",
    ".entry-content",
    "p",
];

static CONTENT: Lazy<Vec<Selector>> = Lazy::new(|| {
    CONTENT_SELECTORS
        .iter()
        .filter_map(|s| Selector::parse(s).ok())
        .collect()
});

static TITLE: Lazy<Option<Selector>> = Lazy::new(|| Selector::parse("title").ok());

static PARAGRAPH: Lazy<Option<Selector>> = Lazy::new(|| Selector::parse("p").ok());

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageStatus {
    Success,
    Error,
}

/// One fetched page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrapedPage {
    pub url: String,
    pub title: String,
    pub content: String,
    pub scraped_at: String,
    pub status: PageStatus,
}

impl ScrapedPage {
    fn failed(url: &str, content: String) -> Self {
        Self {
            url: url.to_string(),
            title: "Error".to_string(),
            content,
            scraped_at: timestamp(),
            status: PageStatus::Error,
        }
    }

    /// Successful and long enough to be worth indexing
    pub fn is_usable(&self) -> bool {
        self.status == PageStatus::Success && self.content.chars().count() > MIN_CONTENT_CHARS
    }
}

/// Result of researching a topic
#[derive(Debug, Clone)]
pub struct ScrapeOutcome {
    pub topic: String,
    pub pages: Vec<ScrapedPage>,
    pub usable: Vec<ScrapedPage>,
    /// File the usable pages were written to
    pub saved_to: Option<PathBuf>,
}

impl ScrapeOutcome {
    pub fn succeeded(&self) -> bool {
        !self.usable.is_empty()
    }
}

fn timestamp() -> String {
    Utc::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Scraper for research topics
pub struct ResearchService {
    client: reqwest::Client,
    settings: ResearchSettings,
    data_dir: PathBuf,
}

impl ResearchService {
    pub fn new(settings: ResearchSettings, data_dir: impl Into<PathBuf>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(settings.user_agent.clone())
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            settings,
            data_dir: data_dir.into(),
        })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Expand the URL templates for a topic
    pub fn candidate_urls(&self, topic: &str, max_results: usize) -> Vec<String> {
        let topic = topic.trim();
        let underscore = topic.replace(' ', "_");
        let query = topic.replace(' ', "%20");

        self.settings
            .sources
            .iter()
            .map(|template| {
                template
                    .replace("{topic_underscore}", &underscore)
                    .replace("{topic_query}", &query)
                    .replace("{topic}", &query)
            })
            .take(max_results)
            .collect()
    }

    /// Fetch and parse one page; failures are reported in the page status
    pub async fn scrape_url(&self, url: &str) -> ScrapedPage {
        let response = match self.client.get(url).send().await {
            Ok(response) => response,
            Err(e) => return ScrapedPage::failed(url, format!("Failed to scrape: {}", e)),
        };

        let response = match response.error_for_status() {
            Ok(response) => response,
            Err(e) => return ScrapedPage::failed(url, format!("Failed to scrape: {}", e)),
        };

        match response.text().await {
            Ok(html) => parse_page(url, &html),
            Err(e) => ScrapedPage::failed(url, format!("Parsing error: {}", e)),
        }
    }

    /// Scrape candidate pages for `topic` and save the usable ones
    pub async fn scrape_topic(&self, topic: &str, max_results: usize) -> Result<ScrapeOutcome> {
        info!("Researching topic: {}", topic);

        let urls = self.candidate_urls(topic, max_results);
        let mut pages = Vec::with_capacity(urls.len());

        for (i, url) in urls.iter().enumerate() {
            debug!("Scraping {}/{}: {}", i + 1, urls.len(), url);
            let page = self.scrape_url(url).await;
            if page.status == PageStatus::Error {
                warn!("{}: {}", url, page.content);
            }
            pages.push(page);

            if i + 1 < urls.len() && self.settings.delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(self.settings.delay_ms)).await;
            }
        }

        let usable: Vec<ScrapedPage> = pages.iter().filter(|p| p.is_usable()).cloned().collect();

        let saved_to = if usable.is_empty() {
            None
        } else {
            Some(self.save_results(topic, &usable).await?)
        };

        info!(
            "Research on '{}' kept {} of {} pages",
            topic,
            usable.len(),
            pages.len()
        );

        Ok(ScrapeOutcome {
            topic: topic.to_string(),
            pages,
            usable,
            saved_to,
        })
    }

    async fn save_results(&self, topic: &str, pages: &[ScrapedPage]) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&self.data_dir).await?;
        let path = self
            .data_dir
            .join(format!("{}_research.json", slugify(topic)));
        tokio::fs::write(&path, serde_json::to_string_pretty(pages)?).await?;
        debug!("Results saved to {}", path.display());
        Ok(path)
    }
}

/// Text of an element, skipping `script`, `style` and `noscript` subtrees
fn element_text(element: ElementRef<'_>) -> String {
    let mut parts = Vec::new();
    for node in element.descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let hidden = node.ancestors().any(|a| {
            a.value()
                .as_element()
                .map(|e| matches!(e.name(), "script" | "style" | "noscript"))
                .unwrap_or(false)
        });
        if !hidden {
            parts.push(&**text);
        }
    }
    collapse_whitespace(&parts.join(" "))
}

fn select_text(document: &Html, selector: &Selector) -> Option<String> {
    let texts: Vec<String> = document.select(selector).map(element_text).collect();
    if texts.is_empty() {
        None
    } else {
        Some(texts.join(" "))
    }
}

/// Extract title and main text from an HTML document
pub fn parse_page(url: &str, html: &str) -> ScrapedPage {
    let document = Html::parse_document(html);

    let title = TITLE
        .as_ref()
        .and_then(|sel| document.select(sel).next())
        .map(|t| collapse_whitespace(&t.text().collect::<String>()))
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| "No Title".to_string());

    let mut content = CONTENT
        .iter()
        .find_map(|sel| select_text(&document, sel))
        .unwrap_or_default();

    if content.trim().is_empty() {
        content = PARAGRAPH
            .as_ref()
            .and_then(|sel| select_text(&document, sel))
            .unwrap_or_default();
    }

    ScrapedPage {
        url: url.to_string(),
        title,
        content: take_chars(&collapse_whitespace(&content), MAX_CONTENT_CHARS),
        scraped_at: timestamp(),
        status: PageStatus::Success,
    }
}

//! Website crawling collaborator.
//!
//! The real client fetches the root page plus a bounded set of same-host
//! links and files text fragments into knowledge categories. The mock
//! produces a small deterministic fragment set so downstream stages always
//! have something to work with.

use async_trait::async_trait;
use scraper::{Html, Selector};
use tracing::{debug, instrument, warn};

use crate::errors::ServiceError;
use crate::types::{ContentFragment, CrawlResult, KnowledgeCategory, ServiceVariant};

/// Minimum fragment length worth keeping, in characters.
const MIN_FRAGMENT_LEN: usize = 40;

/// Crawls a website into categorized content fragments.
#[async_trait]
pub trait WebCrawler: Send + Sync {
    /// Which implementation this is.
    fn variant(&self) -> ServiceVariant;

    /// Cheap health check, called once at pipeline construction.
    async fn probe(&self) -> Result<(), ServiceError>;

    /// Crawl `url` and return categorized fragments.
    async fn crawl(&self, url: &str) -> Result<CrawlResult, ServiceError>;
}

/// Real crawler backed by `reqwest` and `scraper`.
pub struct HttpWebCrawler {
    client: reqwest::Client,
    max_pages: usize,
}

impl HttpWebCrawler {
    /// Create a crawler visiting at most `max_pages` pages per site.
    #[must_use]
    pub fn new(client: reqwest::Client, max_pages: usize) -> Self {
        Self {
            client,
            max_pages: max_pages.max(1),
        }
    }

    async fn fetch(&self, url: &str) -> Result<String, ServiceError> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ServiceError::Upstream {
                status: status.as_u16(),
                detail: status.canonical_reason().unwrap_or("crawl failed").into(),
            });
        }
        Ok(response.text().await?)
    }
}

#[async_trait]
impl WebCrawler for HttpWebCrawler {
    fn variant(&self) -> ServiceVariant {
        ServiceVariant::Real
    }

    async fn probe(&self) -> Result<(), ServiceError> {
        // The crawler has no fixed upstream; reachability is per-site.
        // A constructed client is considered healthy.
        Ok(())
    }

    #[instrument(skip(self), fields(url))]
    async fn crawl(&self, url: &str) -> Result<CrawlResult, ServiceError> {
        let root_html = self.fetch(url).await?;
        let root = parse_page(&root_html, url);

        let mut fragments = root.fragments;
        let mut pages_visited = 1;

        for link in root
            .links
            .into_iter()
            .filter(|l| same_host(url, l))
            .take(self.max_pages.saturating_sub(1))
        {
            match self.fetch(&link).await {
                Ok(html) => {
                    let page = parse_page(&html, &link);
                    fragments.extend(page.fragments);
                    pages_visited += 1;
                }
                Err(e) => {
                    // A broken subpage must not sink the whole crawl.
                    warn!(link, error = %e, "skipping unreachable page");
                }
            }
        }

        debug!(pages_visited, fragments = fragments.len(), "crawl finished");
        Ok(CrawlResult {
            url: url.to_string(),
            title: root.title,
            fragments,
            pages_visited,
        })
    }
}

/// Mock crawler producing fixed placeholder fragments.
pub struct MockWebCrawler;

#[async_trait]
impl WebCrawler for MockWebCrawler {
    fn variant(&self) -> ServiceVariant {
        ServiceVariant::Mock
    }

    async fn probe(&self) -> Result<(), ServiceError> {
        Ok(())
    }

    async fn crawl(&self, url: &str) -> Result<CrawlResult, ServiceError> {
        Ok(CrawlResult {
            url: url.to_string(),
            title: Some("Placeholder site".into()),
            fragments: vec![ContentFragment {
                category: KnowledgeCategory::General,
                text: format!("Placeholder content for {url}; crawling was unavailable."),
                source_url: url.to_string(),
            }],
            pages_visited: 0,
        })
    }
}

struct ParsedPage {
    title: Option<String>,
    fragments: Vec<ContentFragment>,
    links: Vec<String>,
}

/// Parse one page into fragments and outbound links.
///
/// Synchronous on purpose: `scraper::Html` is not `Send` and must not be
/// held across an await point.
fn parse_page(html: &str, source_url: &str) -> ParsedPage {
    let document = Html::parse_document(html);

    let title = Selector::parse("title")
        .ok()
        .and_then(|s| document.select(&s).next())
        .map(|el| el.text().collect::<String>().trim().to_string())
        .filter(|t| !t.is_empty());

    let mut fragments = Vec::new();
    if let Ok(selector) = Selector::parse("p, li, h1, h2, h3") {
        for element in document.select(&selector) {
            let text = element
                .text()
                .collect::<String>()
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" ");
            if text.len() >= MIN_FRAGMENT_LEN {
                fragments.push(ContentFragment {
                    category: categorize(&text),
                    text,
                    source_url: source_url.to_string(),
                });
            }
        }
    }

    let mut links = Vec::new();
    if let Ok(selector) = Selector::parse("a[href]") {
        for element in document.select(&selector) {
            if let Some(href) = element.value().attr("href") {
                if href.starts_with("http") {
                    links.push(href.to_string());
                } else if href.starts_with('/') && href.len() > 1 {
                    links.push(format!("{}{href}", source_url.trim_end_matches('/')));
                }
            }
        }
    }

    ParsedPage {
        title,
        fragments,
        links,
    }
}

fn categorize(text: &str) -> KnowledgeCategory {
    let lower = text.to_lowercase();
    if lower.contains("price") || lower.contains('$') || lower.contains("cost") {
        KnowledgeCategory::Pricing
    } else if lower.contains("hour") || lower.contains("open") || lower.contains("close") {
        KnowledgeCategory::Hours
    } else if lower.contains("contact") || lower.contains("phone") || lower.contains("email") {
        KnowledgeCategory::Contact
    } else if lower.contains('?') {
        KnowledgeCategory::Faq
    } else if lower.contains("service") || lower.contains("offer") {
        KnowledgeCategory::Services
    } else {
        KnowledgeCategory::General
    }
}

fn same_host(root: &str, link: &str) -> bool {
    host_of(link).is_some_and(|h| host_of(root) == Some(h))
}

fn host_of(url: &str) -> Option<&str> {
    let rest = url.strip_prefix("https://").or_else(|| url.strip_prefix("http://"))?;
    rest.split('/').next()
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn categorize_by_keyword() {
        assert_eq!(categorize("Haircuts start at $25"), KnowledgeCategory::Pricing);
        assert_eq!(
            categorize("We are open 9am to 5pm on weekdays"),
            KnowledgeCategory::Hours
        );
        assert_eq!(
            categorize("Contact us by phone or email"),
            KnowledgeCategory::Contact
        );
        assert_eq!(categorize("Do you take walk-ins?"), KnowledgeCategory::Faq);
        assert_eq!(
            categorize("We offer a full range of grooming services"),
            KnowledgeCategory::Services
        );
        assert_eq!(categorize("Welcome to our salon"), KnowledgeCategory::General);
    }

    #[test]
    fn same_host_matching() {
        assert!(same_host("https://example.com", "https://example.com/about"));
        assert!(!same_host("https://example.com", "https://other.com/about"));
        assert!(!same_host("https://example.com", "not a url"));
    }

    #[test]
    fn parse_page_extracts_title_fragments_and_links() {
        let html = r#"<html><head><title>Moose Barbershop</title></head><body>
            <h1>Moose Barbershop: classic cuts in the heart of downtown</h1>
            <p>We are open 9am to 7pm Monday through Saturday, closed Sundays.</p>
            <p>short</p>
            <a href="/pricing">Pricing</a>
            <a href="https://example.com/contact">Contact</a>
        </body></html>"#;
        let page = parse_page(html, "https://example.com");
        assert_eq!(page.title.as_deref(), Some("Moose Barbershop"));
        // "short" is below the minimum fragment length
        assert_eq!(page.fragments.len(), 2);
        assert!(page.links.contains(&"https://example.com/pricing".to_string()));
        assert!(page.links.contains(&"https://example.com/contact".to_string()));
    }

    #[tokio::test]
    async fn mock_crawler_is_deterministic() {
        let crawler = MockWebCrawler;
        assert_eq!(crawler.variant(), ServiceVariant::Mock);
        assert!(crawler.probe().await.is_ok());

        let result = crawler.crawl("https://example.com").await.unwrap();
        assert_eq!(result.pages_visited, 0);
        assert_eq!(result.fragments.len(), 1);
        assert_eq!(result.fragments[0].category, KnowledgeCategory::General);
    }

    #[tokio::test]
    async fn http_crawler_visits_root_and_subpages() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_string(format!(
                r#"<html><head><title>Site</title></head><body>
                <p>We offer a full range of grooming and styling services.</p>
                <a href="{}/hours">Hours</a>
                </body></html>"#,
                server.uri()
            )))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/hours"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                "<html><body><p>We are open 9am to 5pm every weekday, closed weekends.</p></body></html>",
            ))
            .mount(&server)
            .await;

        let crawler = HttpWebCrawler::new(reqwest::Client::new(), 5);
        let result = crawler.crawl(&server.uri()).await.unwrap();
        assert_eq!(result.pages_visited, 2);
        assert!(result
            .fragments
            .iter()
            .any(|f| f.category == KnowledgeCategory::Hours));
    }

    #[tokio::test]
    async fn http_crawler_surfaces_root_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let crawler = HttpWebCrawler::new(reqwest::Client::new(), 3);
        let err = crawler.crawl(&server.uri()).await.unwrap_err();
        assert!(matches!(err, ServiceError::Upstream { status: 500, .. }));
    }

    #[tokio::test]
    async fn http_crawler_skips_broken_subpages() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_string(format!(
                r#"<html><body>
                <p>We offer a full range of grooming and styling services.</p>
                <a href="{}/broken">Broken</a>
                </body></html>"#,
                server.uri()
            )))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/broken"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let crawler = HttpWebCrawler::new(reqwest::Client::new(), 5);
        let result = crawler.crawl(&server.uri()).await.unwrap();
        // Root still counts; the broken page is skipped.
        assert_eq!(result.pages_visited, 1);
        assert!(!result.fragments.is_empty());
    }
}

//! Search providers used for sponsor profiles and media coverage.

use super::SearchSource;
use crate::models::Article;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

const TAVILY_URL: &str = "https://api.tavily.com/search";
const NEWS_API_URL: &str = "https://newsapi.org/v2/everything";

fn http_client(timeout: Duration) -> Option<reqwest::Client> {
    match reqwest::Client::builder().timeout(timeout).build() {
        Ok(client) => Some(client),
        Err(e) => {
            warn!("Failed to create search HTTP client: {}", e);
            None
        }
    }
}

/// A search source that never finds anything.
pub struct NoSearch;

#[async_trait]
impl SearchSource for NoSearch {
    fn name(&self) -> &str {
        "none"
    }

    async fn search(&self, _query: &str) -> Vec<Article> {
        Vec::new()
    }
}

#[derive(Debug, Serialize)]
struct TavilyRequest<'a> {
    api_key: &'a str,
    query: &'a str,
    max_results: usize,
    search_depth: &'static str,
}

#[derive(Debug, Deserialize)]
struct TavilyResponse {
    #[serde(default)]
    results: Vec<TavilyResult>,
}

#[derive(Debug, Deserialize)]
struct TavilyResult {
    title: String,
    url: String,
    #[serde(default)]
    content: String,
}

/// Tavily web search.
pub struct TavilySearch {
    api_key: Option<String>,
    max_results: usize,
    http_client: Option<reqwest::Client>,
}

impl TavilySearch {
    pub fn new(api_key: Option<String>, max_results: usize, timeout: Duration) -> Self {
        Self {
            api_key,
            max_results,
            http_client: http_client(timeout),
        }
    }

    async fn try_search(&self, client: &reqwest::Client, api_key: &str, query: &str) -> Result<Vec<Article>, String> {
        let request = TavilyRequest {
            api_key,
            query,
            max_results: self.max_results,
            search_depth: "advanced",
        };
        let response = client
            .post(TAVILY_URL)
            .json(&request)
            .send()
            .await
            .map_err(|e| e.to_string())?;
        if !response.status().is_success() {
            return Err(format!("HTTP {}", response.status()));
        }
        let body: TavilyResponse = response.json().await.map_err(|e| e.to_string())?;

        Ok(body
            .results
            .into_iter()
            .map(|r| Article {
                title: r.title,
                url: r.url,
                source: Some("tavily".to_string()),
                content: r.content,
            })
            .collect())
    }
}

#[async_trait]
impl SearchSource for TavilySearch {
    fn name(&self) -> &str {
        "tavily"
    }

    async fn search(&self, query: &str) -> Vec<Article> {
        let (Some(api_key), Some(client)) = (self.api_key.as_deref(), self.http_client.as_ref()) else {
            debug!("Tavily search skipped: no API key");
            return Vec::new();
        };

        match self.try_search(client, api_key, query).await {
            Ok(articles) => {
                debug!("Tavily returned {} results for {:?}", articles.len(), query);
                articles
            }
            Err(e) => {
                warn!("Tavily search failed for {:?}: {}", query, e);
                Vec::new()
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct NewsApiResponse {
    #[serde(default)]
    articles: Vec<NewsApiArticle>,
}

#[derive(Debug, Deserialize)]
struct NewsApiArticle {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    source: Option<NewsApiSourceName>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NewsApiSourceName {
    name: Option<String>,
}

impl NewsApiArticle {
    fn into_article(self) -> Option<Article> {
        let content = [self.description, self.content]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join("\n");
        Some(Article {
            title: self.title?,
            url: self.url?,
            source: self.source.and_then(|s| s.name),
            content,
        })
    }
}

/// NewsAPI article search.
pub struct NewsApiSearch {
    api_key: Option<String>,
    page_size: usize,
    http_client: Option<reqwest::Client>,
}

impl NewsApiSearch {
    pub fn new(api_key: Option<String>, page_size: usize, timeout: Duration) -> Self {
        Self {
            api_key,
            page_size,
            http_client: http_client(timeout),
        }
    }

    async fn try_search(&self, client: &reqwest::Client, api_key: &str, query: &str) -> Result<Vec<Article>, String> {
        let page_size = self.page_size.to_string();
        let response = client
            .get(NEWS_API_URL)
            .query(&[
                ("q", query),
                ("language", "en"),
                ("sortBy", "relevancy"),
                ("pageSize", page_size.as_str()),
                ("apiKey", api_key),
            ])
            .send()
            .await
            .map_err(|e| e.to_string())?;
        if !response.status().is_success() {
            return Err(format!("HTTP {}", response.status()));
        }
        let body: NewsApiResponse = response.json().await.map_err(|e| e.to_string())?;

        Ok(body
            .articles
            .into_iter()
            .filter_map(NewsApiArticle::into_article)
            .collect())
    }
}

#[async_trait]
impl SearchSource for NewsApiSearch {
    fn name(&self) -> &str {
        "newsapi"
    }

    async fn search(&self, query: &str) -> Vec<Article> {
        let (Some(api_key), Some(client)) = (self.api_key.as_deref(), self.http_client.as_ref()) else {
            debug!("NewsAPI search skipped: no API key");
            return Vec::new();
        };

        match self.try_search(client, api_key, query).await {
            Ok(articles) => articles,
            Err(e) => {
                warn!("NewsAPI search failed for {:?}: {}", query, e);
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_without_key_returns_empty() {
        let tavily = TavilySearch::new(None, 5, Duration::from_secs(1));
        assert!(tavily.search("H.R. 3852").await.is_empty());

        let news = NewsApiSearch::new(None, 5, Duration::from_secs(1));
        assert!(news.search("H.R. 3852").await.is_empty());

        assert!(NoSearch.search("anything").await.is_empty());
    }

    #[test]
    fn test_news_article_conversion() {
        let body: NewsApiResponse = serde_json::from_value(json!({
            "status": "ok",
            "articles": [
                {
                    "source": { "id": null, "name": "Example News" },
                    "title": "House passes bill",
                    "url": "https://news.example/1",
                    "description": "Summary",
                    "content": "Body"
                },
                { "title": null, "url": "https://news.example/2" }
            ]
        }))
        .unwrap();

        let articles: Vec<Article> = body
            .articles
            .into_iter()
            .filter_map(NewsApiArticle::into_article)
            .collect();
        assert_eq!(articles.len(), 1);
        assert_eq!(articles[0].source.as_deref(), Some("Example News"));
        assert_eq!(articles[0].content, "Summary\nBody");
    }

    #[test]
    fn test_tavily_request_shape() {
        let request = TavilyRequest {
            api_key: "key",
            query: "bill",
            max_results: 3,
            search_depth: "advanced",
        };
        let value = serde_json::to_value(request).unwrap();
        assert_eq!(value["max_results"], 3);
        assert_eq!(value["query"], "bill");
    }
}

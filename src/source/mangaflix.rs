use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use super::{
    CatalogEntry, ChapterDescriptor, ContentSource, SourceError, get_body, join_segment,
    parse_chapter_number,
};

/// JSON API adapter for MangaFlix
#[derive(Debug, Clone)]
pub struct MangaflixSource {
    name: String,
    api_url: String,
    language: String,
    client: reqwest::Client,
}

impl MangaflixSource {
    pub fn new(
        name: impl Into<String>,
        api_url: impl Into<String>,
        language: impl Into<String>,
        client: reqwest::Client,
    ) -> Self {
        Self {
            name: name.into(),
            api_url: api_url.into().trim_end_matches('/').to_string(),
            language: language.into(),
            client,
        }
    }

    fn search_request(&self, query: &str) -> reqwest::RequestBuilder {
        self.client
            .get(format!("{}/search/mangas", self.api_url))
            .query(&[("query", query), ("selected_language", self.language.as_str())])
    }

    fn chapters_request(&self, catalog_id: &str) -> reqwest::RequestBuilder {
        let url = join_segment(&format!("{}/mangas", self.api_url), last_segment(catalog_id));
        self.client.get(url)
    }

    fn pages_request(&self, chapter_id: &str) -> reqwest::RequestBuilder {
        let url = join_segment(&format!("{}/chapters", self.api_url), last_segment(chapter_id));
        self.client
            .get(url)
            .query(&[("selected_language", self.language.as_str())])
    }
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    #[serde(rename = "_id")]
    id: String,
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MangaDetail {
    name: Option<String>,
    #[serde(default)]
    chapters: Vec<ChapterRecord>,
}

#[derive(Debug, Deserialize)]
struct ChapterRecord {
    #[serde(rename = "_id")]
    id: String,
    number: Option<Value>,
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChapterDetail {
    #[serde(default)]
    images: Vec<ImageRecord>,
}

#[derive(Debug, Deserialize)]
struct ImageRecord {
    default_url: Option<String>,
}

fn parse_search(body: &[u8]) -> Result<Vec<CatalogEntry>, SourceError> {
    let envelope: Envelope<Vec<SearchHit>> = serde_json::from_slice(body)?;
    Ok(envelope
        .data
        .unwrap_or_default()
        .into_iter()
        .map(|hit| CatalogEntry {
            title: hit.name.unwrap_or_else(|| hit.id.clone()),
            catalog_id: hit.id,
        })
        .collect())
}

fn parse_chapters(body: &[u8]) -> Result<Vec<ChapterDescriptor>, SourceError> {
    let envelope: Envelope<MangaDetail> = serde_json::from_slice(body)?;
    let Some(detail) = envelope.data else {
        return Ok(Vec::new());
    };
    let title = detail.name.unwrap_or_else(|| "Manga".to_string());

    Ok(detail
        .chapters
        .into_iter()
        .map(|record| {
            let number = parse_chapter_number(record.number.as_ref()).unwrap_or(0.0);
            let chapter = ChapterDescriptor::new(record.id, number, title.clone());
            match record.name.filter(|n| !n.trim().is_empty()) {
                Some(name) => chapter.with_display_name(name),
                None => chapter,
            }
        })
        .collect())
}

fn parse_pages(body: &[u8]) -> Result<Vec<String>, SourceError> {
    let envelope: Envelope<ChapterDetail> = serde_json::from_slice(body)?;
    Ok(envelope
        .data
        .map(|detail| {
            detail
                .images
                .into_iter()
                .filter_map(|image| image.default_url)
                .filter(|url| !url.is_empty())
                .collect()
        })
        .unwrap_or_default())
}

/// Older locators carry a path such as `/br/manga/{id}`
fn last_segment(id: &str) -> &str {
    id.rsplit('/').next().unwrap_or(id)
}

#[async_trait]
impl ContentSource for MangaflixSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn search(&self, query: &str) -> Result<Vec<CatalogEntry>, SourceError> {
        let body = get_body(&self.client, self.search_request(query)).await?;
        parse_search(&body)
    }

    async fn list_chapters(&self, catalog_id: &str) -> Result<Vec<ChapterDescriptor>, SourceError> {
        let body = get_body(&self.client, self.chapters_request(catalog_id)).await?;
        parse_chapters(&body)
    }

    async fn resolve_pages(&self, chapter_id: &str) -> Result<Vec<String>, SourceError> {
        let body = get_body(&self.client, self.pages_request(chapter_id)).await?;
        parse_pages(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_search() {
        let body = br#"{"data": [
            {"_id": "abc", "name": "Blue Lock"},
            {"_id": "def"}
        ]}"#;

        let hits = parse_search(body).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].title, "Blue Lock");
        assert_eq!(hits[0].catalog_id, "abc");
        assert_eq!(hits[1].title, "def");
    }

    #[test]
    fn test_parse_chapters_keeps_source_order() {
        let body = br#"{"data": {
            "name": "Blue Lock",
            "chapters": [
                {"_id": "c1", "number": 1},
                {"_id": "c2", "number": "2.5"},
                {"_id": "c3", "number": 3, "name": "Finale"}
            ]
        }}"#;

        let chapters = parse_chapters(body).unwrap();
        let ids: Vec<_> = chapters.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, ["c1", "c2", "c3"]);
        assert_eq!(chapters[1].number, 2.5);
        assert_eq!(chapters[1].label(), "Chapter 2.5");
        assert_eq!(chapters[2].label(), "Finale");
        assert!(chapters.iter().all(|c| c.catalog_title == "Blue Lock"));
    }

    #[test]
    fn test_parse_pages_skips_missing_urls() {
        let body = br#"{"data": {"images": [
            {"default_url": "https://cdn/1.jpg"},
            {"default_url": null},
            {"default_url": "https://cdn/2.jpg"}
        ]}}"#;

        assert_eq!(
            parse_pages(body).unwrap(),
            vec!["https://cdn/1.jpg", "https://cdn/2.jpg"]
        );
    }

    #[test]
    fn test_missing_data_is_empty() {
        assert!(parse_pages(br#"{"data": null}"#).unwrap().is_empty());
        assert!(parse_chapters(br#"{}"#).unwrap().is_empty());
    }

    #[test]
    fn test_last_segment() {
        assert_eq!(last_segment("/br/manga/abc"), "abc");
        assert_eq!(last_segment("abc"), "abc");
    }

    fn request_url(request: reqwest::RequestBuilder) -> String {
        request.build().unwrap().url().to_string()
    }

    #[test]
    fn test_requests_encode_user_input() {
        let source = MangaflixSource::new(
            "flix",
            "https://api.example/v1/",
            "pt br",
            reqwest::Client::new(),
        );

        assert_eq!(
            request_url(source.search_request("one piece&x=1")),
            "https://api.example/v1/search/mangas?query=one+piece%26x%3D1&selected_language=pt+br"
        );
        assert_eq!(
            request_url(source.chapters_request("/br/manga/abc?x#y")),
            "https://api.example/v1/mangas/abc%3Fx%23y"
        );
        assert_eq!(
            request_url(source.pages_request("c 1")),
            "https://api.example/v1/chapters/c%201?selected_language=pt+br"
        );
    }
}

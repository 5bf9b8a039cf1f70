use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use super::{
    CatalogEntry, ChapterDescriptor, ContentSource, SourceError, get_body, join_segment,
    parse_chapter_number,
};

/// JSON API adapter for ToonBr; page paths are served from a separate CDN host
#[derive(Debug, Clone)]
pub struct ToonbrSource {
    name: String,
    api_url: String,
    cdn_url: String,
    client: reqwest::Client,
}

impl ToonbrSource {
    pub fn new(
        name: impl Into<String>,
        api_url: impl Into<String>,
        cdn_url: impl Into<String>,
        client: reqwest::Client,
    ) -> Self {
        Self {
            name: name.into(),
            api_url: api_url.into().trim_end_matches('/').to_string(),
            cdn_url: cdn_url.into().trim_end_matches('/').to_string(),
            client,
        }
    }

    fn search_request(&self, query: &str) -> reqwest::RequestBuilder {
        self.client
            .get(format!("{}/api/manga", self.api_url))
            .query(&[("page", "1"), ("limit", "20"), ("search", query)])
    }
}

#[derive(Debug, Deserialize)]
struct SearchPage {
    #[serde(default)]
    data: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    title: Option<String>,
    slug: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MangaDetail {
    title: Option<String>,
    #[serde(default)]
    chapters: Vec<ChapterRecord>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChapterRecord {
    id: Value,
    name: Option<String>,
    chapter_number: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct ChapterDetail {
    #[serde(default)]
    pages: Vec<PageRecord>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageRecord {
    image_url: Option<String>,
}

fn parse_search(body: &[u8]) -> Result<Vec<CatalogEntry>, SourceError> {
    let page: SearchPage = serde_json::from_slice(body)?;
    Ok(page
        .data
        .into_iter()
        .filter_map(|hit| {
            let slug = hit.slug?;
            Some(CatalogEntry {
                title: hit.title.unwrap_or_else(|| slug.clone()),
                catalog_id: slug,
            })
        })
        .collect())
}

/// Chapters come back newest first
fn parse_chapters(body: &[u8]) -> Result<Vec<ChapterDescriptor>, SourceError> {
    let detail: MangaDetail = serde_json::from_slice(body)?;
    let title = detail.title.unwrap_or_else(|| "Manga".to_string());

    let mut chapters: Vec<ChapterDescriptor> = detail
        .chapters
        .into_iter()
        .filter_map(|record| {
            // ids are numeric on some deployments
            let id = match record.id {
                Value::String(s) => s,
                Value::Number(n) => n.to_string(),
                _ => return None,
            };
            let number = parse_chapter_number(record.chapter_number.as_ref()).unwrap_or(0.0);
            let chapter = ChapterDescriptor::new(id, number, title.clone());
            Some(match record.name.filter(|n| !n.trim().is_empty()) {
                Some(name) => chapter.with_display_name(name),
                None => chapter,
            })
        })
        .collect();

    chapters.sort_by(|a, b| b.number.total_cmp(&a.number));
    Ok(chapters)
}

fn parse_pages(body: &[u8], cdn_url: &str) -> Result<Vec<String>, SourceError> {
    let detail: ChapterDetail = serde_json::from_slice(body)?;
    Ok(detail
        .pages
        .into_iter()
        .filter_map(|page| page.image_url)
        .filter(|path| !path.is_empty())
        .map(|path| {
            if path.starts_with("http://") || path.starts_with("https://") {
                path
            } else {
                format!("{}/{}", cdn_url, path.trim_start_matches('/'))
            }
        })
        .collect())
}

#[async_trait]
impl ContentSource for ToonbrSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn search(&self, query: &str) -> Result<Vec<CatalogEntry>, SourceError> {
        let body = get_body(&self.client, self.search_request(query)).await?;
        parse_search(&body)
    }

    async fn list_chapters(&self, catalog_id: &str) -> Result<Vec<ChapterDescriptor>, SourceError> {
        let url = join_segment(&format!("{}/api/manga", self.api_url), catalog_id);
        let body = get_body(&self.client, self.client.get(url)).await?;
        parse_chapters(&body)
    }

    async fn resolve_pages(&self, chapter_id: &str) -> Result<Vec<String>, SourceError> {
        let url = join_segment(&format!("{}/api/chapter", self.api_url), chapter_id);
        let body = get_body(&self.client, self.client.get(url)).await?;
        parse_pages(&body, &self.cdn_url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_search_requires_slug() {
        let body = br#"{"data": [
            {"title": "Solo Leveling", "slug": "solo-leveling"},
            {"title": "No slug"}
        ]}"#;

        let hits = parse_search(body).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].catalog_id, "solo-leveling");
    }

    #[test]
    fn test_parse_chapters_sorted_newest_first() {
        let body = br#"{
            "title": "Solo Leveling",
            "chapters": [
                {"id": "a", "name": "", "chapterNumber": "1"},
                {"id": 42, "name": "Cap 3", "chapterNumber": 3},
                {"id": "b", "chapterNumber": 2.5}
            ]
        }"#;

        let chapters = parse_chapters(body).unwrap();
        let numbers: Vec<f64> = chapters.iter().map(|c| c.number).collect();
        assert_eq!(numbers, vec![3.0, 2.5, 1.0]);
        assert_eq!(chapters[0].id, "42");
        assert_eq!(chapters[0].label(), "Cap 3");
        assert_eq!(chapters[2].label(), "Chapter 1");
    }

    #[test]
    fn test_parse_pages_prefixes_cdn() {
        let body = br#"{"pages": [
            {"imageUrl": "/uploads/1.webp"},
            {"imageUrl": null},
            {"imageUrl": "https://elsewhere/2.webp"}
        ]}"#;

        let pages = parse_pages(body, "https://cdn.example").unwrap();
        assert_eq!(
            pages,
            vec![
                "https://cdn.example/uploads/1.webp",
                "https://elsewhere/2.webp"
            ]
        );
    }

    #[test]
    fn test_search_request_encodes_query() {
        let source = ToonbrSource::new(
            "toon",
            "https://api.example",
            "https://cdn.example",
            reqwest::Client::new(),
        );
        let request = source.search_request("solo leveling?").build().unwrap();

        assert_eq!(
            request.url().as_str(),
            "https://api.example/api/manga?page=1&limit=20&search=solo+leveling%3F"
        );
    }
}

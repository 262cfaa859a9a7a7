use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_PAGE: u32 = 1;
pub const DEFAULT_LIMIT: u32 = 9;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Book {
    pub id: String,
    pub title: String,
    pub author: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub cover_url: Option<String>,
    #[serde(default)]
    pub audio_url: Option<String>,
    #[serde(default)]
    pub duration: Option<String>,
    #[serde(default)]
    pub rating: Option<f64>,
    #[serde(default)]
    pub genre: Option<String>,
    /// Raw text fed to speech synthesis.
    #[serde(default)]
    pub book_content: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Book row as inserted; the backend assigns `id` and `created_at`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewBook {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub author: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub genre: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub book_content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

/// The subset of a book joined onto audiomark listings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookSummary {
    pub title: String,
    pub author: String,
    #[serde(default)]
    pub cover_url: Option<String>,
}

impl From<&Book> for BookSummary {
    fn from(book: &Book) -> Self {
        Self {
            title: book.title.clone(),
            author: book.author.clone(),
            cover_url: book.cover_url.clone(),
        }
    }
}

/// A validated catalog query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookQuery {
    pub genre: Option<String>,
    pub search: Option<String>,
    pub page: u32,
    pub limit: u32,
}

impl Default for BookQuery {
    fn default() -> Self {
        Self {
            genre: None,
            search: None,
            page: DEFAULT_PAGE,
            limit: DEFAULT_LIMIT,
        }
    }
}

impl BookQuery {
    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.limit)
    }

    /// Whether rows remain past this page given the filtered total.
    pub fn has_more(&self, total: u64) -> bool {
        self.offset() + u64::from(self.limit) < total
    }

    /// Case-insensitive substring match across title, author and description.
    pub fn matches(&self, book: &Book) -> bool {
        if let Some(genre) = &self.genre {
            if book.genre.as_deref() != Some(genre.as_str()) {
                return false;
            }
        }
        let Some(search) = &self.search else {
            return true;
        };
        let needle = search.to_lowercase();
        [
            Some(book.title.as_str()),
            Some(book.author.as_str()),
            book.description.as_deref(),
        ]
        .into_iter()
        .flatten()
        .any(|field| field.to_lowercase().contains(&needle))
    }
}

/// One page of the catalog together with the filtered total.
#[derive(Debug, Clone, PartialEq)]
pub struct BookPage {
    pub books: Vec<Book>,
    pub total: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn book(title: &str, author: &str, description: Option<&str>, genre: &str) -> Book {
        Book {
            id: title.to_lowercase(),
            title: title.to_owned(),
            author: author.to_owned(),
            description: description.map(ToOwned::to_owned),
            cover_url: None,
            audio_url: None,
            duration: None,
            rating: None,
            genre: Some(genre.to_owned()),
            book_content: None,
            user_id: None,
            created_at: None,
        }
    }

    #[test]
    fn offset_follows_page_and_limit() {
        let query = BookQuery {
            page: 3,
            limit: 9,
            ..BookQuery::default()
        };
        assert_eq!(query.offset(), 18);
        assert!(query.has_more(28));
        assert!(!query.has_more(27));
    }

    #[test]
    fn search_is_case_insensitive_across_fields() {
        let dune = book("Dune", "Frank Herbert", Some("Desert planet"), "Science Fiction");
        let search = |term: &str| BookQuery {
            search: Some(term.to_owned()),
            ..BookQuery::default()
        };
        assert!(search("dUnE").matches(&dune));
        assert!(search("herb").matches(&dune));
        assert!(search("PLANET").matches(&dune));
        assert!(!search("ocean").matches(&dune));
    }

    #[test]
    fn genre_filter_is_exact() {
        let dune = book("Dune", "Frank Herbert", None, "Science Fiction");
        let query = BookQuery {
            genre: Some("Science".to_owned()),
            ..BookQuery::default()
        };
        assert!(!query.matches(&dune));
    }
}

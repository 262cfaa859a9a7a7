//! Catalog browsing: search, genre chips and incremental "load more" paging.

use crate::models::book::{Book, BookQuery};

pub const GENRES: &[&str] = &[
    "Fiction",
    "Non-Fiction",
    "Mystery",
    "Science Fiction",
    "Biography",
    "History",
    "Self-Help",
    "Business",
];
pub const PAGE_SIZE: u32 = 9;

#[derive(Debug, Clone, PartialEq)]
pub struct CatalogState {
    search: String,
    genre: Option<String>,
    page: u32,
    books: Vec<Book>,
    has_more: bool,
    /// The query whose response is awaited, if any.
    in_flight: Option<BookQuery>,
    error: Option<String>,
}

impl Default for CatalogState {
    fn default() -> Self {
        Self {
            search: String::new(),
            genre: None,
            page: 1,
            books: Vec::new(),
            has_more: false,
            in_flight: None,
            error: None,
        }
    }
}

impl CatalogState {
    pub fn books(&self) -> &[Book] {
        &self.books
    }

    pub fn has_more(&self) -> bool {
        self.has_more
    }

    pub fn is_loading(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn selected_genre(&self) -> Option<&str> {
        self.genre.as_deref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Query for the first page under the current filters. Starts a load.
    pub fn refresh(&mut self) -> BookQuery {
        self.page = 1;
        self.start(self.query_for(1))
    }

    pub fn set_search(&mut self, term: &str) -> BookQuery {
        self.search = term.trim().to_owned();
        self.refresh()
    }

    /// Selecting the active genre again clears the filter.
    pub fn toggle_genre(&mut self, genre: &str) -> BookQuery {
        if self.genre.as_deref() == Some(genre) {
            self.genre = None;
        } else {
            self.genre = Some(genre.to_owned());
        }
        self.refresh()
    }

    /// Query for the next page, unless a load is running or nothing is left.
    pub fn load_more(&mut self) -> Option<BookQuery> {
        if self.is_loading() || !self.has_more {
            return None;
        }
        Some(self.start(self.query_for(self.page + 1)))
    }

    /// Applies a page response. Page one replaces the list, later pages
    /// append. Responses for superseded queries are dropped.
    pub fn apply(&mut self, query: &BookQuery, books: Vec<Book>, has_more: bool) -> bool {
        if self.in_flight.as_ref() != Some(query) {
            tracing::debug!(page = query.page, "dropping stale catalog page");
            return false;
        }
        self.in_flight = None;
        self.error = None;
        self.page = query.page;
        if query.page <= 1 {
            self.books = books;
        } else {
            self.books.extend(books);
        }
        self.has_more = has_more;
        true
    }

    pub fn fail(&mut self, query: &BookQuery, message: impl Into<String>) {
        if self.in_flight.as_ref() == Some(query) {
            self.in_flight = None;
            self.error = Some(message.into());
        }
    }

    fn start(&mut self, query: BookQuery) -> BookQuery {
        self.in_flight = Some(query.clone());
        query
    }

    fn query_for(&self, page: u32) -> BookQuery {
        BookQuery {
            genre: self.genre.clone(),
            search: Some(self.search.clone()).filter(|s| !s.is_empty()),
            page,
            limit: PAGE_SIZE,
        }
    }
}

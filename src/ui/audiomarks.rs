use crate::models::audiomark::Audiomark;

use super::player::format_time;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum EditError {
    #[error("No audiomark is being edited")]
    NotEditing,
    #[error("Note is required")]
    EmptyNote,
}

#[derive(Debug, Clone, PartialEq)]
struct Draft {
    id: String,
    note: String,
}

/// The signed-in user's audiomarks, with a local text filter and inline
/// note editing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AudiomarksView {
    marks: Vec<Audiomark>,
    search: String,
    editing: Option<Draft>,
}

impl AudiomarksView {
    pub fn load(&mut self, marks: Vec<Audiomark>) {
        self.marks = marks;
        self.editing = None;
    }

    pub fn all(&self) -> &[Audiomark] {
        &self.marks
    }

    pub fn set_search(&mut self, term: &str) {
        self.search = term.trim().to_lowercase();
    }

    /// Marks whose book title, author or note contain the search term.
    pub fn visible(&self) -> Vec<&Audiomark> {
        if self.search.is_empty() {
            return self.marks.iter().collect();
        }
        self.marks
            .iter()
            .filter(|mark| {
                let book = mark.books.as_ref();
                [
                    book.map(|b| b.title.as_str()),
                    book.map(|b| b.author.as_str()),
                    Some(mark.note.as_str()),
                ]
                .into_iter()
                .flatten()
                .any(|field| field.to_lowercase().contains(&self.search))
            })
            .collect()
    }

    /// Drops a mark after the backend confirmed the delete.
    pub fn remove(&mut self, id: &str) {
        self.marks.retain(|mark| mark.id != id);
        if self.editing_id() == Some(id) {
            self.editing = None;
        }
    }

    pub fn begin_edit(&mut self, id: &str) -> bool {
        let Some(mark) = self.marks.iter().find(|mark| mark.id == id) else {
            return false;
        };
        self.editing = Some(Draft {
            id: mark.id.clone(),
            note: mark.note.clone(),
        });
        true
    }

    pub fn editing_id(&self) -> Option<&str> {
        self.editing.as_ref().map(|draft| draft.id.as_str())
    }

    pub fn edit_note(&mut self, note: &str) {
        if let Some(draft) = self.editing.as_mut() {
            draft.note = note.to_owned();
        }
    }

    pub fn cancel_edit(&mut self) {
        self.editing = None;
    }

    /// The `(id, note)` pair to send; the draft stays open until the update lands.
    pub fn commit_edit(&self) -> Result<(String, String), EditError> {
        let draft = self.editing.as_ref().ok_or(EditError::NotEditing)?;
        let note = draft.note.trim();
        if note.is_empty() {
            return Err(EditError::EmptyNote);
        }
        Ok((draft.id.clone(), note.to_owned()))
    }

    /// Replaces the local copy with the row the backend returned.
    pub fn apply_update(&mut self, updated: Audiomark) {
        if let Some(mark) = self.marks.iter_mut().find(|mark| mark.id == updated.id) {
            // Updates come back without the joined book columns.
            let books = updated.books.clone().or_else(|| mark.books.take());
            *mark = Audiomark { books, ..updated };
        }
        self.editing = None;
    }
}

pub fn label(mark: &Audiomark) -> String {
    match &mark.books {
        Some(book) => format!("{} · {}", book.title, format_time(mark.timestamp)),
        None => format_time(mark.timestamp),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::book::BookSummary;
    use chrono::Utc;

    fn mark(id: &str, title: &str, author: &str, note: &str, timestamp: f64) -> Audiomark {
        Audiomark {
            id: id.to_owned(),
            user_id: "u1".to_owned(),
            book_id: format!("book-{id}"),
            timestamp,
            note: note.to_owned(),
            created_at: Utc::now(),
            books: Some(BookSummary {
                title: title.to_owned(),
                author: author.to_owned(),
                cover_url: None,
            }),
        }
    }

    fn view() -> AudiomarksView {
        let mut view = AudiomarksView::default();
        view.load(vec![
            mark("1", "Dune", "Frank Herbert", "the spice must flow", 42.5),
            mark("2", "Emma", "Jane Austen", "matchmaking", 125.0),
        ]);
        view
    }

    #[test]
    fn search_covers_title_author_and_note() {
        let mut view = view();
        view.set_search("AUSTEN");
        assert_eq!(view.visible().len(), 1);
        view.set_search("spice");
        assert_eq!(view.visible()[0].id, "1");
        view.set_search("");
        assert_eq!(view.visible().len(), 2);
        view.set_search("nothing");
        assert!(view.visible().is_empty());
    }

    #[test]
    fn edits_need_a_note() {
        let mut view = view();
        assert_eq!(view.commit_edit(), Err(EditError::NotEditing));
        assert!(view.begin_edit("2"));
        view.edit_note("   ");
        assert_eq!(view.commit_edit(), Err(EditError::EmptyNote));
        view.edit_note(" a wedding ");
        assert_eq!(view.commit_edit(), Ok(("2".to_owned(), "a wedding".to_owned())));

        let mut updated = mark("2", "", "", "a wedding", 125.0);
        updated.books = None;
        view.apply_update(updated);
        assert_eq!(view.editing_id(), None);
        assert_eq!(view.all()[1].note, "a wedding");
        assert_eq!(view.all()[1].books.as_ref().map(|b| b.title.as_str()), Some("Emma"));
    }

    #[test]
    fn removing_drops_the_mark_and_its_draft() {
        let mut view = view();
        view.begin_edit("1");
        view.remove("1");
        assert_eq!(view.all().len(), 1);
        assert_eq!(view.editing_id(), None);
        assert!(!view.begin_edit("1"));
    }

    #[test]
    fn labels_show_title_and_position() {
        let view = view();
        assert_eq!(label(&view.all()[0]), "Dune · 0:42");
        assert_eq!(label(&view.all()[1]), "Emma · 2:05");
    }
}

use crate::models::{book::Book, user::Tier};

use super::player::PlayerState;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Page {
    #[default]
    Home,
    Login,
    Register,
    Books,
    Audiomarks,
    About,
    RequestBook,
}

impl Page {
    /// Pages that only make sense with a signed-in user.
    pub fn requires_user(self) -> bool {
        matches!(self, Self::Audiomarks)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedInUser {
    pub id: String,
    pub email: String,
    pub name: String,
    pub tier: Tier,
    pub access_token: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Navigate(Page),
    SignedIn(SignedInUser),
    SignedOut,
    Upgraded,
    SelectBook(Book),
    ClosePlayer,
    ClonedVoiceLoaded(bool),
    ClonedVoiceGenerated,
}

/// Top-level view state. Every user-visible change goes through [`AppState::dispatch`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AppState {
    page: Page,
    user: Option<SignedInUser>,
    player: Option<PlayerState>,
    has_cloned_voice: bool,
}

impl AppState {
    pub fn page(&self) -> Page {
        self.page
    }

    pub fn user(&self) -> Option<&SignedInUser> {
        self.user.as_ref()
    }

    pub fn tier(&self) -> Tier {
        self.user.as_ref().map(|user| user.tier).unwrap_or_default()
    }

    pub fn access_token(&self) -> Option<&str> {
        self.user.as_ref().map(|user| user.access_token.as_str())
    }

    pub fn player(&self) -> Option<&PlayerState> {
        self.player.as_ref()
    }

    pub fn player_mut(&mut self) -> Option<&mut PlayerState> {
        self.player.as_mut()
    }

    pub fn has_cloned_voice(&self) -> bool {
        self.has_cloned_voice
    }

    pub fn dispatch(&mut self, action: Action) {
        tracing::debug!(?action, "app action");
        match action {
            Action::Navigate(page) => {
                self.page = if page.requires_user() && self.user.is_none() {
                    Page::Login
                } else {
                    page
                };
            }
            Action::SignedIn(user) => {
                if let Some(player) = self.player.as_mut() {
                    player.set_tier(user.tier);
                }
                self.user = Some(user);
                self.page = Page::Home;
            }
            Action::SignedOut => {
                self.user = None;
                self.player = None;
                self.has_cloned_voice = false;
                self.page = Page::Home;
            }
            Action::Upgraded => {
                if let Some(user) = self.user.as_mut() {
                    user.tier = Tier::Premium;
                }
                if let Some(player) = self.player.as_mut() {
                    player.set_tier(Tier::Premium);
                }
            }
            Action::SelectBook(book) => {
                let user_id = self.user.as_ref().map(|user| user.id.clone());
                self.player = Some(PlayerState::open(book, user_id, self.tier()));
            }
            Action::ClosePlayer => {
                if let Some(mut player) = self.player.take() {
                    player.close();
                }
            }
            Action::ClonedVoiceLoaded(present) => self.has_cloned_voice = present,
            Action::ClonedVoiceGenerated => self.has_cloned_voice = true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ui::player::PlaybackState;

    fn user() -> SignedInUser {
        SignedInUser {
            id: "u1".to_owned(),
            email: "reader@example.com".to_owned(),
            name: "Reader".to_owned(),
            tier: Tier::Free,
            access_token: "token".to_owned(),
        }
    }

    fn book() -> Book {
        Book {
            id: "b1".to_owned(),
            title: "Dune".to_owned(),
            author: "Frank Herbert".to_owned(),
            description: None,
            cover_url: None,
            audio_url: Some("http://x/dune.mp3".to_owned()),
            duration: None,
            rating: None,
            genre: None,
            book_content: Some("a b c".to_owned()),
            user_id: None,
            created_at: None,
        }
    }

    #[test]
    fn audiomarks_page_sends_anonymous_users_to_login() {
        let mut app = AppState::default();
        app.dispatch(Action::Navigate(Page::Audiomarks));
        assert_eq!(app.page(), Page::Login);
        app.dispatch(Action::SignedIn(user()));
        assert_eq!(app.page(), Page::Home);
        app.dispatch(Action::Navigate(Page::Audiomarks));
        assert_eq!(app.page(), Page::Audiomarks);
    }

    #[test]
    fn sign_out_clears_user_and_player() {
        let mut app = AppState::default();
        app.dispatch(Action::SignedIn(user()));
        app.dispatch(Action::SelectBook(book()));
        app.dispatch(Action::ClonedVoiceGenerated);
        assert!(app.has_cloned_voice());
        assert_eq!(app.player().map(PlayerState::state), Some(PlaybackState::Ready));

        app.dispatch(Action::SignedOut);
        assert!(app.user().is_none());
        assert!(app.player().is_none());
        assert!(!app.has_cloned_voice());
    }

    #[test]
    fn upgrade_reaches_the_open_player() {
        let mut app = AppState::default();
        app.dispatch(Action::SignedIn(user()));
        app.dispatch(Action::SelectBook(book()));
        app.dispatch(Action::Upgraded);
        assert_eq!(app.tier(), Tier::Premium);
        assert_eq!(app.player().map(PlayerState::tier), Some(Tier::Premium));
    }

    #[test]
    fn anonymous_players_cannot_save() {
        let mut app = AppState::default();
        app.dispatch(Action::SelectBook(book()));
        let player = app.player().unwrap();
        assert!(player.audiomark_draft().is_err());
        app.dispatch(Action::ClosePlayer);
        assert!(app.player().is_none());
    }
}

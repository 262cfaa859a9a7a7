//! Playback panel.
//!
//! The panel drives a media element it does not own: the embedding view
//! forwards element events (`time_update`, `loaded_metadata`, `ended`) and
//! user intents, and the panel decides which ones are allowed in the current
//! [`PlaybackState`].
//!
//! Audiomark notes are approximated from the playback position with a fixed
//! words-per-second rate over the book's raw text. This is not transcript
//! alignment; the note is only close to what is being read.

use crate::models::{
    audiomark::NewAudiomark,
    book::Book,
    user::Tier,
};

pub const WORDS_PER_SECOND: f64 = 2.0;
pub const NOTE_WORDS: usize = 10;
pub const DEFAULT_VOLUME: u8 = 80;
pub const MAX_VOLUME: u8 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    /// No audio source.
    Idle,
    /// Speech generation in flight.
    TtsPending,
    /// A source is loaded and stopped at `current_time`.
    Ready,
    Playing,
    Paused,
}

impl PlaybackState {
    pub fn has_source(self) -> bool {
        matches!(self, Self::Ready | Self::Playing | Self::Paused)
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PlayerError {
    #[error("No book content available for TTS.")]
    NoContent,
    #[error("Speech generation is already running")]
    GenerationInFlight,
    #[error("Audio not ready")]
    NotReady,
    #[error("You must be logged in to save audiomarks.")]
    NotSignedIn,
    #[error("Pause the audio to save an audiomark.")]
    NotPaused,
    #[error("Please select a model and upload a voice sample")]
    IncompleteCloneRequest,
    #[error("{model} is not available on the {tier} tier")]
    ModelUnavailable { model: String, tier: Tier },
}

/// Voice-cloning upload the panel is allowed to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloneRequest {
    pub user_id: String,
    pub model: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlayerState {
    book: Book,
    user_id: Option<String>,
    tier: Tier,
    state: PlaybackState,
    /// Where a failed generation returns to.
    resume_state: PlaybackState,
    audio_url: Option<String>,
    current_time: f64,
    duration: f64,
    volume: u8,
}

impl PlayerState {
    /// Opens the panel on a book. Books that already carry audio start `Ready`.
    pub fn open(book: Book, user_id: Option<String>, tier: Tier) -> Self {
        let audio_url = book.audio_url.clone().filter(|url| !url.trim().is_empty());
        let state = if audio_url.is_some() {
            PlaybackState::Ready
        } else {
            PlaybackState::Idle
        };
        Self {
            book,
            user_id,
            tier,
            state,
            resume_state: state,
            audio_url,
            current_time: 0.0,
            duration: 0.0,
            volume: DEFAULT_VOLUME,
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn book(&self) -> &Book {
        &self.book
    }

    pub fn audio_url(&self) -> Option<&str> {
        self.audio_url.as_deref()
    }

    pub fn current_time(&self) -> f64 {
        self.current_time
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn volume(&self) -> u8 {
        self.volume
    }

    pub fn tier(&self) -> Tier {
        self.tier
    }

    pub fn set_tier(&mut self, tier: Tier) {
        self.tier = tier;
    }

    /// Starts speech generation; returns the text to synthesize.
    pub fn begin_tts(&mut self) -> Result<String, PlayerError> {
        if self.state == PlaybackState::TtsPending {
            return Err(PlayerError::GenerationInFlight);
        }
        let text = self
            .book
            .book_content
            .as_deref()
            .map(str::trim)
            .filter(|text| !text.is_empty())
            .ok_or(PlayerError::NoContent)?
            .to_owned();
        self.resume_state = match self.state {
            PlaybackState::Playing => PlaybackState::Paused,
            other => other,
        };
        self.state = PlaybackState::TtsPending;
        Ok(text)
    }

    /// Completes generation. A new source replaces the old one and starts
    /// `Ready` at zero; a failure restores the previous state.
    pub fn tts_finished(&mut self, result: Result<String, String>) -> Result<(), String> {
        if self.state != PlaybackState::TtsPending {
            return Ok(());
        }
        match result {
            Ok(url) => {
                self.audio_url = Some(url);
                self.current_time = 0.0;
                self.duration = 0.0;
                self.state = PlaybackState::Ready;
                Ok(())
            }
            Err(message) => {
                self.state = self.resume_state;
                Err(message)
            }
        }
    }

    pub fn toggle_play(&mut self) -> Result<PlaybackState, PlayerError> {
        self.state = match self.state {
            PlaybackState::Ready | PlaybackState::Paused => PlaybackState::Playing,
            PlaybackState::Playing => PlaybackState::Paused,
            PlaybackState::Idle | PlaybackState::TtsPending => return Err(PlayerError::NotReady),
        };
        Ok(self.state)
    }

    /// Pauses and rewinds to the start.
    pub fn stop(&mut self) -> Result<(), PlayerError> {
        self.require_source()?;
        self.current_time = 0.0;
        self.state = PlaybackState::Ready;
        Ok(())
    }

    pub fn seek(&mut self, seconds: f64) -> Result<f64, PlayerError> {
        self.require_source()?;
        self.current_time = self.clamp_time(seconds);
        Ok(self.current_time)
    }

    pub fn set_volume(&mut self, volume: u8) -> Result<u8, PlayerError> {
        self.require_source()?;
        self.volume = volume.min(MAX_VOLUME);
        Ok(self.volume)
    }

    /// Element gain, `0.0..=1.0`.
    pub fn gain(&self) -> f32 {
        f32::from(self.volume) / f32::from(MAX_VOLUME)
    }

    pub fn time_update(&mut self, seconds: f64) {
        if self.state.has_source() {
            self.current_time = self.clamp_time(seconds);
        }
    }

    pub fn loaded_metadata(&mut self, duration: f64) {
        if self.state.has_source() && duration.is_finite() && duration > 0.0 {
            self.duration = duration;
        }
    }

    pub fn ended(&mut self) {
        if self.state == PlaybackState::Playing {
            self.current_time = self.duration.max(self.current_time);
            self.state = PlaybackState::Paused;
        }
    }

    /// Seeks to a saved position and plays from there.
    pub fn jump_to(&mut self, seconds: f64) -> Result<(), PlayerError> {
        self.seek(seconds)?;
        self.state = PlaybackState::Playing;
        Ok(())
    }

    pub fn close(&mut self) {
        self.state = PlaybackState::Idle;
        self.resume_state = PlaybackState::Idle;
        self.audio_url = None;
        self.current_time = 0.0;
        self.duration = 0.0;
    }

    /// The audiomark to save at the current position.
    pub fn audiomark_draft(&self) -> Result<NewAudiomark, PlayerError> {
        let user_id = self.user_id.clone().ok_or(PlayerError::NotSignedIn)?;
        match self.state {
            PlaybackState::Ready | PlaybackState::Paused => {}
            PlaybackState::Playing => return Err(PlayerError::NotPaused),
            PlaybackState::Idle | PlaybackState::TtsPending => return Err(PlayerError::NotReady),
        }
        Ok(NewAudiomark {
            user_id,
            book_id: self.book.id.clone(),
            timestamp: self.current_time,
            note: note_at(self.book.book_content.as_deref().unwrap_or_default(), self.current_time),
        })
    }

    pub fn available_models(&self) -> &'static [&'static str] {
        self.tier.voice_models()
    }

    pub fn clone_request(
        &self,
        model: Option<&str>,
        sample: Option<&[u8]>,
    ) -> Result<CloneRequest, PlayerError> {
        let (Some(user_id), Some(model), Some(sample)) = (self.user_id.as_ref(), model, sample)
        else {
            return Err(PlayerError::IncompleteCloneRequest);
        };
        if model.is_empty() || sample.is_empty() {
            return Err(PlayerError::IncompleteCloneRequest);
        }
        if !self.available_models().contains(&model) {
            return Err(PlayerError::ModelUnavailable {
                model: model.to_owned(),
                tier: self.tier,
            });
        }
        Ok(CloneRequest {
            user_id: user_id.clone(),
            model: model.to_owned(),
        })
    }

    fn require_source(&self) -> Result<(), PlayerError> {
        if self.state.has_source() {
            Ok(())
        } else {
            Err(PlayerError::NotReady)
        }
    }

    fn clamp_time(&self, seconds: f64) -> f64 {
        let seconds = if seconds.is_finite() { seconds.max(0.0) } else { 0.0 };
        if self.duration > 0.0 {
            seconds.min(self.duration)
        } else {
            seconds
        }
    }
}

/// Words read by `seconds` into the text, at [`WORDS_PER_SECOND`].
///
/// Words are split on single spaces, so runs of spaces count as empty words.
pub fn note_at(content: &str, seconds: f64) -> String {
    let seconds = if seconds.is_finite() { seconds.max(0.0) } else { 0.0 };
    let start = (seconds * WORDS_PER_SECOND).floor() as usize;
    content
        .split(' ')
        .skip(start)
        .take(NOTE_WORDS)
        .collect::<Vec<_>>()
        .join(" ")
}

/// `m:ss`
pub fn format_time(seconds: f64) -> String {
    let total = if seconds.is_finite() && seconds > 0.0 {
        seconds.floor() as u64
    } else {
        0
    };
    format!("{}:{:02}", total / 60, total % 60)
}

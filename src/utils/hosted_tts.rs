use url::Url;

pub const TTS_ENDPOINT: &str = "https://translate.google.com/translate_tts";
/// Longest text a single hosted request accepts.
pub const MAX_TEXT_CHARS: usize = 200;
pub const DEFAULT_LANG: &str = "en";

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum HostedTtsError {
    #[error("text length ({0}) should be less than {MAX_TEXT_CHARS} characters")]
    TooLong(usize),
    #[error("lang should be a language code, got `{0}`")]
    InvalidLang(String),
    #[error(transparent)]
    Endpoint(#[from] url::ParseError),
}

/// One request against the hosted synthesis endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct TtsRequest<'a> {
    pub text: &'a str,
    pub lang: &'a str,
    pub slow: bool,
    /// Chunk position when a longer text was split.
    pub idx: usize,
    pub total: usize,
}

impl<'a> TtsRequest<'a> {
    pub fn single(text: &'a str, lang: &'a str, slow: bool) -> Self {
        Self {
            text,
            lang,
            slow,
            idx: 0,
            total: 1,
        }
    }

    pub fn url(&self) -> Result<Url, HostedTtsError> {
        let len = self.text.chars().count();
        if len > MAX_TEXT_CHARS {
            return Err(HostedTtsError::TooLong(len));
        }
        if self.lang.is_empty()
            || !self
                .lang
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(HostedTtsError::InvalidLang(self.lang.to_owned()));
        }
        let mut url = Url::parse(TTS_ENDPOINT)?;
        url.query_pairs_mut()
            .append_pair("ie", "UTF-8")
            .append_pair("q", self.text)
            .append_pair("tl", self.lang)
            .append_pair("total", &self.total.to_string())
            .append_pair("idx", &self.idx.to_string())
            .append_pair("textlen", &len.to_string())
            .append_pair("client", "tw-ob")
            .append_pair("prev", "input")
            .append_pair("ttsspeed", if self.slow { "0.24" } else { "1" });
        Ok(url)
    }
}

/// URL of the hosted synthesis of `text`; nothing is synthesized here.
pub fn audio_url(text: &str, lang: &str, slow: bool) -> Result<Url, HostedTtsError> {
    TtsRequest::single(text, lang, slow).url()
}

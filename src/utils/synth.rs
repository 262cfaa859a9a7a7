use anyhow::Context;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::{fs, process::Command};

use super::hosted_tts::{TtsRequest, DEFAULT_LANG};

/// Hosted synthesis accepts at most this many characters per request.
pub const CHUNK_CHARS: usize = 100;

/// Turns text into an audio file on disk.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// File extension of the audio this synthesizer writes.
    fn extension(&self) -> &'static str;

    async fn synthesize(&self, text: &str, output: &Path) -> anyhow::Result<()>;
}

/// MP3 synthesis through the hosted translate endpoint.
pub struct GoogleTranslateSynthesizer {
    client: reqwest::Client,
    lang: String,
}

impl GoogleTranslateSynthesizer {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            lang: DEFAULT_LANG.to_owned(),
        }
    }
}

#[async_trait]
impl SpeechSynthesizer for GoogleTranslateSynthesizer {
    fn extension(&self) -> &'static str {
        "mp3"
    }

    async fn synthesize(&self, text: &str, output: &Path) -> anyhow::Result<()> {
        let chunks = split_text(text, CHUNK_CHARS);
        let total = chunks.len();
        let mut audio = Vec::new();
        for (idx, chunk) in chunks.iter().enumerate() {
            let url = TtsRequest {
                text: chunk,
                lang: &self.lang,
                slow: false,
                idx,
                total,
            }
            .url()?;
            let bytes = self
                .client
                .get(url)
                .send()
                .await
                .and_then(reqwest::Response::error_for_status)
                .with_context(|| format!("speech request {}/{total} failed", idx + 1))?
                .bytes()
                .await?;
            audio.extend_from_slice(&bytes);
        }
        tracing::debug!(chunks = total, bytes = audio.len(), "synthesized speech");
        fs::write(output, audio)
            .await
            .with_context(|| format!("failed to write {}", output.display()))
    }
}

/// WAV synthesis through a local `espeak`-compatible binary.
pub struct CommandSynthesizer {
    program: PathBuf,
}

impl CommandSynthesizer {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn command(&self, text: &str, output: &Path) -> Command {
        let mut command = Command::new(&self.program);
        command
            .args(["-v", "en", "-s", "150", "-p", "50", "-w"])
            .arg(output)
            .arg("--")
            .arg(text)
            .kill_on_drop(true);
        command
    }
}

#[async_trait]
impl SpeechSynthesizer for CommandSynthesizer {
    fn extension(&self) -> &'static str {
        "wav"
    }

    async fn synthesize(&self, text: &str, output: &Path) -> anyhow::Result<()> {
        let result = self
            .command(text, output)
            .output()
            .await
            .with_context(|| format!("failed to run {}", self.program.display()))?;
        if !result.status.success() {
            anyhow::bail!(
                "{} exited with {}: {}",
                self.program.display(),
                result.status,
                String::from_utf8_lossy(&result.stderr).trim()
            );
        }
        Ok(())
    }
}

/// Splits text into pieces of at most `max_chars` characters, breaking on
/// whitespace. Words longer than the limit are cut.
pub fn split_text(text: &str, max_chars: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;
    for word in text.split_whitespace() {
        let mut word: Vec<char> = word.chars().collect();
        while word.len() > max_chars {
            if !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
                current_len = 0;
            }
            let rest = word.split_off(max_chars);
            chunks.push(word.into_iter().collect());
            word = rest;
        }
        let sep = usize::from(!current.is_empty());
        if current_len + sep + word.len() > max_chars {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }
        if !current.is_empty() {
            current.push(' ');
            current_len += 1;
        }
        current_len += word.len();
        current.extend(word);
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

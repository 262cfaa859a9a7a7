use anyhow::Context;
use microservice_utils::{ensure_var, optional_var};
use std::{net::SocketAddr, path::PathBuf, str::FromStr, time::Duration};

pub const DEFAULT_BIND: &str = "0.0.0.0:3000";
pub const DEFAULT_SITE_URL: &str = "http://localhost:3000";
pub const DEFAULT_GENERATED_DIR: &str = "public/generated";
pub const DEFAULT_ESPEAK_BIN: &str = "espeak-ng";
pub const DEFAULT_CLONE_DELAY_MS: u64 = 2000;
pub const DEFAULT_CONCURRENCY_LIMIT: usize = 64;
const DEV_JWT_SECRET: &str = "auris-development-secret";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendConfig {
    Supabase {
        url: String,
        anon_key: String,
        service_role_key: Option<String>,
    },
    Memory {
        jwt_secret: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TtsEngine {
    /// Hosted synthesis, MP3 output.
    Gtts,
    /// Local command-line synthesizer, WAV output.
    Espeak,
}

impl FromStr for TtsEngine {
    type Err = anyhow::Error;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input {
            "gtts" => Ok(Self::Gtts),
            "espeak" => Ok(Self::Espeak),
            other => Err(anyhow::anyhow!("unknown tts engine `{other}`")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub bind: SocketAddr,
    pub site_url: String,
    pub public_base_url: String,
    pub generated_dir: PathBuf,
    pub backend: BackendConfig,
    pub tts_engine: TtsEngine,
    pub espeak_bin: String,
    pub clone_delay: Duration,
    pub concurrency_limit: usize,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| optional_var(key), |key| ensure_var(key))
    }

    /// Builds the configuration from arbitrary lookups so tests need not touch
    /// the process environment.
    pub fn from_lookup(
        optional: impl Fn(&str) -> Option<String>,
        required: impl Fn(&str) -> anyhow::Result<String>,
    ) -> anyhow::Result<Self> {
        let bind: SocketAddr = optional("AURIS_BIND")
            .unwrap_or_else(|| DEFAULT_BIND.to_owned())
            .parse()
            .context("AURIS_BIND is not a socket address")?;
        let site_url =
            trim_slash(optional("AURIS_SITE_URL").unwrap_or_else(|| DEFAULT_SITE_URL.to_owned()));
        let public_base_url = optional("AURIS_PUBLIC_BASE_URL")
            .map(trim_slash)
            .unwrap_or_else(|| site_url.clone());

        let backend = match optional("AURIS_BACKEND").as_deref() {
            None | Some("supabase") => BackendConfig::Supabase {
                url: trim_slash(required("SUPABASE_URL")?),
                anon_key: required("SUPABASE_ANON_KEY")?,
                service_role_key: optional("SUPABASE_SERVICE_ROLE_KEY"),
            },
            Some("memory") => BackendConfig::Memory {
                jwt_secret: optional("AURIS_JWT_SECRET")
                    .unwrap_or_else(|| DEV_JWT_SECRET.to_owned()),
            },
            Some(other) => {
                anyhow::bail!("AURIS_BACKEND must be `supabase` or `memory`, got `{other}`")
            }
        };

        let tts_engine: TtsEngine = match optional("AURIS_TTS_ENGINE") {
            Some(engine) => engine.parse().context("AURIS_TTS_ENGINE")?,
            None => TtsEngine::Gtts,
        };

        Ok(Self {
            bind,
            site_url,
            public_base_url,
            generated_dir: optional("AURIS_GENERATED_DIR")
                .unwrap_or_else(|| DEFAULT_GENERATED_DIR.to_owned())
                .into(),
            backend,
            tts_engine,
            espeak_bin: optional("AURIS_ESPEAK_BIN")
                .unwrap_or_else(|| DEFAULT_ESPEAK_BIN.to_owned()),
            clone_delay: Duration::from_millis(number(
                &optional,
                "AURIS_CLONE_DELAY_MS",
                DEFAULT_CLONE_DELAY_MS,
            )?),
            concurrency_limit: number(
                &optional,
                "AURIS_CONCURRENCY_LIMIT",
                DEFAULT_CONCURRENCY_LIMIT,
            )?,
        })
    }

    /// Configuration for an in-process run against the memory backend.
    pub fn memory(generated_dir: impl Into<PathBuf>) -> Self {
        Self {
            bind: ([127, 0, 0, 1], 0).into(),
            site_url: DEFAULT_SITE_URL.to_owned(),
            public_base_url: DEFAULT_SITE_URL.to_owned(),
            generated_dir: generated_dir.into(),
            backend: BackendConfig::Memory {
                jwt_secret: DEV_JWT_SECRET.to_owned(),
            },
            tts_engine: TtsEngine::Gtts,
            espeak_bin: DEFAULT_ESPEAK_BIN.to_owned(),
            clone_delay: Duration::ZERO,
            concurrency_limit: DEFAULT_CONCURRENCY_LIMIT,
        }
    }

    pub fn callback_url(&self) -> String {
        format!("{}/auth/callback", self.site_url)
    }

    pub fn generated_url(&self, file_name: &str) -> String {
        format!("{}/generated/{file_name}", self.public_base_url)
    }
}

fn trim_slash(value: String) -> String {
    value.trim_end_matches('/').to_owned()
}

fn number<T>(
    optional: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match optional(key) {
        Some(value) => value
            .trim()
            .parse()
            .with_context(|| format!("{key} must be a number, got `{value}`")),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> anyhow::Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(
            |key| vars.get(key).cloned(),
            |key| {
                vars.get(key)
                    .cloned()
                    .ok_or_else(|| anyhow::anyhow!("environment variable not found: {key:?}"))
            },
        )
    }

    #[test]
    fn supabase_needs_url_and_anon_key() {
        let err = load(&[]).unwrap_err();
        assert!(err.to_string().contains("SUPABASE_URL"));

        let config = load(&[
            ("SUPABASE_URL", "https://demo.supabase.co/"),
            ("SUPABASE_ANON_KEY", "anon"),
        ])
        .unwrap();
        assert_eq!(
            config.backend,
            BackendConfig::Supabase {
                url: "https://demo.supabase.co".to_owned(),
                anon_key: "anon".to_owned(),
                service_role_key: None,
            }
        );
        assert_eq!(config.bind.port(), 3000);
        assert_eq!(config.clone_delay, Duration::from_millis(2000));
        assert_eq!(config.callback_url(), "http://localhost:3000/auth/callback");
    }

    #[test]
    fn memory_backend_needs_nothing_else() {
        let config = load(&[
            ("AURIS_BACKEND", "memory"),
            ("AURIS_PUBLIC_BASE_URL", "https://cdn.example.com/"),
            ("AURIS_TTS_ENGINE", "espeak"),
        ])
        .unwrap();
        assert!(matches!(config.backend, BackendConfig::Memory { .. }));
        assert_eq!(config.tts_engine, TtsEngine::Espeak);
        assert_eq!(
            config.generated_url("a.mp3"),
            "https://cdn.example.com/generated/a.mp3"
        );
    }

    #[test]
    fn bad_numbers_are_errors() {
        let err = load(&[("AURIS_BACKEND", "memory"), ("AURIS_CLONE_DELAY_MS", "soon")])
            .unwrap_err();
        assert!(err.to_string().contains("AURIS_CLONE_DELAY_MS"));
        assert!(load(&[("AURIS_BACKEND", "sqlite")]).is_err());
    }
}

use std::sync::Arc;

use crate::{
    backend::{
        memory::MemoryFactory, supabase::SupabaseFactory, Backend, BackendError, ClientFactory,
        ClientMode,
    },
    config::{BackendConfig, Config, TtsEngine},
    utils::synth::{CommandSynthesizer, GoogleTranslateSynthesizer, SpeechSynthesizer},
};

/// Everything a handler needs, shared through an `Extension`.
pub struct AppContext {
    pub config: Config,
    pub factory: Arc<dyn ClientFactory>,
    pub synthesizer: Arc<dyn SpeechSynthesizer>,
}

impl AppContext {
    pub fn new(
        config: Config,
        factory: Arc<dyn ClientFactory>,
        synthesizer: Arc<dyn SpeechSynthesizer>,
    ) -> Self {
        Self {
            config,
            factory,
            synthesizer,
        }
    }

    /// Wires the configured backend and speech engine.
    pub fn from_config(config: Config) -> anyhow::Result<Self> {
        let factory: Arc<dyn ClientFactory> = match &config.backend {
            BackendConfig::Supabase {
                url,
                anon_key,
                service_role_key,
            } => Arc::new(SupabaseFactory::new(
                url,
                anon_key.clone(),
                service_role_key.clone(),
            )),
            BackendConfig::Memory { jwt_secret } => {
                tracing::warn!("using the in-memory backend; data is lost on exit");
                let factory = MemoryFactory::new(jwt_secret.as_bytes(), &config.public_base_url);
                factory.store().lock().seed_demo_catalog();
                Arc::new(factory)
            }
        };
        let synthesizer: Arc<dyn SpeechSynthesizer> = match config.tts_engine {
            TtsEngine::Gtts => Arc::new(GoogleTranslateSynthesizer::new(reqwest::Client::new())),
            TtsEngine::Espeak => Arc::new(CommandSynthesizer::new(&config.espeak_bin)),
        };
        Ok(Self::new(config, factory, synthesizer))
    }

    pub fn connect(&self, mode: ClientMode) -> Result<Arc<dyn Backend>, BackendError> {
        tracing::debug!(mode = mode.label(), "backend handle");
        self.factory.connect(mode)
    }
}

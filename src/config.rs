//! Configuração do stageline carregada a partir de `stageline.toml`.
//!
//! A struct [`StagelineConfig`] contém todos os parâmetros configuráveis.
//! Valores não presentes no arquivo usam defaults sensíveis; os tempos do
//! loop dependem do [`Profile`] ativo. A variável de ambiente
//! `STAGELINE_PROFILE` tem precedência sobre o arquivo.

use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::engine::EngineSettings;
use crate::error::EngineError;
use crate::queue::{StagePlan, StageSpec};

pub const CONFIG_FILE: &str = "stageline.toml";
pub const PROFILE_ENV: &str = "STAGELINE_PROFILE";

/// Perfil de tempos: produção usa jitter maior e loop de 1s; teste aperta tudo.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Profile {
    #[default]
    Production,
    Test,
}

impl Profile {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "production" | "prod" => Some(Profile::Production),
            "test" => Some(Profile::Test),
            _ => None,
        }
    }

    pub fn jitter_ratio(self) -> f64 {
        match self {
            Profile::Production => 0.15,
            Profile::Test => 0.05,
        }
    }

    pub fn tick_interval_ms(self) -> u64 {
        match self {
            Profile::Production => 1000,
            Profile::Test => 100,
        }
    }

    pub fn callback_timeout_ms(self) -> u64 {
        match self {
            Profile::Production => 5000,
            Profile::Test => 1000,
        }
    }
}

/// Configuração de nível superior carregada de `stageline.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StagelineConfig {
    /// Perfil de tempos ativo.
    #[serde(default)]
    pub profile: Profile,

    /// Identidade desta instância do motor; gerada quando ausente.
    #[serde(default)]
    pub node_id: Option<String>,

    /// Sobrescreve o intervalo do loop do perfil.
    #[serde(default)]
    pub tick_interval_ms: Option<u64>,

    /// Sobrescreve a razão de jitter do perfil.
    #[serde(default)]
    pub jitter_ratio: Option<f64>,

    /// Sobrescreve o timeout do callback do perfil.
    #[serde(default)]
    pub callback_timeout_ms: Option<u64>,

    /// Máximo de tentativas de entrega do callback.
    #[serde(default = "default_max_callback_tries")]
    pub max_callback_tries: u32,

    /// Espera entre tentativas de callback, em milissegundos.
    #[serde(default = "default_callback_backoff_ms")]
    pub callback_backoff_ms: u64,

    /// Etapas do pipeline, em ordem. A última é terminal.
    #[serde(default = "default_stages")]
    pub stages: Vec<StageSpec>,
}

// Valor padrão para tentativas de callback: 3.
fn default_max_callback_tries() -> u32 {
    3
}

// Valor padrão para o backoff do callback: 5000ms.
fn default_callback_backoff_ms() -> u64 {
    5000
}

// Pipeline padrão: só a produção consome tempo.
fn default_stages() -> Vec<StageSpec> {
    vec![
        StageSpec::new("queued", 0),
        StageSpec::new("producing", 60_000),
        StageSpec::new("shipping", 0),
        StageSpec::new("delivered", 0),
    ]
}

impl Default for StagelineConfig {
    fn default() -> Self {
        Self {
            profile: Profile::default(),
            node_id: None,
            tick_interval_ms: None,
            jitter_ratio: None,
            callback_timeout_ms: None,
            max_callback_tries: default_max_callback_tries(),
            callback_backoff_ms: default_callback_backoff_ms(),
            stages: default_stages(),
        }
    }
}

impl StagelineConfig {
    /// Carrega a configuração de `stageline.toml` no diretório atual.
    /// Usa valores padrão se o arquivo não existir.
    pub fn load() -> Result<Self> {
        Self::load_from(Path::new(CONFIG_FILE))
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            toml::from_str::<StagelineConfig>(&contents)?
        } else {
            Self::default()
        };

        // Variável de ambiente tem precedência sobre o arquivo para o perfil.
        config.apply_profile_override(std::env::var(PROFILE_ENV).ok().as_deref());
        Ok(config)
    }

    /// Aplica um valor de perfil vindo do ambiente; valores vazios ou
    /// desconhecidos são ignorados.
    pub fn apply_profile_override(&mut self, value: Option<&str>) {
        if let Some(profile) = value.and_then(Profile::parse) {
            self.profile = profile;
        }
    }

    pub fn plan(&self) -> Result<StagePlan, EngineError> {
        StagePlan::new(self.stages.clone())
    }

    /// Resolve os tempos efetivos: sobrescritas explícitas vencem o perfil.
    pub fn settings(&self) -> EngineSettings {
        let profile = self.profile;
        EngineSettings {
            tick_interval: Duration::from_millis(
                self.tick_interval_ms
                    .unwrap_or_else(|| profile.tick_interval_ms())
                    .max(1),
            ),
            jitter_ratio: self.jitter_ratio.unwrap_or_else(|| profile.jitter_ratio()),
            callback_timeout: Duration::from_millis(
                self.callback_timeout_ms
                    .unwrap_or_else(|| profile.callback_timeout_ms()),
            ),
            max_callback_tries: self.max_callback_tries,
            callback_backoff: Duration::from_millis(self.callback_backoff_ms),
        }
    }
}

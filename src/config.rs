//! Configuração do lote carregada a partir de `batchgen.toml`.
//!
//! A struct [`BatchConfig`] contém todos os parâmetros configuráveis.
//! Valores não presentes no arquivo usam defaults sensíveis.
//! As variáveis de ambiente `OPENAI_API_KEY` e `OPENAI_BASE_URL` têm
//! precedência sobre o arquivo; as flags globais da CLI têm precedência sobre ambos.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::backoff::Backoff;
use crate::cli::{Cli, Command};
use crate::dispatcher::DispatchSettings;
use crate::error::BatchError;
use crate::openai::{DEFAULT_BASE_URL, GenerationParams};

pub const DEFAULT_CONFIG_FILE: &str = "batchgen.toml";

/// Configuração de nível superior carregada de `batchgen.toml`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Chave da API do endpoint de inferência.
    pub api_key: String,

    /// URL base do servidor compatível com OpenAI.
    pub base_url: String,

    /// Identificador do modelo enviado em cada requisição.
    pub model: String,

    /// Máximo de chamadas remotas simultâneas.
    pub concurrency: usize,

    /// Máximo de tentativas por item antes de registrá-lo como falho.
    pub max_retries: u32,

    /// Quantidade de resultados acumulados antes de gravar no disco.
    pub flush_threshold: usize,

    /// Temperatura de amostragem do modo `run` (0.0 para respostas determinísticas).
    pub temperature: f32,

    /// Temperatura do modo `generate`; precisa ser maior que zero para que
    /// as respostas ao mesmo prompt variem.
    pub generate_temperature: f32,

    /// Limite de tokens gerados por resposta.
    pub max_tokens: u32,

    /// Base do backoff exponencial.
    pub backoff_base: u32,

    /// Unidade de tempo do backoff, em milissegundos.
    pub backoff_unit_ms: u64,

    /// Timeout de cada requisição HTTP, em segundos.
    pub request_timeout_secs: u64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: "Qwen/Qwen2-1.5B-Instruct".to_string(),
            concurrency: 40,
            max_retries: 5,
            flush_threshold: 100,
            temperature: 0.0,
            generate_temperature: 0.6,
            max_tokens: 512,
            backoff_base: 2,
            backoff_unit_ms: 1000,
            request_timeout_secs: 120,
        }
    }
}

impl BatchConfig {
    /// Carrega a configuração de `path`, ou de `batchgen.toml` no diretório atual.
    /// Usa valores padrão se o arquivo padrão não existir; um caminho
    /// explícito inexistente é erro.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let default = Path::new(DEFAULT_CONFIG_FILE);
                if default.exists() {
                    Self::from_file(default)?
                } else {
                    Self::default()
                }
            }
        };

        if let Ok(key) = std::env::var("OPENAI_API_KEY")
            && !key.is_empty()
        {
            config.api_key = key;
        }
        if let Ok(url) = std::env::var("OPENAI_BASE_URL")
            && !url.is_empty()
        {
            config.base_url = url;
        }

        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        toml::from_str::<BatchConfig>(&contents)
            .with_context(|| format!("failed to parse {}", path.display()))
    }

    /// Aplica as flags globais da CLI por cima do arquivo.
    pub fn apply_cli(&mut self, cli: &Cli) {
        if let Some(model) = &cli.model {
            self.model = model.clone();
        }
        if let Some(concurrency) = cli.concurrency {
            self.concurrency = concurrency;
        }
        if let Some(max_retries) = cli.max_retries {
            self.max_retries = max_retries;
        }
        if let Some(threshold) = cli.flush_threshold {
            self.flush_threshold = threshold;
        }
        if let Some(temperature) = cli.temperature {
            self.temperature = temperature;
            self.generate_temperature = temperature;
        }
    }

    /// Rejeita valores que deixariam o lote sem progresso.
    pub fn validate(&self) -> Result<(), BatchError> {
        if self.concurrency == 0 {
            return Err(BatchError::Config("concurrency must be at least 1".into()));
        }
        if self.max_retries == 0 {
            return Err(BatchError::Config("max_retries must be at least 1".into()));
        }
        if self.flush_threshold == 0 {
            return Err(BatchError::Config(
                "flush_threshold must be at least 1".into(),
            ));
        }
        if self.model.trim().is_empty() {
            return Err(BatchError::Config("model must not be empty".into()));
        }
        Ok(())
    }

    pub fn generation_params(&self, command: &Command) -> GenerationParams {
        let temperature = match command {
            Command::Run { .. } => self.temperature,
            Command::Generate { .. } => self.generate_temperature,
        };
        GenerationParams {
            temperature,
            max_tokens: self.max_tokens,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn dispatch_settings(&self) -> DispatchSettings {
        DispatchSettings {
            model: self.model.clone(),
            concurrency: self.concurrency,
            max_retries: self.max_retries,
            backoff: Backoff::new(
                self.backoff_base,
                Duration::from_millis(self.backoff_unit_ms),
            ),
        }
    }
}

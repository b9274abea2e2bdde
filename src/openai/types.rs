//! Tipos de dados para o endpoint `/chat/completions` compatível com OpenAI.
//!
//! Cobrem apenas o subconjunto usado pelo lote: uma mensagem de usuário,
//! temperatura e limite de tokens fixos, e o texto da primeira escolha.

use serde::{Deserialize, Serialize};

/// Corpo da requisição para `POST {base_url}/chat/completions`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletionRequest {
    /// Identificador do modelo (ex.: "Qwen/Qwen2-1.5B-Instruct").
    pub model: String,
    /// Mensagens da conversa; o lote envia sempre uma única mensagem de usuário.
    pub messages: Vec<ChatMessage>,
    /// Temperatura de amostragem, fixa durante toda a execução.
    pub temperature: f32,
    /// Número máximo de tokens gerados.
    pub max_tokens: u32,
}

/// Uma mensagem enviada ao modelo.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Papel do remetente: "system", "user" ou "assistant".
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: content.into(),
        }
    }
}

/// Resposta do endpoint `/chat/completions`.
///
/// Servidores compatíveis (vLLM, SiliconFlow, etc.) nem sempre preenchem
/// `id`, `model` ou `usage`, por isso esses campos têm default.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletionResponse {
    #[serde(default)]
    pub id: String,
    pub choices: Vec<Choice>,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub usage: Option<Usage>,
}

impl ChatCompletionResponse {
    /// Texto da primeira escolha, se houver.
    pub fn first_text(&self) -> Option<&str> {
        self.choices
            .first()
            .and_then(|c| c.message.content.as_deref())
    }
}

/// Uma escolha gerada pelo modelo.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Choice {
    #[serde(default)]
    pub index: u32,
    pub message: ResponseMessage,
    /// Motivo da parada ("stop", "length"); `None` se o servidor não informar.
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// Mensagem do assistente dentro de uma escolha. `content` pode vir `null`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseMessage {
    pub role: String,
    pub content: Option<String>,
}

/// Estatísticas de consumo de tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

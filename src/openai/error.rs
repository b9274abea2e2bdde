//! Tipos de erro para o cliente de chat completions compatível com OpenAI.
//!
//! Define [`OpenAiError`] com variantes para rate limiting, erros da API,
//! erros de rede e respostas sem conteúdo. O executor de tarefas trata todas
//! como falha transitória; as variantes existem para o log.

use thiserror::Error;

/// Erros que podem ocorrer em uma única chamada ao endpoint de inferência.
///
/// - [`RateLimited`](OpenAiError::RateLimited): o servidor retornou HTTP 429
/// - [`Api`](OpenAiError::Api): qualquer outro status HTTP não-2xx
/// - [`Network`](OpenAiError::Network): falha de transporte ou timeout
/// - [`EmptyCompletion`](OpenAiError::EmptyCompletion): resposta sem texto
#[derive(Debug, Error)]
pub enum OpenAiError {
    /// O servidor retornou HTTP 429.
    /// `retry_after_ms` vem do cabeçalho `retry-after` (1000ms se ausente).
    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    /// Erro retornado pela API (ex.: 401 chave inválida, 503 sobrecarga).
    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    /// Falha de rede subjacente (DNS, conexão recusada, timeout, corpo inválido).
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// A resposta não trouxe nenhuma escolha ou o conteúdo veio nulo.
    #[error("completion returned no content")]
    EmptyCompletion,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limited_display() {
        let err = OpenAiError::RateLimited {
            retry_after_ms: 5000,
        };
        assert_eq!(err.to_string(), "rate limited, retry after 5000ms");
    }

    #[test]
    fn api_error_display() {
        let err = OpenAiError::Api {
            status: 401,
            message: "Invalid API key".into(),
        };
        assert_eq!(err.to_string(), "API error (status 401): Invalid API key");
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<OpenAiError>();
    }
}

//! Interface de linha de comando do batchgen baseada em clap.
//!
//! Define a struct [`Cli`] com subcomandos [`Command`] (run, generate)
//! e flags globais que sobrescrevem o arquivo de configuração.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::input::DEFAULT_PROMPT_FIELD;

/// batchgen executa lotes de requisições a um modelo de linguagem com
/// concorrência limitada, retentativas e gravação incremental em JSONL.
#[derive(Debug, Parser)]
#[command(name = "batchgen", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Caminho do arquivo de configuração (padrão: ./batchgen.toml).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Modelo a usar nesta execução.
    #[arg(long, global = true)]
    pub model: Option<String>,

    /// Máximo de chamadas simultâneas ao endpoint.
    #[arg(long, global = true)]
    pub concurrency: Option<usize>,

    /// Número máximo de tentativas por item.
    #[arg(long, global = true)]
    pub max_retries: Option<u32>,

    /// Temperatura de amostragem para esta execução (qualquer modo).
    #[arg(long, global = true)]
    pub temperature: Option<f32>,

    /// Resultados acumulados antes de cada gravação.
    #[arg(long, global = true)]
    pub flush_threshold: Option<usize>,

    /// Arquivo JSONL de saída (aberto em modo append).
    #[arg(long, short, global = true, default_value = "results.jsonl")]
    pub output: PathBuf,

    /// Esconde a barra de progresso.
    #[arg(long, short, global = true, default_value_t = false)]
    pub quiet: bool,

    /// Habilita saída detalhada (verbose).
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,

    /// Emite os logs em JSON.
    #[arg(long, global = true, default_value_t = false)]
    pub log_json: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Envia um prompt por registro de um arquivo JSON ou JSONL.
    Run {
        /// Arquivo de entrada (array JSON ou JSON por linha).
        #[arg(long, short)]
        input: PathBuf,

        /// Campo do registro que contém o prompt.
        #[arg(long, default_value = DEFAULT_PROMPT_FIELD)]
        prompt_field: String,

        /// Processa apenas os primeiros N registros.
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Gera N respostas para o mesmo prompt.
    Generate {
        /// Prompt enviado em todas as requisições.
        #[arg(long)]
        prompt: String,

        /// Quantidade de respostas a gerar.
        #[arg(long)]
        count: usize,
    },
}

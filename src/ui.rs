//! Interface de terminal do lote, com barra de progresso e resumo colorido.
//!
//! Usa `indicatif` para a barra de progresso e `console` para estilização.
//! O [`BatchProgress`] apenas observa: avança uma posição por item concluído,
//! seja sucesso, falha ou item descartado, e nunca influencia o despacho.

use console::Style;
use indicatif::{ProgressBar, ProgressStyle};

use crate::dispatcher::RunSummary;
use crate::task::Outcome;

/// Indicador visual de progresso para a execução de um lote.
pub struct BatchProgress {
    // Barra de progresso do indicatif (oculta em testes e com --quiet).
    pb: ProgressBar,
    succeeded: u64,
    failed: u64,
    green: Style,
    red: Style,
    yellow: Style,
}

impl BatchProgress {
    /// Cria a barra com o total de itens e inicia o tick.
    pub fn start(total: u64) -> Self {
        let pb = ProgressBar::new(total);
        pb.set_style(
            ProgressStyle::with_template(
                "{spinner:.cyan} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> "),
        );
        pb.enable_steady_tick(std::time::Duration::from_millis(100));
        Self::with_bar(pb)
    }

    /// Barra que não desenha nada; a contagem continua funcionando.
    pub fn hidden(total: u64) -> Self {
        let pb = ProgressBar::hidden();
        pb.set_length(total);
        Self::with_bar(pb)
    }

    fn with_bar(pb: ProgressBar) -> Self {
        Self {
            pb,
            succeeded: 0,
            failed: 0,
            green: Style::new().green().bold(),
            red: Style::new().red().bold(),
            yellow: Style::new().yellow(),
        }
    }

    /// Registra um item concluído com o seu resultado.
    pub fn record(&mut self, outcome: &Outcome) {
        if outcome.is_success() {
            self.succeeded += 1;
        } else {
            self.failed += 1;
        }
        self.advance();
    }

    /// Avança a barra sem resultado (item descartado por falha de despacho).
    pub fn skip(&mut self) {
        self.advance();
    }

    fn advance(&self) {
        self.pb.inc(1);
        self.pb
            .set_message(format!("ok {} / failed {}", self.succeeded, self.failed));
    }

    /// Quantos itens já foram observados.
    #[cfg(test)]
    pub fn position(&self) -> u64 {
        self.pb.position()
    }

    /// Finaliza a barra e imprime o resumo da execução.
    pub fn finish(&self, summary: &RunSummary) {
        self.pb.finish_and_clear();
        if self.pb.is_hidden() {
            return;
        }
        let headline = if summary.is_clean() {
            self.green.apply_to("✓ Batch completed")
        } else if summary.interrupted {
            self.yellow.apply_to("↯ Batch interrupted")
        } else {
            self.red.apply_to("✗ Batch completed with failures")
        };
        eprintln!("  {headline}");
        eprintln!(
            "  {} succeeded, {} failed, {} skipped of {} in {:.2}s",
            self.green.apply_to(summary.succeeded),
            self.red.apply_to(summary.failed),
            self.yellow.apply_to(summary.skipped),
            summary.total,
            summary.elapsed.as_secs_f64()
        );
    }
}

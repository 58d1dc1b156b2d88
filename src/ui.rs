//! Interface de terminal do stageline: barra de progresso e saída colorida.
//!
//! Usa `indicatif` para a barra de progresso de um item e `console` para
//! estilização. O [`ItemProgress`] acompanha um item enquanto ele percorre
//! as etapas do pipeline.

use console::Style;
use indicatif::{ProgressBar, ProgressStyle};

use stageline::admin::StoreSummary;
use stageline::{QueueItem, StagePlan};

/// Barra de progresso de um único item.
pub struct ItemProgress {
    pb: ProgressBar,
    green: Style,
    red: Style,
    dim: Style,
}

impl ItemProgress {
    /// Cria a barra para o item `item_id`, com o tamanho nominal do pipeline.
    pub fn start(item_id: &str, plan: &StagePlan) -> Self {
        let pb = ProgressBar::new(100);
        let style = ProgressStyle::default_bar()
            .template("{prefix:.bold} [{bar:40.cyan/blue}] {pos:>3}% {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> ");
        pb.set_style(style);
        pb.set_prefix(short_id(item_id).to_string());
        pb.set_message(format!("waiting (~{}s)", plan.total_seconds()));

        Self {
            pb,
            green: Style::new().green().bold(),
            red: Style::new().red().bold(),
            dim: Style::new().dim(),
        }
    }

    /// Reflete o estado persistido do item na barra.
    pub fn update(&self, item: &QueueItem) {
        self.pb.set_position(u64::from(item.progress));
        let stage = item.stage.as_deref().unwrap_or("pending");
        let eta = match item.eta_seconds {
            Some(secs) => format!("eta {secs}s"),
            None => "eta ?".to_string(),
        };
        self.pb
            .set_message(format!("{stage} {}", self.dim.apply_to(eta)));
    }

    /// Finaliza a barra e imprime o histórico de etapas em verde.
    pub fn complete(&self, item: &QueueItem) {
        self.pb.set_position(100);
        self.pb.finish_and_clear();
        println!(
            "  {} {} completed",
            self.green.apply_to("✓"),
            short_id(&item.id)
        );
        for record in &item.history {
            let took = record
                .finished_at
                .map(|end| (end - record.started_at).num_milliseconds().max(0))
                .unwrap_or_default();
            println!("    {:<12} {took:>7}ms", record.stage);
        }
    }

    /// Interrompe a barra com uma mensagem de erro em vermelho.
    pub fn abandon(&self, reason: &str) {
        self.pb.abandon();
        println!("  {} {reason}", self.red.apply_to("✗"));
    }
}

/// Imprime as contagens do armazenamento por status.
pub fn print_summary(summary: &StoreSummary) {
    let green = Style::new().green();
    let yellow = Style::new().yellow();
    let red = Style::new().red();
    println!(
        "{} pending, {} processing, {} completed, {} failed",
        summary.pending,
        yellow.apply_to(summary.processing),
        green.apply_to(summary.completed),
        red.apply_to(summary.failed),
    );
    for entry in &summary.in_flight {
        println!(
            "  {} {:<12} {:>3}% {}",
            short_id(&entry.id),
            entry.stage.as_deref().unwrap_or("-"),
            entry.progress,
            entry.locked_by.as_deref().unwrap_or("(orphan)"),
        );
    }
}

fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}

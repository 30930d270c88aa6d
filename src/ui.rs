//! Interface de terminal do quotato — spinner e saída colorida.
//!
//! Usa `indicatif` para o spinner enquanto a descoberta de fornecedores roda
//! e `console` para estilizar o retrato de status de cada iteração.

use std::collections::BTreeMap;
use std::path::Path;

use console::Style;
use indicatif::{ProgressBar, ProgressStyle};

use crate::state_machine::{JobRegistry, StateKind};

/// Spinner exibido durante uma etapa demorada (descoberta de fornecedores).
pub struct Spinner {
    pb: ProgressBar,
}

impl Spinner {
    pub fn start(message: &str) -> Self {
        let pb = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}") {
            pb.set_style(style);
        }
        pb.set_message(message.to_string());
        pb.enable_steady_tick(std::time::Duration::from_millis(100));
        Self { pb }
    }

    /// Encerra o spinner e imprime o resumo em verde.
    pub fn finish(self, message: &str) {
        self.pb.finish_and_clear();
        println!("  {} {message}", Style::new().green().bold().apply_to("✓"));
    }
}

// Cor associada a cada estado no retrato de status.
fn style_for(kind: StateKind) -> Style {
    match kind {
        StateKind::Completed => Style::new().green().bold(),
        StateKind::Failed => Style::new().red().bold(),
        StateKind::Waiting | StateKind::AwaitingUserInput => Style::new().yellow(),
        StateKind::Pending | StateKind::Running => Style::new().dim(),
    }
}

/// Texto do retrato de status, sem estilo. Separado para os testes.
pub fn status_lines(counts: &BTreeMap<StateKind, usize>, registry: &JobRegistry) -> Vec<String> {
    let mut lines = vec!["Job Status:".to_string()];
    for (kind, count) in counts {
        lines.push(format!("  {}: {count}", kind.label()));
    }

    let waiting = registry.list_by_state(StateKind::Waiting);
    if !waiting.is_empty() {
        lines.push(String::new());
        lines.push("Waiting Jobs:".to_string());
        for job in waiting {
            lines.push(format!("  {}: Waiting for reply", job.vendor_name));
        }
    }

    let needs_input = registry.list_by_state(StateKind::AwaitingUserInput);
    if !needs_input.is_empty() {
        lines.push(String::new());
        lines.push("Jobs Needing User Input:".to_string());
        for job in needs_input {
            lines.push(format!(
                "  {}: {}",
                job.vendor_name,
                job.user_input_needed().unwrap_or_default()
            ));
        }
    }
    lines
}

/// Imprime o cabeçalho da iteração e o retrato de status colorido.
pub fn print_status(iteration: u32, registry: &JobRegistry) {
    println!();
    println!("{}", Style::new().cyan().bold().apply_to(format!("--- Iteration {iteration} ---")));

    let counts = registry.status_counts();
    println!("Job Status:");
    for (kind, count) in &counts {
        let line = format!("  {}: {count}", kind.label());
        if *count > 0 {
            println!("{}", style_for(*kind).apply_to(line));
        } else {
            println!("{line}");
        }
    }
    // As seções de detalhe seguem sem cor.
    for line in status_lines(&counts, registry).into_iter().skip(counts.len() + 1) {
        println!("{line}");
    }
}

/// Linha final com o caminho do relatório.
pub fn print_report_written(path: &Path) {
    println!();
    println!(
        "{} Report generated and saved to {}",
        Style::new().green().bold().apply_to("✓"),
        path.display()
    );
}

//! Interface de linha de comando do quotato baseada em clap.
//!
//! Define a struct [`Cli`] com subcomandos [`Command`] (run, vendors) e flags
//! globais (--config, --verbose). Os argumentos sobrescrevem os valores
//! carregados de `quotato.toml`.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// quotato — pede orçamentos a fornecedores locais e acompanha as respostas.
#[derive(Debug, Parser)]
#[command(name = "quotato", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Caminho do arquivo de configuração (padrão: ./quotato.toml).
    #[arg(long, short, global = true)]
    pub config: Option<PathBuf>,

    /// Habilita saída detalhada (verbose).
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,
}

/// Campos do pedido que podem vir da linha de comando.
#[derive(Debug, Clone, Default, clap::Args)]
pub struct RequestArgs {
    /// Serviço desejado, por exemplo "window replacement".
    #[arg(long)]
    pub service: Option<String>,

    /// Cidade ou região onde o serviço será feito.
    #[arg(long)]
    pub location: Option<String>,

    /// Ignora o cache e gera uma nova lista de fornecedores.
    #[arg(long, default_value_t = false)]
    pub regenerate: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Executa o fluxo completo: descoberta, contato, polling e relatório.
    Run {
        #[command(flatten)]
        request: RequestArgs,

        /// Detalhes do serviço enviados aos fornecedores.
        #[arg(long)]
        details: Option<String>,

        /// Número de iterações do laço de polling.
        #[arg(long)]
        iterations: Option<u32>,

        /// Pausa entre iterações, em milissegundos.
        #[arg(long)]
        delay_ms: Option<u64>,

        /// Caminho do relatório markdown gerado.
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Apenas lista os fornecedores encontrados (ou em cache).
    Vendors {
        #[command(flatten)]
        request: RequestArgs,
    },
}

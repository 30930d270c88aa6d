//! Configuração do quotato carregada a partir de `quotato.toml`.
//!
//! A struct [`QuotatoConfig`] reúne todos os parâmetros da execução: o pedido
//! de orçamento, o acesso ao modelo, os modos de entrega/composição/formulário,
//! o cache de fornecedores e o ritmo do laço de polling. Valores ausentes no
//! arquivo usam defaults sensíveis. Variáveis de ambiente têm precedência
//! sobre o arquivo para segredos e chaves de modo.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::Deserialize;

use crate::error::QuotatoError;

/// Arquivo lido quando `--config` não é informado.
pub const DEFAULT_CONFIG_FILE: &str = "quotato.toml";

/// Configuração de nível superior carregada de `quotato.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct QuotatoConfig {
    /// O que pedir, onde, e em nome de quem.
    #[serde(default)]
    pub request: QuoteRequest,

    #[serde(default)]
    pub llm: LlmSettings,

    /// Envio real por SMTP ou apenas registro no log.
    #[serde(default)]
    pub delivery: DeliveryMode,

    /// Texto gerado pelo modelo ou por templates fixos.
    #[serde(default)]
    pub composition: CompositionMode,

    /// Destino do conteúdo preparado para formulários.
    #[serde(default)]
    pub form_mode: FormMode,

    #[serde(default = "default_forms_dir")]
    pub forms_dir: PathBuf,

    #[serde(default)]
    pub smtp: SmtpSettings,

    #[serde(default)]
    pub discovery: DiscoveryMode,

    /// Diretório do cache JSON de fornecedores.
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,

    /// Número mínimo de fornecedores pedido ao modelo.
    #[serde(default = "default_vendor_count")]
    pub vendor_count: u32,

    #[serde(default)]
    pub replies: ReplySettings,

    /// Iterações do laço de polling; sempre executadas por completo.
    #[serde(default = "default_poll_iterations")]
    pub poll_iterations: u32,

    /// Pausa entre iterações, em milissegundos.
    #[serde(default = "default_poll_delay_ms")]
    pub poll_delay_ms: u64,

    #[serde(default = "default_report_path")]
    pub report_path: PathBuf,

    /// Respostas às perguntas dos fornecedores, por nome do fornecedor.
    #[serde(default)]
    pub answers: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QuoteRequest {
    pub service: String,
    pub location: String,
    pub details: String,
    pub requester_name: String,
    pub requester_email: String,
}

impl Default for QuoteRequest {
    fn default() -> Self {
        Self {
            service: "window replacement".to_string(),
            location: "Seattle".to_string(),
            details: "We have two cracked windows in a single-family home.".to_string(),
            requester_name: "Jeffrey Brown".to_string(),
            requester_email: "jeff@example.com".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    pub api_key: String,
    pub model: String,
    pub max_tokens: u32,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: "claude-haiku-4-5-20251001".to_string(),
            max_tokens: 1024,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SmtpSettings {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl Default for SmtpSettings {
    fn default() -> Self {
        Self {
            host: "smtp.gmail.com".to_string(),
            port: 465,
            username: None,
            password: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReplySettings {
    pub mode: ReplyMode,
    /// Chance de cada job em espera receber resposta por iteração (modo simulado).
    pub reply_chance: f64,
    /// Semente do gerador aleatório; `None` usa entropia do sistema.
    pub seed: Option<u64>,
    pub inbox_dir: PathBuf,
}

impl Default for ReplySettings {
    fn default() -> Self {
        Self {
            mode: ReplyMode::Simulated,
            reply_chance: 0.3,
            seed: None,
            inbox_dir: PathBuf::from("replies"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeliveryMode {
    #[default]
    Mock,
    Smtp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CompositionMode {
    #[default]
    Llm,
    Template,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FormMode {
    #[default]
    Mock,
    Save,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DiscoveryMode {
    #[default]
    Llm,
    CacheOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReplyMode {
    #[default]
    Simulated,
    Inbox,
}

fn default_forms_dir() -> PathBuf {
    PathBuf::from("forms")
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_vendor_count() -> u32 {
    5
}

fn default_poll_iterations() -> u32 {
    10
}

fn default_poll_delay_ms() -> u64 {
    1000
}

fn default_report_path() -> PathBuf {
    PathBuf::from("report.md")
}

impl Default for QuotatoConfig {
    fn default() -> Self {
        Self {
            request: QuoteRequest::default(),
            llm: LlmSettings::default(),
            delivery: DeliveryMode::default(),
            composition: CompositionMode::default(),
            form_mode: FormMode::default(),
            forms_dir: default_forms_dir(),
            smtp: SmtpSettings::default(),
            discovery: DiscoveryMode::default(),
            cache_dir: default_cache_dir(),
            vendor_count: default_vendor_count(),
            replies: ReplySettings::default(),
            poll_iterations: default_poll_iterations(),
            poll_delay_ms: default_poll_delay_ms(),
            report_path: default_report_path(),
            answers: BTreeMap::new(),
        }
    }
}

impl QuotatoConfig {
    /// Carrega a configuração de `path`, ou de `quotato.toml` no diretório
    /// atual quando nenhum caminho é dado. Um caminho explícito inexistente é
    /// erro; o arquivo padrão ausente resulta nos valores padrão.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => {
                if !p.exists() {
                    bail!("config file {} does not exist", p.display());
                }
                Self::from_file(p)?
            }
            None => {
                let p = Path::new(DEFAULT_CONFIG_FILE);
                if p.exists() {
                    Self::from_file(p)?
                } else {
                    Self::default()
                }
            }
        };

        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let config = toml::from_str::<QuotatoConfig>(&contents)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        Ok(config)
    }

    /// Aplica as variáveis de ambiente sobre os valores do arquivo.
    ///
    /// `lookup` abstrai `std::env::var` para os testes.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.is_empty());

        if let Some(key) = non_empty("ANTHROPIC_API_KEY") {
            self.llm.api_key = key;
        }
        if let Some(user) = non_empty("SMTP_USER") {
            self.smtp.username = Some(user);
        }
        if let Some(pass) = non_empty("SMTP_PASS") {
            self.smtp.password = Some(pass);
        }
        if let Some(mock) = non_empty("QUOTATO_MOCK_EMAIL").and_then(|v| parse_flag(&v)) {
            self.delivery = if mock {
                DeliveryMode::Mock
            } else {
                DeliveryMode::Smtp
            };
        }
        if let Some(mock) = non_empty("QUOTATO_MOCK_FORM").and_then(|v| parse_flag(&v)) {
            self.form_mode = if mock { FormMode::Mock } else { FormMode::Save };
        }
    }

    /// Rejeita combinações que fariam a execução falhar no meio do caminho.
    pub fn validate(&self) -> Result<(), QuotatoError> {
        if self.request.service.trim().is_empty() {
            return Err(QuotatoError::Config("request.service must not be empty".into()));
        }
        if !(0.0..=1.0).contains(&self.replies.reply_chance) {
            return Err(QuotatoError::Config(format!(
                "replies.reply_chance must be between 0 and 1, got {}",
                self.replies.reply_chance
            )));
        }
        if self.vendor_count == 0 {
            return Err(QuotatoError::Config("vendor_count must be at least 1".into()));
        }
        if self.llm.api_key.is_empty() {
            let needs_llm = [
                (self.composition == CompositionMode::Llm, "composition = \"llm\""),
                (self.discovery == DiscoveryMode::Llm, "discovery = \"llm\""),
                (self.replies.mode == ReplyMode::Inbox, "replies.mode = \"inbox\""),
            ];
            if let Some((_, what)) = needs_llm.iter().find(|(on, _)| *on) {
                return Err(QuotatoError::Config(format!(
                    "{what} requires an API key; set ANTHROPIC_API_KEY or llm.api_key"
                )));
            }
        }
        Ok(())
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

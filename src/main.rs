mod anthropic;
mod cli;
mod compose;
mod config;
mod delivery;
mod discovery;
mod error;
mod orchestrator;
mod replies;
mod report;
mod state_machine;
mod ui;
mod vendor;

use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use anthropic::AnthropicClient;
use cli::{Cli, Command, RequestArgs};
use compose::{Composer, LlmComposer, TemplateComposer};
use config::{
    CompositionMode, DeliveryMode, DiscoveryMode, LlmSettings, QuotatoConfig, ReplyMode,
};
use delivery::{FormSink, Mailer, MockMailer, SmtpMailer};
use discovery::{CachedDiscovery, LlmVendorFinder, VendorCache, VendorDiscovery};
use orchestrator::{Collaborators, QuoteOrchestrator, RunOptions};
use replies::{InboxDirectory, LlmClassifier, Replies, SimulatedInbox};
use report::ReportRenderer;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut config = QuotatoConfig::load(cli.config.as_deref())?;

    match cli.command {
        Command::Run {
            request,
            details,
            iterations,
            delay_ms,
            report,
        } => {
            apply_request_args(&mut config, &request);
            if let Some(details) = details {
                config.request.details = details;
            }
            if let Some(n) = iterations {
                config.poll_iterations = n;
            }
            if let Some(ms) = delay_ms {
                config.poll_delay_ms = ms;
            }
            if let Some(path) = report {
                config.report_path = path;
            }
            config.validate()?;
            run(config, request.regenerate).await
        }
        Command::Vendors { request } => {
            apply_request_args(&mut config, &request);
            config.validate()?;
            list_vendors(&config, request.regenerate).await
        }
    }
}

/// Logs go to stderr so the status snapshots on stdout stay readable.
/// `RUST_LOG` wins over `--verbose`.
fn init_tracing(verbose: bool) {
    let default = if verbose { "quotato=debug" } else { "quotato=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

fn apply_request_args(config: &mut QuotatoConfig, args: &RequestArgs) {
    if let Some(service) = &args.service {
        config.request.service = service.clone();
    }
    if let Some(location) = &args.location {
        config.request.location = location.clone();
    }
}

fn llm_client(settings: &LlmSettings) -> Result<Option<AnthropicClient>> {
    if settings.api_key.is_empty() {
        return Ok(None);
    }
    let client = AnthropicClient::new(settings.api_key.clone())
        .context("failed to build Anthropic client")?;
    Ok(Some(client))
}

fn build_discovery(
    config: &QuotatoConfig,
    client: Option<&AnthropicClient>,
    regenerate: bool,
) -> CachedDiscovery<LlmVendorFinder<AnthropicClient>> {
    let inner = match config.discovery {
        DiscoveryMode::Llm => client
            .cloned()
            .map(|c| LlmVendorFinder::new(c, config.llm.clone(), config.vendor_count)),
        DiscoveryMode::CacheOnly => None,
    };
    CachedDiscovery::new(VendorCache::new(&config.cache_dir), inner, regenerate)
}

async fn run(config: QuotatoConfig, regenerate: bool) -> Result<()> {
    let client = llm_client(&config.llm)?;
    let missing_key = || anyhow::anyhow!("an API key is required; set ANTHROPIC_API_KEY");

    let composer = match config.composition {
        CompositionMode::Llm => Composer::Llm(LlmComposer::new(
            client.clone().ok_or_else(missing_key)?,
            config.llm.clone(),
        )),
        CompositionMode::Template => Composer::Template(TemplateComposer),
    };
    let mailer = match config.delivery {
        DeliveryMode::Mock => Mailer::Mock(MockMailer::new()),
        DeliveryMode::Smtp => Mailer::Smtp(SmtpMailer::new(&config.smtp)?),
    };
    let replies = match config.replies.mode {
        ReplyMode::Simulated => Replies::Simulated(SimulatedInbox::new(
            config.replies.reply_chance,
            config.replies.seed,
        )),
        ReplyMode::Inbox => Replies::Inbox(InboxDirectory::new(
            &config.replies.inbox_dir,
            LlmClassifier::new(client.clone().ok_or_else(missing_key)?, config.llm.clone()),
        )),
    };

    let parts = Collaborators {
        discovery: build_discovery(&config, client.as_ref(), regenerate),
        composer,
        mailer,
        replies,
        forms: FormSink::new(config.form_mode, &config.forms_dir),
        report: ReportRenderer::new(&config.report_path),
    };
    let options = RunOptions {
        poll_iterations: config.poll_iterations,
        poll_delay: Duration::from_millis(config.poll_delay_ms),
        answers: config.answers.clone(),
        print_status: true,
    };

    println!(
        "Requesting quotes for {} in {}",
        config.request.service, config.request.location
    );
    let mut orchestrator = QuoteOrchestrator::new(config.request, parts, options);
    let summary = orchestrator.run().await?;

    let counts: Vec<String> = summary
        .counts
        .iter()
        .filter(|(_, n)| **n > 0)
        .map(|(kind, n)| format!("{kind}={n}"))
        .collect();
    tracing::info!(
        run_id = %summary.run_id,
        vendors = summary.vendors,
        states = %counts.join(" "),
        "run finished"
    );
    ui::print_report_written(&summary.report_path);
    Ok(())
}

async fn list_vendors(config: &QuotatoConfig, regenerate: bool) -> Result<()> {
    let client = llm_client(&config.llm)?;
    let discovery = build_discovery(config, client.as_ref(), regenerate);

    let spinner = ui::Spinner::start(&format!(
        "Finding {} vendors in {}...",
        config.request.service, config.request.location
    ));
    let vendors = discovery
        .find_vendors(&config.request.service, &config.request.location)
        .await?;
    spinner.finish(&format!("Found {} vendors", vendors.len()));

    for (index, vendor) in vendors.iter().enumerate() {
        let id = vendor::VendorId::new(index, &vendor.name);
        println!("{id}  {}", vendor.name);
        match vendor.contact_method() {
            vendor::ContactMethod::Email { address } => println!("      email: {address}"),
            vendor::ContactMethod::Form { url } => println!("      form:  {url}"),
            vendor::ContactMethod::Unknown => println!("      no contact channel"),
        }
        if let Some(phone) = &vendor.phone {
            println!("      phone: {phone}");
        }
    }
    Ok(())
}

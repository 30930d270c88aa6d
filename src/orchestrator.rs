use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use std::time::Duration;

use tokio::time::sleep;
use tracing::Instrument;
use uuid::Uuid;

use crate::compose::{MessageComposer, retry_once};
use crate::config::QuoteRequest;
use crate::delivery::{FormSink, MessageDelivery, OutgoingEmail};
use crate::discovery::VendorDiscovery;
use crate::error::{QuotatoError, Result};
use crate::replies::{ReplySource, apply_classification};
use crate::report::{ReportRenderer, collect_outcomes};
use crate::state_machine::{Job, JobRegistry, JobState, StateKind};
use crate::ui;
use crate::vendor::{ContactMethod, Vendor, VendorId};

/// The external services one run talks to.
pub struct Collaborators<D, C, M, R> {
    pub discovery: D,
    pub composer: C,
    pub mailer: M,
    pub replies: R,
    pub forms: FormSink,
    pub report: ReportRenderer,
}

/// Pacing and extras for one run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub poll_iterations: u32,
    pub poll_delay: Duration,
    /// Vendor name → answer to that vendor's question.
    pub answers: BTreeMap<String, String>,
    /// Print a status snapshot to stdout after every iteration.
    pub print_status: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            poll_iterations: 10,
            poll_delay: Duration::from_secs(1),
            answers: BTreeMap::new(),
            print_status: false,
        }
    }
}

/// What a finished run produced.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub vendors: usize,
    pub counts: BTreeMap<StateKind, usize>,
    pub report_path: PathBuf,
}

/// Drives every vendor job of one quote request from first contact to the
/// final report.
pub struct QuoteOrchestrator<D, C, M, R> {
    request: QuoteRequest,
    parts: Collaborators<D, C, M, R>,
    options: RunOptions,
    registry: JobRegistry,
    answered: HashSet<VendorId>,
    run_id: Uuid,
}

impl<D, C, M, R> QuoteOrchestrator<D, C, M, R>
where
    D: VendorDiscovery,
    C: MessageComposer,
    M: MessageDelivery,
    R: ReplySource,
{
    pub fn new(request: QuoteRequest, parts: Collaborators<D, C, M, R>, options: RunOptions) -> Self {
        Self {
            request,
            parts,
            options,
            registry: JobRegistry::new(),
            answered: HashSet::new(),
            run_id: Uuid::new_v4(),
        }
    }

    /// Discovers vendors, contacts each one, polls for replies for the
    /// configured number of iterations and writes the report.
    ///
    /// Per-vendor failures end up as failed jobs; only a report that cannot
    /// be written fails the run.
    pub async fn run(&mut self) -> Result<RunSummary> {
        let span = tracing::info_span!("run", run_id = %self.run_id);
        self.run_inner().instrument(span).await
    }

    async fn run_inner(&mut self) -> Result<RunSummary> {
        let vendors = self.discover().await;
        tracing::info!(count = vendors.len(), "found vendors");

        for (index, vendor) in vendors.iter().enumerate() {
            let id = self.register(index, vendor);
            self.initial_contact(&id).await;
        }
        self.registry.finalize_terminal();

        let iterations = self.options.poll_iterations;
        for iteration in 1..=iterations {
            self.answer_questions().await;
            self.poll_once().await;
            self.registry.finalize_terminal();

            if self.options.print_status {
                ui::print_status(iteration, &self.registry);
            }
            if iteration < iterations && !self.options.poll_delay.is_zero() {
                sleep(self.options.poll_delay).await;
            }
        }

        let outcomes = collect_outcomes(self.registry.all_jobs());
        let report_path = self.parts.report.render(&self.request, &vendors, &outcomes)?;

        Ok(RunSummary {
            run_id: self.run_id,
            vendors: vendors.len(),
            counts: self.registry.status_counts(),
            report_path,
        })
    }

    async fn discover(&self) -> Vec<Vendor> {
        let spinner = self.options.print_status.then(|| {
            ui::Spinner::start(&format!(
                "Finding {} vendors in {}...",
                self.request.service, self.request.location
            ))
        });
        let vendors = match self
            .parts
            .discovery
            .find_vendors(&self.request.service, &self.request.location)
            .await
        {
            Ok(vendors) => vendors,
            Err(e) => {
                tracing::warn!(error = %e, "vendor discovery failed, continuing with no vendors");
                Vec::new()
            }
        };
        if let Some(spinner) = spinner {
            spinner.finish(&format!("Found {} vendors", vendors.len()));
        }
        vendors
    }

    fn register(&mut self, index: usize, vendor: &Vendor) -> VendorId {
        let id = VendorId::new(index, &vendor.name);
        let job = Job::new(
            id.clone(),
            vendor.name.clone(),
            self.request.service.clone(),
            self.request.details.clone(),
            vendor.contact_method(),
        );
        self.registry.add(job);
        id
    }

    async fn initial_contact(&mut self, id: &VendorId) {
        let Some(job) = self.registry.find_mut(id) else {
            return;
        };
        if let Err(e) = job.update_state(JobState::Running, Some("Initiating contact")) {
            tracing::error!(vendor = %id, error = %e, "could not start job");
            return;
        }
        let contact = job.contact.clone();

        let outcome = match &contact {
            ContactMethod::Unknown => Err("No contact method available".to_string()),
            _ => self
                .reach_vendor(id, &contact, None)
                .await
                .map_err(|e| QuotatoError::ContactInitiation(e.to_string()).to_string()),
        };

        let Some(job) = self.registry.find_mut(id) else {
            return;
        };
        let result = match outcome {
            Ok(message) => {
                tracing::info!(vendor = %job.vendor_name, "{message}");
                job.update_state(JobState::Waiting, Some(message))
            }
            Err(reason) => {
                tracing::warn!(vendor = %job.vendor_name, %reason, "contact failed");
                job.mark_failed(reason)
            }
        };
        if let Err(e) = result {
            tracing::error!(vendor = %id, error = %e, "unexpected transition");
        }
    }

    /// Sends the outreach (or, with `follow_up`, an answer to the vendor's
    /// question) over the job's channel.
    async fn reach_vendor(
        &self,
        id: &VendorId,
        contact: &ContactMethod,
        follow_up: Option<(&str, &str)>,
    ) -> Result<&'static str> {
        let composer = &self.parts.composer;
        let request = &self.request;

        match contact {
            ContactMethod::Email { address } => {
                let (body, subject) = match follow_up {
                    None => (
                        retry_once("outreach email", move || composer.compose_outreach(request))
                            .await?,
                        self.subject(),
                    ),
                    Some((question, answer)) => (
                        retry_once("follow-up email", move || {
                            composer.compose_follow_up(request, question, answer)
                        })
                        .await?,
                        format!("Re: {}", self.subject()),
                    ),
                };
                let email = OutgoingEmail {
                    to: address.clone(),
                    from: request.requester_email.clone(),
                    subject,
                    body,
                };
                self.parts.mailer.deliver(&email).await?;
                Ok(if follow_up.is_some() {
                    "Follow-up sent"
                } else {
                    "Email sent, awaiting reply"
                })
            }
            ContactMethod::Form { url } => {
                let content = match follow_up {
                    None => {
                        retry_once("form content", move || composer.compose_form_content(request))
                            .await?
                    }
                    Some((question, answer)) => {
                        retry_once("follow-up form content", move || {
                            composer.compose_follow_up(request, question, answer)
                        })
                        .await?
                    }
                };
                self.parts.forms.prepare(id, url, &content)?;
                Ok(if follow_up.is_some() {
                    "Follow-up sent"
                } else {
                    "Form submission prepared"
                })
            }
            ContactMethod::Unknown => Err(QuotatoError::ContactInitiation(
                "No contact method available".into(),
            )),
        }
    }

    fn subject(&self) -> String {
        format!(
            "Quote request: {} in {}",
            self.request.service, self.request.location
        )
    }

    /// Answers pending vendor questions from the answer book, once per job.
    async fn answer_questions(&mut self) {
        let pending: Vec<(VendorId, String, String)> = self
            .registry
            .list_by_state(StateKind::AwaitingUserInput)
            .into_iter()
            .filter(|job| !self.answered.contains(&job.vendor_id))
            .filter_map(|job| {
                let answer = self.options.answers.get(&job.vendor_name)?;
                let question = job.user_input_needed()?;
                Some((job.vendor_id.clone(), question.to_string(), answer.clone()))
            })
            .collect();

        for (id, question, answer) in pending {
            self.answered.insert(id.clone());
            let Some(job) = self.registry.find_mut(&id) else {
                continue;
            };
            if !job.record_user_response(&answer) {
                continue;
            }
            let contact = job.contact.clone();

            let outcome = self
                .reach_vendor(&id, &contact, Some((question.as_str(), answer.as_str())))
                .await;

            let Some(job) = self.registry.find_mut(&id) else {
                continue;
            };
            let result = match outcome {
                Ok(message) => job.update_state(JobState::Waiting, Some(message)),
                Err(e) => job.mark_failed(format!("Follow-up failed: {e}")),
            };
            if let Err(e) = result {
                tracing::error!(vendor = %id, error = %e, "unexpected transition");
            }
        }
    }

    async fn poll_once(&mut self) {
        let replies = {
            let waiting = self.registry.list_by_state(StateKind::Waiting);
            self.parts.replies.poll_replies(&waiting).await
        };

        for (id, reply) in replies {
            let Some(job) = self.registry.find_mut(&id) else {
                tracing::warn!(vendor = %id, "reply for unknown job ignored");
                continue;
            };
            let result = match reply {
                Ok(classification) => {
                    tracing::info!(vendor = %job.vendor_name, ?classification, "reply received");
                    apply_classification(job, classification)
                }
                Err(e @ QuotatoError::Classification(_)) => job.mark_failed(e.to_string()),
                Err(e) => job.mark_failed(format!("Reply classification failed: {e}")),
            };
            if let Err(e) = result {
                tracing::error!(vendor = %id, error = %e, "unexpected transition");
            }
        }
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::state::{JobState, StateKind, StateMachine};
use crate::error::Result;
use crate::vendor::{ContactMethod, VendorId};

/// A price quote extracted from a vendor reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub amount: Option<f64>,
    #[serde(default = "default_currency")]
    pub currency: String,
    pub description: String,
}

fn default_currency() -> String {
    "USD".to_string()
}

impl Quote {
    pub fn new(amount: Option<f64>, description: impl Into<String>) -> Self {
        Self {
            amount,
            currency: default_currency(),
            description: description.into(),
        }
    }

    /// "$850", "$1249.50", or "$N/A" when the vendor gave no figure.
    pub fn amount_display(&self) -> String {
        match self.amount {
            Some(a) if a.fract() == 0.0 => format!("${a:.0}"),
            Some(a) => format!("${a:.2}"),
            None => "$N/A".to_string(),
        }
    }
}

/// Outcome payload of a finished job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JobResult {
    Quote(Quote),
    Error { error: String },
}

/// One line of a job's history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub timestamp: DateTime<Utc>,
    pub state: StateKind,
    pub message: Option<String>,
}

/// A single vendor contact attempt and everything that happened to it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub vendor_id: VendorId,
    pub vendor_name: String,
    pub service: String,
    pub details: String,
    pub contact: ContactMethod,
    pub created_at: DateTime<Utc>,
    state: JobState,
    history: Vec<HistoryEntry>,
}

impl Job {
    pub fn new(
        vendor_id: VendorId,
        vendor_name: impl Into<String>,
        service: impl Into<String>,
        details: impl Into<String>,
        contact: ContactMethod,
    ) -> Self {
        Self {
            vendor_id,
            vendor_name: vendor_name.into(),
            service: service.into(),
            details: details.into(),
            contact,
            created_at: Utc::now(),
            state: JobState::Pending,
            history: Vec::new(),
        }
    }

    #[allow(dead_code)]
    pub fn state(&self) -> &JobState {
        &self.state
    }

    pub fn kind(&self) -> StateKind {
        self.state.kind()
    }

    pub fn is_terminal(&self) -> bool {
        self.kind().is_terminal()
    }

    #[allow(dead_code)]
    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }

    /// The quote on completion, the error on failure, nothing otherwise.
    #[allow(dead_code)]
    pub fn result(&self) -> Option<JobResult> {
        match &self.state {
            JobState::Completed { quote } => Some(JobResult::Quote(quote.clone())),
            JobState::Failed { reason } => Some(JobResult::Error {
                error: reason.clone(),
            }),
            _ => None,
        }
    }

    /// The vendor's pending question, only while awaiting user input.
    pub fn user_input_needed(&self) -> Option<&str> {
        match &self.state {
            JobState::AwaitingUserInput { question } => Some(question),
            _ => None,
        }
    }

    /// Moves the job to `new_state` if the transition table allows it and
    /// appends one history entry. Illegal transitions leave the job as is.
    pub fn update_state(&mut self, new_state: JobState, message: Option<&str>) -> Result<()> {
        let from = self.kind();
        let to = new_state.kind();
        StateMachine::check(from, to)?;

        tracing::debug!(
            vendor = %self.vendor_id,
            %from,
            %to,
            message = message.unwrap_or(""),
            "job transition"
        );
        self.state = new_state;
        self.history.push(HistoryEntry {
            timestamp: Utc::now(),
            state: to,
            message: message.map(str::to_string),
        });
        Ok(())
    }

    pub fn mark_needs_input(&mut self, question: impl Into<String>) -> Result<()> {
        let question = question.into();
        let message = format!("Needs input: {question}");
        self.update_state(JobState::AwaitingUserInput { question }, Some(&message))
    }

    /// Records the user's answer to the pending question and resumes the
    /// job. Returns `false` and changes nothing when no question is pending.
    pub fn record_user_response(&mut self, answer: &str) -> bool {
        if self.user_input_needed().is_none() {
            return false;
        }
        let message = format!("User provided: {answer}");
        self.update_state(JobState::Running, Some(&message)).is_ok()
    }

    pub fn mark_complete(&mut self, quote: Quote) -> Result<()> {
        let message = format!("Quote received: {}", quote.amount_display());
        self.update_state(JobState::Completed { quote }, Some(&message))
    }

    pub fn mark_failed(&mut self, reason: impl Into<String>) -> Result<()> {
        let reason = reason.into();
        let message = reason.clone();
        self.update_state(JobState::Failed { reason }, Some(&message))
    }

    /// One-line outcome used in the final report.
    pub fn outcome_line(&self) -> String {
        match &self.state {
            JobState::Completed { quote } => format!("Quote received: {}", quote.amount_display()),
            JobState::Failed { reason } => format!("Failed: {reason}"),
            JobState::AwaitingUserInput { question } => format!("Needs info: {question}"),
            other => format!("Status: {other}"),
        }
    }
}

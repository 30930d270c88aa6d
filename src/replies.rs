//! Reply ingestion: where vendor replies come from and how they are read.

use std::cell::RefCell;
use std::path::PathBuf;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Deserialize;

use crate::anthropic::{MessageSender, MessagesRequest, extract_json};
use crate::config::LlmSettings;
use crate::error::{QuotatoError, Result};
use crate::state_machine::{Job, Quote};
use crate::vendor::VendorId;

/// What a vendor's reply amounts to.
#[derive(Debug, Clone, PartialEq)]
pub enum Classification {
    Quote {
        amount: Option<f64>,
        description: String,
    },
    NeedsInfo {
        questions: Vec<String>,
    },
    Decline {
        reason: String,
    },
}

/// Drives `job` to the state the classification implies.
pub fn apply_classification(job: &mut Job, classification: Classification) -> Result<()> {
    match classification {
        Classification::Quote {
            amount,
            description,
        } => job.mark_complete(Quote::new(amount, description)),
        Classification::NeedsInfo { questions } => {
            let questions: Vec<&str> = questions
                .iter()
                .map(|q| q.trim())
                .filter(|q| !q.is_empty())
                .collect();
            if questions.is_empty() {
                job.mark_needs_input("Vendor asked for more information")
            } else {
                job.mark_needs_input(questions.join("; "))
            }
        }
        Classification::Decline { reason } => {
            let reason = if reason.trim().is_empty() {
                "Vendor declined".to_string()
            } else {
                reason
            };
            job.mark_failed(reason)
        }
    }
}

/// A reply for one waiting job, or the error hit while reading it.
pub type PolledReply = (VendorId, Result<Classification>);

#[allow(async_fn_in_trait)]
pub trait ReplySource {
    /// Checks each waiting job for a reply. Jobs without one are left out.
    async fn poll_replies(&self, waiting: &[&Job]) -> Vec<PolledReply>;
}

/// Canned vendor replies used by [`SimulatedInbox`].
fn canned_replies() -> [Classification; 3] {
    [
        Classification::Quote {
            amount: Some(850.0),
            description: "Thank you for your inquiry. We can replace your two windows for $850 \
                total, including materials and labor. Let me know if you'd like to proceed."
                .to_string(),
        },
        Classification::NeedsInfo {
            questions: vec!["What are the dimensions of the windows?".to_string()],
        },
        Classification::Decline {
            reason: "Vendor unavailable".to_string(),
        },
    ]
}

/// Pretends vendors answer: each waiting job independently gets a reply
/// with probability `chance`, picked uniformly from the canned replies.
pub struct SimulatedInbox {
    rng: RefCell<StdRng>,
    chance: f64,
}

impl SimulatedInbox {
    pub fn new(chance: f64, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        };
        Self {
            rng: RefCell::new(rng),
            chance: chance.clamp(0.0, 1.0),
        }
    }
}

impl ReplySource for SimulatedInbox {
    async fn poll_replies(&self, waiting: &[&Job]) -> Vec<PolledReply> {
        let mut rng = self.rng.borrow_mut();
        let mut replies = Vec::new();
        for job in waiting {
            if rng.gen_bool(self.chance) {
                let canned = canned_replies();
                let pick = rng.gen_range(0..canned.len());
                tracing::debug!(vendor = %job.vendor_id, "simulated reply");
                replies.push((job.vendor_id.clone(), Ok(canned[pick].clone())));
            }
        }
        replies
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Amount {
    Number(f64),
    Text(String),
}

#[derive(Debug, Deserialize)]
struct RawClassification {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    amount: Option<Amount>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    question: Option<OneOrMany>,
    #[serde(default)]
    questions: Option<OneOrMany>,
    #[serde(default)]
    reason: Option<String>,
}

fn parse_amount(amount: Option<Amount>) -> Option<f64> {
    match amount? {
        Amount::Number(n) => Some(n),
        Amount::Text(t) => t
            .trim()
            .trim_start_matches('$')
            .replace(',', "")
            .parse()
            .ok(),
    }
}

/// Turns the model's JSON verdict into a [`Classification`].
pub fn parse_classification(text: &str) -> Result<Classification> {
    let raw: RawClassification = serde_json::from_str(extract_json(text))
        .map_err(|e| QuotatoError::Classification(format!("unparseable verdict: {e}")))?;

    match raw.kind.to_ascii_lowercase().as_str() {
        "quote" => Ok(Classification::Quote {
            amount: parse_amount(raw.amount),
            description: raw.description.unwrap_or_default(),
        }),
        "needs_info" | "need_info" => {
            let questions = match raw.questions.or(raw.question) {
                Some(OneOrMany::One(q)) => vec![q],
                Some(OneOrMany::Many(qs)) => qs,
                None => Vec::new(),
            };
            Ok(Classification::NeedsInfo { questions })
        }
        "decline" => Ok(Classification::Decline {
            reason: raw.reason.unwrap_or_default(),
        }),
        other => Err(QuotatoError::Classification(format!(
            "unknown reply type {other:?}"
        ))),
    }
}

/// Classifies free-text vendor replies with the model.
pub struct LlmClassifier<S> {
    sender: S,
    settings: LlmSettings,
}

impl<S: MessageSender> LlmClassifier<S> {
    pub fn new(sender: S, settings: LlmSettings) -> Self {
        Self { sender, settings }
    }

    pub async fn classify(&self, job: &Job, reply: &str) -> Result<Classification> {
        let prompt = format!(
            "A {service} vendor named {vendor} replied to a quote request. \
             Classify the reply. Respond with ONLY valid JSON, no other text.\n\
             \n\
             One of:\n\
             {{\"type\": \"quote\", \"amount\": <number or null>, \"description\": \"<one sentence>\"}}\n\
             {{\"type\": \"needs_info\", \"questions\": [\"<question the vendor asked>\"]}}\n\
             {{\"type\": \"decline\", \"reason\": \"<short reason>\"}}\n\
             \n\
             Reply:\n{reply}",
            service = job.service,
            vendor = job.vendor_name,
        );
        let req = MessagesRequest::user(&self.settings.model, self.settings.max_tokens, prompt);
        let text = self
            .sender
            .send_message(&req)
            .await
            .map_err(|e| QuotatoError::Classification(e.to_string()))?
            .text()
            .map_err(|e| QuotatoError::Classification(e.to_string()))?;
        parse_classification(&text)
    }
}

/// Reads replies dropped into a directory as `<vendor_id>.txt` and
/// classifies them. A read file is renamed to `.processed`.
pub struct InboxDirectory<S> {
    dir: PathBuf,
    classifier: LlmClassifier<S>,
}

impl<S: MessageSender> InboxDirectory<S> {
    pub fn new(dir: impl Into<PathBuf>, classifier: LlmClassifier<S>) -> Self {
        Self {
            dir: dir.into(),
            classifier,
        }
    }

    async fn read_one(&self, job: &Job) -> Option<Result<Classification>> {
        let path = self.dir.join(format!("{}.txt", job.vendor_id));
        if !path.exists() {
            return None;
        }
        let text = match std::fs::read_to_string(&path) {
            Ok(t) => t,
            Err(e) => {
                return Some(Err(QuotatoError::Classification(format!(
                    "{}: {e}",
                    path.display()
                ))));
            }
        };
        if let Err(e) = std::fs::rename(&path, path.with_extension("processed")) {
            tracing::warn!(path = %path.display(), error = %e, "could not mark reply processed");
        }
        tracing::info!(vendor = %job.vendor_id, "reply found in inbox");
        Some(self.classifier.classify(job, &text).await)
    }
}

impl<S: MessageSender> ReplySource for InboxDirectory<S> {
    async fn poll_replies(&self, waiting: &[&Job]) -> Vec<PolledReply> {
        let mut replies = Vec::new();
        for job in waiting {
            if let Some(result) = self.read_one(job).await {
                replies.push((job.vendor_id.clone(), result));
            }
        }
        replies
    }
}

/// Reply source chosen from configuration.
pub enum Replies<S> {
    Simulated(SimulatedInbox),
    Inbox(InboxDirectory<S>),
}

impl<S: MessageSender> ReplySource for Replies<S> {
    async fn poll_replies(&self, waiting: &[&Job]) -> Vec<PolledReply> {
        match self {
            Replies::Simulated(s) => s.poll_replies(waiting).await,
            Replies::Inbox(i) => i.poll_replies(waiting).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anthropic::AnthropicError;
    use crate::anthropic::types::{ContentBlock, MessagesResponse, Usage};
    use crate::state_machine::{JobResult, JobState, StateKind};
    use crate::vendor::ContactMethod;
    use std::cell::Cell;

    struct MockClient {
        response: std::result::Result<String, ()>,
        max_tokens_seen: Cell<Option<u32>>,
    }

    impl MockClient {
        fn new(response: std::result::Result<String, ()>) -> Self {
            Self {
                response,
                max_tokens_seen: Cell::new(None),
            }
        }
    }

    impl MessageSender for MockClient {
        async fn send_message(
            &self,
            req: &MessagesRequest,
        ) -> std::result::Result<MessagesResponse, AnthropicError> {
            self.max_tokens_seen.set(Some(req.max_tokens));
            match &self.response {
                Ok(text) => Ok(MessagesResponse {
                    id: "mock".into(),
                    content: vec![ContentBlock {
                        content_type: "text".into(),
                        text: text.clone(),
                    }],
                    model: "mock".into(),
                    stop_reason: Some("end_turn".into()),
                    usage: Usage {
                        input_tokens: 0,
                        output_tokens: 0,
                    },
                }),
                Err(()) => Err(AnthropicError::ApiError {
                    status: 500,
                    message: "mock error".into(),
                }),
            }
        }
    }

    fn waiting_job(index: usize) -> Job {
        let mut job = Job::new(
            VendorId::new(index, "Clearview Windows"),
            "Clearview Windows",
            "window replacement",
            "Two cracked windows",
            ContactMethod::Email {
                address: "hi@clearview.test".into(),
            },
        );
        job.update_state(JobState::Running, None).unwrap();
        job.update_state(JobState::Waiting, None).unwrap();
        job
    }

    #[test]
    fn quote_of_850_completes_job() {
        let mut job = waiting_job(0);
        apply_classification(
            &mut job,
            Classification::Quote {
                amount: Some(850.0),
                description: "Two windows".into(),
            },
        )
        .unwrap();
        assert_eq!(job.kind(), StateKind::Completed);
        match job.result() {
            Some(JobResult::Quote(q)) => assert_eq!(q.amount, Some(850.0)),
            other => panic!("expected quote, got {other:?}"),
        }
    }

    #[test]
    fn needs_info_joins_questions() {
        let mut job = waiting_job(0);
        apply_classification(
            &mut job,
            Classification::NeedsInfo {
                questions: vec!["How many windows?".into(), " ".into(), "Which floor?".into()],
            },
        )
        .unwrap();
        assert_eq!(
            job.user_input_needed(),
            Some("How many windows?; Which floor?")
        );
    }

    #[test]
    fn decline_fails_job_with_reason() {
        let mut job = waiting_job(0);
        apply_classification(
            &mut job,
            Classification::Decline {
                reason: "Vendor unavailable".into(),
            },
        )
        .unwrap();
        assert_eq!(job.outcome_line(), "Failed: Vendor unavailable");
    }

    #[test]
    fn parse_classification_variants() {
        assert_eq!(
            parse_classification(r#"{"type": "quote", "amount": "$1,200", "description": "x"}"#)
                .unwrap(),
            Classification::Quote {
                amount: Some(1200.0),
                description: "x".into()
            }
        );
        assert_eq!(
            parse_classification("```json\n{\"type\": \"need_info\", \"question\": \"Size?\"}\n```")
                .unwrap(),
            Classification::NeedsInfo {
                questions: vec!["Size?".into()]
            }
        );
        assert_eq!(
            parse_classification(r#"{"type": "decline", "reason": "Booked"}"#).unwrap(),
            Classification::Decline {
                reason: "Booked".into()
            }
        );
        assert!(parse_classification(r#"{"type": "spam"}"#).is_err());
        assert!(parse_classification("no idea").is_err());
    }

    #[tokio::test]
    async fn simulated_inbox_never_replies_at_zero_chance() {
        let inbox = SimulatedInbox::new(0.0, Some(7));
        let jobs = [waiting_job(0), waiting_job(1)];
        let refs: Vec<&Job> = jobs.iter().collect();
        for _ in 0..20 {
            assert!(inbox.poll_replies(&refs).await.is_empty());
        }
    }

    #[tokio::test]
    async fn simulated_inbox_always_replies_at_full_chance() {
        let inbox = SimulatedInbox::new(1.0, Some(7));
        let jobs = [waiting_job(0), waiting_job(1), waiting_job(2)];
        let refs: Vec<&Job> = jobs.iter().collect();
        let replies = inbox.poll_replies(&refs).await;
        assert_eq!(replies.len(), 3);
        for ((id, reply), job) in replies.iter().zip(&jobs) {
            assert_eq!(id, &job.vendor_id);
            assert!(canned_replies().contains(reply.as_ref().unwrap()));
        }
    }

    #[tokio::test]
    async fn simulated_inbox_is_deterministic_for_a_seed() {
        let jobs: Vec<Job> = (0..10).map(waiting_job).collect();
        let refs: Vec<&Job> = jobs.iter().collect();
        let a = SimulatedInbox::new(0.5, Some(99)).poll_replies(&refs).await;
        let b = SimulatedInbox::new(0.5, Some(99)).poll_replies(&refs).await;
        let ids = |r: &Vec<PolledReply>| r.iter().map(|(id, _)| id.clone()).collect::<Vec<_>>();
        assert_eq!(ids(&a), ids(&b));
    }

    #[tokio::test]
    async fn inbox_directory_classifies_and_marks_processed() {
        let dir = tempfile::tempdir().unwrap();
        let job = waiting_job(0);
        let other = waiting_job(1);
        let reply_path = dir.path().join(format!("{}.txt", job.vendor_id));
        std::fs::write(&reply_path, "We can do it for $900.").unwrap();

        let classifier = LlmClassifier::new(
            MockClient::new(Ok(
                r#"{"type": "quote", "amount": 900, "description": "Installed"}"#.into(),
            )),
            LlmSettings::default(),
        );
        let inbox = InboxDirectory::new(dir.path(), classifier);
        let replies = inbox.poll_replies(&[&job, &other]).await;

        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].0, job.vendor_id);
        match &replies[0].1 {
            Ok(Classification::Quote { amount, .. }) => assert_eq!(*amount, Some(900.0)),
            other => panic!("expected quote, got {other:?}"),
        }
        assert!(!reply_path.exists());
        assert!(reply_path.with_extension("processed").exists());

        // A processed reply is not read again.
        assert!(inbox.poll_replies(&[&job]).await.is_empty());
    }

    #[tokio::test]
    async fn classifier_uses_configured_token_limit() {
        let settings = LlmSettings {
            max_tokens: 300,
            ..LlmSettings::default()
        };
        let classifier = LlmClassifier::new(
            MockClient::new(Ok(r#"{"type": "decline", "reason": "Booked"}"#.into())),
            settings,
        );
        let verdict = classifier
            .classify(&waiting_job(0), "Sorry, fully booked.")
            .await
            .unwrap();
        assert_eq!(
            verdict,
            Classification::Decline {
                reason: "Booked".into()
            }
        );
        assert_eq!(classifier.sender.max_tokens_seen.get(), Some(300));
    }

    #[tokio::test]
    async fn inbox_directory_surfaces_classifier_errors() {
        let dir = tempfile::tempdir().unwrap();
        let job = waiting_job(0);
        std::fs::write(dir.path().join(format!("{}.txt", job.vendor_id)), "hmm").unwrap();

        let classifier = LlmClassifier::new(MockClient::new(Err(())), LlmSettings::default());
        let replies = InboxDirectory::new(dir.path(), classifier)
            .poll_replies(&[&job])
            .await;
        assert!(matches!(replies[0].1, Err(QuotatoError::Classification(_))));
    }
}

//! Text for outbound contact: quote-request emails, web-form content and
//! follow-ups answering a vendor's question.

use std::future::Future;

use crate::anthropic::{MessageSender, MessagesRequest};
use crate::config::{LlmSettings, QuoteRequest};
use crate::error::Result;

#[allow(async_fn_in_trait)]
pub trait MessageComposer {
    /// Body of the initial quote-request email.
    async fn compose_outreach(&self, request: &QuoteRequest) -> Result<String>;

    /// Text to paste into a vendor's contact form.
    async fn compose_form_content(&self, request: &QuoteRequest) -> Result<String>;

    /// Reply to a vendor who asked `question`, carrying the user's `answer`.
    async fn compose_follow_up(
        &self,
        request: &QuoteRequest,
        question: &str,
        answer: &str,
    ) -> Result<String>;
}

/// Composes with the language model.
pub struct LlmComposer<S> {
    sender: S,
    settings: LlmSettings,
}

const SYSTEM_PROMPT: &str = "You write short, plain-English messages to local service \
    businesses on behalf of a homeowner. Output only the message text, no subject line, \
    no placeholders, no commentary.";

impl<S: MessageSender> LlmComposer<S> {
    pub fn new(sender: S, settings: LlmSettings) -> Self {
        Self { sender, settings }
    }

    async fn ask(&self, prompt: String) -> Result<String> {
        let req = MessagesRequest::user(&self.settings.model, self.settings.max_tokens, prompt)
            .with_system(SYSTEM_PROMPT);
        Ok(self.sender.send_message(&req).await?.text()?)
    }
}

impl<S: MessageSender> MessageComposer for LlmComposer<S> {
    async fn compose_outreach(&self, r: &QuoteRequest) -> Result<String> {
        self.ask(format!(
            "Write a polite email asking for a quote for {} in {}. {}\n\
             Sign it as {} ({}).",
            r.service, r.location, r.details, r.requester_name, r.requester_email
        ))
        .await
    }

    async fn compose_form_content(&self, r: &QuoteRequest) -> Result<String> {
        self.ask(format!(
            "You're filling out an online quote request form for a {} service in {}.\n\
             Here's the customer info:\n\
             \n\
             - Name: {}\n\
             - Email: {}\n\
             \n\
             Service details:\n\
             {}\n\
             \n\
             Write a clear, professional version of what this person would submit to the form.\n\
             Avoid filler. Write in plain English. Keep it short.",
            r.service, r.location, r.requester_name, r.requester_email, r.details
        ))
        .await
    }

    async fn compose_follow_up(&self, r: &QuoteRequest, question: &str, answer: &str) -> Result<String> {
        self.ask(format!(
            "A {} company in {} replied to a quote request ({}) asking: \"{question}\".\n\
             Write a brief reply that answers with: \"{answer}\" and asks them to send the quote.\n\
             Sign it as {} ({}).",
            r.service, r.location, r.details, r.requester_name, r.requester_email
        ))
        .await
    }
}

/// Fills fixed templates; needs no model access.
#[derive(Debug, Default, Clone, Copy)]
pub struct TemplateComposer;

impl MessageComposer for TemplateComposer {
    async fn compose_outreach(&self, r: &QuoteRequest) -> Result<String> {
        Ok(format!(
            "Hello,\n\n\
             I'm looking for a quote for {} in {}. {}\n\n\
             Could you let me know your price and earliest availability?\n\n\
             Thank you,\n{}\n{}\n",
            r.service, r.location, r.details, r.requester_name, r.requester_email
        ))
    }

    async fn compose_form_content(&self, r: &QuoteRequest) -> Result<String> {
        Ok(format!(
            "Name: {}\nEmail: {}\nService: {} ({})\n\n{} Please send a quote by email.\n",
            r.requester_name, r.requester_email, r.service, r.location, r.details
        ))
    }

    async fn compose_follow_up(&self, r: &QuoteRequest, question: &str, answer: &str) -> Result<String> {
        Ok(format!(
            "Hello,\n\n\
             Thanks for getting back to me about {}. You asked: {question}\n\n\
             {answer}\n\n\
             Please let me know the quote when you can.\n\n\
             Thank you,\n{}\n{}\n",
            r.service, r.requester_name, r.requester_email
        ))
    }
}

/// Composition backend chosen from configuration.
pub enum Composer<S> {
    Llm(LlmComposer<S>),
    Template(TemplateComposer),
}

impl<S: MessageSender> MessageComposer for Composer<S> {
    async fn compose_outreach(&self, r: &QuoteRequest) -> Result<String> {
        match self {
            Composer::Llm(c) => c.compose_outreach(r).await,
            Composer::Template(c) => c.compose_outreach(r).await,
        }
    }

    async fn compose_form_content(&self, r: &QuoteRequest) -> Result<String> {
        match self {
            Composer::Llm(c) => c.compose_form_content(r).await,
            Composer::Template(c) => c.compose_form_content(r).await,
        }
    }

    async fn compose_follow_up(&self, r: &QuoteRequest, question: &str, answer: &str) -> Result<String> {
        match self {
            Composer::Llm(c) => c.compose_follow_up(r, question, answer).await,
            Composer::Template(c) => c.compose_follow_up(r, question, answer).await,
        }
    }
}

/// Runs `op`, and once more if the first attempt fails.
pub async fn retry_once<T, F, Fut>(what: &str, op: F) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    match op().await {
        Ok(v) => Ok(v),
        Err(e) => {
            tracing::warn!(error = %e, "{what} failed, retrying once");
            op().await
        }
    }
}

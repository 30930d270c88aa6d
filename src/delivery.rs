//! Outbound delivery: email over SMTP (or a logging mock) and the sink for
//! prepared contact-form content.

use std::cell::RefCell;
use std::fs::OpenOptions;
use std::io::Write as _;
use std::path::PathBuf;

use lettre::message::Mailbox;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Tokio1Executor};

use crate::config::{FormMode, SmtpSettings};
use crate::error::{QuotatoError, Result};
use crate::vendor::VendorId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingEmail {
    pub to: String,
    pub from: String,
    pub subject: String,
    pub body: String,
}

#[allow(async_fn_in_trait)]
pub trait MessageDelivery {
    async fn deliver(&self, email: &OutgoingEmail) -> Result<()>;
}

/// Logs outgoing mail instead of sending it, and keeps a copy of each.
#[derive(Debug, Default)]
pub struct MockMailer {
    sent: RefCell<Vec<OutgoingEmail>>,
}

impl MockMailer {
    pub fn new() -> Self {
        Self::default()
    }

    #[allow(dead_code)]
    pub fn sent(&self) -> Vec<OutgoingEmail> {
        self.sent.borrow().clone()
    }
}

impl MessageDelivery for MockMailer {
    async fn deliver(&self, email: &OutgoingEmail) -> Result<()> {
        tracing::info!(
            to = %email.to,
            subject = %email.subject,
            body = %email.body,
            "mock email (not sent)"
        );
        self.sent.borrow_mut().push(email.clone());
        Ok(())
    }
}

/// Sends mail through an SMTP relay over implicit TLS.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    has_credentials: bool,
}

impl SmtpMailer {
    pub fn new(settings: &SmtpSettings) -> Result<Self> {
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::relay(&settings.host)
            .map_err(|e| QuotatoError::Delivery(format!("SMTP relay {}: {e}", settings.host)))?
            .port(settings.port);

        let has_credentials = match (&settings.username, &settings.password) {
            (Some(user), Some(pass)) => {
                builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
                true
            }
            _ => false,
        };

        Ok(Self {
            transport: builder.build(),
            has_credentials,
        })
    }
}

impl MessageDelivery for SmtpMailer {
    async fn deliver(&self, email: &OutgoingEmail) -> Result<()> {
        if !self.has_credentials {
            return Err(QuotatoError::Delivery(
                "SMTP credentials missing (set SMTP_USER and SMTP_PASS)".into(),
            ));
        }
        let message = build_message(email)?;
        self.transport
            .send(message)
            .await
            .map_err(|e| QuotatoError::Delivery(e.to_string()))?;
        tracing::info!(to = %email.to, subject = %email.subject, "email sent");
        Ok(())
    }
}

fn build_message(email: &OutgoingEmail) -> Result<lettre::Message> {
    let from: Mailbox = email
        .from
        .parse()
        .map_err(|e| QuotatoError::Delivery(format!("bad sender {}: {e}", email.from)))?;
    let to: Mailbox = email
        .to
        .parse()
        .map_err(|e| QuotatoError::Delivery(format!("bad recipient {}: {e}", email.to)))?;
    lettre::Message::builder()
        .from(from)
        .to(to)
        .subject(email.subject.clone())
        .header(ContentType::TEXT_PLAIN)
        .body(email.body.clone())
        .map_err(|e| QuotatoError::Delivery(e.to_string()))
}

/// Delivery backend chosen from configuration.
pub enum Mailer {
    Mock(MockMailer),
    Smtp(SmtpMailer),
}

impl MessageDelivery for Mailer {
    async fn deliver(&self, email: &OutgoingEmail) -> Result<()> {
        match self {
            Mailer::Mock(m) => m.deliver(email).await,
            Mailer::Smtp(m) => m.deliver(email).await,
        }
    }
}

/// Where prepared contact-form content goes. Nothing is submitted.
#[derive(Debug, Clone)]
pub struct FormSink {
    mode: FormMode,
    dir: PathBuf,
}

impl FormSink {
    pub fn new(mode: FormMode, dir: impl Into<PathBuf>) -> Self {
        Self {
            mode,
            dir: dir.into(),
        }
    }

    pub fn prepare(&self, vendor_id: &VendorId, url: &str, content: &str) -> Result<()> {
        match self.mode {
            FormMode::Mock => {
                tracing::info!(vendor = %vendor_id, url, content, "form content prepared (mock)");
            }
            FormMode::Save => {
                std::fs::create_dir_all(&self.dir)?;
                let path = self.dir.join(format!("{vendor_id}.txt"));
                // Follow-ups land after the original submission.
                let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
                if file.metadata()?.len() > 0 {
                    writeln!(file, "\n---\n")?;
                }
                write!(file, "Form: {url}\n\n{content}\n")?;
                tracing::info!(vendor = %vendor_id, path = %path.display(), "form content saved");
            }
        }
        Ok(())
    }
}

/// Reminder email delivery through the Resend HTTP API.
///
/// The dispatcher owns retry semantics (failed attempts are retried by the
/// next run), so this client makes exactly one request per send.
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

const RESEND_API_URL: &str = "https://api.resend.com/emails";
pub const REMINDER_SUBJECT: &str = "Quick win reminder: ClaimCenter Topic 1 awaits";
const REMINDER_CATEGORY: &str = "stalled_learner_reminder";

#[derive(Debug, Error)]
pub enum EmailError {
    #[error("{0} is not configured")]
    NotConfigured(&'static str),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Failed to send reminder email (status {status}): {message}")]
    Api { status: u16, message: String },
}

#[derive(Debug, Clone)]
pub struct ReminderEmailPayload<'a> {
    pub to: &'a str,
    pub first_name: Option<&'a str>,
    pub hours_stalled: i64,
    pub threshold_hours: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EmailContent {
    pub subject: String,
    pub html: String,
    pub text: String,
}

/// Provider acknowledgement. `id` is the provider's message id when returned.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeliveryReceipt {
    pub id: Option<String>,
}

/// Outbound reminder capability. Carried in `AppState` as `Arc<dyn ReminderMailer>`.
#[async_trait]
pub trait ReminderMailer: Send + Sync {
    /// Whether credentials and sender address are present.
    fn is_configured(&self) -> bool;

    async fn send_reminder(
        &self,
        payload: &ReminderEmailPayload<'_>,
    ) -> Result<DeliveryReceipt, EmailError>;
}

fn escape_html(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

pub fn build_email_content(payload: &ReminderEmailPayload<'_>) -> EmailContent {
    let first_name = payload.first_name.map(str::trim).filter(|n| !n.is_empty());
    let greeting = match first_name {
        Some(name) => format!("Hi {name},"),
        None => "Hi there,".to_string(),
    };
    let html_greeting = escape_html(&greeting);
    let stalled_hours = payload.hours_stalled.max(payload.threshold_hours);

    let html = format!(
        r#"<div style="font-family: Arial, sans-serif; color: #111827;">
  <p>{html_greeting}</p>
  <p>You&apos;re {stalled_hours} hours past your last ClaimCenter progress. We reserve these nudges for learners who are serious about getting job-ready faster.</p>
  <p>Jump back into your next guided topic now. Complete it today and jot down three interview-ready takeaways.</p>
  <p style="margin-top: 24px;">Need accountability or have a blocker? Reply to this email and we&apos;ll help you get unstuck.</p>
  <p style="margin-top: 24px;">In your corner,<br />Guidewire Training Platform Mentor Team</p>
  <hr style="margin: 32px 0; border-color: #E5E7EB;" />
  <p style="font-size: 12px; color: #6B7280;">You&apos;re receiving this because you opted into stalled-learner reminders. Turn them off anytime from your dashboard.</p>
</div>"#
    );

    let text = format!(
        "{greeting}\n\n\
         You are {stalled_hours} hours past your last ClaimCenter progress. Complete your next guided topic today and capture three interview-ready takeaways.\n\n\
         Need accountability or a hand? Reply and we will help you get unstuck.\n\n\
         Guidewire Training Platform Mentor Team\n\n\
         You received this because you opted into stalled-learner reminders. Turn them off any time from your dashboard."
    );

    EmailContent {
        subject: REMINDER_SUBJECT.to_string(),
        html,
        text,
    }
}

#[derive(Debug, Serialize)]
struct ResendRequest<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: &'a str,
    html: &'a str,
    text: &'a str,
    tags: Vec<ResendTag>,
}

#[derive(Debug, Serialize)]
struct ResendTag {
    name: &'static str,
    value: String,
}

/// Resend-backed mailer. Built even when credentials are missing so the
/// dispatcher can report the misconfiguration on every run.
#[derive(Clone)]
pub struct ResendMailer {
    client: Client,
    api_key: Option<String>,
    from_address: Option<String>,
}

impl ResendMailer {
    pub fn new(api_key: Option<String>, from_address: Option<String>) -> Self {
        Self {
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(30))
                .build()
                .expect("Failed to build HTTP client"),
            api_key,
            from_address,
        }
    }
}

#[async_trait]
impl ReminderMailer for ResendMailer {
    fn is_configured(&self) -> bool {
        self.api_key.is_some() && self.from_address.is_some()
    }

    async fn send_reminder(
        &self,
        payload: &ReminderEmailPayload<'_>,
    ) -> Result<DeliveryReceipt, EmailError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(EmailError::NotConfigured("RESEND_API_KEY"))?;
        let from = self
            .from_address
            .as_deref()
            .ok_or(EmailError::NotConfigured("REMINDER_EMAIL_FROM"))?;

        let content = build_email_content(payload);
        let body = ResendRequest {
            from,
            to: [payload.to],
            subject: &content.subject,
            html: &content.html,
            text: &content.text,
            tags: vec![
                ResendTag {
                    name: "category",
                    value: REMINDER_CATEGORY.to_string(),
                },
                ResendTag {
                    name: "threshold_hours",
                    value: payload.threshold_hours.to_string(),
                },
            ],
        };

        let response = self
            .client
            .post(RESEND_API_URL)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(EmailError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body = response.text().await.unwrap_or_default();
        let receipt = parse_receipt(&body);
        debug!("Reminder email accepted by provider: {:?}", receipt.id);
        Ok(receipt)
    }
}

/// The provider has already accepted the message once the status is 2xx, so
/// an unreadable body still counts as delivered.
fn parse_receipt(body: &str) -> DeliveryReceipt {
    match serde_json::from_str::<Option<DeliveryReceipt>>(body) {
        Ok(receipt) => receipt.unwrap_or_default(),
        Err(e) => {
            warn!("Unreadable email provider receipt: {e}");
            DeliveryReceipt::default()
        }
    }
}

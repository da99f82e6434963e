//! Outbound email through the Resend HTTP API.

use serde::Serialize;
use std::time::Duration;
use tracing::{info, instrument};

#[derive(Debug, thiserror::Error)]
pub enum EmailError {
    #[error("Email API key is not configured")]
    NotConfigured,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Resend rejected the message ({status}): {body}")]
    Rejected { status: u16, body: String },
}

#[derive(Debug, Serialize)]
struct ResendMessage<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: &'a str,
    html: &'a str,
}

#[derive(Debug, Clone)]
pub struct EmailClient {
    http: reqwest::Client,
    api_url: String,
    api_key: Option<String>,
    from: String,
}

impl EmailClient {
    pub fn new(api_url: impl Into<String>, api_key: Option<String>, from: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();

        Self {
            http,
            api_url: api_url.into(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            from: from.into(),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    #[instrument(skip(self, html), fields(to = %to))]
    pub async fn send(&self, to: &str, subject: &str, html: &str) -> Result<(), EmailError> {
        let key = self.api_key.as_deref().ok_or(EmailError::NotConfigured)?;

        let response = self
            .http
            .post(&self.api_url)
            .bearer_auth(key)
            .json(&ResendMessage {
                from: &self.from,
                to: [to],
                subject,
                html,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EmailError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        info!("Notification email sent");
        Ok(())
    }
}

/// What the unit's notification inbox needs to know about a new booking.
#[derive(Debug, Clone)]
pub struct BookingEmail<'a> {
    pub unit: &'a str,
    pub local: &'a str,
    /// Already formatted for display.
    pub date: &'a str,
    pub start: &'a str,
    pub end: &'a str,
    pub observations: Option<&'a str>,
    pub admin_panel_url: &'a str,
}

impl BookingEmail<'_> {
    pub fn subject(&self) -> String {
        format!("Novo Agendamento: {} - {}", self.unit, self.local)
    }
}

fn escape(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

pub fn booking_email_html(email: &BookingEmail<'_>) -> String {
    let observations = email
        .observations
        .filter(|o| !o.trim().is_empty())
        .unwrap_or("Nenhuma");

    format!(
        "<h1>Novo Agendamento Confirmado</h1>\
         <p><strong>Unidade:</strong> {}</p>\
         <p><strong>Local:</strong> {}</p>\
         <p><strong>Data:</strong> {}</p>\
         <p><strong>Horário:</strong> {} - {}</p>\
         <p><strong>Observações:</strong> {}</p>\
         <br/>\
         <a href=\"{}\">Acessar Painel Admin</a>",
        escape(email.unit),
        escape(email.local),
        escape(email.date),
        escape(email.start),
        escape(email.end),
        escape(observations),
        escape(email.admin_panel_url),
    )
}

// ✉️ Notifier - email dispatch through an HTTP email API
//
// Payload shape expected by the API:
//   { from, to, subject, html, attachments: [{ filename, content(base64) }] }

use base64::Engine;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{error, info};

use crate::config::EmailConfig;

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("email API request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("email API rejected message ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("failed to read attachment {path}: {source}")]
    Attachment {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

// ============================================================================
// MESSAGE
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub filename: String,
    pub content: Vec<u8>,
}

impl Attachment {
    pub fn new(filename: impl Into<String>, content: Vec<u8>) -> Self {
        Attachment {
            filename: filename.into(),
            content,
        }
    }

    pub fn from_path(path: &Path) -> Result<Self, NotifyError> {
        let content = std::fs::read(path).map_err(|source| NotifyError::Attachment {
            path: path.to_path_buf(),
            source,
        })?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Attachment { filename, content })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Email {
    pub to: Vec<String>,
    pub subject: String,
    pub html: String,
    pub attachments: Vec<Attachment>,
}

impl Email {
    pub fn new(to: Vec<String>, subject: impl Into<String>, html: impl Into<String>) -> Self {
        Email {
            to,
            subject: subject.into(),
            html: html.into(),
            attachments: Vec::new(),
        }
    }

    /// Builder pattern: add an attachment
    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }
}

/// Opaque email transport. One call is one attempt; callers never retry.
pub trait Notifier: Send + Sync {
    fn send(&self, email: &Email) -> Result<(), NotifyError>;
}

// ============================================================================
// HTTP EMAIL API
// ============================================================================

#[derive(Serialize)]
struct EmailPayload<'a> {
    from: &'a str,
    to: &'a [String],
    subject: &'a str,
    html: &'a str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    attachments: Vec<AttachmentPayload<'a>>,
}

#[derive(Serialize)]
struct AttachmentPayload<'a> {
    filename: &'a str,
    content: String,
}

pub struct HttpEmailNotifier {
    client: reqwest::blocking::Client,
    api_url: String,
    api_token: String,
    from: String,
}

impl HttpEmailNotifier {
    pub fn new(config: &EmailConfig) -> Self {
        HttpEmailNotifier {
            client: reqwest::blocking::Client::new(),
            api_url: config.api_url.clone(),
            api_token: config.api_token.clone(),
            from: config.from.clone(),
        }
    }

    fn payload<'a>(&'a self, email: &'a Email) -> EmailPayload<'a> {
        let engine = base64::engine::general_purpose::STANDARD;
        EmailPayload {
            from: &self.from,
            to: &email.to,
            subject: &email.subject,
            html: &email.html,
            attachments: email
                .attachments
                .iter()
                .map(|a| AttachmentPayload {
                    filename: &a.filename,
                    content: engine.encode(&a.content),
                })
                .collect(),
        }
    }
}

impl Notifier for HttpEmailNotifier {
    fn send(&self, email: &Email) -> Result<(), NotifyError> {
        info!(
            to = ?email.to,
            subject = %email.subject,
            attachments = email.attachments.len(),
            "sending email"
        );

        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_token)
            .json(&self.payload(email))
            .send()?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            let body = response.text().unwrap_or_default();
            error!(status = status.as_u16(), body = %body, "unable to send email");
            return Err(NotifyError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn notifier() -> HttpEmailNotifier {
        HttpEmailNotifier::new(&EmailConfig {
            api_url: "http://127.0.0.1:9/emails".to_string(),
            api_token: "token".to_string(),
            from: "attendance@example.test".to_string(),
            summary_recipients: vec!["chief@example.test".to_string()],
            summary_subject: "Attendance Summary".to_string(),
        })
    }

    #[test]
    fn test_payload_encodes_attachments() {
        let email = Email::new(vec!["chief@example.test".into()], "Report", "<p>hi</p>")
            .with_attachment(Attachment::new("summary.csv", b"a,b\n".to_vec()));

        let n = notifier();
        let json = serde_json::to_value(n.payload(&email)).unwrap();

        assert_eq!(json["from"], "attendance@example.test");
        assert_eq!(json["to"][0], "chief@example.test");
        assert_eq!(json["attachments"][0]["filename"], "summary.csv");
        assert_eq!(json["attachments"][0]["content"], "YSxiCg==");
    }

    #[test]
    fn test_payload_omits_empty_attachments() {
        let email = Email::new(vec!["ada@example.test".into()], "Hello", "body");
        let n = notifier();
        let json = serde_json::to_value(n.payload(&email)).unwrap();

        assert!(json.get("attachments").is_none());
    }

    #[test]
    fn test_attachment_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.csv");
        std::fs::write(&path, "x\n").unwrap();

        let attachment = Attachment::from_path(&path).unwrap();
        assert_eq!(attachment.filename, "report.csv");
        assert_eq!(attachment.content, b"x\n");

        let missing = Attachment::from_path(&dir.path().join("missing.csv"));
        assert!(matches!(missing, Err(NotifyError::Attachment { .. })));
    }
}

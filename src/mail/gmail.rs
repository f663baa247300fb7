//! Gmail REST mailbox.
//!
//! Uses the Gmail API v1 with a bearer access token:
//! - `users.messages.list` with a `q=` clause built from the time range
//! - `users.messages.get` (`format=raw`), decoded with mail-parser
//! - `users.labels.list` / `users.labels.create`
//! - `users.messages.modify` for label changes
//! - `users.drafts.create` with an RFC 2822 message built by lettre,
//!   base64url-encoded

use async_trait::async_trait;
use base64::engine::general_purpose::GeneralPurpose;
use base64::engine::{DecodePaddingMode, GeneralPurposeConfig};
use base64::prelude::*;
use chrono::{DateTime, Utc};
use mail_parser::MessageParser;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::error::MailError;
use crate::mail::{MailLabel, MailQuery, Mailbox};
use crate::pipeline::types::{EmailMessage, ResponseDraft};

const GMAIL_API_BASE: &str = "https://gmail.googleapis.com/gmail/v1/users/me";

/// One page of list results is the whole batch; there is no pagination.
const MAX_LIST_RESULTS: u32 = 100;

/// Gmail serves `raw` payloads as unpadded base64url, but payloads that
/// crossed a proxy sometimes arrive padded. Decode either form.
const BASE64_URL_INDIFFERENT: GeneralPurpose = GeneralPurpose::new(
    &base64::alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

// ── Wire types ──────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct MessageListResponse {
    messages: Option<Vec<MessageRef>>,
}

#[derive(Debug, Deserialize)]
struct MessageRef {
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawMessage {
    thread_id: Option<String>,
    raw: Option<String>,
    internal_date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GmailLabel {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct LabelsListResponse {
    labels: Option<Vec<GmailLabel>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateLabelRequest {
    name: String,
    label_list_visibility: String,
    message_list_visibility: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ModifyRequest {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    add_label_ids: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    remove_label_ids: Vec<String>,
}

#[derive(Debug, Serialize)]
struct CreateDraftRequest {
    message: DraftMessage,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DraftMessage {
    raw: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    thread_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CreateDraftResponse {
    id: String,
}

// ── Mailbox ─────────────────────────────────────────────────────────

/// Gmail session for one account.
pub struct GmailMailbox {
    client: reqwest::Client,
    access_token: SecretString,
    /// The account's own address, used as the draft From header.
    address: String,
}

impl GmailMailbox {
    pub fn new(address: impl Into<String>, access_token: SecretString) -> Self {
        Self {
            client: reqwest::Client::new(),
            access_token,
            address: address.into(),
        }
    }

    /// Override the HTTP client (custom timeouts, proxies).
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    fn auth_headers(&self) -> Result<HeaderMap, MailError> {
        let mut headers = HeaderMap::new();
        let bearer = format!("Bearer {}", self.access_token.expose_secret());
        let value = HeaderValue::from_str(&bearer).map_err(|e| MailError::AuthFailed {
            reason: format!("invalid access token: {e}"),
        })?;
        headers.insert(AUTHORIZATION, value);
        Ok(headers)
    }

    async fn get<T: for<'de> Deserialize<'de>>(&self, endpoint: &str) -> Result<T, MailError> {
        let url = format!("{}{}", GMAIL_API_BASE, endpoint);
        let response = self
            .client
            .get(&url)
            .headers(self.auth_headers()?)
            .send()
            .await
            .map_err(|e| MailError::RequestFailed {
                reason: e.to_string(),
            })?;

        self.handle_response(response).await
    }

    async fn post<T: for<'de> Deserialize<'de>, B: Serialize>(
        &self,
        endpoint: &str,
        body: &B,
    ) -> Result<T, MailError> {
        let url = format!("{}{}", GMAIL_API_BASE, endpoint);
        let mut headers = self.auth_headers()?;
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let response = self
            .client
            .post(&url)
            .headers(headers)
            .json(body)
            .send()
            .await
            .map_err(|e| MailError::RequestFailed {
                reason: e.to_string(),
            })?;

        self.handle_response(response).await
    }

    async fn post_no_response<B: Serialize>(
        &self,
        endpoint: &str,
        body: &B,
    ) -> Result<(), MailError> {
        let url = format!("{}{}", GMAIL_API_BASE, endpoint);
        let mut headers = self.auth_headers()?;
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let response = self
            .client
            .post(&url)
            .headers(headers)
            .json(body)
            .send()
            .await
            .map_err(|e| MailError::RequestFailed {
                reason: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(self.handle_error(response).await);
        }
        Ok(())
    }

    async fn handle_response<T: for<'de> Deserialize<'de>>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, MailError> {
        if !response.status().is_success() {
            return Err(self.handle_error(response).await);
        }

        response.json().await.map_err(|e| MailError::RequestFailed {
            reason: format!("parse response: {e}"),
        })
    }

    async fn handle_error(&self, response: reqwest::Response) -> MailError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        match status.as_u16() {
            401 | 403 => MailError::AuthFailed {
                reason: format!("HTTP {status}: {body}"),
            },
            404 => MailError::NotFound(body),
            429 => MailError::RateLimited { retry_after: None },
            _ => MailError::RequestFailed {
                reason: format!("API error ({status}): {body}"),
            },
        }
    }
}

#[async_trait]
impl Mailbox for GmailMailbox {
    async fn list_message_ids(&self, query: &MailQuery) -> Result<Vec<String>, MailError> {
        let q = build_query(query, Utc::now());
        // Gmail accepts '+' for spaces inside the q parameter.
        let endpoint = format!(
            "/messages?maxResults={}&q={}",
            MAX_LIST_RESULTS,
            q.replace(' ', "+")
        );
        let response: MessageListResponse = self.get(&endpoint).await?;

        Ok(response
            .messages
            .unwrap_or_default()
            .into_iter()
            .map(|m| m.id)
            .collect())
    }

    async fn fetch_message(&self, id: &str) -> Result<EmailMessage, MailError> {
        let endpoint = format!("/messages/{id}?format=raw");
        let message: RawMessage = self.get(&endpoint).await?;

        let raw = message.raw.ok_or_else(|| MailError::MalformedMessage {
            id: id.to_string(),
            reason: "response carries no raw payload".to_string(),
        })?;

        parse_raw_message(id, message.thread_id, &raw, message.internal_date.as_deref())
    }

    async fn list_labels(&self) -> Result<Vec<MailLabel>, MailError> {
        let response: LabelsListResponse = self.get("/labels").await?;
        Ok(response
            .labels
            .unwrap_or_default()
            .into_iter()
            .map(|l| MailLabel {
                id: l.id,
                name: l.name,
            })
            .collect())
    }

    async fn create_label(&self, name: &str) -> Result<MailLabel, MailError> {
        let body = CreateLabelRequest {
            name: name.to_string(),
            label_list_visibility: "labelShow".to_string(),
            message_list_visibility: "show".to_string(),
        };
        let label: GmailLabel = self.post("/labels", &body).await?;
        Ok(MailLabel {
            id: label.id,
            name: label.name,
        })
    }

    async fn modify_labels(
        &self,
        message_id: &str,
        add: &[String],
        remove: &[String],
    ) -> Result<(), MailError> {
        let endpoint = format!("/messages/{message_id}/modify");
        let body = ModifyRequest {
            add_label_ids: add.to_vec(),
            remove_label_ids: remove.to_vec(),
        };
        self.post_no_response(&endpoint, &body).await
    }

    async fn create_draft(
        &self,
        draft: &ResponseDraft,
        thread_id: Option<&str>,
    ) -> Result<String, MailError> {
        let raw = build_draft_raw(&self.address, draft)?;
        let body = CreateDraftRequest {
            message: DraftMessage {
                raw,
                thread_id: thread_id.map(String::from),
            },
        };
        let response: CreateDraftResponse = self.post("/drafts", &body).await?;
        tracing::info!(draft_id = %response.id, to = %draft.recipient, "Draft stored");
        Ok(response.id)
    }
}

// ── Query building ──────────────────────────────────────────────────

/// Build the Gmail search clause for a query.
fn build_query(query: &MailQuery, now: DateTime<Utc>) -> String {
    let (start, end) = query.range.bounds(now);
    let mut q = format!("after:{}", start.format("%Y/%m/%d"));
    if let Some(end) = end {
        q.push_str(&format!(" before:{}", end.format("%Y/%m/%d")));
    }
    if query.unread_only {
        q.push_str(" is:unread");
    }
    q
}

// ── Message parsing ─────────────────────────────────────────────────

/// Decode a `format=raw` payload into an `EmailMessage`.
///
/// Missing Subject or From headers are data-shape errors; the caller
/// logs and skips the message.
fn parse_raw_message(
    id: &str,
    thread_id: Option<String>,
    raw_b64: &str,
    internal_date: Option<&str>,
) -> Result<EmailMessage, MailError> {
    let bytes =
        BASE64_URL_INDIFFERENT
            .decode(raw_b64)
            .map_err(|e| MailError::MalformedMessage {
                id: id.to_string(),
                reason: format!("raw payload is not base64url: {e}"),
            })?;

    let parsed = MessageParser::default()
        .parse(&bytes)
        .ok_or_else(|| MailError::MalformedMessage {
            id: id.to_string(),
            reason: "unparsable RFC 2822 payload".to_string(),
        })?;

    let subject = parsed
        .subject()
        .ok_or_else(|| MailError::MalformedMessage {
            id: id.to_string(),
            reason: "missing Subject header".to_string(),
        })?
        .to_string();

    let sender = parsed
        .from()
        .and_then(|addr| addr.first())
        .and_then(|a| a.address())
        .map(|s| s.to_string())
        .ok_or_else(|| MailError::MalformedMessage {
            id: id.to_string(),
            reason: "missing From header".to_string(),
        })?;

    let body = extract_text(&parsed);

    let received_at = internal_date
        .and_then(|ms| ms.parse::<i64>().ok())
        .and_then(DateTime::from_timestamp_millis)
        .unwrap_or_else(Utc::now);

    Ok(EmailMessage {
        id: id.to_string(),
        thread_id,
        subject,
        sender,
        body,
        received_at,
    })
}

/// Extract readable text from a parsed email.
fn extract_text(parsed: &mail_parser::Message) -> String {
    if let Some(text) = parsed.body_text(0) {
        return text.to_string();
    }
    if let Some(html) = parsed.body_html(0) {
        return strip_html(html.as_ref());
    }
    "(no readable content)".to_string()
}

/// Strip HTML tags and normalize whitespace.
fn strip_html(html: &str) -> String {
    let mut result = String::new();
    let mut in_tag = false;
    for ch in html.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => result.push(ch),
            _ => {}
        }
    }
    result.split_whitespace().collect::<Vec<_>>().join(" ")
}

// ── Draft building ──────────────────────────────────────────────────

/// Assemble the RFC 2822 reply and base64url-encode it for the API.
fn build_draft_raw(from: &str, draft: &ResponseDraft) -> Result<String, MailError> {
    let message = lettre::Message::builder()
        .from(from.parse().map_err(|e| {
            MailError::DraftBuild(format!("invalid from address: {e}"))
        })?)
        .to(draft.recipient.parse().map_err(|e| {
            MailError::DraftBuild(format!("invalid recipient address: {e}"))
        })?)
        .subject(draft.subject.as_str())
        .body(draft.body.clone())
        .map_err(|e| MailError::DraftBuild(format!("failed to assemble message: {e}")))?;

    Ok(BASE64_URL_SAFE_NO_PAD.encode(message.formatted()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mail::TimeRange;
    use chrono::TimeZone;

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 8, 25, 12, 0, 0).unwrap()
    }

    fn encode_raw(raw: &str) -> String {
        BASE64_URL_SAFE_NO_PAD.encode(raw.as_bytes())
    }

    // ── Query building ──────────────────────────────────────────────

    #[test]
    fn query_today() {
        let q = build_query(
            &MailQuery {
                range: TimeRange::Today,
                unread_only: false,
            },
            fixed_now(),
        );
        assert_eq!(q, "after:2026/08/25");
    }

    #[test]
    fn query_yesterday_is_bounded() {
        let q = build_query(
            &MailQuery {
                range: TimeRange::Yesterday,
                unread_only: false,
            },
            fixed_now(),
        );
        assert_eq!(q, "after:2026/08/24 before:2026/08/25");
    }

    #[test]
    fn query_last_week_with_unread() {
        let q = build_query(
            &MailQuery {
                range: TimeRange::LastWeek,
                unread_only: true,
            },
            fixed_now(),
        );
        assert_eq!(q, "after:2026/08/18 is:unread");
    }

    // ── Raw message parsing ─────────────────────────────────────────

    #[test]
    fn parses_a_plain_text_message() {
        let raw = "From: Recruiter <recruiter@acme.com>\r\n\
                   To: me@example.com\r\n\
                   Subject: Interview next week\r\n\
                   Content-Type: text/plain; charset=utf-8\r\n\
                   \r\n\
                   We would like to invite you for an interview next Tuesday";
        let email = parse_raw_message(
            "m-1",
            Some("t-1".into()),
            &encode_raw(raw),
            Some("1735689600000"),
        )
        .unwrap();

        assert_eq!(email.id, "m-1");
        assert_eq!(email.thread_id.as_deref(), Some("t-1"));
        assert_eq!(email.subject, "Interview next week");
        assert_eq!(email.sender, "recruiter@acme.com");
        assert!(email.body.contains("invite you for an interview"));
        assert_eq!(
            email.received_at,
            Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn missing_subject_is_a_malformed_message() {
        let raw = "From: someone@example.com\r\n\
                   To: me@example.com\r\n\
                   \r\n\
                   no subject here";
        let result = parse_raw_message("m-2", None, &encode_raw(raw), None);
        match result {
            Err(MailError::MalformedMessage { id, reason }) => {
                assert_eq!(id, "m-2");
                assert!(reason.contains("Subject"));
            }
            other => panic!("Expected MalformedMessage, got {:?}", other),
        }
    }

    #[test]
    fn missing_from_is_a_malformed_message() {
        let raw = "Subject: hello\r\n\r\nbody";
        let result = parse_raw_message("m-3", None, &encode_raw(raw), None);
        assert!(matches!(
            result,
            Err(MailError::MalformedMessage { .. })
        ));
    }

    #[test]
    fn garbage_base64_is_a_malformed_message() {
        let result = parse_raw_message("m-4", None, "not!!valid@@base64", None);
        assert!(matches!(
            result,
            Err(MailError::MalformedMessage { .. })
        ));
    }

    #[test]
    fn padded_raw_payload_still_parses() {
        let raw = "From: r@acme.com\r\n\
                   Subject: Interview\r\n\
                   \r\n\
                   See you Tuesday";
        // Same alphabet, padded the way a forwarding proxy would.
        let padded = BASE64_URL_SAFE.encode(raw.as_bytes());
        assert!(padded.ends_with('='));

        let email = parse_raw_message("m-6", None, &padded, None).unwrap();
        assert_eq!(email.subject, "Interview");
        assert_eq!(email.sender, "r@acme.com");
    }

    #[test]
    fn html_only_body_is_stripped() {
        let raw = "From: r@acme.com\r\n\
                   Subject: Offer\r\n\
                   Content-Type: text/html; charset=utf-8\r\n\
                   \r\n\
                   <div><b>Congratulations!</b> We have an offer for you.</div>";
        let email = parse_raw_message("m-5", None, &encode_raw(raw), None).unwrap();
        assert_eq!(email.body, "Congratulations! We have an offer for you.");
    }

    // ── HTML stripping ──────────────────────────────────────────────

    #[test]
    fn strip_html_nested_tags() {
        assert_eq!(
            strip_html("<div><b>Bold</b> and <i>italic</i></div>"),
            "Bold and italic"
        );
    }

    #[test]
    fn strip_html_plain_text_passthrough() {
        assert_eq!(strip_html("No HTML here"), "No HTML here");
    }

    // ── Draft building ──────────────────────────────────────────────

    #[test]
    fn draft_raw_round_trips_through_the_parser() {
        let draft = ResponseDraft {
            recipient: "recruiter@acme.com".into(),
            subject: "Re: Interview next week".into(),
            body: "Tuesday works for me.".into(),
        };
        let raw = build_draft_raw("me@example.com", &draft).unwrap();

        let bytes = BASE64_URL_SAFE_NO_PAD.decode(&raw).unwrap();
        let parsed = MessageParser::default().parse(&bytes[..]).unwrap();
        assert_eq!(parsed.subject(), Some("Re: Interview next week"));
        assert_eq!(
            parsed
                .to()
                .and_then(|a| a.first())
                .and_then(|a| a.address()),
            Some("recruiter@acme.com")
        );
        assert!(parsed.body_text(0).unwrap().contains("Tuesday works"));
    }

    #[test]
    fn draft_with_invalid_recipient_fails_to_build() {
        let draft = ResponseDraft {
            recipient: "not an address".into(),
            subject: "Re: x".into(),
            body: "y".into(),
        };
        let result = build_draft_raw("me@example.com", &draft);
        assert!(matches!(result, Err(MailError::DraftBuild(_))));
    }

    // ── Wire serialization ──────────────────────────────────────────

    #[test]
    fn modify_request_skips_empty_sides() {
        let body = ModifyRequest {
            add_label_ids: vec!["Label_7".into()],
            remove_label_ids: vec![],
        };
        let json = serde_json::to_string(&body).unwrap();
        assert!(json.contains("addLabelIds"));
        assert!(!json.contains("removeLabelIds"));
    }

    #[test]
    fn draft_request_carries_thread_id_when_present() {
        let body = CreateDraftRequest {
            message: DraftMessage {
                raw: "abc".into(),
                thread_id: Some("t-9".into()),
            },
        };
        let json = serde_json::to_string(&body).unwrap();
        assert!(json.contains("\"threadId\":\"t-9\""));

        let body = CreateDraftRequest {
            message: DraftMessage {
                raw: "abc".into(),
                thread_id: None,
            },
        };
        let json = serde_json::to_string(&body).unwrap();
        assert!(!json.contains("threadId"));
    }

    #[test]
    fn labels_response_parsing() {
        let json = r#"{"labels": [
            {"id": "Label_1", "name": "Interview", "type": "user"},
            {"id": "INBOX", "name": "INBOX", "type": "system"}
        ]}"#;
        let parsed: LabelsListResponse = serde_json::from_str(json).unwrap();
        let labels = parsed.labels.unwrap();
        assert_eq!(labels.len(), 2);
        assert_eq!(labels[0].id, "Label_1");
        assert_eq!(labels[0].name, "Interview");
    }
}

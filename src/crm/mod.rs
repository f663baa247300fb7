//! CRM candidate source. Pulls contacts from a REST endpoint with bearer
//! auth and syncs them into the local roster.
//!
//! Sync is config-gated: without a CRM base URL in the environment the
//! pipeline runs on the bootstrap account alone.

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::error::CrmError;
use crate::store::RecordStore;

/// Default number of contacts fetched per sync.
pub const DEFAULT_SYNC_LIMIT: usize = 150;

/// A contact as the CRM reports it.
#[derive(Debug, Clone, Deserialize)]
pub struct Contact {
    pub id: String,
    pub email: Option<String>,
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ContactsResponse {
    contacts: Vec<Contact>,
}

/// Source of candidate contacts.
#[async_trait]
pub trait CandidateSource: Send + Sync {
    /// Fetch up to `limit` contacts.
    async fn fetch_contacts(&self, limit: usize) -> Result<Vec<Contact>, CrmError>;
}

/// REST candidate source: `GET {base}/contacts?limit=N`.
pub struct RestCandidateSource {
    client: reqwest::Client,
    base_url: String,
    api_token: SecretString,
}

impl RestCandidateSource {
    pub fn new(base_url: impl Into<String>, api_token: SecretString) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_token,
        }
    }

    /// Override the HTTP client (custom timeouts, proxies).
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    fn auth_headers(&self) -> Result<HeaderMap, CrmError> {
        let mut headers = HeaderMap::new();
        let bearer = format!("Bearer {}", self.api_token.expose_secret());
        let value = HeaderValue::from_str(&bearer).map_err(|_| CrmError::AuthFailed)?;
        headers.insert(AUTHORIZATION, value);
        Ok(headers)
    }
}

#[async_trait]
impl CandidateSource for RestCandidateSource {
    async fn fetch_contacts(&self, limit: usize) -> Result<Vec<Contact>, CrmError> {
        let url = format!("{}/contacts?limit={}", self.base_url, limit);
        let response = self
            .client
            .get(&url)
            .headers(self.auth_headers()?)
            .send()
            .await
            .map_err(|e| CrmError::RequestFailed {
                reason: e.to_string(),
            })?;

        let status = response.status();
        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(CrmError::AuthFailed);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CrmError::RequestFailed {
                reason: format!("API error ({status}): {body}"),
            });
        }

        let parsed: ContactsResponse =
            response.json().await.map_err(|e| CrmError::InvalidResponse {
                reason: e.to_string(),
            })?;
        Ok(parsed.contacts)
    }
}

/// Pull up to `limit` contacts and upsert them into the roster by
/// external id. Contacts without an email address are skipped; a single
/// failed upsert is logged and does not abort the sync.
///
/// Returns the number of candidates written.
pub async fn sync_candidates(
    source: &dyn CandidateSource,
    store: &dyn RecordStore,
    limit: usize,
) -> Result<usize, CrmError> {
    let contacts = source.fetch_contacts(limit).await?;
    debug!(count = contacts.len(), "Fetched CRM contacts");

    let mut synced = 0;
    for contact in contacts {
        let Some(email) = contact.email.as_deref() else {
            debug!(contact_id = %contact.id, "Skipping contact without email");
            continue;
        };

        match store
            .upsert_candidate(&contact.id, email, contact.name.as_deref(), None)
            .await
        {
            Ok(_) => synced += 1,
            Err(e) => {
                warn!(contact_id = %contact.id, error = %e, "Failed to upsert contact");
            }
        }
    }

    info!(synced, "Candidate roster synced from CRM");
    Ok(synced)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::LibSqlStore;

    struct MockSource {
        contacts: Vec<Contact>,
    }

    #[async_trait]
    impl CandidateSource for MockSource {
        async fn fetch_contacts(&self, limit: usize) -> Result<Vec<Contact>, CrmError> {
            Ok(self.contacts.iter().take(limit).cloned().collect())
        }
    }

    struct FailingSource;

    #[async_trait]
    impl CandidateSource for FailingSource {
        async fn fetch_contacts(&self, _limit: usize) -> Result<Vec<Contact>, CrmError> {
            Err(CrmError::AuthFailed)
        }
    }

    fn contact(id: &str, email: Option<&str>, name: Option<&str>) -> Contact {
        Contact {
            id: id.to_string(),
            email: email.map(String::from),
            name: name.map(String::from),
        }
    }

    #[tokio::test]
    async fn sync_upserts_contacts_with_emails() {
        let store = LibSqlStore::new_memory().await.unwrap();
        let source = MockSource {
            contacts: vec![
                contact("sf-1", Some("a@example.com"), Some("Ada")),
                contact("sf-2", None, Some("No Email")),
                contact("sf-3", Some("c@example.com"), None),
            ],
        };

        let synced = sync_candidates(&source, &store, 10).await.unwrap();
        assert_eq!(synced, 2);

        let candidates = store.list_candidates().await.unwrap();
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].external_id, "sf-1");
        assert_eq!(candidates[0].name.as_deref(), Some("Ada"));
        // Synced contacts carry no mailbox token
        assert!(candidates.iter().all(|c| c.access_token.is_none()));
    }

    #[tokio::test]
    async fn sync_twice_does_not_duplicate() {
        let store = LibSqlStore::new_memory().await.unwrap();
        let source = MockSource {
            contacts: vec![contact("sf-1", Some("a@example.com"), Some("Ada"))],
        };

        sync_candidates(&source, &store, 10).await.unwrap();
        sync_candidates(&source, &store, 10).await.unwrap();

        assert_eq!(store.list_candidates().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn sync_honors_the_limit() {
        let store = LibSqlStore::new_memory().await.unwrap();
        let source = MockSource {
            contacts: vec![
                contact("sf-1", Some("a@example.com"), None),
                contact("sf-2", Some("b@example.com"), None),
                contact("sf-3", Some("c@example.com"), None),
            ],
        };

        let synced = sync_candidates(&source, &store, 2).await.unwrap();
        assert_eq!(synced, 2);
    }

    #[tokio::test]
    async fn fetch_gives_up_when_the_endpoint_never_responds() {
        // Accepts connections but never writes a byte; only the client's
        // own timeout gets the sync unstuck.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            loop {
                let Ok((socket, _)) = listener.accept().await else {
                    return;
                };
                std::mem::forget(socket);
            }
        });

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_millis(200))
            .build()
            .unwrap();
        let source = RestCandidateSource::new(
            format!("http://{addr}"),
            SecretString::from("tok"),
        )
        .with_client(client);

        let started = std::time::Instant::now();
        let result = source.fetch_contacts(10).await;

        assert!(matches!(result, Err(CrmError::RequestFailed { .. })));
        assert!(started.elapsed() < std::time::Duration::from_secs(5));
    }

    #[tokio::test]
    async fn fetch_failure_propagates() {
        let store = LibSqlStore::new_memory().await.unwrap();
        let result = sync_candidates(&FailingSource, &store, 10).await;
        assert!(matches!(result, Err(CrmError::AuthFailed)));
    }

    #[test]
    fn contacts_response_parsing() {
        let json = r#"{"contacts": [
            {"id": "sf-1", "email": "a@example.com", "name": "Ada"},
            {"id": "sf-2", "email": null, "name": null}
        ]}"#;
        let parsed: ContactsResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.contacts.len(), 2);
        assert_eq!(parsed.contacts[0].email.as_deref(), Some("a@example.com"));
        assert!(parsed.contacts[1].email.is_none());
    }
}

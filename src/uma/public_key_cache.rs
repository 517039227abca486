use std::collections::HashMap;

use chrono::Utc;
use parking_lot::Mutex;
use reqwest::Client;

use super::address::scheme_for_domain;
use super::protocol::PubKeyResponse;
use crate::error::Error;

/// Public keys of counterparty VASPs, keyed by domain.
#[derive(Debug, Default)]
pub struct InMemoryPublicKeyCache {
    entries: Mutex<HashMap<String, PubKeyResponse>>,
}

impl InMemoryPublicKeyCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached keys for `vasp_domain`, unless they have expired.
    pub fn fetch(&self, vasp_domain: &str) -> Option<PubKeyResponse> {
        let now = Utc::now().timestamp();
        self.entries
            .lock()
            .get(vasp_domain)
            .filter(|keys| !keys.is_expired_at(now))
            .cloned()
    }

    pub fn add(&self, vasp_domain: impl Into<String>, keys: PubKeyResponse) {
        self.entries.lock().insert(vasp_domain.into(), keys);
    }

    pub fn remove(&self, vasp_domain: &str) {
        self.entries.lock().remove(vasp_domain);
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

/// Keys of `vasp_domain`, from the cache or its `/.well-known/lnurlpubkey`.
pub async fn fetch_public_key_for_vasp(
    http: &Client,
    vasp_domain: &str,
    cache: &InMemoryPublicKeyCache,
) -> Result<PubKeyResponse, Error> {
    if let Some(keys) = cache.fetch(vasp_domain) {
        return Ok(keys);
    }

    let fetch_error = |message: String| Error::CounterpartyPubkeyFetch {
        domain: vasp_domain.to_string(),
        message,
    };
    let url = format!(
        "{}://{}/.well-known/lnurlpubkey",
        scheme_for_domain(vasp_domain),
        vasp_domain
    );
    tracing::debug!("Fetching public keys from {}", url);

    let response = http
        .get(&url)
        .send()
        .await
        .map_err(|e| fetch_error(e.to_string()))?;
    let status = response.status();
    if !status.is_success() {
        return Err(fetch_error(format!("status {}", status.as_u16())));
    }
    let keys: PubKeyResponse = response
        .json()
        .await
        .map_err(|e| fetch_error(e.to_string()))?;

    cache.add(vasp_domain, keys.clone());
    Ok(keys)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::mock_vasp_public_keys;
    use httpmock::prelude::*;

    fn keys(expiration_timestamp: Option<i64>) -> PubKeyResponse {
        PubKeyResponse {
            signing_pub_key: "02aa".to_string(),
            encryption_pub_key: "03bb".to_string(),
            expiration_timestamp,
        }
    }

    #[test]
    fn test_fetch_skips_expired_entries() {
        let cache = InMemoryPublicKeyCache::new();
        let now = Utc::now().timestamp();
        cache.add("fresh.example.com", keys(Some(now + 3600)));
        cache.add("stale.example.com", keys(Some(now - 1)));
        cache.add("forever.example.com", keys(None));

        assert!(cache.fetch("fresh.example.com").is_some());
        assert!(cache.fetch("stale.example.com").is_none());
        assert!(cache.fetch("forever.example.com").is_some());
        assert!(cache.fetch("unknown.example.com").is_none());

        cache.remove("fresh.example.com");
        assert!(cache.fetch("fresh.example.com").is_none());
        cache.clear();
        assert!(cache.fetch("forever.example.com").is_none());
    }

    #[tokio::test]
    async fn test_fetch_public_key_for_vasp_caches_result() {
        let server = MockServer::start();
        let mock = mock_vasp_public_keys(&server, "02aa", "03bb", None);
        let domain = server.address().to_string();
        let cache = InMemoryPublicKeyCache::new();
        let http = Client::new();

        let first = fetch_public_key_for_vasp(&http, &domain, &cache).await.unwrap();
        let second = fetch_public_key_for_vasp(&http, &domain, &cache).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first.signing_pub_key, "02aa");
        mock.assert_hits(1);
    }

    #[tokio::test]
    async fn test_fetch_public_key_failure() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/.well-known/lnurlpubkey");
            then.status(404);
        });
        let domain = server.address().to_string();

        let err = fetch_public_key_for_vasp(&Client::new(), &domain, &InMemoryPublicKeyCache::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::CounterpartyPubkeyFetch { .. }));
        assert_eq!(err.status_code(), 424);
    }
}

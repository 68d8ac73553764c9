//! Authenticated HTTP client shared by every stage of the pipeline.
//!
//! The client owns one cookie jar and one user agent for the lifetime of the
//! process. Listing requests, post lookups, and image downloads all go through
//! it so that a paid subscriber's session reaches every endpoint.
//!
//! # Credential sources
//!
//! Resolved by [`ArchiveClient::authenticate`] in this order:
//!
//! 1. An explicit raw session secret (`--cookie`)
//! 2. An explicit session descriptor path (`--session-file`)
//! 3. `{session_dir}/substack_session_{domain}.json`
//! 4. `{session_dir}/substack_session.json`
//! 5. The `SUBSTACK_SID` environment secret
//! 6. Anonymous (public posts only)
//!
//! A descriptor that cannot be read or parsed is logged and skipped; it never
//! aborts the run.

use crate::error::ScrapeError;
use crate::models::{SessionCookie, SessionState};
use reqwest::Client;
use reqwest::cookie::Jar;
use reqwest::header::USER_AGENT;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};
use url::Url;

/// User agent sent until a captured session replaces it.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Environment variable holding a raw session secret.
pub const SECRET_ENV_VAR: &str = "SUBSTACK_SID";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Where the client's identity came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialSource {
    ExplicitSecret,
    SessionFile(PathBuf),
    EnvironmentSecret,
    Anonymous,
}

/// Inputs to credential resolution. All storage locations are supplied by the
/// caller.
#[derive(Debug, Clone, Copy)]
pub struct Credentials<'a> {
    pub secret: Option<&'a str>,
    pub session_file: Option<&'a Path>,
    pub session_dir: &'a Path,
    pub env_secret: Option<&'a str>,
}

/// Cookie name the platform reads the session from.
///
/// Hosted publications (`*.substack.com`) use `substack.sid`; custom domains
/// are proxied through a separate session and use `connect.sid`.
pub fn session_cookie_name(host: &str) -> &'static str {
    let host = host.to_ascii_lowercase();
    if host == "substack.com" || host.ends_with(".substack.com") {
        "substack.sid"
    } else {
        "connect.sid"
    }
}

/// Descriptor files to try for `host`, most specific first.
pub fn session_candidates(
    session_dir: &Path,
    host: &str,
    explicit: Option<&Path>,
) -> Vec<PathBuf> {
    let mut candidates = Vec::with_capacity(3);
    if let Some(path) = explicit {
        candidates.push(path.to_path_buf());
    }
    candidates.push(session_dir.join(format!("substack_session_{host}.json")));
    candidates.push(session_dir.join("substack_session.json"));
    candidates
}

/// Read and parse a session descriptor without touching any client.
pub fn read_session(path: &Path) -> Result<SessionState, ScrapeError> {
    let raw = std::fs::read_to_string(path).map_err(|e| ScrapeError::Credential {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    serde_json::from_str(&raw).map_err(|e| ScrapeError::Credential {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

/// HTTP client bound to one newsletter and one identity.
#[derive(Debug)]
pub struct ArchiveClient {
    /// Base URL without a trailing slash, e.g. `https://example.substack.com`.
    base: String,
    base_url: Url,
    http: Client,
    jar: Arc<Jar>,
    user_agent: String,
}

impl ArchiveClient {
    /// Build a client for `base_url`, optionally carrying a raw session secret.
    ///
    /// The secret is percent-decoded (browser exports often copy it as
    /// `s%3A...`) and installed under [`session_cookie_name`] for the base host.
    pub fn new(base_url: &str, secret: Option<&str>) -> Result<Self, ScrapeError> {
        let base = base_url.trim().trim_end_matches('/').to_string();
        let parsed = Url::parse(&base).map_err(|source| ScrapeError::InvalidUrl {
            url: base.clone(),
            source,
        })?;
        if parsed.host_str().is_none() {
            return Err(ScrapeError::InvalidUrl {
                url: base,
                source: url::ParseError::EmptyHost,
            });
        }

        let jar = Arc::new(Jar::default());
        let http = Client::builder()
            .cookie_provider(Arc::clone(&jar))
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ScrapeError::transport(&base, e))?;

        let mut client = Self {
            base,
            base_url: parsed,
            http,
            jar,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        };
        if let Some(secret) = secret {
            client.install_secret(secret);
        }
        Ok(client)
    }

    /// Build a client using the first credential source that works.
    #[instrument(level = "info", skip_all, fields(base_url = %base_url))]
    pub fn authenticate(
        base_url: &str,
        credentials: &Credentials<'_>,
    ) -> Result<(Self, CredentialSource), ScrapeError> {
        if let Some(secret) = credentials.secret.filter(|s| !s.trim().is_empty()) {
            info!("Using session secret from command line");
            return Ok((Self::new(base_url, Some(secret))?, CredentialSource::ExplicitSecret));
        }

        let mut client = Self::new(base_url, None)?;
        let candidates = session_candidates(
            credentials.session_dir,
            client.host(),
            credentials.session_file,
        );
        for candidate in candidates {
            if !candidate.exists() {
                debug!(path = %candidate.display(), "No session descriptor here");
                continue;
            }
            if client.load_session(&candidate) {
                return Ok((client, CredentialSource::SessionFile(candidate)));
            }
        }

        if let Some(secret) = credentials.env_secret.filter(|s| !s.trim().is_empty()) {
            info!(var = SECRET_ENV_VAR, "Using session secret from environment");
            client.install_secret(secret);
            return Ok((client, CredentialSource::EnvironmentSecret));
        }

        warn!("No credentials found; only publicly visible posts will be archived");
        Ok((client, CredentialSource::Anonymous))
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn host(&self) -> &str {
        self.base_url.host_str().unwrap_or_default()
    }

    /// Host plus an explicit port, e.g. `localhost:8080`; names the output
    /// directory.
    pub fn domain(&self) -> String {
        match self.base_url.port() {
            Some(port) => format!("{}:{port}", self.host()),
            None => self.host().to_string(),
        }
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    /// Absolute URL for an API path such as `/api/v1/archive`.
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    fn install_secret(&mut self, secret: &str) {
        let decoded = urlencoding::decode(secret.trim())
            .map(|v| v.into_owned())
            .unwrap_or_else(|_| secret.trim().to_string());
        let name = session_cookie_name(self.host());
        self.jar
            .add_cookie_str(&format!("{name}={decoded}; Path=/"), &self.base_url);
        debug!(cookie = name, host = %self.host(), "Installed session secret");
    }

    /// Load a captured session descriptor into this client.
    ///
    /// Returns `false` (and logs why) when the descriptor is unreadable or
    /// malformed; the client is left untouched in that case.
    pub fn load_session(&mut self, path: &Path) -> bool {
        match read_session(path) {
            Ok(state) => {
                self.install_session(&state);
                info!(
                    path = %path.display(),
                    cookies = state.cookies.len(),
                    storage_keys = state.local_storage.len(),
                    "Loaded session descriptor"
                );
                true
            }
            Err(e) => {
                warn!(error = %e, "Could not load session descriptor");
                false
            }
        }
    }

    /// Install every cookie verbatim and adopt the captured user agent.
    ///
    /// The user agent has to match the browser that created the session or
    /// the platform may silently treat requests as anonymous.
    pub fn install_session(&mut self, state: &SessionState) {
        if let Some(ua) = state.user_agent.as_deref().filter(|ua| !ua.trim().is_empty()) {
            self.user_agent = ua.to_string();
        }
        for cookie in &state.cookies {
            self.install_cookie(cookie);
        }
    }

    fn install_cookie(&self, cookie: &SessionCookie) {
        let host = cookie.domain.trim_start_matches('.');
        if host.is_empty() {
            debug!(name = %cookie.name, "Skipping cookie without a domain");
            return;
        }
        let path = if cookie.path.starts_with('/') {
            cookie.path.as_str()
        } else {
            "/"
        };
        let origin = match Url::parse(&format!("{}://{}{}", self.base_url.scheme(), host, path)) {
            Ok(origin) => origin,
            Err(e) => {
                warn!(name = %cookie.name, domain = %cookie.domain, error = %e, "Skipping cookie with unusable domain");
                return;
            }
        };
        // A leading dot marks a domain cookie; anything else is host-only.
        let header = if cookie.domain.starts_with('.') {
            format!("{}={}; Domain={}; Path={}", cookie.name, cookie.value, host, path)
        } else {
            format!("{}={}; Path={}", cookie.name, cookie.value, path)
        };
        self.jar.add_cookie_str(&header, &origin);
    }

    /// GET an API path and decode the JSON body.
    #[instrument(level = "debug", skip(self, params))]
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<T, ScrapeError> {
        let url = self.endpoint(path);
        let response = self
            .http
            .get(&url)
            .header(USER_AGENT, &self.user_agent)
            .query(params)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| ScrapeError::transport(&url, e))?;
        response
            .json::<T>()
            .await
            .map_err(|e| ScrapeError::transport(&url, e))
    }

    /// GET an absolute URL and hand back the successful response for streaming.
    pub async fn get_raw(&self, url: &Url) -> Result<reqwest::Response, ScrapeError> {
        self.http
            .get(url.clone())
            .header(USER_AGENT, &self.user_agent)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| ScrapeError::transport(url.as_str(), e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::cookie::CookieStore;
    use tempfile::TempDir;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn cookie_header(client: &ArchiveClient, url: &str) -> String {
        client
            .jar
            .cookies(&Url::parse(url).unwrap())
            .map(|v| v.to_str().unwrap().to_string())
            .unwrap_or_default()
    }

    const SESSION_JSON: &str = r#"{
        "cookies": [
            {"name": "substack.sid", "value": "s:session-value", "domain": ".substack.com", "path": "/"},
            {"name": "visit_id", "value": "v1", "domain": "example.substack.com", "path": "/"}
        ],
        "local_storage": {},
        "user_agent": "Mozilla/5.0 (X11; Linux x86_64) Captured/1.0"
    }"#;

    #[test]
    fn test_session_cookie_name() {
        assert_eq!(session_cookie_name("read.substack.com"), "substack.sid");
        assert_eq!(session_cookie_name("substack.com"), "substack.sid");
        assert_eq!(session_cookie_name("www.lennysnewsletter.com"), "connect.sid");
        assert_eq!(session_cookie_name("notsubstack.com"), "connect.sid");
        assert_eq!(session_cookie_name("mail.substack.com.proxy.net"), "connect.sid");
        assert_eq!(session_cookie_name("Read.Substack.com"), "substack.sid");
    }

    #[test]
    fn test_secret_is_decoded_and_named_for_hosted_domain() {
        let client = ArchiveClient::new("https://example.substack.com/", Some("s%3Aabc.def")).unwrap();
        assert_eq!(client.base(), "https://example.substack.com");
        assert_eq!(
            cookie_header(&client, "https://example.substack.com/api/v1/archive"),
            "substack.sid=s:abc.def"
        );
    }

    #[test]
    fn test_secret_named_for_custom_domain() {
        let client = ArchiveClient::new("https://www.example.com", Some("s:xyz")).unwrap();
        assert_eq!(
            cookie_header(&client, "https://www.example.com/"),
            "connect.sid=s:xyz"
        );
    }

    #[test]
    fn test_domain_keeps_explicit_port() {
        let plain = ArchiveClient::new("https://example.substack.com", None).unwrap();
        assert_eq!(plain.domain(), "example.substack.com");
        let default_port = ArchiveClient::new("https://example.substack.com:443", None).unwrap();
        assert_eq!(default_port.domain(), "example.substack.com");
        let local = ArchiveClient::new("http://127.0.0.1:8080/", None).unwrap();
        assert_eq!(local.domain(), "127.0.0.1:8080");
        assert_eq!(local.host(), "127.0.0.1");
    }

    #[test]
    fn test_invalid_base_url() {
        let err = ArchiveClient::new("example.substack.com", None).unwrap_err();
        assert!(matches!(err, ScrapeError::InvalidUrl { .. }));
    }

    #[test]
    fn test_endpoint_joins_base() {
        let client = ArchiveClient::new("https://example.substack.com//", None).unwrap();
        assert_eq!(
            client.endpoint("/api/v1/archive"),
            "https://example.substack.com/api/v1/archive"
        );
        assert_eq!(client.user_agent(), DEFAULT_USER_AGENT);
    }

    #[test]
    fn test_load_session_installs_cookies_and_user_agent() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("substack_session.json");
        std::fs::write(&file, SESSION_JSON).unwrap();

        let mut client = ArchiveClient::new("https://example.substack.com", None).unwrap();
        assert!(client.load_session(&file));
        assert_eq!(client.user_agent(), "Mozilla/5.0 (X11; Linux x86_64) Captured/1.0");

        let cookies = cookie_header(&client, "https://example.substack.com/api/v1/archive");
        assert!(cookies.contains("substack.sid=s:session-value"));
        assert!(cookies.contains("visit_id=v1"));

        // The domain cookie reaches sibling publications, the host-only one does not.
        let sibling = cookie_header(&client, "https://other.substack.com/");
        assert!(sibling.contains("substack.sid=s:session-value"));
        assert!(!sibling.contains("visit_id"));
    }

    #[test]
    fn test_load_session_malformed_leaves_client_untouched() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("substack_session.json");
        std::fs::write(&file, "{ not json").unwrap();

        let mut client = ArchiveClient::new("https://example.substack.com", None).unwrap();
        assert!(!client.load_session(&file));
        assert!(!client.load_session(&tmp.path().join("missing.json")));
        assert_eq!(client.user_agent(), DEFAULT_USER_AGENT);
        assert_eq!(cookie_header(&client, "https://example.substack.com/"), "");
    }

    #[test]
    fn test_read_session_reports_path() {
        let err = read_session(Path::new("/nonexistent/substack_session.json")).unwrap_err();
        assert!(matches!(err, ScrapeError::Credential { .. }));
        assert!(err.to_string().contains("/nonexistent/substack_session.json"));
    }

    #[test]
    fn test_session_candidates_order() {
        let dir = Path::new("/sessions");
        let explicit = Path::new("/elsewhere/mine.json");
        let candidates = session_candidates(dir, "example.substack.com", Some(explicit));
        assert_eq!(
            candidates,
            vec![
                PathBuf::from("/elsewhere/mine.json"),
                PathBuf::from("/sessions/substack_session_example.substack.com.json"),
                PathBuf::from("/sessions/substack_session.json"),
            ]
        );
    }

    #[test]
    fn test_authenticate_explicit_secret_wins() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("substack_session.json"), SESSION_JSON).unwrap();
        let creds = Credentials {
            secret: Some("s:explicit"),
            session_file: None,
            session_dir: tmp.path(),
            env_secret: Some("s:env"),
        };
        let (client, source) = ArchiveClient::authenticate("https://example.substack.com", &creds).unwrap();
        assert_eq!(source, CredentialSource::ExplicitSecret);
        assert_eq!(client.user_agent(), DEFAULT_USER_AGENT);
        assert_eq!(
            cookie_header(&client, "https://example.substack.com/"),
            "substack.sid=s:explicit"
        );
    }

    #[test]
    fn test_authenticate_falls_through_malformed_descriptor() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(
            tmp.path().join("substack_session_example.substack.com.json"),
            "garbage",
        )
        .unwrap();
        std::fs::write(tmp.path().join("substack_session.json"), SESSION_JSON).unwrap();
        let creds = Credentials {
            secret: None,
            session_file: None,
            session_dir: tmp.path(),
            env_secret: None,
        };
        let (client, source) = ArchiveClient::authenticate("https://example.substack.com", &creds).unwrap();
        assert_eq!(
            source,
            CredentialSource::SessionFile(tmp.path().join("substack_session.json"))
        );
        assert!(client.user_agent().contains("Captured/1.0"));
    }

    #[test]
    fn test_authenticate_environment_then_anonymous() {
        let tmp = TempDir::new().unwrap();
        let creds = Credentials {
            secret: None,
            session_file: None,
            session_dir: tmp.path(),
            env_secret: Some("s%3Aenv"),
        };
        let (client, source) = ArchiveClient::authenticate("https://www.example.com", &creds).unwrap();
        assert_eq!(source, CredentialSource::EnvironmentSecret);
        assert_eq!(cookie_header(&client, "https://www.example.com/"), "connect.sid=s:env");

        let anonymous = Credentials {
            env_secret: Some("   "),
            ..creds
        };
        let (client, source) = ArchiveClient::authenticate("https://www.example.com", &anonymous).unwrap();
        assert_eq!(source, CredentialSource::Anonymous);
        assert_eq!(cookie_header(&client, "https://www.example.com/"), "");
    }

    #[tokio::test]
    async fn test_get_json_sends_identity() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/archive"))
            .and(query_param("sort", "new"))
            .and(header("user-agent", "Captured/2.0"))
            .and(header("cookie", "connect.sid=s:tok"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([{"slug": "a"}])))
            .expect(1)
            .mount(&server)
            .await;

        let mut client = ArchiveClient::new(&server.uri(), Some("s:tok")).unwrap();
        client.install_session(&SessionState {
            user_agent: Some("Captured/2.0".to_string()),
            ..SessionState::default()
        });

        let body: serde_json::Value = client
            .get_json("/api/v1/archive", &[("sort", "new".to_string())])
            .await
            .unwrap();
        assert_eq!(body[0]["slug"], "a");
    }

    #[tokio::test]
    async fn test_get_json_maps_http_errors_to_transport() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/posts/gone"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = ArchiveClient::new(&server.uri(), None).unwrap();
        let err = client
            .get_json::<serde_json::Value>("/api/v1/posts/gone", &[])
            .await
            .unwrap_err();
        assert!(err.is_transport());
        assert!(err.to_string().contains("/api/v1/posts/gone"));
    }
}

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Map, Value};
use tracing::debug;
use url::Url;

use crate::config::SourceSection;

use super::error::{ResolveError, ResolveResult, SessionError, SessionResult};
use super::types::{Credential, Derivative, SessionToken};
use super::SourcePlatform;

/// Response format selector for JSON.
const FORMAT_JSON: &str = "1";

/// Exception codes that mean the entry itself does not exist.
const ENTRY_NOT_FOUND_CODES: &[&str] = &["ENTRY_ID_NOT_FOUND", "INVALID_ENTRY_ID", "ENTRY_NOT_FOUND"];

/// Client for the Kaltura API v3 endpoints the migration needs.
#[derive(Debug, Clone)]
pub struct KalturaClient {
    http: Client,
    service_url: Url,
    partner_id: String,
    session_type: u8,
    session_expiry_s: u64,
}

impl KalturaClient {
    pub fn new(section: &SourceSection) -> SessionResult<Self> {
        let mut service_url = Url::parse(&section.service_url).map_err(|err| {
            SessionError::Configuration(format!(
                "invalid service url {}: {err}",
                section.service_url
            ))
        })?;
        if !service_url.path().ends_with('/') {
            let path = format!("{}/", service_url.path());
            service_url.set_path(&path);
        }
        let http = Client::builder()
            .user_agent(section.user_agent.clone())
            .build()
            .map_err(|err| SessionError::Configuration(err.to_string()))?;
        Ok(Self {
            http,
            service_url,
            partner_id: section.partner_id.clone(),
            session_type: section.session_type,
            session_expiry_s: section.session_expiry_s,
        })
    }

    fn endpoint(&self, service: &str, action: &str) -> Result<Url, url::ParseError> {
        self.service_url
            .join(&format!("api_v3/service/{service}/action/{action}"))
    }

    async fn post_form(&self, url: Url, form: &[(&str, String)]) -> reqwest::Result<Value> {
        self.http
            .post(url)
            .form(form)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
    }
}

#[async_trait]
impl SourcePlatform for KalturaClient {
    async fn start_session(&self, credential: &Credential) -> SessionResult<SessionToken> {
        let url = self
            .endpoint("session", "start")
            .map_err(|err| SessionError::Configuration(err.to_string()))?;
        let form = [
            ("secret", credential.secret().to_string()),
            ("partnerId", credential.account_id().to_string()),
            ("type", self.session_type.to_string()),
            ("expiry", self.session_expiry_s.to_string()),
            ("format", FORMAT_JSON.to_string()),
        ];
        debug!(partner_id = credential.account_id(), "requesting session");
        let response = self.post_form(url, &form).await?;
        parse_session_response(response)
    }

    async fn list_derivatives(
        &self,
        entry_id: &str,
        token: &SessionToken,
    ) -> ResolveResult<Vec<Derivative>> {
        let url = self
            .endpoint("flavorasset", "getByEntryId")
            .map_err(|err| ResolveError::Response(err.to_string()))?;
        let form = [
            ("ks", token.as_str().to_string()),
            ("entryId", entry_id.to_string()),
            ("format", FORMAT_JSON.to_string()),
        ];
        debug!(entry_id, "listing derivatives");
        let response = self.post_form(url, &form).await?;
        parse_derivatives_response(entry_id, response)
    }

    fn download_url(&self, entry_id: &str, derivative: &Derivative, token: &SessionToken) -> String {
        synthesize_download_url(
            &self.service_url,
            &self.partner_id,
            entry_id,
            &derivative.id,
            derivative.extension(),
            token,
        )
    }
}

/// Builds the play-manifest download URL for one flavor.
pub fn synthesize_download_url(
    service_url: &Url,
    partner_id: &str,
    entry_id: &str,
    derivative_id: &str,
    extension: &str,
    token: &SessionToken,
) -> String {
    let base = service_url.as_str().trim_end_matches('/');
    let scheme = service_url.scheme();
    format!(
        "{base}/p/{partner_id}/sp/{partner_id}00/playManifest/entryId/{entry_id}/flavorId/{derivative_id}/format/download/protocol/{scheme}/ks/{ks}/a.{extension}",
        ks = token.as_str()
    )
}

pub fn parse_session_response(value: Value) -> SessionResult<SessionToken> {
    match value {
        Value::String(token) if !token.trim().is_empty() => Ok(SessionToken::new(token.trim())),
        Value::String(_) => Err(SessionError::Auth("empty session token".into())),
        Value::Object(map) => Err(SessionError::Auth(describe_exception(&map))),
        other => Err(SessionError::Auth(format!(
            "unexpected session response: {other}"
        ))),
    }
}

pub fn parse_derivatives_response(entry_id: &str, value: Value) -> ResolveResult<Vec<Derivative>> {
    match value {
        Value::Array(items) => decode_derivatives(items),
        Value::Object(map) if is_exception(&map) => {
            let message = describe_exception(&map);
            if is_missing_entry(&map) {
                Err(ResolveError::NotFound {
                    entry_id: entry_id.to_string(),
                    message,
                })
            } else {
                Err(ResolveError::Response(message))
            }
        }
        Value::Object(mut map) => match map.remove("objects") {
            Some(Value::Array(items)) => decode_derivatives(items),
            _ => Err(ResolveError::Response(format!(
                "derivative list for {entry_id} has no objects"
            ))),
        },
        other => Err(ResolveError::Response(format!(
            "unexpected derivative list for {entry_id}: {other}"
        ))),
    }
}

fn decode_derivatives(items: Vec<Value>) -> ResolveResult<Vec<Derivative>> {
    items
        .into_iter()
        .map(|item| serde_json::from_value(item).map_err(ResolveError::from))
        .collect()
}

fn is_exception(map: &Map<String, Value>) -> bool {
    let typed = map
        .get("objectType")
        .and_then(Value::as_str)
        .map(|kind| kind.contains("Exception"))
        .unwrap_or(false);
    typed || (map.contains_key("code") && map.contains_key("message"))
}

fn is_missing_entry(map: &Map<String, Value>) -> bool {
    map.get("code")
        .and_then(Value::as_str)
        .map(|code| ENTRY_NOT_FOUND_CODES.contains(&code))
        .unwrap_or(false)
}

fn describe_exception(map: &Map<String, Value>) -> String {
    let code = map.get("code").and_then(Value::as_str);
    let message = map.get("message").and_then(Value::as_str);
    match (code, message) {
        (Some(code), Some(message)) => format!("{code}: {message}"),
        (Some(code), None) => code.to_string(),
        (None, Some(message)) => message.to_string(),
        (None, None) => "platform error without details".to_string(),
    }
}

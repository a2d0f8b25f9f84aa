mod error;
mod kaltura;
mod selection;
mod types;

use async_trait::async_trait;
use tracing::{info, warn};

pub use error::{ResolveError, ResolveResult, SessionError, SessionResult};
pub use kaltura::{
    parse_derivatives_response, parse_session_response, synthesize_download_url, KalturaClient,
};
pub use selection::select_derivative;
pub use types::{
    Credential, Derivative, DerivativeStatus, ResolvedDerivative, SelectionPolicy, SessionToken,
    READY_STATUS_CODE,
};

/// The hosting platform assets are migrated from.
#[async_trait]
pub trait SourcePlatform: Send + Sync {
    async fn start_session(&self, credential: &Credential) -> SessionResult<SessionToken>;

    async fn list_derivatives(
        &self,
        entry_id: &str,
        token: &SessionToken,
    ) -> ResolveResult<Vec<Derivative>>;

    /// URL used when the platform did not send one with the derivative.
    fn download_url(&self, entry_id: &str, derivative: &Derivative, token: &SessionToken) -> String;
}

/// Exchanges the credential for a session token. Single attempt.
pub async fn acquire_session(
    platform: &dyn SourcePlatform,
    credential: &Credential,
) -> SessionResult<SessionToken> {
    match platform.start_session(credential).await {
        Ok(token) => {
            info!(partner_id = credential.account_id(), "session acquired");
            Ok(token)
        }
        Err(err) => {
            warn!(partner_id = credential.account_id(), error = %err, "session start failed");
            Err(err)
        }
    }
}

pub async fn resolve(
    platform: &dyn SourcePlatform,
    entry_id: &str,
    token: &SessionToken,
    policy: &SelectionPolicy,
) -> ResolveResult<ResolvedDerivative> {
    let derivatives = platform.list_derivatives(entry_id, token).await?;
    let chosen =
        select_derivative(&derivatives, policy).ok_or_else(|| ResolveError::NoDerivative {
            entry_id: entry_id.to_string(),
            extension: policy.target_extension.clone(),
        })?;
    let download_url = chosen
        .download_url
        .clone()
        .filter(|url| !url.trim().is_empty())
        .unwrap_or_else(|| platform.download_url(entry_id, chosen, token));
    info!(
        entry_id,
        derivative_id = %chosen.id,
        tier = ?chosen.flavor_params_id,
        candidates = derivatives.len(),
        "derivative selected"
    );
    Ok(ResolvedDerivative {
        derivative_id: chosen.id.clone(),
        download_url,
        original_filename: chosen.original_filename.clone(),
        file_ext: chosen.extension().to_string(),
        flavor_params_id: chosen.flavor_params_id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct StaticPlatform {
        listing: serde_json::Value,
    }

    #[async_trait]
    impl SourcePlatform for StaticPlatform {
        async fn start_session(&self, credential: &Credential) -> SessionResult<SessionToken> {
            if credential.secret() == "good" {
                Ok(SessionToken::new("KS"))
            } else {
                parse_session_response(json!({"code": "INVALID_KS", "message": "bad secret"}))
            }
        }

        async fn list_derivatives(
            &self,
            entry_id: &str,
            _token: &SessionToken,
        ) -> ResolveResult<Vec<Derivative>> {
            parse_derivatives_response(entry_id, self.listing.clone())
        }

        fn download_url(
            &self,
            entry_id: &str,
            derivative: &Derivative,
            token: &SessionToken,
        ) -> String {
            format!("https://cdn.test/{entry_id}/{}?ks={}", derivative.id, token.as_str())
        }
    }

    fn policy() -> SelectionPolicy {
        SelectionPolicy {
            target_extension: "mp4".into(),
            preferred_tier: 100,
        }
    }

    #[tokio::test]
    async fn acquire_session_propagates_auth_errors() {
        let platform = StaticPlatform { listing: json!([]) };
        let ok = acquire_session(&platform, &Credential::new("1", "good")).await;
        assert_eq!(ok.unwrap().as_str(), "KS");
        let err = acquire_session(&platform, &Credential::new("1", "bad")).await;
        assert!(matches!(err, Err(SessionError::Auth(_))));
    }

    #[tokio::test]
    async fn resolve_prefers_api_url_then_synthesizes() {
        let platform = StaticPlatform {
            listing: json!([
                {"id": "0_b", "fileExt": "mp4", "flavorParamsId": 200, "status": 2},
                {"id": "0_a", "fileExt": "mp4", "flavorParamsId": 100, "status": 2,
                 "downloadUrl": "https://api.test/0_a.mp4", "originalFilename": "episode.mov"}
            ]),
        };
        let token = SessionToken::new("KS");
        let resolved = resolve(&platform, "1_abc", &token, &policy()).await.unwrap();
        assert_eq!(resolved.derivative_id, "0_a");
        assert_eq!(resolved.download_url, "https://api.test/0_a.mp4");
        assert_eq!(resolved.original_filename.as_deref(), Some("episode.mov"));

        let platform = StaticPlatform {
            listing: json!([{"id": "0_c", "fileExt": "mp4", "flavorParamsId": 487, "status": 2}]),
        };
        let resolved = resolve(&platform, "1_abc", &token, &policy()).await.unwrap();
        assert_eq!(resolved.download_url, "https://cdn.test/1_abc/0_c?ks=KS");
    }

    #[tokio::test]
    async fn resolve_reports_missing_derivative() {
        let platform = StaticPlatform {
            listing: json!([{"id": "0_a", "fileExt": "flv", "flavorParamsId": 100, "status": 2}]),
        };
        let err = resolve(&platform, "1_abc", &SessionToken::new("KS"), &policy())
            .await
            .unwrap_err();
        assert!(matches!(err, ResolveError::NoDerivative { .. }));
    }
}

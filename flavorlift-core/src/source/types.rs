use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::SourceSection;

/// Platform status code for a flavor whose conversion finished.
pub const READY_STATUS_CODE: i64 = 2;

#[derive(Clone)]
pub struct Credential {
    account_id: String,
    secret: String,
}

impl Credential {
    pub fn new(account_id: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            account_id: account_id.into(),
            secret: secret.into(),
        }
    }

    pub fn account_id(&self) -> &str {
        &self.account_id
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("account_id", &self.account_id)
            .field("secret", &"<redacted>")
            .finish()
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct SessionToken(String);

impl SessionToken {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionToken(<{} chars>)", self.0.len())
    }
}

/// Status as reported by the platform; older endpoints send the numeric
/// code, newer ones a label.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum DerivativeStatus {
    Code(i64),
    Label(String),
}

impl DerivativeStatus {
    pub fn is_ready(&self) -> bool {
        match self {
            DerivativeStatus::Code(code) => *code == READY_STATUS_CODE,
            DerivativeStatus::Label(label) => {
                let label = label.trim();
                label.eq_ignore_ascii_case("ready") || label == READY_STATUS_CODE.to_string()
            }
        }
    }
}

impl Default for DerivativeStatus {
    fn default() -> Self {
        DerivativeStatus::Code(-1)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Derivative {
    pub id: String,
    #[serde(default)]
    pub entry_id: Option<String>,
    #[serde(default)]
    pub file_ext: String,
    #[serde(default)]
    pub flavor_params_id: Option<u32>,
    #[serde(default)]
    pub status: DerivativeStatus,
    #[serde(default, alias = "url")]
    pub download_url: Option<String>,
    #[serde(default, alias = "originalFileName")]
    pub original_filename: Option<String>,
}

impl Derivative {
    pub fn extension(&self) -> &str {
        self.file_ext.trim().trim_start_matches('.')
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedDerivative {
    pub derivative_id: String,
    pub download_url: String,
    pub original_filename: Option<String>,
    pub file_ext: String,
    pub flavor_params_id: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionPolicy {
    pub target_extension: String,
    pub preferred_tier: u32,
}

impl From<&SourceSection> for SelectionPolicy {
    fn from(section: &SourceSection) -> Self {
        Self {
            target_extension: section.target_extension.trim_start_matches('.').to_string(),
            preferred_tier: section.preferred_flavor_params_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_output_hides_secrets() {
        let credential = Credential::new("1234567", "top-secret");
        let token = SessionToken::new("djJ8MTIzNDU2N3x0b2tlbg==");
        assert!(!format!("{credential:?}").contains("top-secret"));
        assert!(!format!("{token:?}").contains("djJ8"));
    }

    #[test]
    fn status_accepts_codes_and_labels() {
        assert!(DerivativeStatus::Code(2).is_ready());
        assert!(!DerivativeStatus::Code(1).is_ready());
        assert!(DerivativeStatus::Label("READY".into()).is_ready());
        assert!(DerivativeStatus::Label("2".into()).is_ready());
        assert!(!DerivativeStatus::Label("converting".into()).is_ready());
        assert!(!DerivativeStatus::default().is_ready());
    }

    #[test]
    fn derivative_deserializes_platform_fields() {
        let raw = serde_json::json!({
            "objectType": "KalturaFlavorAsset",
            "id": "0_flv1",
            "entryId": "1_abc",
            "fileExt": "mp4",
            "flavorParamsId": 100,
            "status": 2,
            "size": 20480,
            "width": 1280,
            "height": 720
        });
        let derivative: Derivative = serde_json::from_value(raw).unwrap();
        assert_eq!(derivative.id, "0_flv1");
        assert_eq!(derivative.flavor_params_id, Some(100));
        assert!(derivative.status.is_ready());
        assert!(derivative.download_url.is_none());
        assert_eq!(derivative.extension(), "mp4");
    }
}

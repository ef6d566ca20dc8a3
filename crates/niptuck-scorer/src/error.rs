use niptuck_common::credential::CredentialError;
use niptuck_common::error::CommonError;
use niptuck_common::gemini::GeminiClientError;
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Common(#[from] CommonError),

    #[error("config error: {0}")]
    Config(String),
}

/// Everything that can stop a scoring attempt. Each variant surfaces on exactly one panel.
#[derive(Debug, thiserror::Error)]
pub enum ScoringError {
    #[error("no API key provided")]
    MissingCredential,

    #[error("API key is not a valid Gemini key")]
    InvalidCredentialShape,

    #[error("no photos selected")]
    NoPhotosSelected,

    #[error("network error (status {}): {body}", status_label(.status))]
    Network {
        status: Option<u16>,
        body: String,
        credential_rejected: bool,
    },

    #[error("model output could not be read as JSON: {0}")]
    ModelOutput(String),

    #[error("a scoring request is already in flight")]
    InFlight,
}

fn status_label(status: &Option<u16>) -> String {
    match status {
        Some(code) => code.to_string(),
        None => "none".to_string(),
    }
}

/// User-visible message panels. Showing one hides all others.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ErrorPanel {
    KeyMissing,
    KeyInvalid,
    NoPhotos,
    Network,
    Model,
    Busy,
}

impl ErrorPanel {
    pub fn message(self) -> &'static str {
        match self {
            Self::KeyMissing => "Add your Gemini API key to continue.",
            Self::KeyInvalid => {
                "That API key doesn't look right. Paste the key itself (starts with AIza), not a URL."
            }
            Self::NoPhotos => "Upload at least one photo (3-5 recommended) before scoring.",
            Self::Network => "The scoring service could not be reached or returned an error. Try again.",
            Self::Model => "The model answered, but not with readable results. Try again.",
            Self::Busy => "Scoring is already running. Wait for it to finish.",
        }
    }
}

impl ScoringError {
    pub fn panel(&self) -> ErrorPanel {
        match self {
            Self::MissingCredential => ErrorPanel::KeyMissing,
            Self::InvalidCredentialShape => ErrorPanel::KeyInvalid,
            Self::NoPhotosSelected => ErrorPanel::NoPhotos,
            Self::Network {
                credential_rejected: true,
                ..
            } => ErrorPanel::KeyInvalid,
            Self::Network { .. } => ErrorPanel::Network,
            Self::ModelOutput(_) => ErrorPanel::Model,
            Self::InFlight => ErrorPanel::Busy,
        }
    }
}

impl From<CredentialError> for ScoringError {
    fn from(value: CredentialError) -> Self {
        match value {
            CredentialError::Missing => Self::MissingCredential,
            CredentialError::InvalidShape => Self::InvalidCredentialShape,
        }
    }
}

impl From<GeminiClientError> for ScoringError {
    fn from(value: GeminiClientError) -> Self {
        match value {
            GeminiClientError::Upstream { .. } | GeminiClientError::Request(_) => Self::Network {
                status: value.status(),
                credential_rejected: value.is_credential_rejection(),
                body: match value {
                    GeminiClientError::Upstream { body, .. } => body,
                    other => other.to_string(),
                },
            },
            GeminiClientError::InvalidJson(e) => Self::ModelOutput(e.to_string()),
            GeminiClientError::NoJson { .. } => Self::ModelOutput(value.to_string()),
        }
    }
}

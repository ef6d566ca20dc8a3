/// Generation API credential: persistence and lexical validation.
///
/// The store keeps whatever the user typed, unvalidated, under a single fixed key.
/// `validate_credential` runs only right before a network call.
use std::fmt;
use std::sync::OnceLock;

use regex::Regex;

use crate::error::CommonError;
use crate::kv::KeyValueStore;

/// Name of the single entry the credential lives under.
pub const CREDENTIAL_KEY: &str = "geminiApiKey";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CredentialError {
    #[error("no API key provided")]
    Missing,

    #[error("API key does not look like a Gemini key (expected AIza followed by at least 20 characters)")]
    InvalidShape,
}

/// A credential that passed `validate_credential`. `Debug` never prints the secret.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Credential({})", mask(&self.0))
    }
}

fn key_shape() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^AIza[0-9A-Za-z_\-]{20,}$").expect("valid regex"))
}

/// Check the lexical shape of a raw credential string.
///
/// Trims whitespace, then strips one leading and one trailing quote character
/// (each independently), rejects URL-looking input, and finally requires `AIza` followed
/// by at least 20 URL-safe characters.
pub fn validate_credential(raw: &str) -> Result<Credential, CredentialError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(CredentialError::Missing);
    }

    let unquoted = trimmed
        .strip_prefix(['"', '\''])
        .unwrap_or(trimmed);
    let unquoted = unquoted.strip_suffix(['"', '\'']).unwrap_or(unquoted);

    let lower = unquoted.to_ascii_lowercase();
    if ["http://", "https://", "file://"]
        .iter()
        .any(|prefix| lower.starts_with(prefix))
    {
        return Err(CredentialError::InvalidShape);
    }

    if !key_shape().is_match(unquoted) {
        return Err(CredentialError::InvalidShape);
    }
    Ok(Credential(unquoted.to_string()))
}

/// Show the first and last four characters only.
pub fn mask(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    if chars.len() <= 8 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}…{tail}")
}

#[derive(Clone)]
pub struct CredentialStore {
    kv: KeyValueStore,
}

impl CredentialStore {
    pub fn new(kv: KeyValueStore) -> Self {
        Self { kv }
    }

    pub fn backend_name(&self) -> &'static str {
        self.kv.backend_name()
    }

    /// The stored raw value, if any. An empty stored string counts as nothing stored.
    pub async fn get(&self) -> Option<String> {
        self.kv.get(CREDENTIAL_KEY).await.filter(|v| !v.is_empty())
    }

    /// Persist the raw value as typed. An empty value clears the entry.
    pub async fn set(&self, value: &str) -> Result<(), CommonError> {
        if value.is_empty() {
            return self.kv.delete(CREDENTIAL_KEY).await;
        }
        self.kv.set(CREDENTIAL_KEY, value).await
    }
}

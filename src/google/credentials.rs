use std::{fs, path::Path};

use serde_json::Value;

use crate::{config::Google, error::CredentialError};

const BEGIN_MARKER: &str = "-----BEGIN";
const END_MARKER: &str = "-----END";

/// A service account ready to sign tokens.
#[derive(Clone)]
pub struct ServiceAccountKey {
    pub project_id: String,
    pub private_key_id: String,
    /// PEM text with real newlines
    pub private_key: String,
    pub client_email: String,
    pub client_id: String,
    pub token_uri: String,
}

impl ServiceAccountKey {
    /// Materialises the key from configuration, normalising the private key.
    pub fn from_config(google: &Google) -> Result<Self, CredentialError> {
        if google.private_key.trim().is_empty() {
            return Err(CredentialError::MissingVar("GOOGLE_PRIVATE_KEY"));
        }
        if google.client_email.trim().is_empty() {
            return Err(CredentialError::MissingVar("GOOGLE_CLIENT_EMAIL"));
        }

        Ok(ServiceAccountKey {
            project_id: google.project_id.clone(),
            private_key_id: google.private_key_id.clone(),
            private_key: normalize_private_key(&google.private_key)?,
            client_email: google.client_email.trim().to_string(),
            client_id: google.client_id.clone(),
            token_uri: google.token_uri.clone(),
        })
    }

    /// Who the job authenticates as, for the startup log.
    pub fn summary(&self) -> String {
        let or_dash = |v: &str| match v.trim() {
            "" => "-".to_string(),
            v => v.to_string(),
        };
        format!(
            "{} (project {}, client {}, key {})",
            self.client_email,
            or_dash(&self.project_id),
            or_dash(&self.client_id),
            or_dash(&self.private_key_id)
        )
    }
}

// Debug output never includes the private key.
impl std::fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("project_id", &self.project_id)
            .field("private_key_id", &self.private_key_id)
            .field("client_email", &self.client_email)
            .field("token_uri", &self.token_uri)
            .finish_non_exhaustive()
    }
}

/// Turns a private key as stored in an environment variable back into PEM.
///
/// Accepts the key with or without surrounding quotes and with newlines
/// escaped as `\n`. Fails unless both PEM markers and a body are present.
pub fn normalize_private_key(raw: &str) -> Result<String, CredentialError> {
    let mut key = raw.trim();
    for quote in ['"', '\''] {
        if key.len() >= 2 && key.starts_with(quote) && key.ends_with(quote) {
            key = &key[1..key.len() - 1];
            break;
        }
    }

    let key = key
        .replace("\\r\\n", "\n")
        .replace("\\n", "\n")
        .replace("\r\n", "\n");
    let key = key.trim();

    if !key.starts_with(BEGIN_MARKER) {
        return Err(CredentialError::MalformedPrivateKey(
            "missing BEGIN marker".to_string(),
        ));
    }

    let end = key.rfind(END_MARKER).ok_or_else(|| {
        CredentialError::MalformedPrivateKey("missing END marker".to_string())
    })?;

    let body_lines = key[..end]
        .lines()
        .skip(1)
        .filter(|line| !line.trim().is_empty())
        .count();
    if body_lines == 0 {
        return Err(CredentialError::MalformedPrivateKey(
            "key body is empty or not split into lines".to_string(),
        ));
    }

    Ok(format!("{}\n", key))
}

/// Extracts `private_key` from a downloaded credential file and returns it
/// as a JSON string literal, newlines escaped, ready for `.env` or a CI secret.
pub fn export_private_key(credential_json: &str) -> Result<String, CredentialError> {
    let parsed: Value =
        serde_json::from_str(credential_json).map_err(|why| CredentialError::CredentialFile {
            path: String::new(),
            reason: why.to_string(),
        })?;

    let key = parsed
        .get("private_key")
        .and_then(Value::as_str)
        .ok_or_else(|| CredentialError::CredentialFile {
            path: String::new(),
            reason: "no private_key field".to_string(),
        })?;

    // 驗證內容確實是 PEM 格式
    normalize_private_key(key)?;

    serde_json::to_string(key).map_err(|why| CredentialError::CredentialFile {
        path: String::new(),
        reason: why.to_string(),
    })
}

/// Reads the credential file at `path` and exports its private key.
pub fn export_private_key_from_file(path: &Path) -> Result<String, CredentialError> {
    let with_path = |err: CredentialError| match err {
        CredentialError::CredentialFile { reason, .. } => CredentialError::CredentialFile {
            path: path.display().to_string(),
            reason,
        },
        other => other,
    };

    let text = fs::read_to_string(path).map_err(|why| CredentialError::CredentialFile {
        path: path.display().to_string(),
        reason: why.to_string(),
    })?;

    export_private_key(&text).map_err(with_path)
}

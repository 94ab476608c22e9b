//! Credential loading from a runtime `.env` file and the process environment.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Context;
use tracing::debug;

use crate::config::TransportConfig;

/// Runtime credentials keyed by variable name.
#[derive(Clone, Default)]
pub struct Credentials {
    vars: BTreeMap<String, String>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("keys", &self.vars.keys().collect::<Vec<_>>())
            .field("values", &"[REDACTED]")
            .finish()
    }
}

impl Credentials {
    /// Build credentials from a key-value map.
    pub fn from_map(vars: BTreeMap<String, String>) -> Self {
        Self { vars }
    }

    /// Returns a required non-empty credential or an error when missing.
    ///
    /// # Errors
    ///
    /// Returns an error when the key is absent or blank.
    pub fn require(&self, key: &str) -> anyhow::Result<String> {
        self.vars
            .get(key)
            .filter(|value| !value.trim().is_empty())
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("missing required credential: {key}"))
    }

    /// Overlay values from an env resolver for the given keys.
    ///
    /// Resolved values win over those loaded from the file.
    pub fn overlay(&mut self, keys: &[&str], env: impl Fn(&str) -> Option<String>) {
        for key in keys {
            if let Some(value) = env(key) {
                self.vars.insert((*key).to_owned(), value);
            }
        }
    }

    /// Returns all non-empty credential values for redaction purposes.
    pub fn known_secrets(&self) -> Vec<String> {
        self.vars
            .values()
            .filter(|value| !value.trim().is_empty())
            .cloned()
            .collect()
    }
}

/// Load credentials from a `.env` path.
///
/// A missing file yields empty credentials so hosted deployments can rely on
/// the process environment alone.
///
/// # Errors
///
/// Returns an error if the file permissions are too broad or parsing fails.
pub fn load_credentials(path: &Path) -> anyhow::Result<Credentials> {
    if !path.exists() {
        debug!(path = %path.display(), "no credentials file, using process environment");
        return Ok(Credentials::default());
    }

    validate_private_permissions(path)?;

    let mut vars = BTreeMap::new();
    let iter = dotenvy::from_path_iter(path)
        .with_context(|| format!("failed to read credentials at {}", path.display()))?;

    for item in iter {
        let (key, value) = item.with_context(|| {
            format!(
                "failed to parse key-value entry in credentials file {}",
                path.display()
            )
        })?;
        vars.insert(key, value);
    }

    Ok(Credentials { vars })
}

#[cfg(unix)]
fn validate_private_permissions(path: &Path) -> anyhow::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let metadata = std::fs::metadata(path)
        .with_context(|| format!("failed to inspect credentials file {}", path.display()))?;
    let mode = metadata.permissions().mode() & 0o777;

    if mode & 0o077 != 0 {
        return Err(anyhow::anyhow!(
            "credentials file {} must be 0600, found {:o}",
            path.display(),
            mode
        ));
    }

    Ok(())
}

#[cfg(not(unix))]
fn validate_private_permissions(_path: &Path) -> anyhow::Result<()> {
    Ok(())
}

// ---------------------------------------------------------------------------
// Twilio
// ---------------------------------------------------------------------------

/// Twilio account credentials and sender identity.
#[derive(Clone, PartialEq, Eq)]
pub struct TwilioAuth {
    /// Account SID, used as the basic-auth user and in the resource path.
    pub account_sid: String,
    /// Auth token, used as the basic-auth password.
    pub auth_token: String,
    /// Sender phone number.
    pub from_number: String,
}

impl std::fmt::Debug for TwilioAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TwilioAuth")
            .field("account_sid", &"[REDACTED]")
            .field("auth_token", &"[REDACTED]")
            .field("from_number", &self.from_number)
            .finish()
    }
}

impl TwilioAuth {
    /// Returns secret values for redactor registration.
    pub fn secret_values(&self) -> Vec<String> {
        vec![self.account_sid.clone(), self.auth_token.clone()]
    }
}

/// Resolve Twilio credentials using the key names from transport config.
///
/// # Errors
///
/// Returns an error naming the first missing key.
pub fn resolve_twilio_auth(
    credentials: &Credentials,
    transport: &TransportConfig,
) -> anyhow::Result<TwilioAuth> {
    Ok(TwilioAuth {
        account_sid: credentials.require(&transport.account_sid_key)?,
        auth_token: credentials.require(&transport.auth_token_key)?,
        from_number: credentials.require(&transport.from_number_key)?,
    })
}

/// Credential keys that the transport reads.
pub fn transport_keys(transport: &TransportConfig) -> [&str; 3] {
    [
        transport.account_sid_key.as_str(),
        transport.auth_token_key.as_str(),
        transport.from_number_key.as_str(),
    ]
}

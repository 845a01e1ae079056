// SPDX-License-Identifier: MIT OR Apache-2.0
//! Error type shared by the secret-store clients.

/// Failures surfaced by secret fetching and template resolution.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VaultError {
    /// The backend rejected our credentials (HTTP 401/403).
    #[error("secret store '{provider}' rejected credentials")]
    Auth {
        /// Backend tag that refused us.
        provider: String,
    },

    /// The secret does not exist, or exists with an empty value.
    #[error("secret not found: {path}")]
    NotFound {
        /// Requested secret path.
        path: String,
    },

    /// HTTP or network-level failure; the status is preserved when one was
    /// received.
    #[error("secret store transport failure{}: {message}", status.map(|s| format!(" (HTTP {s})")).unwrap_or_default())]
    Transport {
        /// HTTP status, if the request got far enough to receive one.
        status: Option<u16>,
        /// Underlying failure text.
        message: String,
    },

    /// The fetch was cancelled before it completed.
    #[error("secret fetch cancelled")]
    Cancelled,

    /// The client could not be constructed from its configuration.
    #[error("secret store misconfigured: {0}")]
    Config(String),
}

impl VaultError {
    /// Whether the transport failure text points at a TLS or certificate
    /// problem. Logged distinctly so operators can tell a broken client
    /// certificate apart from an unreachable host.
    #[must_use]
    pub fn looks_like_tls_failure(&self) -> bool {
        match self {
            VaultError::Transport { message, .. } => {
                let lower = message.to_ascii_lowercase();
                ["tls", "ssl", "certificate", "handshake"]
                    .iter()
                    .any(|needle| lower.contains(needle))
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_display_preserves_status() {
        let err = VaultError::Transport {
            status: Some(503),
            message: "service unavailable".into(),
        };
        assert!(err.to_string().contains("HTTP 503"));
    }

    #[test]
    fn tls_failures_are_recognised() {
        let tls = VaultError::Transport {
            status: None,
            message: "invalid peer certificate: Expired".into(),
        };
        assert!(tls.looks_like_tls_failure());
        let plain = VaultError::Transport {
            status: Some(500),
            message: "connection reset by peer".into(),
        };
        assert!(!plain.looks_like_tls_failure());
        assert!(!VaultError::Cancelled.looks_like_tls_failure());
    }
}

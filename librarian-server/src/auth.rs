//! Authenticator → source-name resolution (§6).
//!
//! The payload carries either an opaque `authenticator` string that maps to
//! a source name through the configured `sources` table, or a third-party
//! `username`/`token` pair that an external identity endpoint verifies. That
//! endpoint is an API collaborator this crate only consumes the contract
//! of ([`IdentityVerifier`]); nothing here speaks its wire protocol.

use async_trait::async_trait;
use librarian_core::LibrarianError;
use serde::Deserialize;
use serde_json::Value;

use crate::state::AppState;

/// The external identity check for third-party username/token credentials.
/// No implementation ships here — see DESIGN.md.
#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    async fn verify(&self, username: &str, token: &str) -> Result<String, LibrarianError>;
}

#[derive(Debug, Deserialize, Default)]
struct Credentials {
    authenticator: Option<String>,
    username: Option<String>,
    token: Option<String>,
}

/// Resolve the payload's credentials to a source name, or `AuthFailed`.
pub async fn authenticate(state: &AppState, payload: &Value) -> Result<String, LibrarianError> {
    let creds: Credentials = serde_json::from_value(payload.clone()).unwrap_or_default();

    if let Some(authenticator) = creds.authenticator.as_deref() {
        return state
            .config
            .sources
            .iter()
            .find(|(_, source)| source.authenticator == authenticator)
            .map(|(name, _)| name.clone())
            .ok_or(LibrarianError::AuthFailed);
    }

    if let (Some(username), Some(token)) = (creds.username.as_deref(), creds.token.as_deref()) {
        let verifier = state.identity_verifier.as_ref().ok_or(LibrarianError::AuthFailed)?;
        return verifier.verify(username, token).await;
    }

    Err(LibrarianError::AuthFailed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::tests::test_state;
    use serde_json::json;

    #[tokio::test]
    async fn known_authenticator_resolves_to_its_source_name() {
        let state = test_state();
        let source = authenticate(&state, &json!({"authenticator": "s3cr3t-token"}))
            .await
            .unwrap();
        assert_eq!(source, "karoo");
    }

    #[tokio::test]
    async fn unknown_authenticator_fails_auth() {
        let state = test_state();
        let err = authenticate(&state, &json!({"authenticator": "nope"})).await.unwrap_err();
        assert!(matches!(err, LibrarianError::AuthFailed));
    }

    #[tokio::test]
    async fn missing_credentials_fail_auth() {
        let state = test_state();
        let err = authenticate(&state, &json!({})).await.unwrap_err();
        assert!(matches!(err, LibrarianError::AuthFailed));
    }

    #[tokio::test]
    async fn third_party_credentials_fail_without_a_configured_verifier() {
        let state = test_state();
        let err = authenticate(&state, &json!({"username": "alice", "token": "xyz"}))
            .await
            .unwrap_err();
        assert!(matches!(err, LibrarianError::AuthFailed));
    }
}

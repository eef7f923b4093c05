use crate::access_log::{AccessLogEntry, AccessLogger};
use crate::grant::GrantManager;
use crate::grant::error::GrantError;
use crate::signed_url::SignedUrlService;
use axum::extract::{Path, Query, Request, State};
use axum::http::{StatusCode, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use std::sync::Arc;
use tracing::warn;

/// Header carrying the requester's verified identity, installed by the
/// upstream authentication layer. Trusted as ground truth for binding.
pub const USER_ID_HEADER: &str = "x-user-id";

/// Uniform denial. The body never identifies which check failed; the
/// specific reason is only visible to the audit log.
fn denied_response() -> Response {
    (StatusCode::UNAUTHORIZED, "access denied").into_response()
}

/// Credential carried by a wrapped signed URL.
#[derive(Debug, Deserialize)]
pub struct UrlCredential {
    pub expires: Option<u64>,
    pub sig: Option<String>,
}

/// Verifier state passed to the media middleware
#[derive(Clone)]
pub struct GrantState {
    pub grant_manager: Arc<GrantManager>,
    pub signed_urls: SignedUrlService,
    pub access_log: AccessLogger,
}

/// Middleware gating the external media route.
///
/// Two credential forms are accepted: the `expires`/`sig` query pair of a
/// wrapped signed URL, or a Bearer binding token checked against the
/// authenticated user. Every decision, grant or deny, is recorded.
pub async fn media_auth_middleware(
    State(state): State<GrantState>,
    Path((content_id, storage_key)): Path<(String, String)>,
    Query(url_credential): Query<UrlCredential>,
    mut req: Request,
    next: Next,
) -> Response {
    let presented_user = req
        .headers()
        .get(USER_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);

    let outcome = authorize(
        &state,
        &content_id,
        &storage_key,
        &url_credential,
        presented_user.as_deref(),
        req.headers()
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok()),
    );

    let log_user = presented_user.as_deref().unwrap_or("-");
    match outcome {
        Ok(claims) => {
            state.access_log.log(AccessLogEntry::granted(
                log_user,
                &content_id,
                &storage_key,
                "credential verified",
            ));

            if let Some(claims) = claims {
                req.extensions_mut().insert(claims);
            }
            next.run(req).await
        }
        Err(reason) => {
            warn!(
                content_id,
                storage_key,
                user_id = log_user,
                %reason,
                "Media access denied"
            );
            state.access_log.log(AccessLogEntry::denied(
                log_user,
                &content_id,
                &storage_key,
                &reason.to_string(),
            ));
            denied_response()
        }
    }
}

fn authorize(
    state: &GrantState,
    content_id: &str,
    storage_key: &str,
    url_credential: &UrlCredential,
    presented_user: Option<&str>,
    authorization: Option<&str>,
) -> Result<Option<crate::grant::GrantClaims>, GrantError> {
    // Wrapped-URL form: the URL itself is the storage-layer credential.
    if let (Some(expires), Some(sig)) = (url_credential.expires, url_credential.sig.as_deref()) {
        state
            .signed_urls
            .verify_wrapped(content_id, storage_key, expires, sig)?;
        return Ok(None);
    }

    // Binding-token form: requires both the token and the authenticated
    // identity it must be bound to.
    let token = match authorization.and_then(|header| header.strip_prefix("Bearer ")) {
        Some(token) => token,
        None => return Err(GrantError::Malformed),
    };
    let user_id = match presented_user {
        Some(user_id) if !user_id.is_empty() => user_id,
        _ => return Err(GrantError::UserMismatch),
    };

    let claims = state
        .grant_manager
        .verify(token, user_id, content_id, storage_key)?;
    Ok(Some(claims))
}

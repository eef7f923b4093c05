use crate::MIN_URL_EXPIRATION;
use crate::app_state::AppState;
use crate::content_type::content_type_for_key;
use crate::grant::{
    CreateGrantRequest, CreateGrantResponse, CreateStreamGrantRequest, CreateStreamGrantResponse,
};
use crate::access_log::AccessLogEntry;
use crate::storage::is_safe_storage_key;
use axum::body::Body;
use axum::extract::{Extension, Path as AxumPath};
use axum::http::{Request, Response, StatusCode, header};
use axum::response::{IntoResponse, Json, Redirect};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

#[derive(Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

#[axum::debug_handler]
pub async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, Json(HealthResponse { status: "ok" }))
}

/// Mint a binding token plus a signed media URL for one (user, content,
/// storage object) triple.
///
/// The entitlement check runs first; nothing is signed for a user the
/// platform says may not view the content.
pub async fn create_grant(
    Extension(state): Extension<AppState>,
    Json(request): Json<CreateGrantRequest>,
) -> axum::response::Response {
    if request.user_id.is_empty() {
        warn!("user_id is empty");
        return err_response(StatusCode::BAD_REQUEST, "user_id is required");
    }
    if request.content_id.is_empty() {
        warn!("content_id is empty");
        return err_response(StatusCode::BAD_REQUEST, "content_id is required");
    }
    if !is_safe_storage_key(&request.storage_key) {
        warn!(storage_key = %request.storage_key, "Invalid storage key");
        return err_response(StatusCode::BAD_REQUEST, "Invalid storage key");
    }

    if !state
        .entitlement
        .is_entitled(&request.user_id, &request.content_id)
        .await
    {
        debug!(
            user_id = %request.user_id,
            content_id = %request.content_id,
            "Grant refused, user not entitled"
        );
        state.access_log.log(AccessLogEntry::denied(
            &request.user_id,
            &request.content_id,
            &request.storage_key,
            "not entitled",
        ));
        return err_response(StatusCode::FORBIDDEN, "not entitled");
    }

    let grant = match state.grant_manager.issue(
        &request.user_id,
        &request.content_id,
        &request.storage_key,
        request.expires_in_secs,
    ) {
        Ok(grant) => grant,
        Err(error) => {
            warn!(?error, "Failed to mint binding token");
            return err_response(error.mint_status(), "Failed to mint grant");
        }
    };

    let signed_url = match state
        .signed_urls
        .generate(
            &request.content_id,
            &request.storage_key,
            request.expires_in_secs,
        )
        .await
    {
        Ok(signed_url) => signed_url,
        Err(error) => {
            error!(?error, "Failed to generate signed URL");
            return err_response(error.mint_status(), "Failed to generate signed URL");
        }
    };

    debug!(
        user_id = %request.user_id,
        content_id = %request.content_id,
        expires_at = grant.expires_at,
        "Grant minted"
    );
    state.access_log.log(AccessLogEntry::granted(
        &request.user_id,
        &request.content_id,
        &request.storage_key,
        "grant minted",
    ));

    (
        StatusCode::OK,
        Json(CreateGrantResponse {
            binding_token: grant.token,
            media_url: signed_url.url,
            expires_at: grant.expires_at,
        }),
    )
        .into_response()
}

/// Mint a token for the external streaming provider.
pub async fn create_stream_grant(
    Extension(state): Extension<AppState>,
    Json(request): Json<CreateStreamGrantRequest>,
) -> axum::response::Response {
    let Some(stream_tokens) = &state.stream_tokens else {
        warn!("Stream grant requested but no stream secret is configured");
        return err_response(StatusCode::SERVICE_UNAVAILABLE, "streaming not configured");
    };

    if request.user_id.is_empty() {
        warn!("user_id is empty");
        return err_response(StatusCode::BAD_REQUEST, "user_id is required");
    }
    if request.content_id.is_empty() {
        warn!("content_id is empty");
        return err_response(StatusCode::BAD_REQUEST, "content_id is required");
    }

    if !state
        .entitlement
        .is_entitled(&request.user_id, &request.content_id)
        .await
    {
        state.access_log.log(AccessLogEntry::denied(
            &request.user_id,
            &request.content_id,
            "-",
            "not entitled",
        ));
        return err_response(StatusCode::FORBIDDEN, "not entitled");
    }

    match stream_tokens.issue(&request.content_id, request.expires_in_secs) {
        Ok(token) => {
            state.access_log.log(AccessLogEntry::granted(
                &request.user_id,
                &request.content_id,
                "-",
                "stream token minted",
            ));
            (
                StatusCode::OK,
                Json(CreateStreamGrantResponse {
                    token: token.token,
                    content_id: token.content_id,
                    expires_at: token.expires_at,
                }),
            )
                .into_response()
        }
        Err(error) => {
            warn!(?error, "Failed to mint stream token");
            err_response(error.mint_status(), "Failed to mint stream token")
        }
    }
}

/// Serve one gated media object. Runs behind the grant middleware, so the
/// credential has already been verified by the time this executes.
///
/// The downstream credential is regenerated fresh on every hit: a valid
/// binding token says nothing about whether an older presigned URL is
/// still alive.
pub async fn serve_media(
    Extension(state): Extension<AppState>,
    AxumPath((content_id, storage_key)): AxumPath<(String, String)>,
    req: Request<Body>,
) -> axum::response::Response {
    if !is_safe_storage_key(&storage_key) {
        warn!(%content_id, %storage_key, "Invalid storage key");
        return err_response(StatusCode::BAD_REQUEST, "Invalid storage key");
    }

    if state.storage.is_remote() {
        // Redirect to a short-lived presigned URL in the backend's own
        // signing scheme.
        return match state
            .storage
            .presign_read(&storage_key, std::time::Duration::from_secs(MIN_URL_EXPIRATION))
            .await
        {
            Ok(url) => {
                debug!(%content_id, %storage_key, "Redirecting to presigned URL");
                Redirect::temporary(&url).into_response()
            }
            Err(error) => {
                error!(%content_id, %storage_key, ?error, "Failed to presign object");
                file_not_found()
            }
        };
    }

    let Ok(size) = state.storage.content_length(&storage_key).await else {
        return file_not_found();
    };
    if size == 0 {
        return file_not_found();
    }

    let (status, start, end) = parse_range(&req, size);
    let body = match state.storage.read_range(&storage_key, start, end).await {
        Ok(bytes) => bytes,
        Err(error) => {
            error!(%content_id, %storage_key, ?error, "Failed to read object");
            return file_not_found();
        }
    };

    debug!(%content_id, %storage_key, start, end, "Serving media object");

    let mut res = Response::new(Body::from(body));
    *res.status_mut() = status;
    let headers = res.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        content_type_for_key(&storage_key).parse().unwrap(),
    );
    headers.insert(header::ACCEPT_RANGES, "bytes".parse().unwrap());
    // Gated content is never cacheable by shared caches.
    headers.insert(header::CACHE_CONTROL, "private, max-age=0".parse().unwrap());
    headers.insert(
        header::CONTENT_LENGTH,
        (end - start + 1).to_string().parse().unwrap(),
    );
    if status == StatusCode::PARTIAL_CONTENT {
        headers.insert(
            header::CONTENT_RANGE,
            format!("bytes {start}-{end}/{size}").parse().unwrap(),
        );
    }
    res
}

fn parse_range(req: &Request<Body>, file_size: u64) -> (StatusCode, u64, u64) {
    if let Some(rh) = req.headers().get(header::RANGE)
        && let Ok(s) = rh.to_str()
        && let Some(stripped) = s.strip_prefix("bytes=")
        && let parts = stripped.split('-').collect::<Vec<_>>()
        && let Ok(start) = parts[0].parse::<u64>()
        && start < file_size
    {
        let end = parts
            .get(1)
            .and_then(|e| e.parse::<u64>().ok())
            .unwrap_or(file_size - 1)
            .min(file_size - 1);
        if start <= end {
            return (StatusCode::PARTIAL_CONTENT, start, end);
        }
    }

    (StatusCode::OK, 0, file_size - 1)
}

fn file_not_found() -> axum::response::Response {
    err_response(StatusCode::NOT_FOUND, "File not found")
}

pub(crate) fn err_response(status: StatusCode, body_str: &'static str) -> axum::response::Response {
    Response::builder()
        .status(status)
        .body(Body::from(body_str))
        .unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn get_request(range: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri("/media/c/key.mp4");
        if let Some(range) = range {
            builder = builder.header(header::RANGE, range);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[test]
    fn test_parse_range_full_file_without_header() {
        let (status, start, end) = parse_range(&get_request(None), 100);
        assert_eq!(status, StatusCode::OK);
        assert_eq!((start, end), (0, 99));
    }

    #[test]
    fn test_parse_range_bounded() {
        let (status, start, end) = parse_range(&get_request(Some("bytes=10-19")), 100);
        assert_eq!(status, StatusCode::PARTIAL_CONTENT);
        assert_eq!((start, end), (10, 19));
    }

    #[test]
    fn test_parse_range_open_ended_and_clamped() {
        let (status, start, end) = parse_range(&get_request(Some("bytes=90-")), 100);
        assert_eq!(status, StatusCode::PARTIAL_CONTENT);
        assert_eq!((start, end), (90, 99));

        let (_, start, end) = parse_range(&get_request(Some("bytes=90-500")), 100);
        assert_eq!((start, end), (90, 99));
    }

    #[test]
    fn test_parse_range_garbage_falls_back_to_full() {
        let (status, start, end) = parse_range(&get_request(Some("bytes=oops")), 100);
        assert_eq!(status, StatusCode::OK);
        assert_eq!((start, end), (0, 99));

        // A start past the end of the file is not satisfiable as a range.
        let (status, ..) = parse_range(&get_request(Some("bytes=500-")), 100);
        assert_eq!(status, StatusCode::OK);

        // An inverted range falls back rather than underflowing.
        let (status, start, end) = parse_range(&get_request(Some("bytes=5-2")), 100);
        assert_eq!(status, StatusCode::OK);
        assert_eq!((start, end), (0, 99));
    }
}

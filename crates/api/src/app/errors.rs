use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use assistsync_auth::AuthzError;
use assistsync_events::FanoutError;
use assistsync_infra::activation::ToggleError;
use assistsync_infra::store::StoreError;

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

pub fn store_error_to_response(err: StoreError) -> axum::response::Response {
    match err {
        StoreError::NotFound => json_error(StatusCode::NOT_FOUND, "not_found", "conversation not found"),
        StoreError::Conflict => json_error(StatusCode::CONFLICT, "conflict", "conversation already exists"),
        StoreError::Backend(msg) => {
            tracing::error!(error = %msg, "store backend failure");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", msg)
        }
    }
}

pub fn toggle_error_to_response(err: ToggleError) -> axum::response::Response {
    match err {
        ToggleError::Store(e) => store_error_to_response(e),
        ToggleError::TenantInactive(verdict) => json_error(
            StatusCode::CONFLICT,
            "assistant_disabled",
            format!("assistant is disabled for this tenant: {}", verdict.reason),
        ),
    }
}

pub fn authz_error_to_response(err: AuthzError) -> axum::response::Response {
    match err {
        AuthzError::TenantMismatch => json_error(StatusCode::FORBIDDEN, "tenant_isolation", "tenant mismatch"),
        AuthzError::Forbidden(perm) => json_error(
            StatusCode::FORBIDDEN,
            "forbidden",
            format!("missing permission '{perm}'"),
        ),
    }
}

pub fn fanout_error_to_response(err: FanoutError) -> axum::response::Response {
    match err {
        FanoutError::UnknownSession(_) => json_error(StatusCode::NOT_FOUND, "unknown_session", err.to_string()),
        FanoutError::TenantMismatch { .. } => {
            json_error(StatusCode::FORBIDDEN, "tenant_isolation", err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assistsync_activation::ActivationVerdict;

    #[test]
    fn store_errors_map_to_http_statuses() {
        assert_eq!(store_error_to_response(StoreError::NotFound).status(), StatusCode::NOT_FOUND);
        assert_eq!(store_error_to_response(StoreError::Conflict).status(), StatusCode::CONFLICT);
        assert_eq!(
            store_error_to_response(StoreError::Backend("down".into())).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn refused_activation_is_a_conflict() {
        let resp = toggle_error_to_response(ToggleError::TenantInactive(ActivationVerdict::fail_closed()));
        assert_eq!(resp.status(), StatusCode::CONFLICT);
    }
}

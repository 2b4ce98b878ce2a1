//! Version negotiation middleware
//!
//! Runs in front of every route. It stamps the supported range on every
//! response, negotiates the requested version for everything under `/v1`,
//! stores the result as an [`ApiVersion`] request extension and echoes it
//! back on the response.

use axum::{
    extract::Request,
    http::{HeaderMap, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};

use super::error::ApiError;
use crate::version::{
    ApiVersion, VersionError, MAX_VERSION_HEADER, MIN_VERSION_HEADER, VERSION_HEADER,
};

fn header_value(version: ApiVersion) -> HeaderValue {
    // "<digits>.<digits>" is always a valid header value
    HeaderValue::from_str(&version.to_string()).unwrap_or(HeaderValue::from_static("1.1"))
}

fn requested_version(headers: &HeaderMap) -> Result<ApiVersion, VersionError> {
    let raw = match headers.get(VERSION_HEADER) {
        None => None,
        Some(value) => Some(
            value
                .to_str()
                .map_err(|_| VersionError::Malformed(String::from_utf8_lossy(value.as_bytes()).into_owned()))?,
        ),
    };
    ApiVersion::negotiate(raw)
}

/// Negotiate the API version for one request.
pub async fn negotiate_version(mut req: Request, next: Next) -> Response {
    let versioned = req.uri().path().starts_with("/v1");

    let mut response = if versioned {
        match requested_version(req.headers()) {
            Ok(version) => {
                req.extensions_mut().insert(version);
                let mut response = next.run(req).await;
                response
                    .headers_mut()
                    .insert(VERSION_HEADER, header_value(version));
                response
            }
            Err(e) => {
                tracing::debug!(error = %e, "version negotiation failed");
                ApiError::from(e).into_response()
            }
        }
    } else {
        next.run(req).await
    };

    let headers = response.headers_mut();
    headers.insert(MIN_VERSION_HEADER, header_value(ApiVersion::MIN));
    headers.insert(MAX_VERSION_HEADER, header_value(ApiVersion::MAX));
    response
}

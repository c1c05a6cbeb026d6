//! Canvas REST client.
//!
//! Issues authenticated requests against an allowlisted Canvas instance
//! and follows `Link: <url>; rel="next"` pagination transparently. Every
//! request path checks the allowlist before a token leaves the process;
//! followed pagination links must additionally stay on the origin that
//! was allowlisted.

use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use reqwest::StatusCode;
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

use crate::allowlist::{AllowlistError, HostAllowlist};

use super::types::RawProfile;

const USER_AGENT: &str = concat!("Unitrack/", env!("CARGO_PKG_VERSION"));
const COURSES_PER_PAGE: u32 = 50;

/// Tolerant extractor for the `next` relation out of a Link header value.
/// Other relations and malformed segments are ignored.
static LINK_NEXT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<\s*([^<>]+?)\s*>\s*;[^,]*rel\s*=\s*"?next"?"#).expect("link pattern compiles")
});

/// Failures talking to Canvas, grouped by how the caller must react.
#[derive(Debug, Error)]
pub enum CanvasError {
    /// 401/403: the stored token is no longer valid. The caller reacts by
    /// disconnecting, so this must stay distinguishable from everything else.
    #[error("canvas rejected the access token")]
    TokenInvalid,
    /// Connectivity/timeout problems; safe to retry later.
    #[error("network error talking to canvas: {details}")]
    Network { details: String },
    /// Canvas answered with an unexpected status (5xx and friends).
    #[error("canvas returned status {status}")]
    Upstream { status: u16 },
    /// Body did not parse into the expected shape.
    #[error("malformed canvas response: {details}")]
    MalformedResponse { details: String },
    /// The `next` link pointed back at the page just fetched.
    #[error("pagination loop detected at {url}")]
    PaginationLoop { url: String },
    /// Base URL failed the allowlist check.
    #[error(transparent)]
    HostNotAllowed(#[from] AllowlistError),
}

impl CanvasError {
    fn from_status(status: StatusCode) -> Self {
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            CanvasError::TokenInvalid
        } else {
            CanvasError::Upstream {
                status: status.as_u16(),
            }
        }
    }

    fn from_reqwest(error: reqwest::Error) -> Self {
        CanvasError::Network {
            details: error.to_string(),
        }
    }
}

/// HTTP client for one deployment's set of allowlisted Canvas instances.
#[derive(Debug, Clone)]
pub struct CanvasClient {
    http: reqwest::Client,
    allowlist: HostAllowlist,
}

impl CanvasClient {
    pub fn new(allowlist: HostAllowlist, timeout: Duration) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()?;

        Ok(Self { http, allowlist })
    }

    /// The host table this client enforces.
    pub fn allowlist(&self) -> &HostAllowlist {
        &self.allowlist
    }

    /// Fetch the authenticated user's profile. Doubles as token verification
    /// when creating a connection.
    pub async fn fetch_profile(
        &self,
        base_url: &str,
        token: &str,
    ) -> Result<RawProfile, CanvasError> {
        self.allowlist.require(base_url)?;

        let url = format!(
            "{}/api/v1/users/self/profile",
            base_url.trim_end_matches('/')
        );

        let response = self
            .http
            .get(&url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(CanvasError::from_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            return Err(CanvasError::from_status(status));
        }

        response
            .json::<RawProfile>()
            .await
            .map_err(|e| CanvasError::MalformedResponse {
                details: e.to_string(),
            })
    }

    /// Fetch every page of the user's active courses as raw JSON values.
    ///
    /// Pages are fetched strictly sequentially; each page's URL comes from
    /// the previous response's Link header. Individual records are left
    /// unvalidated here so the mapper can skip bad ones without losing the
    /// rest of the page.
    pub async fn fetch_courses(
        &self,
        base_url: &str,
        token: &str,
    ) -> Result<Vec<serde_json::Value>, CanvasError> {
        self.allowlist.require(base_url)?;

        let base = base_url.trim_end_matches('/');
        let origin = Url::parse(base).map_err(|e| CanvasError::MalformedResponse {
            details: format!("invalid base URL: {}", e),
        })?;

        let mut next_url = format!(
            "{}/api/v1/courses?enrollment_state=active&include[]=syllabus_body&per_page={}",
            base, COURSES_PER_PAGE
        );
        let mut courses = Vec::new();
        let mut pages = 0u32;

        loop {
            let response = self
                .http
                .get(&next_url)
                .bearer_auth(token)
                .send()
                .await
                .map_err(CanvasError::from_reqwest)?;

            let status = response.status();
            if !status.is_success() {
                return Err(CanvasError::from_status(status));
            }

            let link_header = response
                .headers()
                .get("Link")
                .and_then(|value| value.to_str().ok())
                .map(str::to_string);

            let page: Vec<serde_json::Value> =
                response
                    .json()
                    .await
                    .map_err(|e| CanvasError::MalformedResponse {
                        details: e.to_string(),
                    })?;

            pages += 1;
            debug!(page = pages, records = page.len(), "fetched canvas course page");
            courses.extend(page);

            let Some(next) = link_header.as_deref().and_then(parse_link_next) else {
                break;
            };

            // A next link identical to the page just fetched would loop forever.
            if next == next_url {
                return Err(CanvasError::PaginationLoop { url: next });
            }

            // The token only ever follows links on the origin we allowlisted.
            let next_parsed = Url::parse(&next).map_err(|e| CanvasError::MalformedResponse {
                details: format!("invalid next link: {}", e),
            })?;
            if !same_origin(&origin, &next_parsed) {
                warn!(next = %next, "canvas next link left the allowlisted origin");
                return Err(CanvasError::MalformedResponse {
                    details: "next link points off the allowlisted host".to_string(),
                });
            }

            next_url = next;
        }

        Ok(courses)
    }
}

/// Extract the `next` relation URL from a Link header value, if present.
pub(crate) fn parse_link_next(header: &str) -> Option<String> {
    header
        .split(',')
        .find_map(|part| LINK_NEXT.captures(part).map(|c| c[1].to_string()))
}

fn same_origin(a: &Url, b: &Url) -> bool {
    a.scheme() == b.scheme()
        && a.host_str() == b.host_str()
        && a.port_or_known_default() == b.port_or_known_default()
}

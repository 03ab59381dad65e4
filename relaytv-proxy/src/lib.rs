//! Stream Gateway
//!
//! Fetches an upstream media resource on behalf of the player, follows
//! redirects under a bounded budget and streams the body back with a
//! controlled header set. Bare segments and live streams are answered with
//! a synthesized playlist instead; upstream playlists are rewritten so
//! their URIs route back through the gateway.

pub mod content_type;
pub mod error;
pub mod guard;
pub mod headers;
pub mod m3u8;
pub mod query;

use std::time::Duration;

use axum::{
    body::Body,
    http::{
        header::{
            HeaderValue, ACCESS_CONTROL_ALLOW_ORIGIN, CACHE_CONTROL, CONTENT_LENGTH, CONTENT_TYPE,
            LOCATION,
        },
        HeaderMap, Method, StatusCode,
    },
    response::Response,
};
use backon::{BackoffBuilder, ExponentialBuilder};
use bytes::{Bytes, BytesMut};
use futures::stream::{self, BoxStream, StreamExt};
use relaytv_core::config::GatewayConfig;
use relaytv_core::models::stream::is_playlist;
use relaytv_core::models::StreamRequest;
use relaytv_core::resilience::retry::should_retry_error;
use tracing::{debug, warn};
use url::Url;

pub use error::GatewayError;
pub use query::RelayQuery;

/// Upstream response after the redirect loop
#[derive(Debug)]
pub struct UpstreamResponse {
    /// URL that produced the final response
    pub final_url: Url,
    pub redirects: u32,
    pub response: reqwest::Response,
}

type UpstreamBody = BoxStream<'static, Result<Bytes, reqwest::Error>>;

/// MPEG-TS packets start with this byte
const TS_SYNC_BYTE: u8 = 0x47;

enum PlaylistBody {
    Complete(String),
    /// Not a playlist after all: the bytes read so far and the rest
    Media { prefix: Bytes, rest: UpstreamBody },
}

/// Shared gateway state: configuration plus one pooled HTTP client
#[derive(Debug, Clone)]
pub struct Gateway {
    client: reqwest::Client,
    config: GatewayConfig,
    user_agent: HeaderValue,
}

impl Gateway {
    pub fn new(config: GatewayConfig) -> Result<Self, GatewayError> {
        let user_agent = HeaderValue::from_str(config.user_agent.trim()).map_err(|e| {
            GatewayError::InvalidRequest(format!("invalid user agent: {e}"))
        })?;

        // Redirects are followed by hand so every hop passes the host guard
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .connect_timeout(config.connect_timeout())
            .pool_idle_timeout(Duration::from_secs(config.pool_idle_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            config,
            user_agent,
        })
    }

    #[must_use]
    pub const fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Answer one gateway call
    pub async fn relay(
        &self,
        method: Method,
        request: &StreamRequest,
        inbound: &HeaderMap,
    ) -> Result<Response, GatewayError> {
        guard::check_target(&request.target_url, self.config.block_private_hosts)?;

        if request.should_synthesize() {
            debug!(
                target = %request.target_url,
                mode = %request.effective_mode(),
                "Synthesizing manifest"
            );
            let manifest = m3u8::synthesize_manifest(
                request.target_url.as_str(),
                request.effective_mode(),
                &self.config.public_path,
            );
            return playlist_response(&method, manifest);
        }

        let upstream = self
            .fetch(method.clone(), request.target_url.clone(), inbound)
            .await?;
        let status = upstream.response.status();
        let final_path = upstream.final_url.path().to_string();

        let upstream_type = upstream
            .response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok());
        let content_type = content_type::resolve_content_type(upstream_type, &final_path);
        if upstream_type != content_type.as_deref() {
            debug!(
                upstream = ?upstream_type,
                resolved = ?content_type,
                "Overrode content type"
            );
        }

        let is_playlist_body = content_type
            .as_deref()
            .is_some_and(content_type::is_playlist_content_type)
            || is_playlist(&final_path);
        let upstream_headers = upstream.response.headers().clone();
        let body = upstream.response.bytes_stream().boxed();

        if !request.want_raw && method != Method::HEAD && status == StatusCode::OK && is_playlist_body
        {
            match self.read_playlist(body).await? {
                PlaylistBody::Complete(text) => {
                    let rewritten =
                        m3u8::rewrite_playlist(&text, &upstream.final_url, &self.config.public_path);
                    return playlist_response(&method, rewritten);
                }
                PlaylistBody::Media { prefix, rest } => {
                    // Labelled as a playlist but actually media (often an
                    // endless MPEG-TS feed): relay it unchanged
                    let content_type = if prefix.first() == Some(&TS_SYNC_BYTE) {
                        Some(content_type::MPEG_TS.to_string())
                    } else {
                        content_type
                    };
                    debug!(
                        buffered = prefix.len(),
                        content_type = ?content_type,
                        "Playlist-labelled body is not a playlist, streaming through"
                    );
                    let head = stream::once(async move { Ok::<_, reqwest::Error>(prefix) });
                    return media_response(
                        status,
                        &upstream_headers,
                        content_type,
                        Body::from_stream(head.chain(rest)),
                    );
                }
            }
        }

        // Dropping the body stream (client gone) drops the upstream connection
        media_response(status, &upstream_headers, content_type, Body::from_stream(body))
    }

    /// Buffer a playlist candidate for rewriting. Gives up as soon as the
    /// body cannot be a playlist or outgrows `max_playlist_bytes`, returning
    /// what was read so far together with the unread remainder.
    async fn read_playlist(&self, mut body: UpstreamBody) -> Result<PlaylistBody, GatewayError> {
        let limit = self.config.max_playlist_bytes;
        let timeout = self.config.request_timeout();
        let mut buffered = BytesMut::new();

        let read = async {
            while let Some(chunk) = body.next().await {
                buffered.extend_from_slice(&chunk?);
                if buffered.len() > limit || !m3u8::may_be_playlist(&buffered) {
                    return Ok::<_, GatewayError>(false);
                }
            }
            Ok(true)
        };
        let outcome = tokio::time::timeout(timeout, read).await;
        let complete = match outcome {
            Ok(result) => result?,
            Err(_) => {
                warn!(?timeout, buffered = buffered.len(), "Playlist body timed out");
                return Err(GatewayError::Timeout(timeout));
            }
        };

        if complete && m3u8::is_playlist_body(&buffered) {
            Ok(PlaylistBody::Complete(
                String::from_utf8_lossy(&buffered).into_owned(),
            ))
        } else {
            Ok(PlaylistBody::Media {
                prefix: buffered.freeze(),
                rest: body,
            })
        }
    }

    /// Issue the upstream request, following redirects up to the budget
    pub async fn fetch(
        &self,
        method: Method,
        target: Url,
        inbound: &HeaderMap,
    ) -> Result<UpstreamResponse, GatewayError> {
        let upstream_headers = headers::upstream_request_headers(inbound, &self.user_agent);
        let mut current = target;

        for hop in 0..=self.config.max_redirects {
            guard::check_target(&current, self.config.block_private_hosts)?;

            let response = self.send(&method, &current, &upstream_headers).await?;
            if !response.status().is_redirection() {
                return Ok(UpstreamResponse {
                    final_url: current,
                    redirects: hop,
                    response,
                });
            }

            // 304 and friends carry no Location and are passed through
            let Some(location) = response.headers().get(LOCATION) else {
                return Ok(UpstreamResponse {
                    final_url: current,
                    redirects: hop,
                    response,
                });
            };
            let location = location
                .to_str()
                .map_err(|_| GatewayError::InvalidRedirect("non-ASCII Location header".to_string()))?;
            let next = current
                .join(location)
                .map_err(|e| GatewayError::InvalidRedirect(format!("{location}: {e}")))?;
            if !matches!(next.scheme(), "http" | "https") {
                return Err(GatewayError::InvalidRedirect(format!(
                    "unsupported scheme in {next}"
                )));
            }

            debug!(hop, status = %response.status(), from = %current, to = %next, "Following redirect");
            current = next;
        }

        warn!(
            limit = self.config.max_redirects,
            last = %current,
            "Redirect budget exhausted"
        );
        Err(GatewayError::TooManyRedirects(self.config.max_redirects))
    }

    /// One upstream exchange. Only the response head is bounded by the
    /// request timeout; connection failures are retried with backoff.
    async fn send(
        &self,
        method: &Method,
        url: &Url,
        headers: &HeaderMap,
    ) -> Result<reqwest::Response, GatewayError> {
        let timeout = self.config.request_timeout();
        let mut backoff = ExponentialBuilder::default()
            .with_min_delay(Duration::from_millis(100))
            .with_max_delay(Duration::from_secs(1))
            .with_max_times(self.config.connect_retries as usize)
            .with_jitter()
            .build();

        loop {
            let request = self
                .client
                .request(method.clone(), url.clone())
                .headers(headers.clone());

            match tokio::time::timeout(timeout, request.send()).await {
                Err(_) => {
                    warn!(url = %url, ?timeout, "Upstream response timed out");
                    return Err(GatewayError::Timeout(timeout));
                }
                Ok(Ok(response)) => return Ok(response),
                Ok(Err(e)) if !e.is_timeout() && (e.is_connect() || should_retry_error(&e)) => {
                    let Some(delay) = backoff.next() else {
                        return Err(e.into());
                    };
                    warn!(url = %url, error = %e, ?delay, "Upstream connection failed, retrying");
                    tokio::time::sleep(delay).await;
                }
                Ok(Err(e)) => return Err(e.into()),
            }
        }
    }
}

fn media_response(
    status: StatusCode,
    upstream_headers: &HeaderMap,
    content_type: Option<String>,
    body: Body,
) -> Result<Response, GatewayError> {
    let mut builder = Response::builder().status(status);
    if let Some(out) = builder.headers_mut() {
        out.extend(headers::forwarded_response_headers(upstream_headers));
        if let Some(ct) = content_type.and_then(|ct| HeaderValue::from_str(&ct).ok()) {
            out.insert(CONTENT_TYPE, ct);
        }
        out.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    }
    Ok(builder.body(body)?)
}

fn playlist_response(method: &Method, playlist: String) -> Result<Response, GatewayError> {
    let builder = Response::builder()
        .status(StatusCode::OK)
        .header(CONTENT_TYPE, content_type::HLS_PLAYLIST)
        .header(CONTENT_LENGTH, playlist.len())
        .header(CACHE_CONTROL, "no-cache")
        .header(ACCESS_CONTROL_ALLOW_ORIGIN, "*");

    let body = if *method == Method::HEAD {
        Body::empty()
    } else {
        Body::from(playlist)
    };
    Ok(builder.body(body)?)
}

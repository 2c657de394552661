//! The dispatch engine: HTTP server, fan-out scheduling, acknowledgement.

use std::future::IntoFuture;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::extract::{Request, State};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use http::header::{ALLOW, CONTENT_TYPE};
use http::{HeaderValue, Method, StatusCode};
use reqwest::Url;
use serde::Serialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use scatter_storage::Storage;

use crate::client::new_client;
use crate::config::Config;
use crate::error::Error;
use crate::limiter;
use crate::stat::{Counters, Stat};
use crate::worker::WorkerPool;

/// One configured downstream target, frozen at construction.
#[derive(Debug, Clone)]
struct Endpoint {
    name: String,
    url: Url,
    timeout: Duration,
}

struct Inner {
    config: Config,
    client: reqwest::Client,
    storage: Arc<dyn Storage>,
    endpoints: Vec<Endpoint>,
    endpoint_names: Vec<String>,
    counters: Counters,
    worker: Option<WorkerPool>,
}

/// The broker: traps one inbound HTTP request, acknowledges it, and
/// dispatches it to every configured endpoint.
///
/// Cheap to clone; all clones share the outbound client, the storage
/// handle, the counters and the worker pool.
#[derive(Clone)]
pub struct Broker {
    inner: Arc<Inner>,
}

impl Broker {
    /// Builds a broker from its configuration and a storage handle.
    ///
    /// Validates the endpoint set and, when `worker_num` is positive,
    /// starts the worker pool.
    pub fn new(config: Config, storage: Arc<dyn Storage>) -> Result<Self, Error> {
        if config.endpoints.is_empty() {
            return Err(Error::NoEndpoints);
        }

        let mut endpoints = Vec::with_capacity(config.endpoints.len());
        for (name, ep) in &config.endpoints {
            let url = Url::parse(&ep.url).map_err(|err| Error::EndpointUrl {
                name: name.clone(),
                reason: err.to_string(),
            })?;
            let timeout = match ep.timeout {
                Some(t) if !t.is_zero() => t.as_std(),
                _ => config.http_client_timeout.as_std(),
            };
            endpoints.push(Endpoint {
                name: name.clone(),
                url,
                timeout,
            });
        }
        let endpoint_names = config.endpoint_names();

        let worker = (config.worker_num > 0).then(|| {
            debug!(workers = config.worker_num, "worker pool launched");
            let pool = WorkerPool::new(config.worker_num as usize);
            pool.start();
            pool
        });

        let client = new_client(&config)?;

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                client,
                storage,
                endpoints,
                endpoint_names,
                counters: Counters::default(),
                worker,
            }),
        })
    }

    /// Returns the counter deltas since the previous call and resets them.
    pub fn stat(&self) -> Stat {
        self.inner.counters.snapshot()
    }

    /// Closes the worker pool, waiting for in-flight fan-out jobs.
    pub async fn close(&self) {
        if let Some(worker) = &self.inner.worker {
            worker.close().await;
        }
    }

    /// Binds the configured address and serves until `token` is cancelled.
    pub async fn serve(&self, token: CancellationToken) -> Result<(), Error> {
        let addr = self.inner.config.listen_addr();
        let listener = TcpListener::bind(&addr).await?;
        info!(%addr, "broker: listening");
        self.serve_on(listener, token).await
    }

    /// Serves on an already-bound listener until `token` is cancelled,
    /// then drains in-flight handlers for at most the configured shutdown
    /// timeout and closes the worker pool.
    pub async fn serve_on(
        &self,
        listener: TcpListener,
        token: CancellationToken,
    ) -> Result<(), Error> {
        let router = self.router();
        let shutdown = {
            let token = token.clone();
            async move { token.cancelled().await }
        };
        let server = axum::serve(listener, router).with_graceful_shutdown(shutdown);
        let mut server = std::pin::pin!(server.into_future());

        tokio::select! {
            result = &mut server => result?,
            () = token.cancelled() => {
                info!("broker: context canceled");
                let drain = self.inner.config.shutdown_timeout.as_std();
                if drain.is_zero() {
                    (&mut server).await?;
                } else {
                    match tokio::time::timeout(drain, &mut server).await {
                        Ok(result) => result?,
                        Err(_) => warn!(timeout = ?drain, "broker: shutdown drain timed out"),
                    }
                }
            }
        }

        self.close().await;
        info!("broker: closed");
        Ok(())
    }

    fn router(&self) -> Router {
        let router = Router::new().fallback(entry).with_state(self.clone());
        limiter::apply(router, self.inner.config.max_handlers)
    }

    async fn handle(&self, request: Request) -> Response {
        let (parts, body) = request.into_parts();
        match parts.method.as_str() {
            "GET" => self.dispatch(&parts, None, None).await,
            "POST" => {
                let content_type = parts.headers.get(CONTENT_TYPE).cloned();
                let bytes = match axum::body::to_bytes(body, usize::MAX).await {
                    Ok(bytes) => bytes,
                    Err(err) => {
                        return problem(
                            StatusCode::INTERNAL_SERVER_ERROR,
                            "failed to read body",
                            &err.to_string(),
                            "(N/A)",
                        );
                    }
                };
                self.dispatch(&parts, Some(bytes), content_type).await
            }
            other => {
                let mut response = problem(
                    StatusCode::METHOD_NOT_ALLOWED,
                    "method not allowed",
                    &format!("method {other} is not allowed"),
                    "",
                );
                response
                    .headers_mut()
                    .insert(ALLOW, HeaderValue::from_static("GET, POST"));
                response
            }
        }
    }

    /// Persists the request record, schedules one fan-out job per endpoint
    /// and acknowledges the caller. The acknowledgement may race with
    /// fan-out completion; callers learn endpoint outcomes from storage
    /// only.
    async fn dispatch(
        &self,
        parts: &http::request::Parts,
        body: Option<Bytes>,
        content_type: Option<HeaderValue>,
    ) -> Response {
        let reqid = Uuid::new_v4().to_string();

        if let Err(err) = self
            .inner
            .storage
            .store_request(&reqid, parts.method.as_str(), &parts.uri.to_string())
            .await
        {
            return problem(
                StatusCode::INTERNAL_SERVER_ERROR,
                "failed to prepare storage",
                &err.to_string(),
                &reqid,
            );
        }

        let query = parts
            .uri
            .query()
            .filter(|q| !q.is_empty())
            .map(ToOwned::to_owned);

        for endpoint in &self.inner.endpoints {
            let job = inquire(
                Arc::clone(&self.inner),
                reqid.clone(),
                endpoint.clone(),
                parts.method.clone(),
                query.clone(),
                content_type.clone(),
                body.clone(),
            );
            match &self.inner.worker {
                Some(pool) => {
                    if let Err(err) = pool.run(Box::pin(job)) {
                        self.inner.counters.incr_worker_fail();
                        warn!(
                            reqid = %reqid,
                            endpoint = %endpoint.name,
                            error = %err,
                            "worker: failed to queue"
                        );
                    }
                }
                None => {
                    tokio::spawn(job);
                }
            }
        }

        json_response(
            StatusCode::OK,
            &Ack {
                request_id: &reqid,
                endpoints: &self.inner.endpoint_names,
            },
        )
    }
}

async fn entry(State(broker): State<Broker>, request: Request) -> Response {
    broker.handle(request).await
}

/// One fan-out job: build the outbound request, execute it under the
/// endpoint deadline, persist the body. Every outcome after this point is
/// absorbed by a counter and a log line.
async fn inquire(
    inner: Arc<Inner>,
    reqid: String,
    endpoint: Endpoint,
    method: Method,
    query: Option<String>,
    content_type: Option<HeaderValue>,
    body: Option<Bytes>,
) {
    inner.counters.incr_inquire();

    let url = concat_query(&endpoint.url, query.as_deref());
    let mut request = inner.client.request(method, url);
    if let Some(ct) = content_type {
        request = request.header(CONTENT_TYPE, ct);
    }
    if let Some(body) = body {
        request = request.body(body);
    }

    let send = async {
        let response = request.send().await?;
        let status = response.status();
        let bytes = response.bytes().await?;
        Ok::<_, reqwest::Error>((status, bytes))
    };

    let outcome = if endpoint.timeout.is_zero() {
        send.await
    } else {
        match tokio::time::timeout(endpoint.timeout, send).await {
            Ok(outcome) => outcome,
            Err(_) => {
                inner.counters.incr_inquire_timeout();
                return;
            }
        }
    };

    let (status, bytes) = match outcome {
        Ok(ok) => ok,
        Err(err) if err.is_timeout() => {
            inner.counters.incr_inquire_timeout();
            return;
        }
        Err(err) => {
            inner.counters.incr_inquire_fail();
            warn!(reqid = %reqid, endpoint = %endpoint.name, error = %err, "failed to round trip");
            return;
        }
    };
    // The broker is a transport: non-2xx bodies are persisted like any
    // other, the status only shows up here.
    debug!(reqid = %reqid, endpoint = %endpoint.name, status = status.as_u16(), "downstream answered");

    if let Err(err) = inner
        .storage
        .store_response(&reqid, &endpoint.name, &bytes)
        .await
    {
        if err.is_timeout() {
            inner.counters.incr_store_timeout();
        } else {
            inner.counters.incr_inquire_fail();
            warn!(reqid = %reqid, endpoint = %endpoint.name, error = %err, "failed to store");
        }
    }
}

/// Appends the inbound raw query to the endpoint's base URL.
fn concat_query(base: &Url, query: Option<&str>) -> Url {
    let Some(query) = query else {
        return base.clone();
    };
    let mut url = base.clone();
    match base.query() {
        Some(existing) if !existing.is_empty() => {
            url.set_query(Some(&format!("{existing}&{query}")));
        }
        _ => url.set_query(Some(query)),
    }
    url
}

#[derive(Serialize)]
struct Ack<'a> {
    request_id: &'a str,
    endpoints: &'a [String],
}

#[derive(Serialize)]
struct ProblemDetail<'a> {
    status: u16,
    title: &'a str,
    detail: &'a str,
    #[serde(skip_serializing_if = "str::is_empty")]
    request_id: &'a str,
}

fn problem(status: StatusCode, title: &str, detail: &str, request_id: &str) -> Response {
    json_response(
        status,
        &ProblemDetail {
            status: status.as_u16(),
            title,
            detail,
            request_id,
        },
    )
}

fn json_response<T: Serialize>(status: StatusCode, value: &T) -> Response {
    match serde_json::to_vec(value) {
        Ok(body) => Response::builder()
            .status(status)
            .header(CONTENT_TYPE, "application/json; charset=utf-8")
            .body(Body::from(body))
            .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response()),
        Err(_) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn concat_query_without_inbound_query_keeps_base() {
        let base = url("http://host:1000/path?fixed=1");
        assert_eq!(concat_query(&base, None), base);
    }

    #[test]
    fn concat_query_assigns_when_base_has_none() {
        let base = url("http://host:1000/path");
        assert_eq!(
            concat_query(&base, Some("q=1")).as_str(),
            "http://host:1000/path?q=1"
        );
    }

    #[test]
    fn concat_query_joins_with_ampersand() {
        let base = url("http://host:1000/path?fixed=1");
        assert_eq!(
            concat_query(&base, Some("q=1&r=2")).as_str(),
            "http://host:1000/path?fixed=1&q=1&r=2"
        );
    }

    #[test]
    fn problem_detail_drops_empty_request_id() {
        let body = serde_json::to_value(&ProblemDetail {
            status: 405,
            title: "method not allowed",
            detail: "method PUT is not allowed",
            request_id: "",
        })
        .unwrap();
        assert!(body.get("request_id").is_none());
        assert_eq!(body["status"], 405);
    }
}

//! Request routing and the non-upload handlers.

use std::future::Future;
use std::io;
use std::time::{Duration, Instant};

use bytes::Bytes;
use futures_util::TryStreamExt;
use http_body_util::{BodyExt, Full};
use hyper::body::Body;
use hyper::header::{ALLOW, CONTENT_TYPE, HeaderValue};
use hyper::{Method, Request, Response, StatusCode};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::io::StreamReader;
use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

use pipeload_stream::ThrottledReader;

use crate::config::ServerConfig;
use crate::sink::Sink;
use crate::upload::receive_upload;

pub type ResponseBody = Full<Bytes>;

/// Most request body read and discarded after a rejected upload. Clients
/// stream the whole body before reading the response, so a rejection
/// only reaches them once their body has been consumed.
const MAX_DRAIN: u64 = 64 * 1024 * 1024;

/// Dispatches one request and logs its outcome.
///
/// `POST /upload/` runs without a deadline so large uploads are never cut
/// off; everything under `/` runs under the configured API timeout.
pub async fn route<B>(req: Request<B>, config: &ServerConfig) -> Response<ResponseBody>
where
    B: Body<Data = Bytes> + Send + Unpin,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let id = Uuid::new_v4();
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let span = info_span!("request", %id);

    async move {
        let start = Instant::now();
        let response = match path.as_str() {
            "/upload/" | "/upload" if method == Method::POST => handle_upload(req, config).await,
            "/upload/" | "/upload" => method_not_allowed("POST"),
            "/" if method == Method::GET => {
                with_api_timeout(config.api_timeout, async { text(StatusCode::OK, "OK") }).await
            }
            "/" if method == Method::POST => {
                with_api_timeout(config.api_timeout, handle_raw_write(req, config)).await
            }
            "/" => method_not_allowed("GET, POST"),
            _ => text(StatusCode::NOT_FOUND, "404 page not found\n"),
        };

        info!(
            %method,
            path = %path,
            status = response.status().as_u16(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "request handled"
        );
        response
    }
    .instrument(span)
    .await
}

async fn handle_upload<B>(req: Request<B>, config: &ServerConfig) -> Response<ResponseBody>
where
    B: Body<Data = Bytes> + Send + Unpin,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    debug!("upload handler called");
    let content_type = req
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);

    let mut body = body_reader(req.into_body());
    match receive_upload(content_type.as_deref(), &mut body, config).await {
        Ok(upload) => text(StatusCode::OK, upload.confirmation()),
        Err(failure) => {
            drain_body(&mut body, MAX_DRAIN).await;
            text(failure.status(), failure.public_message())
        }
    }
}

/// Reads and discards up to `limit` bytes of what is left of `body`.
async fn drain_body<R>(body: &mut R, limit: u64) -> u64
where
    R: AsyncRead + Unpin,
{
    let mut rest = body.take(limit);
    match tokio::io::copy(&mut rest, &mut tokio::io::sink()).await {
        Ok(discarded) => {
            debug!(discarded, "drained rejected request body");
            discarded
        }
        Err(e) => {
            debug!(error = %e, "stopped draining request body");
            0
        }
    }
}

/// `POST /`: writes the raw request body to the destination.
async fn handle_raw_write<B>(req: Request<B>, config: &ServerConfig) -> Response<ResponseBody>
where
    B: Body<Data = Bytes> + Send + Unpin,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let internal = || text(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error\n");

    let mut body = body_reader(req.into_body());
    let mut sink = match Sink::create(&config.destination).await {
        Ok(sink) => sink,
        Err(e) => {
            error!(error = %e, "error creating file");
            drain_body(&mut body, MAX_DRAIN).await;
            return internal();
        }
    };
    let mut source = ThrottledReader::new(body, config.upload_delay);
    let written = match sink.copy_from(&mut source).await {
        Ok(n) => n,
        Err(e) => {
            error!(error = %e, "error writing body");
            return internal();
        }
    };
    if let Err(e) = sink.finish().await {
        error!(error = %e, "error syncing file");
        return internal();
    }

    debug!(written, "body written");
    text(StatusCode::OK, "DONE\n")
}

/// Runs `handler` under `limit`, answering 503 if it runs out. A zero
/// limit disables the deadline.
async fn with_api_timeout<F>(limit: Duration, handler: F) -> Response<ResponseBody>
where
    F: Future<Output = Response<ResponseBody>>,
{
    if limit.is_zero() {
        return handler.await;
    }
    match tokio::time::timeout(limit, handler).await {
        Ok(response) => response,
        Err(_) => {
            warn!(?limit, "request timed out");
            text(StatusCode::SERVICE_UNAVAILABLE, "Request timed out")
        }
    }
}

/// Adapts a request body into a byte reader.
fn body_reader<B>(body: B) -> impl AsyncRead + Send + Unpin
where
    B: Body<Data = Bytes> + Send + Unpin,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    StreamReader::new(body.into_data_stream().map_err(io::Error::other))
}

fn method_not_allowed(allow: &'static str) -> Response<ResponseBody> {
    let mut response = text(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed\n");
    response
        .headers_mut()
        .insert(ALLOW, HeaderValue::from_static(allow));
    response
}

pub(crate) fn text(status: StatusCode, body: impl Into<Bytes>) -> Response<ResponseBody> {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = status;
    response.headers_mut().insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}

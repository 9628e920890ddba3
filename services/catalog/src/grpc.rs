//! gRPC transport for the catalog, `laptop.v1.LaptopService`.
//!
//! ## RPCs
//!
//! - `CreateLaptop` (unary)
//! - `SearchLaptop` (server streaming, one response per match)
//! - `UploadImage` (client streaming: info first, then chunks)
//! - `RateLaptop` (bidirectional, one response per score)
//!
//! Every call gets its own [`CallContext`]. Its deadline is the earlier of
//! the `grpc-timeout` header and the handler's request timeout; a client
//! that drops a response stream cancels it.

use crate::context::CallContext;
use crate::error::CatalogError;
use crate::laptop_store::StoreError;
use crate::pb::{
    CreateLaptopRequest, CreateLaptopResponse, RateLaptopRequest, RateLaptopResponse,
    SearchLaptopRequest, SearchLaptopResponse, UploadImageRequest, UploadImageResponse,
};
use crate::service::CatalogService;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tonic::metadata::MetadataMap;
use tonic::{Request, Response, Status, Streaming};
use tracing::{debug, error, warn};

include!(concat!(env!("OUT_DIR"), "/laptop.v1.LaptopService.rs"));

pub use laptop_service_client::LaptopServiceClient;
pub use laptop_service_server::{LaptopService, LaptopServiceServer};

/// Buffered responses per streaming call before the producer waits.
pub const DEFAULT_STREAM_BUFFER: usize = 16;

/// Upper bound on a call when the client asks for no shorter deadline.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// gRPC handler wrapping a shared [`CatalogService`].
#[derive(Clone)]
pub struct GrpcHandler {
    service: Arc<CatalogService>,
    stream_buffer: usize,
    request_timeout: Duration,
}

impl GrpcHandler {
    pub fn new(service: Arc<CatalogService>) -> Self {
        Self {
            service,
            stream_buffer: DEFAULT_STREAM_BUFFER,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_stream_buffer(mut self, stream_buffer: usize) -> Self {
        self.stream_buffer = stream_buffer.max(1);
        self
    }

    /// Bound every call, streaming ones included, by `timeout`.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    fn call_context(&self, metadata: &MetadataMap) -> CallContext {
        call_context(metadata, self.request_timeout)
    }
}

#[tonic::async_trait]
impl LaptopService for GrpcHandler {
    async fn create_laptop(
        &self,
        request: Request<CreateLaptopRequest>,
    ) -> Result<Response<CreateLaptopResponse>, Status> {
        let ctx = self.call_context(request.metadata());
        let laptop = request
            .into_inner()
            .laptop
            .ok_or_else(|| Status::invalid_argument("request carries no laptop"))?;

        let service = self.service.clone();
        let id = run_blocking(move || service.create_laptop(&ctx, laptop)).await?;

        Ok(Response::new(CreateLaptopResponse { id }))
    }

    type SearchLaptopStream = ReceiverStream<Result<SearchLaptopResponse, Status>>;

    async fn search_laptop(
        &self,
        request: Request<SearchLaptopRequest>,
    ) -> Result<Response<Self::SearchLaptopStream>, Status> {
        let ctx = self.call_context(request.metadata());
        let filter = request.into_inner().filter.unwrap_or_default();

        // One slot stays reserved for the terminal status.
        let (tx, rx) = mpsc::channel(self.stream_buffer + 1);
        let outcome = tx
            .clone()
            .reserve_owned()
            .await
            .map_err(|_| Status::internal("search response stream closed"))?;

        let finished = CancellationToken::new();
        tokio::spawn(cancel_when_closed(
            tx.clone(),
            ctx.token().clone(),
            finished.clone(),
        ));

        // The store iterates under a synchronous read lock. Each send waits
        // for room in the stream, but never past the call's deadline.
        let service = self.service.clone();
        let runtime = Handle::current();
        tokio::task::spawn_blocking(move || {
            let _finished = finished.drop_guard();

            let result = service.search_laptop(&ctx, &filter, &mut |laptop| {
                let response = Ok(SearchLaptopResponse {
                    laptop: Some(laptop),
                });

                match runtime.block_on(ctx.run(tx.send(response))) {
                    Ok(Ok(())) => Ok(()),
                    Ok(Err(_)) => Err(StoreError::Emit("client stream closed".to_string())),
                    Err(reason) => Err(StoreError::Interrupted(reason)),
                }
            });

            if let Err(e) = result {
                let _ = outcome.send(Err(e.into()));
            }
        });

        Ok(Response::new(ReceiverStream::new(rx)))
    }

    async fn upload_image(
        &self,
        request: Request<Streaming<UploadImageRequest>>,
    ) -> Result<Response<UploadImageResponse>, Status> {
        let ctx = self.call_context(request.metadata());
        let response = self
            .service
            .upload_image(&ctx, request.into_inner())
            .await?;

        Ok(Response::new(response))
    }

    type RateLaptopStream = ReceiverStream<Result<RateLaptopResponse, Status>>;

    async fn rate_laptop(
        &self,
        request: Request<Streaming<RateLaptopRequest>>,
    ) -> Result<Response<Self::RateLaptopStream>, Status> {
        let ctx = self.call_context(request.metadata());
        let mut requests = request.into_inner();
        let (tx, rx) = mpsc::channel(self.stream_buffer);

        let service = self.service.clone();
        tokio::spawn(async move {
            loop {
                let next = tokio::select! {
                    biased;
                    _ = tx.closed() => {
                        ctx.cancel();
                        break;
                    }
                    reason = ctx.interrupted() => {
                        let _ = tx.try_send(Err(CatalogError::from(reason).into()));
                        break;
                    }
                    next = requests.next() => next,
                };

                let outcome = match next {
                    None => {
                        debug!("No more ratings");
                        break;
                    }
                    Some(Err(status)) => {
                        warn!(error = %status, "Cannot receive rating request");
                        Err(CatalogError::Unknown(format!(
                            "cannot receive stream request: {}",
                            status.message()
                        ))
                        .into())
                    }
                    Some(Ok(request)) => {
                        let service = service.clone();
                        let call = ctx.clone();
                        run_blocking(move || service.rate_laptop(&call, request)).await
                    }
                };

                let failed = outcome.is_err();
                match ctx.run(tx.send(outcome)).await {
                    Ok(Ok(())) if !failed => {}
                    Ok(_) => break,
                    Err(reason) => {
                        let _ = tx.try_send(Err(CatalogError::from(reason).into()));
                        break;
                    }
                }
            }
        });

        Ok(Response::new(ReceiverStream::new(rx)))
    }
}

/// Run synchronous store work on the blocking pool.
async fn run_blocking<T, F>(work: F) -> Result<T, Status>
where
    F: FnOnce() -> Result<T, CatalogError> + Send + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn_blocking(work).await {
        Ok(result) => result.map_err(Status::from),
        Err(e) => Err(Status::internal(format!("handler task failed: {}", e))),
    }
}

/// Cancel `token` once the receiving half of `tx` is dropped, unless
/// `finished` fires first.
async fn cancel_when_closed<T>(
    tx: mpsc::Sender<T>,
    token: CancellationToken,
    finished: CancellationToken,
) {
    tokio::select! {
        _ = tx.closed() => {
            debug!("Client stopped reading, canceling call");
            token.cancel();
        }
        _ = finished.cancelled() => {}
    }
}

/// Build the context for one call from its request metadata.
///
/// The deadline is the earlier of the `grpc-timeout` header and `limit`.
fn call_context(metadata: &MetadataMap, limit: Duration) -> CallContext {
    let requested = match metadata.get("grpc-timeout").map(|v| v.to_str()) {
        Some(Ok(value)) => {
            let parsed = parse_grpc_timeout(value);
            if parsed.is_none() {
                warn!(value, "Ignoring malformed grpc-timeout header");
            }
            parsed
        }
        Some(Err(e)) => {
            error!(error = %e, "Unreadable grpc-timeout header");
            None
        }
        None => None,
    };

    let timeout = requested.map_or(limit, |requested| requested.min(limit));

    CallContext::new().with_timeout(timeout)
}

/// Parse a `grpc-timeout` value: up to 8 ASCII digits followed by a unit
/// (`H`, `M`, `S`, `m`, `u`, `n`).
fn parse_grpc_timeout(value: &str) -> Option<Duration> {
    if !value.is_ascii() || value.len() < 2 || value.len() > 9 {
        return None;
    }

    let (digits, unit) = value.split_at(value.len() - 1);
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let amount: u64 = digits.parse().ok()?;

    match unit {
        "H" => Some(Duration::from_secs(amount * 3600)),
        "M" => Some(Duration::from_secs(amount * 60)),
        "S" => Some(Duration::from_secs(amount)),
        "m" => Some(Duration::from_millis(amount)),
        "u" => Some(Duration::from_micros(amount)),
        "n" => Some(Duration::from_nanos(amount)),
        _ => None,
    }
}

/// Create a `LaptopServiceServer` from a shared catalog service, bounding
/// every call by `request_timeout`.
pub fn grpc_server(
    service: Arc<CatalogService>,
    request_timeout: Duration,
) -> LaptopServiceServer<GrpcHandler> {
    LaptopServiceServer::new(GrpcHandler::new(service).with_request_timeout(request_timeout))
}

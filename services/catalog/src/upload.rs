//! Chunked image upload.
//!
//! An upload is a client stream: one `info` message naming the laptop and
//! the image type, then any number of byte chunks, then end of input.
//! [`UploadAssembler`] tracks where a call is in that protocol:
//!
//! ```text
//! AwaitingInfo --info--> ReceivingChunks --end of input--> Finalized
//!      |                      |
//!      +------ error ---------+-----------> Aborted
//! ```
//!
//! Bytes only leave the assembler in [`UploadAssembler::finalize`]; every
//! other exit drops the buffer, so a failed or abandoned upload never
//! reaches the image store.

use crate::context::CallContext;
use crate::error::CatalogError;
use crate::image_store::ImageStore;
use crate::laptop_store::{LaptopStore, StoreError};
use crate::pb::{
    upload_image_request::Data, ImageInfo, Laptop, UploadImageRequest, UploadImageResponse,
};
use bytes::BytesMut;
use futures::{Stream, StreamExt};
use std::fmt::Display;
use std::sync::Arc;
use tracing::{debug, warn};

/// Largest accepted image, in bytes.
pub const MAX_IMAGE_SIZE: usize = 1 << 20;

/// Observable protocol state of an upload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadPhase {
    AwaitingInfo,
    ReceivingChunks,
    Finalized,
    Aborted,
}

#[derive(Debug)]
enum State {
    AwaitingInfo,
    ReceivingChunks {
        laptop_id: String,
        image_type: String,
        data: BytesMut,
    },
    Finalized,
    Aborted,
}

/// Per-call accumulator for one image upload.
#[derive(Debug)]
pub struct UploadAssembler {
    state: State,
}

impl Default for UploadAssembler {
    fn default() -> Self {
        Self::new()
    }
}

impl UploadAssembler {
    pub fn new() -> Self {
        Self {
            state: State::AwaitingInfo,
        }
    }

    pub fn phase(&self) -> UploadPhase {
        match self.state {
            State::AwaitingInfo => UploadPhase::AwaitingInfo,
            State::ReceivingChunks { .. } => UploadPhase::ReceivingChunks,
            State::Finalized => UploadPhase::Finalized,
            State::Aborted => UploadPhase::Aborted,
        }
    }

    /// Bytes buffered so far
    pub fn size(&self) -> usize {
        match &self.state {
            State::ReceivingChunks { data, .. } => data.len(),
            _ => 0,
        }
    }

    /// Feed one client message into the protocol.
    ///
    /// The first message must be `info` for a laptop present in `laptops`;
    /// every later one must be a chunk keeping the total within
    /// [`MAX_IMAGE_SIZE`]. Any violation aborts the upload.
    pub fn accept(
        &mut self,
        laptops: &dyn LaptopStore,
        request: UploadImageRequest,
    ) -> Result<(), CatalogError> {
        let data = request.data;

        match self.state {
            State::AwaitingInfo => match data {
                Some(Data::Info(info)) => {
                    let owner = laptops.find(&info.laptop_id);
                    self.begin(info, owner)
                }
                _ => Err(self.abort_with(CatalogError::InvalidArgument(
                    "first upload message must carry image info".to_string(),
                ))),
            },
            State::ReceivingChunks { .. } => match data {
                Some(Data::ChunkData(chunk)) => self.push_chunk(&chunk),
                _ => Err(self.abort_with(CatalogError::InvalidArgument(
                    "expected image chunk data".to_string(),
                ))),
            },
            State::Finalized | State::Aborted => Err(CatalogError::Internal(format!(
                "upload is already {:?}",
                self.phase()
            ))),
        }
    }

    /// Enter the chunk phase for `info`, given the result of looking up
    /// its laptop.
    pub fn begin(
        &mut self,
        info: ImageInfo,
        owner: Result<Option<Laptop>, StoreError>,
    ) -> Result<(), CatalogError> {
        if !matches!(self.state, State::AwaitingInfo) {
            return Err(self.abort_with(CatalogError::InvalidArgument(
                "image info was already received".to_string(),
            )));
        }

        let found = match owner {
            Ok(found) => found,
            Err(e) => {
                return Err(self.abort_with(CatalogError::Internal(format!(
                    "cannot find laptop: {}",
                    e
                ))))
            }
        };

        if found.is_none() {
            return Err(self.abort_with(CatalogError::NotFound(format!(
                "laptop {} doesn't exist",
                info.laptop_id
            ))));
        }

        self.state = State::ReceivingChunks {
            laptop_id: info.laptop_id,
            image_type: info.image_type,
            data: BytesMut::new(),
        };

        Ok(())
    }

    fn push_chunk(&mut self, chunk: &[u8]) -> Result<(), CatalogError> {
        let State::ReceivingChunks { data, .. } = &mut self.state else {
            return Err(CatalogError::Internal("no upload in progress".to_string()));
        };

        let total = data.len() + chunk.len();

        debug!(chunk_size = chunk.len(), total, "Received image chunk");

        if total > MAX_IMAGE_SIZE {
            return Err(self.abort_with(CatalogError::InvalidArgument(format!(
                "image is too large: {} > {}",
                total, MAX_IMAGE_SIZE
            ))));
        }

        data.extend_from_slice(chunk);
        Ok(())
    }

    /// Hand the complete image to `images`.
    ///
    /// Only valid while receiving chunks. The assembler ends up `Finalized`
    /// on success and `Aborted` if the store rejects the image.
    pub async fn finalize(
        &mut self,
        images: &dyn ImageStore,
    ) -> Result<UploadImageResponse, CatalogError> {
        let (laptop_id, image_type, data) =
            match std::mem::replace(&mut self.state, State::Aborted) {
                State::ReceivingChunks {
                    laptop_id,
                    image_type,
                    data,
                } => (laptop_id, image_type, data.freeze()),
                State::AwaitingInfo => {
                    return Err(CatalogError::InvalidArgument(
                        "upload ended before image info".to_string(),
                    ))
                }
                State::Finalized => {
                    self.state = State::Finalized;
                    return Err(CatalogError::Internal("upload is already finalized".to_string()));
                }
                State::Aborted => {
                    return Err(CatalogError::Internal("upload is already aborted".to_string()));
                }
            };

        let size = data.len();
        let id = images.save(&laptop_id, &image_type, data).await?;

        self.state = State::Finalized;

        Ok(UploadImageResponse {
            id,
            size: size as u32,
        })
    }

    /// Drop everything buffered; the upload can no longer finalize.
    pub fn abort(&mut self) {
        if !matches!(self.state, State::Finalized) {
            self.state = State::Aborted;
        }
    }

    fn abort_with(&mut self, error: CatalogError) -> CatalogError {
        self.abort();
        error
    }
}

/// Run a whole upload call over a stream of client messages.
///
/// Every receive races the call's cancellation and deadline, and the laptop
/// lookup runs on the blocking pool. Receive errors other than clean end of
/// input are reported as [`CatalogError::Unknown`].
pub async fn receive_upload<S, E>(
    ctx: &CallContext,
    laptops: &Arc<dyn LaptopStore>,
    images: &dyn ImageStore,
    mut requests: S,
) -> Result<UploadImageResponse, CatalogError>
where
    S: Stream<Item = Result<UploadImageRequest, E>> + Unpin,
    E: Display,
{
    let mut assembler = UploadAssembler::new();

    loop {
        let next = match ctx.run(requests.next()).await {
            Ok(next) => next,
            Err(e) => {
                assembler.abort();
                debug!(reason = %e, phase = ?assembler.phase(), "Upload interrupted");
                return Err(e.into());
            }
        };

        match next {
            Some(Ok(UploadImageRequest {
                data: Some(Data::Info(info)),
            })) if assembler.phase() == UploadPhase::AwaitingInfo => {
                let owner = match ctx.run(find_owner(laptops, &info.laptop_id)).await {
                    Ok(owner) => owner,
                    Err(e) => {
                        assembler.abort();
                        return Err(e.into());
                    }
                };
                assembler.begin(info, owner)?;
            }
            Some(Ok(request)) => assembler.accept(laptops.as_ref(), request)?,
            Some(Err(e)) => {
                assembler.abort();
                warn!(error = %e, phase = ?assembler.phase(), "Upload receive failed");
                return Err(CatalogError::Unknown(format!("cannot receive upload data: {}", e)));
            }
            None => break,
        }
    }

    debug!(size = assembler.size(), "No more upload data");

    assembler.finalize(images).await
}

async fn find_owner(
    laptops: &Arc<dyn LaptopStore>,
    laptop_id: &str,
) -> Result<Option<Laptop>, StoreError> {
    let laptops = laptops.clone();
    let laptop_id = laptop_id.to_string();

    tokio::task::spawn_blocking(move || laptops.find(&laptop_id))
        .await
        .unwrap_or_else(|e| Err(StoreError::Task(e.to_string())))
}

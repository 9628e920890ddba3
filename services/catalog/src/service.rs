//! Transport-independent entry points of the catalog.

use crate::context::CallContext;
use crate::error::CatalogError;
use crate::image_store::ImageStore;
use crate::laptop_store::{Emit, LaptopStore};
use crate::pb::{Filter, Laptop, RateLaptopRequest, RateLaptopResponse, UploadImageRequest, UploadImageResponse};
use crate::rating_store::RatingStore;
use crate::upload::receive_upload;
use futures::Stream;
use std::fmt::Display;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// The catalog service: laptop creation, search, image upload and rating.
///
/// Holds its collaborators by shared ownership so that every concurrent
/// call handler can work against the same stores.
#[derive(Clone)]
pub struct CatalogService {
    laptops: Arc<dyn LaptopStore>,
    images: Arc<dyn ImageStore>,
    ratings: Arc<dyn RatingStore>,
}

impl CatalogService {
    pub fn new(
        laptops: Arc<dyn LaptopStore>,
        images: Arc<dyn ImageStore>,
        ratings: Arc<dyn RatingStore>,
    ) -> Self {
        Self {
            laptops,
            images,
            ratings,
        }
    }

    pub fn laptops(&self) -> &Arc<dyn LaptopStore> {
        &self.laptops
    }

    /// Store a new laptop and return its id.
    ///
    /// A non-empty id must be a valid UUID; an empty one is replaced by a
    /// freshly generated UUID.
    #[instrument(skip(self, ctx, laptop), fields(laptop_id = %laptop.id))]
    pub fn create_laptop(&self, ctx: &CallContext, mut laptop: Laptop) -> Result<String, CatalogError> {
        info!("Received create-laptop request");

        if laptop.id.is_empty() {
            laptop.id = Uuid::new_v4().to_string();
        } else if let Err(e) = Uuid::parse_str(&laptop.id) {
            return Err(log_failure(CatalogError::InvalidArgument(format!(
                "laptop ID is not a valid UUID: {}",
                e
            ))));
        }

        ctx.check().map_err(|e| log_failure(e.into()))?;

        self.laptops
            .save(&laptop)
            .map_err(|e| log_failure(e.into()))?;

        metrics::counter!("catalog.laptops.created").increment(1);
        info!(id = %laptop.id, "Saved laptop");

        Ok(laptop.id)
    }

    /// Stream every laptop matching `filter` into `emit`, one at a time.
    #[instrument(skip(self, ctx, emit))]
    pub fn search_laptop(
        &self,
        ctx: &CallContext,
        filter: &Filter,
        emit: &mut Emit<'_>,
    ) -> Result<(), CatalogError> {
        info!("Received search-laptop request");

        let mut sent = 0usize;
        let result = self.laptops.search(ctx, filter, &mut |laptop| {
            let id = laptop.id.clone();
            emit(laptop)?;
            sent += 1;
            tracing::debug!(laptop_id = %id, "Sent laptop");
            Ok(())
        });

        metrics::counter!("catalog.search.results").increment(sent as u64);

        match result {
            Ok(()) => {
                info!(sent, "Search completed");
                Ok(())
            }
            Err(e) => Err(log_failure(e.into())),
        }
    }

    /// Receive a chunked image for an existing laptop and store it.
    #[instrument(skip_all)]
    pub async fn upload_image<S, E>(
        &self,
        ctx: &CallContext,
        requests: S,
    ) -> Result<UploadImageResponse, CatalogError>
    where
        S: Stream<Item = Result<UploadImageRequest, E>> + Unpin,
        E: Display,
    {
        info!("Received upload-image request");

        let response = receive_upload(ctx, &self.laptops, self.images.as_ref(), requests)
            .await
            .map_err(log_failure)?;

        metrics::counter!("catalog.images.uploaded").increment(1);
        info!(image_id = %response.id, size = response.size, "Saved image");

        Ok(response)
    }

    /// Record one score for an existing laptop.
    #[instrument(skip(self, ctx, request), fields(laptop_id = %request.laptop_id))]
    pub fn rate_laptop(
        &self,
        ctx: &CallContext,
        request: RateLaptopRequest,
    ) -> Result<RateLaptopResponse, CatalogError> {
        ctx.check().map_err(|e| log_failure(e.into()))?;

        let found = self
            .laptops
            .find(&request.laptop_id)
            .map_err(|e| log_failure(CatalogError::Internal(format!("cannot find laptop: {}", e))))?;

        if found.is_none() {
            return Err(log_failure(CatalogError::NotFound(format!(
                "laptop {} doesn't exist",
                request.laptop_id
            ))));
        }

        let rating = self.ratings.add(&request.laptop_id, request.score);

        info!(score = request.score, rated_count = rating.count, "Rated laptop");

        Ok(RateLaptopResponse {
            laptop_id: request.laptop_id,
            rated_count: rating.count,
            average_score: rating.average(),
        })
    }
}

fn log_failure(error: CatalogError) -> CatalogError {
    warn!(error = %error, "Request failed");
    error
}

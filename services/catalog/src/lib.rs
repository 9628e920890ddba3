//! Laptop Catalog Service
//!
//! In-memory laptop catalog served over gRPC. Clients create laptop records,
//! stream the records matching a filter, upload one image per call in chunks,
//! and rate laptops.
//!
//! ## Features
//!
//! - **Filtered Search Streaming**: matches are sent one by one while the
//!   store is scanned, and the scan stops as soon as the call is canceled
//!   or past its deadline
//! - **Chunked Image Upload**: image metadata first, then up to 1 MiB of
//!   chunks, written to disk only once the upload completes
//! - **All-or-Nothing Calls**: a call that fails leaves no partial record
//!   or image behind
//!
//! ## Architecture
//!
//! ```text
//!   gRPC client
//!        │
//!        ▼
//! ┌──────────────┐      ┌──────────────┐      ┌──────────────┐
//! │ GrpcHandler  │─────▶│ Catalog      │─────▶│ Laptop       │
//! │ (tonic)      │      │ Service      │      │ Store        │
//! └──────────────┘      └──────────────┘      └──────────────┘
//!                          │        │
//!                          ▼        ▼
//!                 ┌──────────────┐ ┌──────────────┐
//!                 │ Upload       │ │ Rating       │
//!                 │ Assembler    │ │ Store        │
//!                 └──────────────┘ └──────────────┘
//!                          │
//!                          ▼
//!                 ┌──────────────┐
//!                 │ Image Store  │
//!                 └──────────────┘
//! ```

pub mod config;
pub mod context;
pub mod error;
pub mod filter;
pub mod grpc;
pub mod image_store;
pub mod laptop_store;
pub mod pb;
pub mod rating_store;
pub mod sample;
pub mod serializer;
pub mod service;
pub mod upload;

pub use config::Config;
pub use context::{CallContext, Interrupted};
pub use error::CatalogError;
pub use filter::{is_qualified, to_bit, FilterBuilder};
pub use grpc::{grpc_server, GrpcHandler, LaptopServiceClient, LaptopServiceServer};
pub use image_store::{DiskImageStore, ImageStore, ImageStoreError};
pub use laptop_store::{InMemoryLaptopStore, LaptopStore, StoreError};
pub use rating_store::{InMemoryRatingStore, Rating, RatingStore};
pub use service::CatalogService;
pub use upload::{receive_upload, UploadAssembler, UploadPhase, MAX_IMAGE_SIZE};

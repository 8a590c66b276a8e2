//! # deck-pipeline: Presentation Stages for deck-queue
//!
//! The per-job-type business logic of the presentation service, written
//! purely against pluggable service contracts:
//!
//! - **generate**: AI spec generation; persists a new template version and
//!   meters the reported token count
//! - **bind**: reworks a source version's spec around caller content, with
//!   a fall-back-to-source path that succeeds unmetered on AI failure
//! - **render**: PPTX render of a version; blob upload, then one asset row
//! - **export**: render plus a unit `export` metering record and a download
//!   filename from metadata
//! - **thumbnail**: one PNG per slide; the cover page's asset is the output
//!
//! Handlers tolerate re-invocation for the same job: blob keys are derived
//! from the job id, asset creation is guarded by a blob-key lookup, and
//! billables rely on the queue's metering uniqueness guard.
//!
//! Wire it up with [`handlers::pipeline_dispatcher`]:
//!
//! ```rust
//! use std::sync::Arc;
//! use deck_pipeline::handlers::pipeline_dispatcher;
//! use deck_pipeline::memory::{
//!     MemoryAssetStore, MemoryBlobStore, MemoryVersionStore, StaticRenderer, StaticSpecGenerator,
//! };
//! use deck_pipeline::services::Services;
//! use deck_queue::QueueConfig;
//!
//! let services = Arc::new(Services::new(
//!     Arc::new(StaticSpecGenerator),
//!     Arc::new(StaticRenderer::new()),
//!     Arc::new(MemoryBlobStore::new()),
//!     Arc::new(MemoryVersionStore::new()),
//!     Arc::new(MemoryAssetStore::new()),
//! ));
//! let dispatcher = pipeline_dispatcher(services, QueueConfig::default());
//! assert_eq!(dispatcher.registered_types().len(), 5);
//! ```

pub mod error;
pub mod handlers;
pub mod memory;
pub mod services;

pub use error::{BlobError, RenderError, SpecError, StoreError};
pub use handlers::{
    pipeline_dispatcher, BindHandler, ExportHandler, GenerateHandler, RenderHandler,
    ThumbnailHandler,
};
pub use services::{
    Asset, AssetStore, AssetType, BlobMeta, BlobStore, DeckSpec, GenerateRequest,
    GenerationOutcome, Renderer, Services, SlideSpec, SpecGenerator, Template, Version,
    VersionStore, MIME_PNG, MIME_PPTX,
};

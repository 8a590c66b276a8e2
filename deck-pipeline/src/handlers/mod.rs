//! Stage handlers: the per-job-type business logic the dispatcher routes to.
//!
//! Handlers are written so an aborted attempt leaves no observable partial
//! state: blob keys are derived from the job (re-uploads overwrite), asset
//! rows are created only after the upload succeeded and are guarded by a
//! blob-key lookup, and billable quantities ride the metering store's
//! uniqueness guard.

pub mod bind;
pub mod export;
pub mod generate;
pub mod render;
pub mod thumbnail;

pub use bind::BindHandler;
pub use export::ExportHandler;
pub use generate::GenerateHandler;
pub use render::RenderHandler;
pub use thumbnail::ThumbnailHandler;

use std::sync::Arc;

use deck_queue::{Dispatcher, QueueConfig};

use crate::services::Services;

/// Build a dispatcher with every pipeline stage registered
pub fn pipeline_dispatcher(services: Arc<Services>, config: QueueConfig) -> Dispatcher {
    let mut dispatcher = Dispatcher::new(config);
    dispatcher.register(Arc::new(GenerateHandler::new(services.clone())));
    dispatcher.register(Arc::new(BindHandler::new(services.clone())));
    dispatcher.register(Arc::new(RenderHandler::new(services.clone())));
    dispatcher.register(Arc::new(ExportHandler::new(services.clone())));
    dispatcher.register(Arc::new(ThumbnailHandler::new(services)));
    dispatcher
}

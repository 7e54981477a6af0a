// Export pipeline: rendered document → page rasters → multi-page PDF → delivery.
//
// Stages are awaited one after another and each run owns its page buffers.
// CPU-bound PDF assembly runs inside tokio::task::spawn_blocking.

pub mod assembler;
pub mod delivery;
pub mod error;
pub mod filename;
pub mod geometry;
pub mod notify;
pub mod orchestrator;
pub mod pagination;
pub mod slicer;
pub mod surface;

#[cfg(test)]
pub mod testing;

pub use assembler::FitPolicy;
pub use delivery::BufferedDelivery;
pub use error::ExportError;
pub use geometry::{PageGeometry, PaperFormat};
pub use notify::{NotificationSink, TracingNotifier};
pub use orchestrator::{ExportOptions, ExportOrchestrator};
pub use pagination::PageEstimate;
pub use slicer::{CancellationFlag, SlicingStrategy};
pub use surface::{InMemoryRenderSource, RasterSurface};

//! croprec - region-constrained screen recording pipeline.
//!
//! Captures a live video (and optional audio) source, recomposes each
//! frame into a constrained output region (crop or fixed-resolution
//! rescale), feeds the composed stream through an incremental encoder on
//! a fixed flush cadence, and assembles one finished media asset that is
//! handed to a storage collaborator by value or by reference depending
//! on its size.

pub mod compositor;
pub mod encoder;
pub mod recorder;
pub mod source;
pub mod storage;
pub mod testing;
pub mod transfer;
pub mod utils;

pub use compositor::policy::{CompositionPolicy, CropRegion};
pub use recorder::assembler::{CompositionMetadata, FinishedAsset};
pub use recorder::session::{RecordingSession, SessionOptions};
pub use recorder::state::{SessionEvent, SessionState, SessionStatus};
pub use source::SourceStream;
pub use utils::error::{PipelineError, PipelineResult};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize tracing/logging for binaries and tests. Safe to call more
/// than once; later calls are no-ops.
pub fn init_logging() {
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "croprec=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}

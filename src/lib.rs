//! Stratum is a surface aggregation engine for compositing display pipelines.
//!
//! Producers submit [`CompositorFrame`]s to surfaces in a [`SurfaceManager`]; a
//! [`SurfaceAggregator`] walks the embedding tree rooted at one surface and flattens it into a
//! single [`AggregatedFrame`]:
//!
//! - damage is tracked per surface and pass so unchanged content is skipped
//! - opaque embeds are merged into their embedder instead of getting their own pass
//! - reference cycles, missing surfaces and invalid frames degrade instead of failing
#![forbid(unsafe_code)]

mod foundation;

pub(crate) mod aggregator;
pub(crate) mod quads;
pub(crate) mod resources;
/// JSON scene descriptions used by the CLI and fixtures.
pub mod scene;
pub(crate) mod surfaces;

pub use kurbo::Affine;

pub use crate::foundation::color::{ColorSpace, ContentColorUsage, DisplayColorSpaces};
pub use crate::foundation::core::{Color, DisplayTime};
pub use crate::foundation::error::{StratumError, StratumResult};
pub use crate::foundation::geometry::{Rect, Size};
pub use crate::foundation::transform::DisplayTransform;

pub use crate::aggregator::frame::{AggregatedFrame, FrameAnnotator};
pub use crate::aggregator::stats::AggregateStatistics;
pub use crate::aggregator::{
    AggregatorSettings, DeJellySettings, ExtraPassForReadback, MAX_LATENCY_INFO,
    SurfaceAggregator, SurfaceAggregatorBuilder,
};
pub use crate::quads::builder::{FrameBuilder, PassBuilder};
pub use crate::quads::draw_quad::{DrawQuad, Material, QuadResources, SurfaceQuadMaterial};
pub use crate::quads::filters::{FilterOperation, FilterOperations};
pub use crate::quads::frame::{
    CompositorFrame, CompositorFrameMetadata, CopyOutputRequest, DelegatedInkMetadata,
    LatencyInfo, ResourceId, TransferableResource,
};
pub use crate::quads::render_pass::{
    AggregatedRenderPass, AggregatedRenderPassId, CompositorRenderPass, CompositorRenderPassId,
};
pub use crate::quads::shared_quad_state::{BlendMode, MaskFilterInfo, SharedQuadState};
pub use crate::resources::provider::{ChildId, DisplayResourceProvider};
pub use crate::scene::{Scene, SceneSurface};
pub use crate::surfaces::client::SurfaceClient;
pub use crate::surfaces::ids::{FrameSinkId, LocalSurfaceId, SurfaceId, SurfaceRange};
pub use crate::surfaces::manager::{FRAME_INDEX_START, SurfaceManager};
pub use crate::surfaces::surface::{CopyRequestsMap, Surface};

use crate::{
    foundation::{core::DisplayTime, geometry::Rect},
    quads::frame::{CopyOutputRequest, ResourceId, TransferableResource},
    surfaces::ids::SurfaceId,
};

/// Producer-side hooks the aggregator calls while walking a surface.
///
/// Clients are shared between a surface and the code that owns the producer, so methods take
/// `&self`; implementations use interior mutability where they record state.
pub trait SurfaceClient {
    /// Take a reference on the resources of a newly resolved frame. Called once per frame.
    fn ref_resources(&self, resources: &[TransferableResource]);

    /// Resources the display no longer uses and that may be recycled.
    fn return_resources(&self, _resources: &[ResourceId]) {}

    /// The surface contributed `damage` (in its own space) to the frame that will be shown
    /// at `expected_display_time`. Clients may queue copy requests from here.
    fn on_surface_aggregated_damage(
        &self,
        _surface_id: SurfaceId,
        _damage: Rect,
        _expected_display_time: DisplayTime,
    ) {
    }

    /// Copy requests queued at the frame sink level since the last aggregation.
    fn take_copy_output_requests(&self, _surface_id: SurfaceId) -> Vec<CopyOutputRequest> {
        Vec::new()
    }

    /// Whether a video capturer is attached to the frame sink.
    fn is_video_capture_on(&self) -> bool {
        false
    }
}

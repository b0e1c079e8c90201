use std::{collections::BTreeMap, fmt, mem, rc::Rc, sync::Arc};

use crate::{
    foundation::{
        core::DisplayTime,
        geometry::{Rect, Size},
    },
    quads::{
        frame::{CompositorFrame, CopyOutputRequest, LatencyInfo},
        render_pass::CompositorRenderPassId,
    },
    surfaces::{client::SurfaceClient, ids::SurfaceId},
};

/// Pending copy requests keyed by the source render pass they target.
pub type CopyRequestsMap = BTreeMap<CompositorRenderPassId, Vec<CopyOutputRequest>>;

/// One version of a producer's output stream and its active frame.
pub struct Surface {
    id: SurfaceId,
    previous_frame_surface_id: SurfaceId,
    client: Option<Rc<dyn SurfaceClient>>,
    active_frame: Option<Arc<CompositorFrame>>,
    active_frame_index: u64,
    copy_requests: CopyRequestsMap,
    client_copy_requests: Vec<CopyOutputRequest>,
    latency_info: Vec<LatencyInfo>,
    has_surface_animation_damage: bool,
    undrawn: bool,
    aggregation_count: u64,
}

impl fmt::Debug for Surface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Surface")
            .field("id", &self.id)
            .field("active_frame_index", &self.active_frame_index)
            .field("has_client", &self.client.is_some())
            .finish_non_exhaustive()
    }
}

impl Surface {
    pub(crate) fn new(
        id: SurfaceId,
        previous_frame_surface_id: SurfaceId,
        client: Option<Rc<dyn SurfaceClient>>,
    ) -> Self {
        Self {
            id,
            previous_frame_surface_id,
            client,
            active_frame: None,
            active_frame_index: 0,
            copy_requests: CopyRequestsMap::new(),
            client_copy_requests: Vec::new(),
            latency_info: Vec::new(),
            has_surface_animation_damage: false,
            undrawn: false,
            aggregation_count: 0,
        }
    }

    pub fn id(&self) -> SurfaceId {
        self.id
    }

    /// Surface of the same frame sink that was active before this one, or this surface's id
    /// when there was none.
    pub fn previous_frame_surface_id(&self) -> SurfaceId {
        self.previous_frame_surface_id
    }

    pub fn client(&self) -> Option<&Rc<dyn SurfaceClient>> {
        self.client.as_ref()
    }

    pub fn has_active_frame(&self) -> bool {
        self.active_frame.is_some()
    }

    pub fn active_frame(&self) -> Option<&Arc<CompositorFrame>> {
        self.active_frame.as_ref()
    }

    /// Index of the active frame. Indices increase by one per submitted frame within a frame
    /// sink, across surfaces of that sink.
    pub fn active_frame_index(&self) -> u64 {
        self.active_frame_index
    }

    pub fn size_in_pixels(&self) -> Size {
        self.active_frame
            .as_ref()
            .map(|f| f.size_in_pixels())
            .unwrap_or_default()
    }

    pub fn device_scale_factor(&self) -> f32 {
        self.active_frame
            .as_ref()
            .map_or(1.0, |f| f.device_scale_factor())
    }

    /// Replace the active frame. Copy requests attached to its passes move onto the surface;
    /// requests left over from the previous frame retarget the new root pass.
    pub(crate) fn activate_frame(&mut self, mut frame: CompositorFrame, frame_index: u64) {
        let mut leftovers: Vec<CopyOutputRequest> =
            mem::take(&mut self.copy_requests).into_values().flatten().collect();

        for pass in &mut frame.render_pass_list {
            if !pass.copy_requests.is_empty() {
                self.copy_requests
                    .entry(pass.id)
                    .or_default()
                    .append(&mut pass.copy_requests);
            }
        }
        if !leftovers.is_empty() {
            if let Some(root) = frame.root_pass() {
                self.copy_requests
                    .entry(root.id)
                    .or_default()
                    .append(&mut leftovers);
            }
        }

        self.latency_info.append(&mut frame.metadata.latency_info);
        self.active_frame = Some(Arc::new(frame));
        self.active_frame_index = frame_index;
        self.undrawn = true;
    }

    pub fn has_copy_output_requests(&self) -> bool {
        self.copy_requests.values().any(|r| !r.is_empty())
    }

    pub fn has_copy_requests_for_pass(&self, pass_id: CompositorRenderPassId) -> bool {
        self.copy_requests
            .get(&pass_id)
            .is_some_and(|r| !r.is_empty())
    }

    /// Remove and return every pending copy request.
    pub fn take_copy_output_requests(&mut self) -> CopyRequestsMap {
        mem::take(&mut self.copy_requests)
    }

    pub(crate) fn queue_copy_request(&mut self, request: CopyOutputRequest) {
        self.client_copy_requests.push(request);
    }

    /// Move requests queued at the frame sink level onto the root pass of the active frame.
    pub fn take_copy_output_requests_from_client(&mut self) {
        let mut requests = mem::take(&mut self.client_copy_requests);
        if let Some(client) = &self.client {
            requests.extend(client.take_copy_output_requests(self.id));
        }
        if requests.is_empty() {
            return;
        }
        let Some(root_id) = self
            .active_frame
            .as_ref()
            .and_then(|f| f.root_pass())
            .map(|p| p.id)
        else {
            tracing::debug!(surface = %self.id, "dropping copy requests for surface without a frame");
            return;
        };
        self.copy_requests
            .entry(root_id)
            .or_default()
            .append(&mut requests);
    }

    pub fn is_video_capture_on_from_client(&self) -> bool {
        self.client.as_ref().is_some_and(|c| c.is_video_capture_on())
    }

    /// The active frame has not been drawn by any aggregation yet.
    pub fn has_undrawn_active_frame(&self) -> bool {
        self.undrawn
    }

    pub fn on_will_be_drawn(&mut self) {
        self.undrawn = false;
    }

    pub fn did_aggregate(&mut self) {
        self.aggregation_count += 1;
    }

    /// Number of times the surface's content was copied into an aggregated frame.
    pub fn aggregation_count(&self) -> u64 {
        self.aggregation_count
    }

    pub fn notify_aggregated_damage(&self, damage: Rect, expected_display_time: DisplayTime) {
        if let Some(client) = &self.client {
            client.on_surface_aggregated_damage(self.id, damage, expected_display_time);
        }
    }

    /// Whether the surface is animating and must be fully redrawn every frame.
    pub fn has_surface_animation_damage(&self) -> bool {
        self.has_surface_animation_damage
    }

    pub fn set_surface_animation_damage(&mut self, animating: bool) {
        self.has_surface_animation_damage = animating;
    }

    /// Move pending latency records into `out`.
    pub fn take_latency_info(&mut self, out: &mut Vec<LatencyInfo>) {
        out.append(&mut self.latency_info);
    }
}

#[cfg(test)]
#[path = "../../tests/unit/surfaces/surface.rs"]
mod tests;

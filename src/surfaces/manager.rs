use std::{
    collections::{BTreeMap, HashMap},
    rc::Rc,
};

use crate::{
    foundation::error::{StratumError, StratumResult},
    quads::frame::{CompositorFrame, CopyOutputRequest},
    surfaces::{
        client::SurfaceClient,
        ids::{FrameSinkId, LocalSurfaceId, SurfaceId, SurfaceRange},
        surface::Surface,
    },
};

/// First frame index handed out per frame sink. Zero means "no frame" and one is skipped so
/// that a fresh cache entry never mistakes the first frame for the successor of another.
pub const FRAME_INDEX_START: u64 = 2;

/// Registry of live surfaces and their active frames.
///
/// This is the submission side of the pipeline: producers create surfaces, submit frames and
/// queue copy requests here; the aggregator only reads frames and drains per-aggregation
/// state.
#[derive(Debug, Default)]
pub struct SurfaceManager {
    surfaces: BTreeMap<SurfaceId, Surface>,
    last_frame_index: HashMap<FrameSinkId, u64>,
    latest_surface: HashMap<FrameSinkId, SurfaceId>,
    destroyed: Vec<SurfaceId>,
    frame_sinks_changed_count: u64,
}

impl SurfaceManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new surface. Its previous-frame surface is the latest surface of the same
    /// frame sink, if any.
    pub fn create_surface(
        &mut self,
        id: SurfaceId,
        client: Option<Rc<dyn SurfaceClient>>,
    ) -> StratumResult<()> {
        if !id.is_valid() {
            return Err(StratumError::surface(format!("invalid surface id {id}")));
        }
        if self.surfaces.contains_key(&id) {
            return Err(StratumError::surface(format!("surface {id} already exists")));
        }
        let latest = self.latest_surface.get(&id.frame_sink_id).copied();
        let newer = latest.map_or(true, |l| l.local_surface_id < id.local_surface_id);
        let previous = latest.filter(|_| newer).unwrap_or(id);
        if newer {
            self.latest_surface.insert(id.frame_sink_id, id);
        }
        self.surfaces.insert(id, Surface::new(id, previous, client));
        tracing::debug!(surface = %id, previous = %previous, "surface created");
        Ok(())
    }

    /// Remove a surface. The aggregator drops its cached state at the next aggregation.
    pub fn destroy_surface(&mut self, id: SurfaceId) -> StratumResult<()> {
        if self.surfaces.remove(&id).is_none() {
            return Err(StratumError::surface(format!("unknown surface {id}")));
        }
        if self.latest_surface.get(&id.frame_sink_id) == Some(&id) {
            self.latest_surface.remove(&id.frame_sink_id);
        }
        self.destroyed.push(id);
        tracing::debug!(surface = %id, "surface destroyed");
        Ok(())
    }

    /// Validate `frame` and make it the active frame of `id`. Returns the new frame index.
    pub fn submit_frame(&mut self, id: SurfaceId, frame: CompositorFrame) -> StratumResult<u64> {
        frame
            .validate()
            .map_err(|e| StratumError::validation(format!("frame for {id}: {e}")))?;
        let surface = self
            .surfaces
            .get_mut(&id)
            .ok_or_else(|| StratumError::surface(format!("unknown surface {id}")))?;
        let index = self
            .last_frame_index
            .entry(id.frame_sink_id)
            .and_modify(|i| *i += 1)
            .or_insert(FRAME_INDEX_START);
        surface.activate_frame(frame, *index);
        Ok(*index)
    }

    /// Queue a copy of the next aggregated output of `id`'s root pass.
    pub fn request_copy_of_output(
        &mut self,
        id: SurfaceId,
        request: CopyOutputRequest,
    ) -> StratumResult<()> {
        self.surface_mut_or_err(id)?.queue_copy_request(request);
        Ok(())
    }

    /// Mark `id` as animating: it reports full damage until cleared.
    pub fn set_surface_animation_damage(&mut self, id: SurfaceId, animating: bool) -> StratumResult<()> {
        self.surface_mut_or_err(id)?
            .set_surface_animation_damage(animating);
        Ok(())
    }

    fn surface_mut_or_err(&mut self, id: SurfaceId) -> StratumResult<&mut Surface> {
        self.surfaces
            .get_mut(&id)
            .ok_or_else(|| StratumError::surface(format!("unknown surface {id}")))
    }

    pub fn get_surface_for_id(&self, id: &SurfaceId) -> Option<&Surface> {
        self.surfaces.get(id)
    }

    pub fn get_surface_for_id_mut(&mut self, id: &SurfaceId) -> Option<&mut Surface> {
        self.surfaces.get_mut(id)
    }

    /// Newest surface with an active frame inside `range`. The primary's frame sink is
    /// searched first, then the fallback's when it belongs to another sink.
    pub fn get_latest_in_flight_surface(&self, range: &SurfaceRange) -> Option<SurfaceId> {
        let end = range.end;
        let lower = match range.start {
            Some(start) if start.frame_sink_id == end.frame_sink_id => start,
            _ => SurfaceId::new(end.frame_sink_id, LocalSurfaceId::default()),
        };
        if let Some(id) = self.newest_active_in(lower, end) {
            return Some(id);
        }
        let start = range.start.filter(|_| range.has_different_frame_sink_ids())?;
        let upper = SurfaceId::new(
            start.frame_sink_id,
            LocalSurfaceId::new(u32::MAX, u32::MAX),
        );
        self.newest_active_in(start, upper)
    }

    fn newest_active_in(&self, lower: SurfaceId, upper: SurfaceId) -> Option<SurfaceId> {
        if lower > upper {
            return None;
        }
        self.surfaces
            .range(lower..=upper)
            .rev()
            .find(|(_, s)| s.has_active_frame())
            .map(|(id, _)| *id)
    }

    /// Surfaces currently resolved from the referenced ranges of `id`'s active frame.
    pub fn active_referenced_surfaces(&self, id: &SurfaceId) -> Vec<SurfaceId> {
        let Some(frame) = self.surfaces.get(id).and_then(Surface::active_frame) else {
            return Vec::new();
        };
        let mut out = Vec::new();
        for range in &frame.metadata.referenced_surfaces {
            if let Some(resolved) = self.get_latest_in_flight_surface(range) {
                if !out.contains(&resolved) {
                    out.push(resolved);
                }
            }
        }
        out
    }

    /// Drain the surfaces destroyed since the last call.
    pub fn take_destroyed_surfaces(&mut self) -> Vec<SurfaceId> {
        std::mem::take(&mut self.destroyed)
    }

    /// Called by the aggregator when the set of frame sinks in its output changed.
    pub fn aggregated_frame_sinks_changed(&mut self) {
        self.frame_sinks_changed_count += 1;
    }

    pub fn frame_sinks_changed_count(&self) -> u64 {
        self.frame_sinks_changed_count
    }
}

#[cfg(test)]
#[path = "../../tests/unit/surfaces/manager.rs"]
mod tests;

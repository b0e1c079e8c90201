//! Surface aggregation: flattening a tree of independently submitted compositor frames into
//! one ordered render pass list.
//!
//! One [`SurfaceAggregator::aggregate`] call runs a damage walk over every surface reachable
//! from the root, then a copy walk that emits the aggregated passes, then appends auxiliary
//! passes (de-jelly, color conversion, readback). Per-surface state that must survive across
//! calls lives in [`resolved::ResolvedFrameData`]; everything else lives in an [`Aggregation`]
//! that is dropped when the call returns.

pub(crate) mod aux_passes;
pub(crate) mod copy;
pub(crate) mod damage_list;
pub(crate) mod de_jelly;
pub(crate) mod frame;
pub(crate) mod prewalk;
pub(crate) mod resolved;
pub(crate) mod stats;

use std::{
    collections::{BTreeSet, HashMap},
    time::Instant,
};

use kurbo::Affine;

use crate::{
    aggregator::{
        frame::{AggregatedFrame, FrameAnnotator},
        prewalk::PrewalkResult,
        resolved::{AggregationPassData, FrameSnapshot, PassKey, ResolvedFrameData},
        stats::AggregateStatistics,
    },
    foundation::{
        color::{ContentColorUsage, DisplayColorSpaces},
        core::DisplayTime,
        error::{StratumError, StratumResult},
        geometry::Rect,
        transform::{DisplayTransform, map_enclosed_rect_axis_aligned},
    },
    quads::{
        draw_quad::SurfaceQuadMaterial,
        frame::{CompositorFrame, DelegatedInkMetadata, LatencyInfo},
        render_pass::{AggregatedRenderPass, AggregatedRenderPassId, AggregatedRenderPassIdGenerator},
        shared_quad_state::SharedQuadState,
    },
    resources::provider::DisplayResourceProvider,
    surfaces::{
        ids::{FrameSinkId, LocalSurfaceId, SurfaceId, SurfaceRange},
        manager::SurfaceManager,
    },
};

/// Opacity within this distance of 1 counts as opaque when deciding whether to merge.
pub(crate) const OPACITY_EPSILON: f32 = 0.001;

/// Float error ignored when mapping quad damage into its target space.
pub(crate) const DAMAGE_EPSILON: f64 = 0.001;

/// Pixel tolerance for a root surface quad to count as covering the whole output.
pub(crate) const FULLSCREEN_TOLERANCE: i32 = 8;

/// Latency records kept per aggregated frame; the rest are dropped.
pub const MAX_LATENCY_INFO: usize = 100;

/// Whether an extra root pass is added so the backend can read back the composited output.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ExtraPassForReadback {
    #[default]
    None,
    /// Only when a pass drawn into the root has backdrop filters.
    AddPassForReadback,
    AlwaysAddPass,
}

/// Skew correction for content that scrolled between frames.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct DeJellySettings {
    /// Width used to turn a vertical delta into a skew angle.
    pub screen_width: f32,
    /// Extra height skewed sub-passes may draw outside their clip.
    pub max_de_jelly_height: i32,
}

impl Default for DeJellySettings {
    fn default() -> Self {
        Self {
            screen_width: 1920.0,
            max_de_jelly_height: 30,
        }
    }
}

/// Static configuration of a [`SurfaceAggregator`].
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct AggregatorSettings {
    /// Skip quads that do not intersect the root damage.
    pub aggregate_only_damaged: bool,
    /// Fill [`AggregatedFrame::surface_damage_rect_list`] for overlay promotion.
    pub needs_surface_damage_rect_list: bool,
    pub extra_pass_for_readback: ExtraPassForReadback,
    /// Move surface copy requests onto the emitted passes.
    pub take_copy_requests: bool,
    /// Secure-only textures may be shown.
    pub output_is_secure: bool,
    /// Clamp for non-root pass output sizes; 0 disables it.
    pub max_render_target_size: i32,
    pub de_jelly: Option<DeJellySettings>,
}

impl Default for AggregatorSettings {
    fn default() -> Self {
        Self {
            aggregate_only_damaged: false,
            needs_surface_damage_rect_list: false,
            extra_pass_for_readback: ExtraPassForReadback::None,
            take_copy_requests: true,
            output_is_secure: false,
            max_render_target_size: 0,
            de_jelly: None,
        }
    }
}

impl AggregatorSettings {
    pub fn validate(&self) -> StratumResult<()> {
        if self.max_render_target_size < 0 {
            return Err(StratumError::validation(format!(
                "max_render_target_size must be >= 0, got {}",
                self.max_render_target_size
            )));
        }
        if let Some(de_jelly) = &self.de_jelly {
            if !(de_jelly.screen_width.is_finite() && de_jelly.screen_width > 0.0) {
                return Err(StratumError::validation(
                    "de_jelly.screen_width must be finite and > 0",
                ));
            }
            if de_jelly.max_de_jelly_height < 0 {
                return Err(StratumError::validation(
                    "de_jelly.max_de_jelly_height must be >= 0",
                ));
            }
        }
        Ok(())
    }
}

/// Consuming builder for [`SurfaceAggregator`].
pub struct SurfaceAggregatorBuilder {
    settings: AggregatorSettings,
    display_color_spaces: DisplayColorSpaces,
}

impl SurfaceAggregatorBuilder {
    pub fn new() -> Self {
        Self {
            settings: AggregatorSettings::default(),
            display_color_spaces: DisplayColorSpaces::default(),
        }
    }

    pub fn settings(mut self, settings: AggregatorSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn aggregate_only_damaged(mut self, enabled: bool) -> Self {
        self.settings.aggregate_only_damaged = enabled;
        self
    }

    pub fn needs_surface_damage_rect_list(mut self, enabled: bool) -> Self {
        self.settings.needs_surface_damage_rect_list = enabled;
        self
    }

    pub fn extra_pass_for_readback(mut self, option: ExtraPassForReadback) -> Self {
        self.settings.extra_pass_for_readback = option;
        self
    }

    pub fn take_copy_requests(mut self, enabled: bool) -> Self {
        self.settings.take_copy_requests = enabled;
        self
    }

    pub fn output_is_secure(mut self, secure: bool) -> Self {
        self.settings.output_is_secure = secure;
        self
    }

    pub fn max_render_target_size(mut self, size: i32) -> Self {
        self.settings.max_render_target_size = size;
        self
    }

    pub fn de_jelly(mut self, de_jelly: DeJellySettings) -> Self {
        self.settings.de_jelly = Some(de_jelly);
        self
    }

    pub fn display_color_spaces(mut self, spaces: DisplayColorSpaces) -> Self {
        self.display_color_spaces = spaces;
        self
    }

    pub fn build(self) -> StratumResult<SurfaceAggregator> {
        self.settings.validate()?;
        let mut aggregator = SurfaceAggregator::with_settings(self.settings);
        aggregator.display_color_spaces = self.display_color_spaces;
        Ok(aggregator)
    }
}

impl Default for SurfaceAggregatorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
enum AggregationPhase {
    #[default]
    Idle,
    Prewalking,
    Copying,
    PostProcessing,
}

/// Flattens surface trees into aggregated frames, keeping per-surface caches between calls.
pub struct SurfaceAggregator {
    settings: AggregatorSettings,
    display_color_spaces: DisplayColorSpaces,
    provider: DisplayResourceProvider,
    resolved_frames: HashMap<SurfaceId, ResolvedFrameData>,
    id_generator: AggregatedRenderPassIdGenerator,
    previous_contained_surfaces: BTreeSet<SurfaceId>,
    previous_contained_frame_sinks: HashMap<FrameSinkId, LocalSurfaceId>,
    /// Referenced ranges of every surface walked in the last aggregation, by frame sink.
    damage_ranges: HashMap<FrameSinkId, Vec<SurfaceRange>>,
    root_content_color_usage: ContentColorUsage,
    last_frame_had_color_conversion_pass: bool,
    last_frame_had_readback_pass: bool,
    last_frame_had_delegated_ink: bool,
    last_frame_had_jelly: bool,
    color_conversion_render_pass_id: Option<AggregatedRenderPassId>,
    readback_render_pass_id: Option<AggregatedRenderPassId>,
    display_transform_render_pass_id: Option<AggregatedRenderPassId>,
    frame_annotator: Option<Box<dyn FrameAnnotator>>,
    last_stats: AggregateStatistics,
    phase: AggregationPhase,
}

impl std::fmt::Debug for SurfaceAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SurfaceAggregator")
            .field("settings", &self.settings)
            .field("resolved_frames", &self.resolved_frames.len())
            .field("phase", &self.phase)
            .finish_non_exhaustive()
    }
}

impl SurfaceAggregator {
    pub fn builder() -> SurfaceAggregatorBuilder {
        SurfaceAggregatorBuilder::new()
    }

    /// Aggregator with validated `settings` and default display color spaces.
    pub fn new(settings: AggregatorSettings) -> StratumResult<Self> {
        settings.validate()?;
        Ok(Self::with_settings(settings))
    }

    fn with_settings(settings: AggregatorSettings) -> Self {
        Self {
            settings,
            display_color_spaces: DisplayColorSpaces::default(),
            provider: DisplayResourceProvider::new(),
            resolved_frames: HashMap::new(),
            id_generator: AggregatedRenderPassIdGenerator::default(),
            previous_contained_surfaces: BTreeSet::new(),
            previous_contained_frame_sinks: HashMap::new(),
            damage_ranges: HashMap::new(),
            root_content_color_usage: ContentColorUsage::Srgb,
            last_frame_had_color_conversion_pass: false,
            last_frame_had_readback_pass: false,
            last_frame_had_delegated_ink: false,
            last_frame_had_jelly: false,
            color_conversion_render_pass_id: None,
            readback_render_pass_id: None,
            display_transform_render_pass_id: None,
            frame_annotator: None,
            last_stats: AggregateStatistics::default(),
            phase: AggregationPhase::Idle,
        }
    }

    pub fn settings(&self) -> &AggregatorSettings {
        &self.settings
    }

    pub fn set_display_color_spaces(&mut self, spaces: DisplayColorSpaces) {
        self.display_color_spaces = spaces;
    }

    pub fn set_max_render_target_size(&mut self, size: i32) {
        debug_assert!(size >= 0);
        self.settings.max_render_target_size = size.max(0);
    }

    pub fn set_output_is_secure(&mut self, secure: bool) {
        self.settings.output_is_secure = secure;
    }

    /// Treat the whole of `surface_id` as damaged in the next aggregation.
    pub fn set_full_damage_for_surface(&mut self, surface_id: SurfaceId) {
        if let Some(resolved) = self.resolved_frames.get_mut(&surface_id) {
            resolved.set_full_damage_for_next_aggregation();
        }
    }

    pub fn set_frame_annotator(&mut self, annotator: Option<Box<dyn FrameAnnotator>>) {
        self.frame_annotator = annotator;
    }

    pub fn has_frame_annotator(&self) -> bool {
        self.frame_annotator.is_some()
    }

    /// Statistics of the most recent aggregation.
    pub fn last_stats(&self) -> &AggregateStatistics {
        &self.last_stats
    }

    /// Surfaces drawn by the most recent aggregation.
    pub fn previous_contained_surfaces(&self) -> &BTreeSet<SurfaceId> {
        &self.previous_contained_surfaces
    }

    pub fn resource_provider(&self) -> &DisplayResourceProvider {
        &self.provider
    }

    /// Called when `surface_id` received new content. Returns `true` when the display has to
    /// redraw: the surface was part of the last aggregation, or a walked frame references it.
    pub fn notify_surface_damage_and_check_for_display_damage(
        &mut self,
        manager: &SurfaceManager,
        surface_id: SurfaceId,
    ) -> bool {
        if let Some(resolved) = self.resolved_frames.get_mut(&surface_id) {
            let has_no_resources = manager
                .get_surface_for_id(&surface_id)
                .and_then(|s| s.active_frame())
                .is_some_and(|f| f.resource_list.is_empty());
            if has_no_resources {
                // A frame without resources asks for everything held to be returned.
                let released = resolved.force_release_resources(&mut self.provider);
                if let Some(client) = resolved.client() {
                    if !released.is_empty() {
                        client.return_resources(&released);
                    }
                }
            }
        }
        if self.previous_contained_surfaces.contains(&surface_id) {
            return true;
        }
        self.damage_ranges
            .get(&surface_id.frame_sink_id)
            .is_some_and(|ranges| ranges.iter().any(|r| r.is_in_range_inclusive(&surface_id)))
    }

    fn on_surface_destroyed(&mut self, surface_id: SurfaceId) {
        debug_assert_eq!(self.phase, AggregationPhase::Idle);
        if let Some(resolved) = self.resolved_frames.remove(&surface_id) {
            tracing::debug!(surface = %surface_id, "dropping resolved frame of destroyed surface");
            self.release_resolved_frame(resolved);
        }
    }

    fn release_resolved_frame(&mut self, resolved: ResolvedFrameData) {
        let released = self.provider.destroy_child(resolved.child_id());
        if let Some(client) = resolved.client() {
            if !released.is_empty() {
                client.return_resources(&released);
            }
        }
    }

    /// Aggregate everything reachable from `root` into one frame.
    ///
    /// `target_damage` is extra area the output needs redrawn. It widens what is copied but is
    /// not reported as root pass damage. A root without a valid active frame yields an empty
    /// frame.
    #[tracing::instrument(skip(self, manager))]
    pub fn aggregate(
        &mut self,
        manager: &mut SurfaceManager,
        root: SurfaceId,
        expected_display_time: DisplayTime,
        display_transform: DisplayTransform,
        target_damage: Rect,
    ) -> AggregatedFrame {
        assert_eq!(
            self.phase,
            AggregationPhase::Idle,
            "aggregate called while another aggregation is in flight"
        );
        for destroyed in manager.take_destroyed_surfaces() {
            self.on_surface_destroyed(destroyed);
        }
        let mut aggregation = Aggregation::new(self, manager, root, expected_display_time);
        let frame = aggregation.run(display_transform, target_damage);
        let stats = aggregation.finish();
        self.last_stats = stats;

        let mut frame = frame;
        if !frame.is_empty() {
            if let Some(annotator) = self.frame_annotator.as_mut() {
                annotator.annotate_aggregated_frame(&mut frame);
            }
        }
        frame
    }
}

/// Transient state of one [`SurfaceAggregator::aggregate`] call.
pub(crate) struct Aggregation<'a> {
    agg: &'a mut SurfaceAggregator,
    manager: &'a mut SurfaceManager,
    root_surface_id: SurfaceId,
    /// Display transform of the root output.
    root_surface_transform: Affine,
    expected_display_time: DisplayTime,
    /// Damage in root target space that drives pruning and pass damage.
    root_damage_rect: Rect,
    /// Surfaces on the current walk stack.
    referenced_surfaces: BTreeSet<SurfaceId>,
    /// Surfaces whose client already heard about this aggregation's damage.
    notified_surfaces: BTreeSet<SurfaceId>,
    resolved_surface_ranges: HashMap<SurfaceRange, Option<SurfaceId>>,
    contained_surfaces: BTreeSet<SurfaceId>,
    contained_frame_sinks: HashMap<FrameSinkId, LocalSurfaceId>,
    /// Surfaces drawing their first frame; only tracked for de-jelly.
    new_surfaces: BTreeSet<SurfaceId>,
    has_copy_requests: bool,
    has_pixel_moving_backdrop_filter: bool,
    dest_pass_list: Vec<AggregatedRenderPass>,
    surface_damage_rect_list: Vec<Rect>,
    current_zero_damage_rect_is_not_recorded: bool,
    delegated_ink_metadata: Option<DelegatedInkMetadata>,
    stats: AggregateStatistics,
}

impl<'a> Aggregation<'a> {
    fn new(
        agg: &'a mut SurfaceAggregator,
        manager: &'a mut SurfaceManager,
        root_surface_id: SurfaceId,
        expected_display_time: DisplayTime,
    ) -> Self {
        Self {
            agg,
            manager,
            root_surface_id,
            root_surface_transform: Affine::IDENTITY,
            expected_display_time,
            root_damage_rect: Rect::default(),
            referenced_surfaces: BTreeSet::new(),
            notified_surfaces: BTreeSet::new(),
            resolved_surface_ranges: HashMap::new(),
            contained_surfaces: BTreeSet::new(),
            contained_frame_sinks: HashMap::new(),
            new_surfaces: BTreeSet::new(),
            has_copy_requests: false,
            has_pixel_moving_backdrop_filter: false,
            dest_pass_list: Vec::new(),
            surface_damage_rect_list: Vec::new(),
            current_zero_damage_rect_is_not_recorded: false,
            delegated_ink_metadata: None,
            stats: AggregateStatistics::default(),
        }
    }

    fn run(&mut self, display_transform: DisplayTransform, target_damage: Rect) -> AggregatedFrame {
        self.agg.phase = AggregationPhase::Prewalking;
        let prewalk_started = Instant::now();

        let Some(root) = self.resolve_surface(self.root_surface_id) else {
            tracing::debug!(surface = %self.root_surface_id, "root surface has no active frame");
            return AggregatedFrame::default();
        };
        if !root.valid {
            tracing::warn!(surface = %root.surface_id, "root surface frame is invalid");
            return AggregatedFrame::default();
        }
        self.check_frame_sinks_changed(root.surface_id);

        let root_frame: &CompositorFrame = &root.frame;
        let mut frame = AggregatedFrame {
            top_controls_visible_height: root_frame.metadata.top_controls_visible_height,
            ..AggregatedFrame::default()
        };

        let root_output_rect = root.output_rect();
        debug_assert!(!root
            .pass(root.root_index())
            .backdrop_filters
            .has_filter_that_moves_pixels());
        let viewport = root_output_rect.size();
        self.root_surface_transform = display_transform.to_affine(kurbo::Size::new(
            f64::from(viewport.width),
            f64::from(viewport.height),
        ));

        self.agg.damage_ranges.clear();
        debug_assert!(self.referenced_surfaces.is_empty());

        // The root pass of the root surface starts the embedding tree.
        if let Some(data) = self.pass_data_mut(root.root_key()) {
            data.flags.will_draw = true;
        }

        let mut prewalk = PrewalkResult::default();
        let prewalk_damage = self.prewalk_surface(&root, None, Rect::default(), &mut prewalk);
        self.stats.prewalk_time = prewalk_started.elapsed();

        self.root_damage_rect = prewalk_damage.union_with(&target_damage);

        // A color usage change reshapes the output, so everything is redrawn.
        let color_usage_changed = self.agg.root_content_color_usage != prewalk.content_color_usage;
        if color_usage_changed {
            self.root_damage_rect = map_enclosed_rect_axis_aligned(
                &self.root_surface_transform,
                Rect::from_size(root_frame.size_in_pixels()),
            );
            self.agg.root_content_color_usage = prewalk.content_color_usage;
        }

        if prewalk.frame_sinks_changed {
            self.manager.aggregated_frame_sinks_changed();
        }

        frame.has_copy_requests = self.has_copy_requests && self.agg.settings.take_copy_requests;
        frame.video_capture_enabled = prewalk.video_capture_enabled;
        frame.content_color_usage = prewalk.content_color_usage;
        frame.page_fullscreen_mode = prewalk.page_fullscreen_mode;

        self.agg.phase = AggregationPhase::Copying;
        let copy_started = Instant::now();
        self.copy_undrawn_surfaces(&mut prewalk);
        let root_id = root.surface_id;
        self.visit_surface(root_id, |this| this.copy_passes(&root));
        debug_assert!(self.referenced_surfaces.is_empty());
        self.stats.copy_time = copy_started.elapsed();
        self.stats.log();

        if self.dest_pass_list.is_empty() {
            return AggregatedFrame::default();
        }

        self.agg.phase = AggregationPhase::PostProcessing;

        // Target damage only widens what gets copied; the reported root damage stays the
        // surface damage unless the whole output is being redrawn anyway.
        let root_needs_full_damage = self
            .pass_data(root.root_key())
            .is_some_and(|d| d.flags.needs_full_damage());
        if !color_usage_changed && !self.agg.last_frame_had_delegated_ink && !root_needs_full_damage {
            if let Some(last) = self.dest_pass_list.last_mut() {
                last.damage_rect.intersect(&prewalk_damage);
            }
        }

        if self.agg.settings.de_jelly.is_some() {
            self.handle_de_jelly();
        }
        self.add_color_conversion_pass();
        self.add_root_readback_pass();

        frame.render_pass_list = std::mem::take(&mut self.dest_pass_list);
        frame.surface_damage_rect_list = std::mem::take(&mut self.surface_damage_rect_list);

        self.purge_unused_resolved_frames();
        std::mem::swap(
            &mut self.contained_surfaces,
            &mut self.agg.previous_contained_surfaces,
        );
        std::mem::swap(
            &mut self.contained_frame_sinks,
            &mut self.agg.previous_contained_frame_sinks,
        );
        self.contained_surfaces.clear();
        self.contained_frame_sinks.clear();

        frame.latency_info = self.take_latency_info();

        match self.delegated_ink_metadata.take() {
            Some(ink) => {
                frame.delegated_ink_metadata = Some(ink);
                self.agg.last_frame_had_delegated_ink = true;
            }
            None => self.agg.last_frame_had_delegated_ink = false,
        }

        frame
    }

    /// Reset per-aggregation state of every cache entry and hand back the statistics.
    fn finish(self) -> AggregateStatistics {
        for resolved in self.agg.resolved_frames.values_mut() {
            resolved.reset_after_aggregation();
        }
        self.agg.phase = AggregationPhase::Idle;
        self.stats
    }

    fn take_latency_info(&mut self) -> Vec<LatencyInfo> {
        let mut latency = Vec::new();
        for id in &self.agg.previous_contained_surfaces {
            if let Some(surface) = self.manager.get_surface_for_id_mut(id) {
                surface.take_latency_info(&mut latency);
            }
        }
        if latency.len() > MAX_LATENCY_INFO {
            tracing::warn!(
                count = latency.len(),
                max = MAX_LATENCY_INFO,
                "too many latency records; truncating"
            );
            latency.truncate(MAX_LATENCY_INFO);
        }
        latency
    }

    /// Drop cache entries no walk touched and release their resources.
    fn purge_unused_resolved_frames(&mut self) {
        let unused: Vec<SurfaceId> = self
            .agg
            .resolved_frames
            .iter()
            .filter(|(_, r)| !r.was_used_in_aggregation())
            .map(|(id, _)| *id)
            .collect();
        for id in unused {
            if let Some(resolved) = self.agg.resolved_frames.remove(&id) {
                tracing::debug!(surface = %id, "evicting unused resolved frame");
                self.agg.release_resolved_frame(resolved);
            }
        }
    }

    /// Run `visit` with `id` on the walk stack. A surface already on the stack is a reference
    /// cycle; the nested visit is skipped and `None` returned.
    pub(crate) fn visit_surface<R>(
        &mut self,
        id: SurfaceId,
        visit: impl FnOnce(&mut Self) -> R,
    ) -> Option<R> {
        if !self.referenced_surfaces.insert(id) {
            tracing::warn!(surface = %id, "surface references itself; cutting cycle");
            return None;
        }
        let out = visit(self);
        self.referenced_surfaces.remove(&id);
        Some(out)
    }

    /// Resolve `range` to its latest surface with an active frame. Cached per aggregation.
    pub(crate) fn resolve_range(&mut self, range: &SurfaceRange) -> Option<FrameSnapshot> {
        let id = match self.resolved_surface_ranges.get(range) {
            Some(id) => *id,
            None => {
                let id = self.manager.get_latest_in_flight_surface(range);
                self.resolved_surface_ranges.insert(*range, id);
                id
            }
        }?;
        self.resolve_surface(id)
    }

    /// Cache entry of `id`, created on first use and refreshed once per aggregation when the
    /// surface has a newer frame.
    pub(crate) fn resolve_surface(&mut self, id: SurfaceId) -> Option<FrameSnapshot> {
        let SurfaceAggregator {
            resolved_frames,
            provider,
            id_generator,
            ..
        } = &mut *self.agg;
        let surface = self.manager.get_surface_for_id(&id)?;

        if !resolved_frames.contains_key(&id) {
            if !surface.has_active_frame() {
                return None;
            }
            let previous_id = surface.previous_frame_surface_id();
            let previous = (previous_id != id)
                .then(|| resolved_frames.get(&previous_id))
                .flatten()
                .map(|r| (r.previous_frame_index(), r.previous_output_rect()));
            let resolved = ResolvedFrameData::new(provider, surface, previous)?;
            resolved_frames.insert(id, resolved);
        }
        let resolved = resolved_frames.get_mut(&id)?;

        if !resolved.was_used_in_aggregation() {
            resolved.mark_as_used_in_aggregation();
            if resolved.needs_update(surface) {
                let started = Instant::now();
                if let (Some(client), Some(frame)) = (surface.client(), surface.active_frame()) {
                    client.ref_resources(&frame.resource_list);
                }
                self.stats.declare_resources_count += surface
                    .active_frame()
                    .map_or(0, |f| f.resource_list.len());
                let released = resolved.update_for_active_frame(surface, provider, id_generator);
                if !released.is_empty() {
                    if let Some(client) = surface.client() {
                        client.return_resources(&released);
                    }
                }
                self.stats.declare_resources_time += started.elapsed();
            }
        }
        Some(resolved.snapshot())
    }

    pub(crate) fn pass_data(&self, key: PassKey) -> Option<&AggregationPassData> {
        self.agg
            .resolved_frames
            .get(&key.surface_id)?
            .aggregation(key.pass_index)
    }

    pub(crate) fn pass_data_mut(&mut self, key: PassKey) -> Option<&mut AggregationPassData> {
        self.agg
            .resolved_frames
            .get_mut(&key.surface_id)?
            .aggregation_mut(key.pass_index)
    }

    /// Record `id` as drawn. Returns `true` when its frame sink was not drawn last time.
    pub(crate) fn check_frame_sinks_changed(&mut self, id: SurfaceId) -> bool {
        self.contained_surfaces.insert(id);
        let local = self.contained_frame_sinks.entry(id.frame_sink_id).or_default();
        *local = (*local).max(id.local_surface_id);
        !self
            .agg
            .previous_contained_frame_sinks
            .contains_key(&id.frame_sink_id)
    }

    pub(crate) fn is_root_surface(&self, id: SurfaceId) -> bool {
        id == self.root_surface_id
    }
}

/// Loose merge check used by the damage walk; the copy walk adds transform, copy request and
/// mask conditions.
pub(crate) fn can_potentially_merge_pass(
    surface_quad: &SurfaceQuadMaterial,
    sqs: &SharedQuadState,
) -> bool {
    surface_quad.allow_merge
        && (sqs.opacity - 1.0).abs() <= OPACITY_EPSILON
        && sqs.de_jelly_delta_y == 0.0
}

/// Scale applied to embedded content: stretch-to-fill, or the device scale factor ratio
/// between embedder and embedded frame.
pub(crate) fn extra_content_scale(
    surface_quad: &SurfaceQuadMaterial,
    quad_rect: Rect,
    parent_device_scale_factor: f32,
    child: &CompositorFrame,
) -> (f32, f32) {
    if surface_quad.stretch_content_to_fill_bounds {
        let size = child.size_in_pixels();
        if size.is_empty() {
            return (1.0, 1.0);
        }
        return (
            quad_rect.width as f32 / size.width as f32,
            quad_rect.height as f32 / size.height as f32,
        );
    }
    let scale = parent_device_scale_factor / child.device_scale_factor();
    (scale, scale)
}

#[cfg(test)]
#[path = "../../tests/unit/aggregator/mod.rs"]
mod tests;

use kurbo::Affine;

use crate::{
    foundation::{
        color::ContentColorUsage,
        core::Color,
        error::StratumResult,
        geometry::Rect,
    },
    quads::{
        draw_quad::{DrawQuad, SurfaceQuadMaterial},
        filters::FilterOperations,
        frame::{
            CompositorFrame, CompositorFrameMetadata, CopyOutputRequest, DelegatedInkMetadata,
            LatencyInfo, TransferableResource,
        },
        render_pass::{CompositorRenderPass, CompositorRenderPassId},
        shared_quad_state::SharedQuadState,
    },
    surfaces::ids::{SurfaceId, SurfaceRange},
};

/// Builds a [`CompositorFrame`]; passes are added in draw order, root last.
#[derive(Default)]
pub struct FrameBuilder {
    metadata: CompositorFrameMetadata,
    resources: Vec<TransferableResource>,
    passes: Vec<CompositorRenderPass>,
}

impl FrameBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn device_scale_factor(mut self, dsf: f32) -> Self {
        self.metadata.device_scale_factor = dsf;
        self
    }

    pub fn background_color(mut self, color: Color) -> Self {
        self.metadata.root_background_color = color;
        self
    }

    pub fn content_color_usage(mut self, usage: ContentColorUsage) -> Self {
        self.metadata.content_color_usage = usage;
        self
    }

    pub fn referenced_surface(mut self, range: SurfaceRange) -> Self {
        self.metadata.referenced_surfaces.push(range);
        self
    }

    pub fn delegated_ink(mut self, ink: DelegatedInkMetadata) -> Self {
        self.metadata.delegated_ink_metadata = Some(ink);
        self
    }

    pub fn latency_info(mut self, info: LatencyInfo) -> Self {
        self.metadata.latency_info.push(info);
        self
    }

    pub fn top_controls_visible_height(mut self, height: f32) -> Self {
        self.metadata.top_controls_visible_height = Some(height);
        self
    }

    pub fn resource(mut self, resource: TransferableResource) -> Self {
        self.resources.push(resource);
        self
    }

    pub fn pass(mut self, pass: CompositorRenderPass) -> Self {
        self.passes.push(pass);
        self
    }

    /// Assemble and validate the frame.
    pub fn build(self) -> StratumResult<CompositorFrame> {
        let frame = CompositorFrame {
            metadata: self.metadata,
            resource_list: self.resources,
            render_pass_list: self.passes,
        };
        frame.validate()?;
        Ok(frame)
    }
}

/// Builds one [`CompositorRenderPass`].
pub struct PassBuilder {
    pass: CompositorRenderPass,
}

impl PassBuilder {
    /// Pass with full damage over `output_rect`.
    pub fn new(id: u64, output_rect: Rect) -> Self {
        Self {
            pass: CompositorRenderPass::new(CompositorRenderPassId(id), output_rect),
        }
    }

    pub fn damage(mut self, damage_rect: Rect) -> Self {
        self.pass.damage_rect = damage_rect;
        self
    }

    pub fn transform_to_root_target(mut self, transform: Affine) -> Self {
        self.pass.transform_to_root_target = transform;
        self
    }

    pub fn filters(mut self, filters: FilterOperations) -> Self {
        self.pass.filters = filters;
        self
    }

    pub fn backdrop_filters(mut self, filters: FilterOperations) -> Self {
        self.pass.backdrop_filters = filters;
        self
    }

    pub fn cache_render_pass(mut self, cache: bool) -> Self {
        self.pass.cache_render_pass = cache;
        self
    }

    pub fn transparent_background(mut self, transparent: bool) -> Self {
        self.pass.has_transparent_background = transparent;
        self
    }

    pub fn copy_request(mut self, request: CopyOutputRequest) -> Self {
        self.pass.copy_requests.push(request);
        self
    }

    /// Start a new run of quads sharing `sqs`.
    pub fn shared_state(mut self, sqs: SharedQuadState) -> Self {
        self.pass.push_shared_quad_state(sqs);
        self
    }

    /// Append a quad to the current run. A pass without state gets an identity state
    /// covering the quad.
    pub fn quad(mut self, quad: DrawQuad) -> Self {
        if self.pass.shared_quad_state_list.is_empty() {
            self.pass
                .push_shared_quad_state(SharedQuadState::with_rect(quad.rect));
        }
        if quad.per_quad_damage().is_some() {
            self.pass.has_per_quad_damage = true;
        }
        self.pass.push_quad(quad);
        self
    }

    /// Solid color quad in its own identity state.
    pub fn solid(self, rect: Rect, color: Color) -> Self {
        self.shared_state(SharedQuadState::with_rect(rect))
            .quad(DrawQuad::solid_color(0, rect, color))
    }

    /// Embed of `surface` in its own state placed by `transform`.
    pub fn surface(self, rect: Rect, transform: Affine, surface: SurfaceId) -> Self {
        self.surface_range(rect, transform, SurfaceRange::single(surface), Color::TRANSPARENT)
    }

    /// Embed of a surface range with a default background color.
    pub fn surface_range(
        self,
        rect: Rect,
        transform: Affine,
        range: SurfaceRange,
        default_background_color: Color,
    ) -> Self {
        let sqs = SharedQuadState {
            quad_to_target_transform: transform,
            ..SharedQuadState::with_rect(rect)
        };
        self.shared_state(sqs).quad(DrawQuad::surface_content(
            0,
            rect,
            SurfaceQuadMaterial {
                surface_range: range,
                default_background_color,
                stretch_content_to_fill_bounds: false,
                is_reflection: false,
                allow_merge: true,
            },
        ))
    }

    /// Quad drawing another pass of the same frame, in its own state.
    pub fn render_pass_quad(self, rect: Rect, transform: Affine, pass_id: u64) -> Self {
        let sqs = SharedQuadState {
            quad_to_target_transform: transform,
            ..SharedQuadState::with_rect(rect)
        };
        self.shared_state(sqs).quad(DrawQuad::render_pass(
            0,
            rect,
            CompositorRenderPassId(pass_id),
        ))
    }

    pub fn build(self) -> CompositorRenderPass {
        self.pass
    }
}

use smallvec::SmallVec;

use crate::{
    foundation::{core::Color, geometry::Rect},
    quads::{
        frame::ResourceId,
        render_pass::{AggregatedRenderPassId, CompositorRenderPassId},
    },
    surfaces::ids::SurfaceRange,
};

/// Resource ids referenced by a quad. Most quads reference at most one texture.
pub type QuadResources = SmallVec<[ResourceId; 4]>;

/// Embed of another surface's output.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SurfaceQuadMaterial {
    /// Acceptable surfaces; `end` is the primary.
    pub surface_range: SurfaceRange,
    /// Color drawn when no surface in the range has a frame.
    #[serde(default)]
    pub default_background_color: Color,
    /// Stretch the embedded content to exactly fill the quad rect.
    #[serde(default)]
    pub stretch_content_to_fill_bounds: bool,
    /// The embed mirrors another surface (e.g. a reflection/magnifier).
    #[serde(default)]
    pub is_reflection: bool,
    /// The embedder allows the embedded root pass to be merged into its pass.
    #[serde(default = "default_allow_merge")]
    pub allow_merge: bool,
}

fn default_allow_merge() -> bool {
    true
}

/// Quad payload. `SurfaceContent` and `CompositorRenderPass` only appear in submitted frames;
/// `AggregatedRenderPass` only appears in aggregated output.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Material {
    SolidColor {
        color: Color,
        #[serde(default)]
        force_anti_aliasing_off: bool,
    },
    Texture {
        #[serde(default)]
        premultiplied_alpha: bool,
        #[serde(default)]
        background_color: Color,
        /// May only be shown on a secure output.
        #[serde(default)]
        secure_output_only: bool,
        /// Damage of this quad in render pass space, valid for the frame right after the
        /// previously aggregated one.
        #[serde(default)]
        damage_rect: Option<Rect>,
    },
    Tile {
        #[serde(default)]
        is_premultiplied: bool,
    },
    SurfaceContent(SurfaceQuadMaterial),
    CompositorRenderPass {
        render_pass_id: CompositorRenderPassId,
    },
    AggregatedRenderPass {
        render_pass_id: AggregatedRenderPassId,
        /// Damage under the quad intersects it, so backdrop filters must be re-evaluated.
        #[serde(default)]
        intersects_damage_under: bool,
    },
}

/// One drawable primitive.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct DrawQuad {
    /// Index into the owning pass's shared quad state list.
    #[serde(default)]
    pub shared_quad_state: usize,
    /// Quad bounds in quad space.
    pub rect: Rect,
    /// Visible part of `rect`.
    pub visible_rect: Rect,
    #[serde(default)]
    pub needs_blending: bool,
    #[serde(default)]
    pub resources: QuadResources,
    pub material: Material,
}

impl DrawQuad {
    /// Quad whose visible rect is its whole rect.
    pub fn new(shared_quad_state: usize, rect: Rect, material: Material) -> Self {
        Self {
            shared_quad_state,
            rect,
            visible_rect: rect,
            needs_blending: false,
            resources: QuadResources::new(),
            material,
        }
    }

    pub fn solid_color(shared_quad_state: usize, rect: Rect, color: Color) -> Self {
        Self::new(
            shared_quad_state,
            rect,
            Material::SolidColor {
                color,
                force_anti_aliasing_off: false,
            },
        )
    }

    pub fn surface_content(shared_quad_state: usize, rect: Rect, quad: SurfaceQuadMaterial) -> Self {
        Self::new(shared_quad_state, rect, Material::SurfaceContent(quad))
    }

    pub fn render_pass(
        shared_quad_state: usize,
        rect: Rect,
        render_pass_id: CompositorRenderPassId,
    ) -> Self {
        Self::new(
            shared_quad_state,
            rect,
            Material::CompositorRenderPass { render_pass_id },
        )
    }

    /// Texture quad drawing `resource`, optionally with its own damage.
    pub fn texture(
        shared_quad_state: usize,
        rect: Rect,
        resource: ResourceId,
        damage_rect: Option<Rect>,
    ) -> Self {
        let mut quad = Self::new(
            shared_quad_state,
            rect,
            Material::Texture {
                premultiplied_alpha: true,
                background_color: Color::TRANSPARENT,
                secure_output_only: false,
                damage_rect,
            },
        );
        quad.resources.push(resource);
        quad
    }

    pub fn compositor_render_pass_id(&self) -> Option<CompositorRenderPassId> {
        match self.material {
            Material::CompositorRenderPass { render_pass_id } => Some(render_pass_id),
            _ => None,
        }
    }

    pub fn aggregated_render_pass_id(&self) -> Option<AggregatedRenderPassId> {
        match self.material {
            Material::AggregatedRenderPass { render_pass_id, .. } => Some(render_pass_id),
            _ => None,
        }
    }

    /// Per-quad damage rect, in render pass space.
    pub fn per_quad_damage(&self) -> Option<Rect> {
        match self.material {
            Material::Texture { damage_rect, .. } => damage_rect,
            _ => None,
        }
    }

    /// Return `true` for quads that embed another surface or pass.
    pub fn is_embedding(&self) -> bool {
        matches!(
            self.material,
            Material::SurfaceContent(_)
                | Material::CompositorRenderPass { .. }
                | Material::AggregatedRenderPass { .. }
        )
    }
}

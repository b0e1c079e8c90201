//! JSON scene descriptions: a set of surfaces, the frames each one submits over time and the
//! aggregator configuration to flatten them with.
//!
//! Step `k` of a scene submits the `k`-th frame of every surface that has one; surfaces with
//! fewer frames keep their last active frame. Copy requests are queued before the first step.

use std::{collections::BTreeSet, path::Path};

use anyhow::Context as _;

use crate::{
    aggregator::{AggregatorSettings, SurfaceAggregator},
    foundation::{
        color::DisplayColorSpaces,
        error::{StratumError, StratumResult},
    },
    quads::frame::{CompositorFrame, CopyOutputRequest},
    surfaces::{ids::SurfaceId, manager::SurfaceManager},
};

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Scene {
    #[serde(default)]
    pub settings: AggregatorSettings,
    #[serde(default)]
    pub display_color_spaces: DisplayColorSpaces,
    /// Surface aggregated as the display root.
    pub root: SurfaceId,
    pub surfaces: Vec<SceneSurface>,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SceneSurface {
    pub id: SurfaceId,
    #[serde(default)]
    pub frames: Vec<CompositorFrame>,
    #[serde(default)]
    pub copy_requests: Vec<CopyOutputRequest>,
    /// Report full damage every aggregation.
    #[serde(default)]
    pub animating: bool,
}

impl Scene {
    pub fn from_json_str(json: &str) -> StratumResult<Self> {
        let scene: Scene = serde_json::from_str(json)?;
        scene.validate()?;
        Ok(scene)
    }

    pub fn from_path(path: &Path) -> StratumResult<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("read scene '{}'", path.display()))?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> StratumResult<()> {
        let mut seen = BTreeSet::new();
        for surface in &self.surfaces {
            if !surface.id.is_valid() {
                return Err(StratumError::scene(format!(
                    "surface {} has an invalid id",
                    surface.id
                )));
            }
            if !seen.insert(surface.id) {
                return Err(StratumError::scene(format!(
                    "surface {} is listed twice",
                    surface.id
                )));
            }
            for (step, frame) in surface.frames.iter().enumerate() {
                frame.validate().map_err(|e| {
                    StratumError::scene(format!("surface {} frame {step}: {e}", surface.id))
                })?;
            }
        }
        if !seen.contains(&self.root) {
            return Err(StratumError::scene(format!(
                "root surface {} is not listed",
                self.root
            )));
        }
        self.settings.validate()?;
        Ok(())
    }

    /// Number of submission steps; a scene without frames still has one.
    pub fn steps(&self) -> usize {
        self.surfaces
            .iter()
            .map(|s| s.frames.len())
            .max()
            .unwrap_or(0)
            .max(1)
    }

    pub fn build_aggregator(&self) -> StratumResult<SurfaceAggregator> {
        SurfaceAggregator::builder()
            .settings(self.settings.clone())
            .display_color_spaces(self.display_color_spaces)
            .build()
    }

    /// Create every surface and queue the scene's copy requests.
    pub fn build_manager(&self) -> StratumResult<SurfaceManager> {
        let mut manager = SurfaceManager::new();
        for surface in &self.surfaces {
            manager.create_surface(surface.id, None)?;
            if surface.animating {
                manager.set_surface_animation_damage(surface.id, true)?;
            }
            for request in &surface.copy_requests {
                manager.request_copy_of_output(surface.id, request.clone())?;
            }
        }
        Ok(manager)
    }

    /// Submit the frames of `step`. Returns how many surfaces received a frame.
    pub fn submit_step(&self, manager: &mut SurfaceManager, step: usize) -> StratumResult<usize> {
        let mut submitted = 0;
        for surface in &self.surfaces {
            if let Some(frame) = surface.frames.get(step) {
                manager.submit_frame(surface.id, frame.clone())?;
                submitted += 1;
            }
        }
        tracing::debug!(step, submitted, "submitted scene step");
        Ok(submitted)
    }
}

#[cfg(test)]
#[path = "../tests/unit/scene.rs"]
mod tests;

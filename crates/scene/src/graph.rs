//! Name-keyed registry of renderers in insertion order.

use glam::Vec3;

use crate::context::GpuContext;
use crate::error::SceneError;
use crate::renderer::SceneRenderer;

/// Renderers by unique name. Unknown names are ignored by every mutator.
#[derive(Debug, Default)]
pub struct SceneGraph {
    entries: Vec<(String, SceneRenderer)>,
}

impl SceneGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace. A replaced renderer keeps its slot and is returned.
    pub fn add_renderer(&mut self, name: impl Into<String>, renderer: SceneRenderer) -> Option<SceneRenderer> {
        let name = name.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some((_, slot)) => Some(std::mem::replace(slot, renderer)),
            None => {
                self.entries.push((name, renderer));
                None
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&SceneRenderer> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, r)| r)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut SceneRenderer> {
        self.entries.iter_mut().find(|(n, _)| n == name).map(|(_, r)| r)
    }

    pub fn remove(&mut self, name: &str) -> Option<SceneRenderer> {
        let index = self.entries.iter().position(|(n, _)| n == name)?;
        Some(self.entries.remove(index).1)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Names in insertion order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &SceneRenderer> {
        self.entries.iter().map(|(_, r)| r)
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut SceneRenderer> {
        self.entries.iter_mut().map(|(_, r)| r)
    }

    pub fn translate(&mut self, name: &str, delta: Vec3) {
        if let Some(r) = self.get_mut(name) {
            r.transform_mut().base.translate(delta);
        }
    }

    pub fn rotate(&mut self, name: &str, axis: Vec3, degrees: f32) {
        if let Some(r) = self.get_mut(name) {
            r.transform_mut().base.rotate(axis, degrees);
        }
    }

    pub fn scale(&mut self, name: &str, factor: Vec3) {
        if let Some(r) = self.get_mut(name) {
            r.transform_mut().base.scale_by(factor);
        }
    }

    pub fn set_auto_rotation(&mut self, name: &str, enabled: bool, axis: Option<Vec3>, speed: Option<f32>) {
        if let Some(r) = self.get_mut(name) {
            r.transform_mut().set_auto_rotation(enabled, axis, speed);
        }
    }

    /// Render one renderer by name, or all of them in insertion order.
    pub fn render(&mut self, name: Option<&str>, ctx: &mut GpuContext<'_>) -> Result<(), SceneError> {
        match name {
            Some(name) => match self.get_mut(name) {
                Some(r) => r.render(ctx),
                None => Ok(()),
            },
            None => self.iter_mut().try_for_each(|r| r.render(ctx)),
        }
    }

    /// Mutable access to the renderer `name` plus every other renderer, ordered by `order`.
    ///
    /// `order` lists names; names missing from the graph are skipped.
    pub fn split_peers<'a>(
        &'a mut self,
        name: &str,
        order: &[String],
    ) -> Option<(&'a mut SceneRenderer, Vec<&'a mut SceneRenderer>)> {
        let mut target = None;
        let mut others: Vec<(&str, &'a mut SceneRenderer)> = Vec::with_capacity(self.entries.len());
        for (n, r) in self.entries.iter_mut() {
            if n.as_str() == name {
                target = Some(r);
            } else {
                others.push((n.as_str(), r));
            }
        }
        let target = target?;
        let mut peers = Vec::with_capacity(others.len());
        for wanted in order {
            if let Some(index) = others.iter().position(|(n, _)| *n == wanted.as_str()) {
                peers.push(others.swap_remove(index).1);
            }
        }
        Some((target, peers))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RenderOverrides, RendererConfiguration, SkyboxParams, VariantConfig};
    use engine_core::CameraKeyframe;

    fn renderer(name: &str) -> SceneRenderer {
        let defaults = RendererConfiguration {
            camera_positions: vec![CameraKeyframe::new(0.0, 0.0, 0.0, 0.0, 0.0)],
            ..Default::default()
        };
        let params = SkyboxParams {
            faces: Some(std::array::from_fn(|i| format!("{i}.png").into())),
        };
        let config = defaults.add_skybox(name, &params, &RenderOverrides::default()).unwrap();
        SceneRenderer::new(VariantConfig::Skybox(config))
    }

    #[test]
    fn same_name_replaces_in_place() {
        let mut graph = SceneGraph::new();
        graph.add_renderer("a", renderer("a"));
        graph.add_renderer("b", renderer("b"));
        let replacement = renderer("a");
        let id = replacement.id();
        assert!(graph.add_renderer("a", replacement).is_some());
        assert_eq!(graph.names().collect::<Vec<_>>(), ["a", "b"]);
        assert_eq!(graph.get("a").map(SceneRenderer::id), Some(id));
    }

    #[test]
    fn unknown_names_are_ignored() {
        let mut graph = SceneGraph::new();
        graph.add_renderer("a", renderer("a"));
        graph.translate("missing", Vec3::ONE);
        graph.rotate("missing", Vec3::Y, 90.0);
        graph.scale("missing", Vec3::splat(2.0));
        graph.set_auto_rotation("missing", true, None, Some(10.0));
        assert!(graph.remove("missing").is_none());
        assert_eq!(graph.len(), 1);
    }

    #[test]
    fn transforms_apply_to_named_renderer() {
        let mut graph = SceneGraph::new();
        graph.add_renderer("a", renderer("a"));
        graph.translate("a", Vec3::new(1.0, 2.0, 3.0));
        graph.scale("a", Vec3::splat(2.0));
        graph.set_auto_rotation("a", true, Some(Vec3::X), Some(45.0));
        let transform = graph.get("a").unwrap().transform();
        assert_eq!(transform.base.position, Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(transform.base.scale, Vec3::splat(2.0));
        assert!(transform.auto_rotation.enabled);
        assert_eq!(transform.auto_rotation.speed, 45.0);
    }

    #[test]
    fn split_peers_follows_order_and_excludes_target() {
        let mut graph = SceneGraph::new();
        for name in ["water", "sky", "boat"] {
            graph.add_renderer(name, renderer(name));
        }
        let order: Vec<String> = ["boat", "water", "sky"].map(String::from).to_vec();
        let (target, peers) = graph.split_peers("water", &order).unwrap();
        assert_eq!(target.name(), "water");
        assert_eq!(peers.iter().map(|p| p.name()).collect::<Vec<_>>(), ["boat", "sky"]);
        assert!(graph.split_peers("missing", &order).is_none());
    }
}

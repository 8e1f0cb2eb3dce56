//! The rendering instance: owns the device and window and runs the frame loop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use engine_core::{CameraPathController, Light, Time};
use input::{WindowService, WindowSignal};
use renderer::{FramebufferManager, GraphicsDevice, ShaderLibrary, TextureUnitAllocator, Viewport};

use crate::assets::AssetLoader;
use crate::config::{RendererConfiguration, RunSettings, ScenarioFile};
use crate::context::GpuContext;
use crate::error::{ConfigError, SceneError};
use crate::graph::SceneGraph;
use crate::message::{BenchMessage, MessageSink, NullSink, RunOutcome, RunReport};
use crate::renderer::shadow::ShadowMapManager;
use crate::renderer::SceneRenderer;

/// Borrow the instance's services as a [`GpuContext`], leaving the graph free.
macro_rules! gpu_context {
    ($self:ident) => {
        GpuContext {
            device: &mut $self.device,
            shaders: &$self.shaders,
            assets: $self.assets.as_ref(),
            units: &mut $self.units,
            shadow_maps: &mut $self.shadow_maps,
            elapsed: $self.time.elapsed_seconds(),
        }
    };
}

#[derive(Debug, Clone)]
struct OrderEntry {
    name: String,
    order: i32,
    /// Insertion sequence, breaks ties.
    sequence: u64,
}

/// One benchmark run: device, window, scene and the loop that drives them.
pub struct RenderingInstance<D: GraphicsDevice, W: WindowService> {
    device: D,
    window: W,
    shaders: ShaderLibrary,
    assets: Box<dyn AssetLoader>,
    graph: SceneGraph,
    order: Vec<OrderEntry>,
    next_sequence: u64,
    framebuffers: FramebufferManager,
    units: TextureUnitAllocator,
    shadow_maps: ShadowMapManager,
    camera_path: CameraPathController,
    lights: Vec<Light>,
    run: RunSettings,
    sink: Box<dyn MessageSink>,
    stop: Arc<AtomicBool>,
    time: Time,
    released: bool,
}

impl<D: GraphicsDevice, W: WindowService> RenderingInstance<D, W> {
    pub fn new(
        device: D,
        window: W,
        shaders: ShaderLibrary,
        assets: Box<dyn AssetLoader>,
        config: &RendererConfiguration,
        run: RunSettings,
    ) -> Result<Self, SceneError> {
        let camera_path = CameraPathController::new(
            config.camera_positions.clone(),
            config.lens_rotations.clone(),
            config.camera_speed,
            config.loop_camera,
        )
        .map_err(ConfigError::from)?;
        Ok(Self {
            device,
            window,
            shaders,
            assets,
            graph: SceneGraph::new(),
            order: Vec::new(),
            next_sequence: 0,
            framebuffers: FramebufferManager::new(),
            units: TextureUnitAllocator::new(),
            shadow_maps: ShadowMapManager::new(),
            camera_path,
            lights: config.lights.clone(),
            run,
            sink: Box::new(NullSink),
            stop: Arc::new(AtomicBool::new(false)),
            time: Time::new(),
            released: false,
        })
    }

    /// Instance with every renderer of `scenario` set up in file order.
    pub fn from_scenario(
        device: D,
        window: W,
        shaders: ShaderLibrary,
        assets: Box<dyn AssetLoader>,
        scenario: &ScenarioFile,
    ) -> Result<Self, SceneError> {
        let mut instance = Self::new(device, window, shaders, assets, &scenario.defaults, scenario.run)?;
        instance.load_scenario(scenario)?;
        Ok(instance)
    }

    pub fn with_sink(mut self, sink: Box<dyn MessageSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_stop_flag(mut self, stop: Arc<AtomicBool>) -> Self {
        self.stop = stop;
        self
    }

    /// Flag that ends the loop with [`RunOutcome::Cancelled`] once raised.
    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    pub fn window(&self) -> &W {
        &self.window
    }

    pub fn graph(&self) -> &SceneGraph {
        &self.graph
    }

    pub fn graph_mut(&mut self) -> &mut SceneGraph {
        &mut self.graph
    }

    pub fn camera_path(&self) -> &CameraPathController {
        &self.camera_path
    }

    pub fn texture_units(&self) -> &TextureUnitAllocator {
        &self.units
    }

    pub fn framebuffers(&self) -> &FramebufferManager {
        &self.framebuffers
    }

    /// Renderer names in main-pass order.
    pub fn render_order(&self) -> Vec<&str> {
        self.order.iter().map(|e| e.name.as_str()).collect()
    }

    pub fn load_scenario(&mut self, scenario: &ScenarioFile) -> Result<(), SceneError> {
        for planned in scenario.plan()? {
            let name = planned.config.name().to_string();
            self.add_renderer(&name, SceneRenderer::new(planned.config), planned.order)?;
        }
        Ok(())
    }

    /// Set up `renderer` and register it under `name`.
    ///
    /// Nothing is registered when setup fails. Without an explicit order the
    /// renderer goes after the current maximum. An existing renderer with the
    /// same name is shut down and replaced in place.
    pub fn add_renderer(&mut self, name: &str, mut renderer: SceneRenderer, order: Option<i32>) -> Result<(), SceneError> {
        renderer.setup(&mut gpu_context!(self))?;

        let (width, height) = self.device.surface_size();
        if let Err(source) = self.framebuffers.allocate(&mut self.device, name, width, height) {
            let _ = renderer.shutdown(&mut gpu_context!(self));
            return Err(SceneError::Device {
                renderer: name.to_string(),
                source,
            });
        }

        if let Some(mut replaced) = self.graph.add_renderer(name, renderer) {
            log::info!("Replacing renderer '{}'", name);
            if let Err(e) = replaced.shutdown(&mut gpu_context!(self)) {
                log::error!("Failed to shut down replaced renderer '{}': {}", name, e);
            }
            self.order.retain(|e| e.name != name);
        }
        let order = order.unwrap_or_else(|| self.order.iter().map(|e| e.order).max().unwrap_or(0) + 1);
        self.order.push(OrderEntry {
            name: name.to_string(),
            order,
            sequence: self.next_sequence,
        });
        self.next_sequence += 1;
        self.update_render_order();
        log::info!("Added renderer '{}' at order {}", name, order);
        Ok(())
    }

    /// Change the main-pass order of `name`. Unknown names are ignored.
    pub fn set_render_order(&mut self, name: &str, order: i32) {
        if let Some(entry) = self.order.iter_mut().find(|e| e.name == name) {
            entry.order = order;
            self.update_render_order();
        }
    }

    /// Shut down and forget `name`. Returns false for unknown names.
    pub fn remove_renderer(&mut self, name: &str) -> Result<bool, SceneError> {
        let Some(mut renderer) = self.graph.remove(name) else {
            return Ok(false);
        };
        self.order.retain(|e| e.name != name);
        self.framebuffers.destroy(&mut self.device, name);
        renderer.shutdown(&mut gpu_context!(self))?;
        Ok(true)
    }

    /// Stable sort by order value; equal values keep insertion order.
    pub fn update_render_order(&mut self) {
        self.order.sort_by_key(|e| (e.order, e.sequence));
    }

    /// Run frames until the duration, the frame limit, a window close or the stop flag.
    pub fn run(&mut self) -> Result<RunReport, SceneError> {
        if self.released {
            return Err(SceneError::Context(renderer::DeviceError::ContextLost("run after shutdown".into())));
        }
        log::info!(
            "Starting run with {} renderers (duration {:?}, frame limit {:?})",
            self.order.len(),
            self.run.duration,
            self.run.frame_limit
        );
        self.sink.send(BenchMessage::Ready);

        let mut fps_samples = Vec::new();
        let mut frames = 0u64;
        let outcome = loop {
            if self.stop.load(Ordering::Relaxed) {
                break RunOutcome::Cancelled;
            }
            if let Some(outcome) = self.frame(&mut fps_samples)? {
                break outcome;
            }
            frames += 1;
            let elapsed = self.time.elapsed_seconds();
            if self.run.duration.is_some_and(|d| elapsed >= d) || self.run.frame_limit.is_some_and(|l| frames >= l) {
                break RunOutcome::Completed;
            }
            if self.run.frame_yield_ms > 0 {
                std::thread::sleep(Duration::from_millis(self.run.frame_yield_ms));
            }
        };

        self.sink
            .send(BenchMessage::StoppedByUser(outcome == RunOutcome::StoppedByUser));
        let report = RunReport {
            outcome,
            frames,
            elapsed: self.time.elapsed_seconds(),
            fps_samples,
        };
        log::info!(
            "Run ended ({:?}) after {} frames, {:.2}s, average {:.1} fps",
            report.outcome,
            report.frames,
            report.elapsed,
            report.average_fps()
        );
        Ok(report)
    }

    /// One frame. Returns the outcome when the window asked to close.
    fn frame(&mut self, fps_samples: &mut Vec<f32>) -> Result<Option<RunOutcome>, SceneError> {
        for signal in self.window.poll_events() {
            match signal {
                WindowSignal::CloseRequested => {
                    log::info!("Window closed by user");
                    return Ok(Some(RunOutcome::StoppedByUser));
                }
                WindowSignal::Resized { width, height } => self.resize(width, height)?,
            }
        }
        let dt = self.window.delta_time();
        self.time.advance(Duration::from_secs_f32(dt.max(0.0)));

        let (width, height) = self.device.surface_size();
        let main_viewport = Viewport::new(width, height);
        self.device.bind_render_target(None);
        self.device.set_viewport(main_viewport);
        self.device.clear(Some(self.run.clear_color), true);

        let names: Vec<String> = self.order.iter().map(|e| e.name.clone()).collect();
        self.planar_passes(&names)?;
        self.shadow_pass(&names, main_viewport)?;

        let sample = self.camera_path.update(dt);
        for name in &names {
            let mut ctx = gpu_context!(self);
            if let Some(renderer) = self.graph.get_mut(name) {
                renderer.update_camera(&sample, (width, height));
                renderer.advance(&mut ctx, dt)?;
                renderer.render(&mut ctx)?;
            }
        }

        let fps = self.time.fps();
        fps_samples.push(fps);
        self.sink.send(BenchMessage::Fps(fps));

        self.device.present().map_err(SceneError::Context)?;
        Ok(None)
    }

    fn planar_passes(&mut self, names: &[String]) -> Result<(), SceneError> {
        for name in names {
            if !self.graph.get(name).is_some_and(SceneRenderer::has_planar_camera) {
                continue;
            }
            let mut ctx = gpu_context!(self);
            if let Some((renderer, mut peers)) = self.graph.split_peers(name, names) {
                renderer.render_planar_view(&mut ctx, &mut peers, self.run.clear_color)?;
            }
        }
        Ok(())
    }

    fn shadow_pass(&mut self, names: &[String], main_viewport: Viewport) -> Result<(), SceneError> {
        if self.shadow_maps.is_empty() || !self.graph.iter().any(SceneRenderer::casts_shadow) {
            return Ok(());
        }
        let light = self.lights.first().copied().or_else(|| {
            self.graph
                .iter()
                .find(|r| r.settings().shadows.is_some())
                .and_then(|r| r.settings().lights.first().copied())
        });
        let Some(light) = light else {
            return Ok(());
        };
        let Some(light_space) = self.shadow_maps.begin_pass(&mut self.device, 0, &light) else {
            return Ok(());
        };
        log::debug!("Shadow pass");

        let mut result = Ok(());
        for name in names {
            let mut ctx = gpu_context!(self);
            if let Some(renderer) = self.graph.get_mut(name).filter(|r| r.casts_shadow()) {
                if let Err(e) = renderer.render_from_light(&mut ctx, light_space) {
                    result = Err(e);
                    break;
                }
            }
        }
        self.shadow_maps.end_pass(&mut self.device, main_viewport);
        result
    }

    fn resize(&mut self, width: u32, height: u32) -> Result<(), SceneError> {
        if width == 0 || height == 0 {
            return Ok(());
        }
        log::debug!("Resizing to {}x{}", width, height);
        self.device.resize(width, height);
        for entry in &self.order {
            self.framebuffers
                .allocate(&mut self.device, &entry.name, width, height)
                .map_err(|source| SceneError::Device {
                    renderer: entry.name.clone(),
                    source,
                })?;
        }
        Ok(())
    }

    /// Release renderers, then framebuffers and shadow maps, then the context.
    ///
    /// Every step runs even if an earlier one fails; the first error is returned.
    pub fn shutdown(&mut self) -> Result<(), SceneError> {
        if self.released {
            return Ok(());
        }
        log::info!("Shutting down {} renderers", self.graph.len());
        let mut first_error = None;
        let names: Vec<String> = self.order.iter().rev().map(|e| e.name.clone()).collect();
        for name in &names {
            let mut ctx = gpu_context!(self);
            if let Some(renderer) = self.graph.get_mut(name) {
                if let Err(e) = renderer.shutdown(&mut ctx) {
                    log::error!("Failed to shut down renderer '{}': {}", name, e);
                    first_error.get_or_insert(e);
                }
            }
        }
        self.framebuffers.destroy_all(&mut self.device);
        self.shadow_maps.destroy_all(&mut self.device);
        self.device.release_context();
        self.released = true;
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::MemoryAssets;
    use crate::config::RenderOverrides;
    use crate::context::Resources;
    use crate::error::VariantError;
    use crate::renderer::RendererVariant;
    use engine_core::CameraKeyframe;
    use input::HeadlessWindow;
    use renderer::{BufferId, BufferKind, DrawCall, RecordingDevice, SkyboxVertex};

    /// One buffer; `double_delete` makes release fail on the device.
    struct Points {
        buffer: Option<BufferId>,
        double_delete: bool,
    }

    impl RendererVariant for Points {
        fn kind(&self) -> &'static str {
            "points"
        }

        fn create_buffers(&mut self, res: &mut Resources<'_>) -> Result<(), VariantError> {
            let layout = SkyboxVertex::layout();
            self.buffer = Some(res.device.create_buffer("points", BufferKind::Vertex(layout), &[0u8; 12])?);
            Ok(())
        }

        fn draw_geometry(&mut self, res: &mut Resources<'_>) {
            if let Some(buffer) = self.buffer {
                res.device.draw(&DrawCall::arrays(buffer, 1));
            }
        }

        fn release(&mut self, device: &mut dyn GraphicsDevice) {
            if let Some(buffer) = self.buffer.take() {
                device.delete_buffer(buffer);
                if self.double_delete {
                    device.delete_buffer(buffer);
                }
            }
        }
    }

    fn points(config: &RendererConfiguration, name: &str, double_delete: bool) -> SceneRenderer {
        let settings = config.resolve(name, "points", &RenderOverrides::default()).unwrap();
        SceneRenderer::with_variant(
            settings,
            Box::new(Points {
                buffer: None,
                double_delete,
            }),
        )
    }

    fn instance(config: RendererConfiguration) -> Result<RenderingInstance<RecordingDevice, HeadlessWindow>, SceneError> {
        RenderingInstance::new(
            RecordingDevice::new(64, 64),
            HeadlessWindow::new(64, 64, 1.0 / 60.0),
            ShaderLibrary::in_memory()
                .with_file("points/vertex.wgsl", "vs")
                .with_file("points/fragment.wgsl", "fs"),
            Box::new(MemoryAssets::new()),
            &config,
            RunSettings {
                frame_yield_ms: 0,
                ..Default::default()
            },
        )
    }

    #[test]
    fn camera_path_needs_keyframes() {
        let err = instance(RendererConfiguration::default()).err();
        assert!(matches!(err, Some(SceneError::Config(ConfigError::CameraPath(_)))));
    }

    #[test]
    fn stop_flag_cancels_before_first_frame() {
        let config = RendererConfiguration {
            camera_positions: vec![CameraKeyframe::new(0.0, 0.0, 0.0, 0.0, 0.0)],
            ..Default::default()
        };
        let mut instance = instance(config).unwrap();
        instance.stop_flag().store(true, Ordering::Relaxed);
        let report = instance.run().unwrap();
        assert_eq!(report.outcome, RunOutcome::Cancelled);
        assert_eq!(report.frames, 0);
        assert_eq!(instance.window().frames_polled(), 0);
    }

    #[test]
    fn shutdown_releases_context_once() {
        let config = RendererConfiguration {
            camera_positions: vec![CameraKeyframe::new(0.0, 0.0, 0.0, 0.0, 0.0)],
            ..Default::default()
        };
        let mut instance = instance(config).unwrap();
        instance.shutdown().unwrap();
        instance.shutdown().unwrap();
        let releases = instance
            .device()
            .commands()
            .iter()
            .filter(|c| matches!(c, renderer::Command::ReleaseContext))
            .count();
        assert_eq!(releases, 1);
        assert!(instance.run().is_err());
    }

    #[test]
    fn failed_release_of_replaced_renderer_still_reorders() {
        let config = RendererConfiguration {
            camera_positions: vec![CameraKeyframe::new(0.0, 0.0, 5.0, -90.0, 0.0)],
            debug: true,
            ..Default::default()
        };
        let mut instance = instance(config.clone()).unwrap();
        instance.add_renderer("a", points(&config, "a", true), Some(5)).unwrap();
        instance.add_renderer("b", points(&config, "b", false), None).unwrap();
        assert_eq!(instance.render_order(), ["a", "b"]);

        instance.add_renderer("a", points(&config, "a", false), None).unwrap();
        assert_eq!(instance.render_order(), ["b", "a"]);
        assert_eq!(instance.graph().len(), 2);
        instance.shutdown().unwrap();
        assert_eq!(instance.device().live_resources(), 0);
    }
}

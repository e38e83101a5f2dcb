// ============================================================================
// app.rs — Luxtree
// Application state and winit event-loop handler: render tick, GPU upload,
// egui overlay, keyboard overrides, and sensing lifecycle.
// ============================================================================

use std::sync::Arc;
use std::time::Instant;

use winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    keyboard::{Key, NamedKey},
    window::{Window, WindowAttributes},
};

use crate::camera::CameraRig;
use crate::config::{AppConfig, DisplayParams};
use crate::control::ControlContext;
use crate::control_ui::{self, FrameInfo};
use crate::morph::DiscreteState;
use crate::pipeline::{create_depth_view, create_pipelines, encode_scene_pass, GpuGroup, Pipelines};
use crate::scene::Scene;
use crate::sensing::{start_sensing, SensingHandle};

// ======================== Application ========================

pub struct App {
    state: Option<AppState>,
    config: AppConfig,
    control: Arc<ControlContext>,
    runtime: tokio::runtime::Handle,
    sensing: Option<SensingHandle>,
}

struct AppState {
    // GPU
    device: wgpu::Device,
    queue: wgpu::Queue,
    surface: wgpu::Surface<'static>,
    surface_config: wgpu::SurfaceConfiguration,
    depth_view: wgpu::TextureView,

    // Scene
    scene: Scene,
    pipelines: Pipelines,
    gpu_groups: Vec<GpuGroup>,

    // Window
    window: Arc<Window>,

    // Camera & display
    camera: CameraRig,
    params: DisplayParams,

    // egui
    egui_ctx: egui::Context,
    egui_winit_state: egui_winit::State,
    egui_renderer: egui_wgpu::Renderer,

    // Timing
    last_redraw: Instant,
    fps: f32,
}

impl App {
    pub fn new(config: AppConfig, runtime: tokio::runtime::Handle) -> Self {
        let control = Arc::new(ControlContext::default());
        let sensing = start_sensing(&runtime, &config, Arc::clone(&control));
        Self {
            state: None,
            config,
            control,
            runtime,
            sensing,
        }
    }

    fn stop_sensing(&mut self) {
        if let Some(handle) = self.sensing.take() {
            let task = handle.stop();
            if let Err(e) = self.runtime.block_on(task) {
                log::warn!("Sensing task ended abnormally: {}", e);
            }
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &winit::event_loop::ActiveEventLoop) {
        if self.state.is_some() {
            return;
        }

        let window_attrs = WindowAttributes::default()
            .with_title("Luxtree")
            .with_inner_size(winit::dpi::LogicalSize::new(1280u32, 800u32));

        let window = Arc::new(
            event_loop
                .create_window(window_attrs)
                .expect("Failed to create window"),
        );

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let surface = instance
            .create_surface(window.clone())
            .expect("Failed to create surface");

        let (device, queue, surface_config) =
            pollster::block_on(init_gpu(&instance, &surface, &window));

        surface.configure(&device, &surface_config);

        let scene = Scene::new(&self.config.scene);
        let pipelines = create_pipelines(&device, surface_config.format);
        let gpu_groups = scene
            .groups
            .iter()
            .map(|g| GpuGroup::new(&device, &pipelines, g))
            .collect();
        let depth_view = create_depth_view(&device, surface_config.width, surface_config.height);

        let mut camera = CameraRig::default();
        camera.resize(surface_config.width, surface_config.height);

        // ---- Initialize egui ----
        let egui_ctx = egui::Context::default();
        let mut visuals = egui::Visuals::dark();
        visuals.window_fill = egui::Color32::from_rgba_premultiplied(10, 14, 10, 220);
        visuals.panel_fill = egui::Color32::from_rgba_premultiplied(10, 14, 10, 220);
        egui_ctx.set_visuals(visuals);

        let egui_winit_state = egui_winit::State::new(
            egui_ctx.clone(),
            egui::ViewportId::ROOT,
            event_loop,
            Some(window.scale_factor() as f32),
            None,
            None,
        );

        let egui_renderer = egui_wgpu::Renderer::new(
            &device,
            surface_config.format,
            None,
            1,
            false,
        );

        log::info!(
            "Luxtree initialized: {} entities in {} groups, vision {}",
            scene.entity_count(),
            scene.groups.len(),
            if self.sensing.is_some() { "on" } else { "off" }
        );

        self.state = Some(AppState {
            device,
            queue,
            surface,
            surface_config,
            depth_view,
            scene,
            pipelines,
            gpu_groups,
            window: window.clone(),
            camera,
            params: DisplayParams::default(),
            egui_ctx,
            egui_winit_state,
            egui_renderer,
            last_redraw: Instant::now(),
            fps: 0.0,
        });

        // Initial redraw, required on macOS with winit 0.30
        window.request_redraw();
    }

    fn about_to_wait(&mut self, _event_loop: &winit::event_loop::ActiveEventLoop) {
        if let Some(state) = &self.state {
            state.window.request_redraw();
        }
    }

    fn window_event(
        &mut self,
        event_loop: &winit::event_loop::ActiveEventLoop,
        _window_id: winit::window::WindowId,
        event: WindowEvent,
    ) {
        let Some(state) = &mut self.state else {
            return;
        };

        // Pass events to egui first
        let egui_response = state.egui_winit_state.on_window_event(&state.window, &event);

        match event {
            WindowEvent::CloseRequested => event_loop.exit(),

            WindowEvent::KeyboardInput { event, .. } => {
                handle_keyboard(state, &self.control, event_loop, &event, egui_response.consumed);
            }

            WindowEvent::Resized(new_size) => {
                if new_size.width > 0 && new_size.height > 0 {
                    state.surface_config.width = new_size.width;
                    state.surface_config.height = new_size.height;
                    state.surface.configure(&state.device, &state.surface_config);
                    state.depth_view =
                        create_depth_view(&state.device, new_size.width, new_size.height);
                    state.camera.resize(new_size.width, new_size.height);
                }
            }

            WindowEvent::RedrawRequested => {
                let info = FrameInfo {
                    fps: state.fps,
                    vision_enabled: self.sensing.is_some(),
                    phase: self.sensing.as_ref().map(SensingHandle::phase),
                };
                redraw(state, &self.control, &info);
            }

            _ => {}
        }
    }

    fn exiting(&mut self, _event_loop: &winit::event_loop::ActiveEventLoop) {
        self.stop_sensing();
        self.state = None;
        log::info!("Luxtree closed");
    }
}

// ======================== GPU Initialization ========================

async fn init_gpu(
    instance: &wgpu::Instance,
    surface: &wgpu::Surface<'_>,
    window: &Window,
) -> (wgpu::Device, wgpu::Queue, wgpu::SurfaceConfiguration) {
    let adapter = instance
        .request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: Some(surface),
            force_fallback_adapter: false,
        })
        .await
        .expect(
            "Failed to find a suitable GPU adapter.\n\
             Luxtree requires a GPU with Vulkan, Metal, DX12, or GL support.",
        );

    log::info!("GPU: {}", adapter.get_info().name);

    let (device, queue) = adapter
        .request_device(
            &wgpu::DeviceDescriptor {
                label: Some("luxtree_device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                memory_hints: Default::default(),
            },
            None,
        )
        .await
        .expect("Failed to create device");

    let size = window.inner_size();
    let surface_caps = surface.get_capabilities(&adapter);
    let surface_format = surface_caps
        .formats
        .iter()
        .find(|f| f.is_srgb())
        .copied()
        .unwrap_or(surface_caps.formats[0]);

    let present_mode = if surface_caps.present_modes.contains(&wgpu::PresentMode::Mailbox) {
        log::info!("Present mode: Mailbox");
        wgpu::PresentMode::Mailbox
    } else {
        log::info!("Present mode: Fifo (VSync ON)");
        wgpu::PresentMode::Fifo
    };

    let surface_config = wgpu::SurfaceConfiguration {
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        format: surface_format,
        width: size.width.max(1),
        height: size.height.max(1),
        present_mode,
        alpha_mode: surface_caps.alpha_modes[0],
        view_formats: vec![],
        desired_maximum_frame_latency: 2,
    };

    (device, queue, surface_config)
}

// ======================== Keyboard Handling ========================

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum KeyAction {
    Quit,
    TogglePanel,
    SetState(DiscreteState),
}

impl KeyAction {
    /// Global actions still fire while egui holds keyboard focus.
    fn is_global(self) -> bool {
        matches!(self, KeyAction::Quit | KeyAction::TogglePanel)
    }
}

fn key_action(key: &Key) -> Option<KeyAction> {
    match key {
        Key::Named(NamedKey::Escape) => Some(KeyAction::Quit),
        Key::Character(c) => match c.to_ascii_lowercase().as_str() {
            "h" => Some(KeyAction::TogglePanel),
            "f" => Some(KeyAction::SetState(DiscreteState::Formed)),
            "c" => Some(KeyAction::SetState(DiscreteState::Chaos)),
            _ => None,
        },
        _ => None,
    }
}

fn handle_keyboard(
    state: &mut AppState,
    control: &ControlContext,
    event_loop: &winit::event_loop::ActiveEventLoop,
    event: &winit::event::KeyEvent,
    egui_consumed: bool,
) {
    if !event.state.is_pressed() {
        return;
    }
    let Some(action) = key_action(&event.logical_key) else {
        return;
    };
    if egui_consumed && !action.is_global() {
        return;
    }

    match action {
        KeyAction::Quit => event_loop.exit(),
        KeyAction::TogglePanel => {
            state.params.show_panel = !state.params.show_panel;
            log::info!("Control panel: {}", if state.params.show_panel { "ON" } else { "OFF" });
        }
        KeyAction::SetState(target) => control.set_discrete_state(target),
    }
}

// ======================== Frame Rendering ========================

fn redraw(state: &mut AppState, control: &ControlContext, info: &FrameInfo) {
    let now = Instant::now();
    let dt = now.duration_since(state.last_redraw).as_secs_f32();
    state.last_redraw = now;
    state.fps = state.fps * 0.95 + (1.0 / dt.max(0.0001)) * 0.05;

    // ---- Render tick: one snapshot for every group ----
    let snapshot = control.snapshot();
    state.scene.tick(&snapshot, dt);
    state
        .camera
        .update(snapshot.position, state.scene.elapsed(), dt);

    state
        .pipelines
        .update_camera(&state.queue, &state.camera.uniforms(state.scene.elapsed()));
    for (gpu, group) in state.gpu_groups.iter_mut().zip(&state.scene.groups) {
        gpu.upload(&state.queue, group);
    }

    // ---- egui frame ----
    let raw_input = state.egui_winit_state.take_egui_input(&state.window);
    let full_output = state.egui_ctx.run(raw_input, |ctx| {
        control_ui::render_control_ui(ctx, &state.params, control, &state.scene, info);
    });
    state
        .egui_winit_state
        .handle_platform_output(&state.window, full_output.platform_output);

    // ---- Scene pass ----
    let output = match state.surface.get_current_texture() {
        Ok(t) => t,
        Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
            state.surface.configure(&state.device, &state.surface_config);
            return;
        }
        Err(e) => {
            log::error!("Surface error: {:?}", e);
            return;
        }
    };

    let view = output
        .texture
        .create_view(&wgpu::TextureViewDescriptor::default());

    let mut encoder = state
        .device
        .create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("scene_encoder"),
        });
    encode_scene_pass(
        &mut encoder,
        &view,
        &state.depth_view,
        &state.pipelines,
        &state.gpu_groups,
    );

    // ---- egui pass on top ----
    let paint_jobs = state
        .egui_ctx
        .tessellate(full_output.shapes, full_output.pixels_per_point);

    for (id, image_delta) in &full_output.textures_delta.set {
        state
            .egui_renderer
            .update_texture(&state.device, &state.queue, *id, image_delta);
    }

    let screen_descriptor = egui_wgpu::ScreenDescriptor {
        size_in_pixels: [state.surface_config.width, state.surface_config.height],
        pixels_per_point: full_output.pixels_per_point,
    };

    state.egui_renderer.update_buffers(
        &state.device,
        &state.queue,
        &mut encoder,
        &paint_jobs,
        &screen_descriptor,
    );

    render_egui_pass(
        &state.egui_renderer,
        &mut encoder,
        &view,
        &paint_jobs,
        &screen_descriptor,
    );

    state.queue.submit(std::iter::once(encoder.finish()));
    output.present();

    for id in &full_output.textures_delta.free {
        state.egui_renderer.free_texture(id);
    }
}

fn render_egui_pass(
    renderer: &egui_wgpu::Renderer,
    encoder: &mut wgpu::CommandEncoder,
    view: &wgpu::TextureView,
    paint_jobs: &[egui::ClippedPrimitive],
    screen_descriptor: &egui_wgpu::ScreenDescriptor,
) {
    let pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
        label: Some("egui_render_pass"),
        color_attachments: &[Some(wgpu::RenderPassColorAttachment {
            view,
            resolve_target: None,
            ops: wgpu::Operations {
                load: wgpu::LoadOp::Load,
                store: wgpu::StoreOp::Store,
            },
        })],
        depth_stencil_attachment: None,
        timestamp_writes: None,
        occlusion_query_set: None,
    });
    // egui_wgpu::Renderer::render needs a RenderPass<'static> in wgpu 24
    let mut pass = pass.forget_lifetime();
    renderer.render(&mut pass, paint_jobs, screen_descriptor);
}

//! Comet demo application: window, input routing, loader thread and the
//! main frame loop.
//!
//! CLI: the first argument may pick a test scene
//! (`RenderingStressTest` / `InstancingStressTest` / `OnpcReflectionTest`);
//! every remaining argument is a glTF path. `COMET_RENDERER=gl` selects the
//! legacy backend instead of Vulkan.

use std::path::Path;
use std::sync::{Arc, Condvar, Mutex};

use comet_engine::camera::CameraContainer;
use comet_engine::clock::Clock;
use comet_engine::error::EngineResult;
use comet_engine::events::{
    register_default_events, EngineState, EngineStateCell, Event, EventSystem, Key, WorldContext,
};
use comet_engine::limits::{
    CAMERA_INITIAL_POSITION, DEFAULT_MESH_NAME, INITIAL_WINDOW_HEIGHT, INITIAL_WINDOW_WIDTH,
};
use comet_engine::mesh::load_obj;
use comet_engine::renderer::{DrawContext, FrameContext, Renderer, WindowHandles};
use comet_engine::resource::{GeometryTables, MaterialTable, MeshTransform, TextureTable};
use comet_engine::scene::{
    create_scene_from_args, parse_scene_args, upload_texture_from_file, GameObjectManager,
    RenderContainer, SceneArgs, SpinBehavior,
};
use comet_engine::{engine_error, engine_fatal, engine_info, engine_warn};
use comet_engine_renderer_gl::GlRenderer;
use comet_engine_renderer_vulkan::VulkanRenderer;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use winit::application::ApplicationHandler;
use winit::event::{DeviceEvent, DeviceId, ElementState, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::{Window, WindowId};

/// Everything the loader thread fills in and the frame loop reads.
struct SceneData {
    tables: GeometryTables,
    materials: MaterialTable,
    textures: TextureTable,
    renders: RenderContainer,
    game_objects: GameObjectManager,
}

impl SceneData {
    fn new() -> Self {
        Self {
            tables: GeometryTables::new(),
            materials: MaterialTable::new(),
            textures: TextureTable::new(),
            renders: RenderContainer::new(),
            game_objects: GameObjectManager::new(),
        }
    }
}

type SharedRenderer = Arc<Mutex<Box<dyn Renderer>>>;

fn create_renderer() -> Box<dyn Renderer> {
    match std::env::var("COMET_RENDERER").as_deref() {
        Ok("gl") => Box::new(GlRenderer::new()),
        _ => Box::new(VulkanRenderer::new()),
    }
}

/// Scene ingestion, run on the loader thread while the main thread keeps
/// the waiting screen alive.
fn load_scene(
    args: &SceneArgs,
    scene: &Mutex<SceneData>,
    renderer: &SharedRenderer,
) -> EngineResult<()> {
    let mut scene = scene.lock().expect("scene lock");
    let scene = &mut *scene;

    {
        let mut renderer = renderer.lock().expect("renderer lock");
        if let Err(error) = upload_texture_from_file(
            Path::new("assets/textures/default.dds"),
            "dds_texture_default",
            &mut scene.textures,
            renderer.as_mut(),
        ) {
            engine_warn!("comet::demo", "default texture unavailable: {}", error);
        }
    }

    load_obj(
        &mut scene.tables,
        Path::new("assets/meshes/bunny.obj"),
        DEFAULT_MESH_NAME,
    )?;

    {
        let mut renderer = renderer.lock().expect("renderer lock");
        create_scene_from_args(
            args,
            &mut scene.tables,
            &mut scene.materials,
            &mut scene.textures,
            &mut scene.renders,
            renderer.as_mut(),
        )?;
    }

    // A handful of slowly spinning kittens exercises the dynamic-transform
    // path every frame
    if scene.tables.mesh_by_name("kitten").is_some() {
        for index in 0..4 {
            let transform = MeshTransform::new(
                glam::Vec3::new(index as f32 * 4.0, 20.0, -10.0),
                1.0,
                glam::Quat::IDENTITY,
            );
            scene.game_objects.add_object(
                &scene.tables,
                &mut scene.renders,
                "kitten",
                transform,
                Box::new(SpinBehavior { yaw_per_second: 0.6 }),
            )?;
        }
    }

    let mut renderer = renderer.lock().expect("renderer lock");
    let mut draw_context = DrawContext {
        geometry: &mut scene.tables,
        materials: &mut scene.materials,
        renders: &scene.renders,
    };
    renderer.setup_for_rendering(&mut draw_context)
}

struct DemoApp {
    args: SceneArgs,
    window: Option<Arc<Window>>,
    renderer: SharedRenderer,
    scene: Arc<Mutex<SceneData>>,
    state: Arc<EngineStateCell>,
    loading_done: Arc<(Mutex<bool>, Condvar)>,
    events: EventSystem,
    cameras: CameraContainer,
    clock: Clock,
    final_setup_done: bool,
    init_failed: bool,
}

impl DemoApp {
    fn new(args: SceneArgs) -> Self {
        let mut events = EventSystem::new();
        register_default_events(&mut events);
        Self {
            args,
            window: None,
            renderer: Arc::new(Mutex::new(create_renderer())),
            scene: Arc::new(Mutex::new(SceneData::new())),
            state: Arc::new(EngineStateCell::new(EngineState::Loading)),
            loading_done: Arc::new((Mutex::new(false), Condvar::new())),
            events,
            cameras: CameraContainer::new(INITIAL_WINDOW_WIDTH, INITIAL_WINDOW_HEIGHT),
            clock: Clock::new(),
            final_setup_done: false,
            init_failed: false,
        }
    }

    fn fire(&mut self, event: Event) {
        let mut ctx = WorldContext {
            cameras: &mut self.cameras,
            state: &self.state,
        };
        self.events.fire(&event, &mut ctx);
    }

    fn spawn_loader(&self) {
        let args = self.args.clone();
        let scene = Arc::clone(&self.scene);
        let renderer = Arc::clone(&self.renderer);
        let state = Arc::clone(&self.state);
        let loading_done = Arc::clone(&self.loading_done);

        std::thread::spawn(move || {
            let result = load_scene(&args, &scene, &renderer);
            match result {
                Ok(()) => {
                    state.transition(EngineState::Loading, EngineState::Running);
                }
                Err(error) => {
                    engine_fatal!("comet::demo", "scene load failed: {}", error);
                    state.set(EngineState::ShutdownAfterLoad);
                }
            }
            let (lock, condvar) = &*loading_done;
            *lock.lock().expect("loading flag") = true;
            condvar.notify_one();
        });
    }

    /// One iteration of the frame loop, driven from `about_to_wait`.
    fn tick(&mut self, event_loop: &ActiveEventLoop) {
        match self.state.get() {
            EngineState::Loading | EngineState::ShutdownAfterLoad => {
                self.clock.update();
                let mut renderer = self.renderer.lock().expect("renderer lock");
                if let Err(error) = renderer.draw_while_waiting(self.clock.delta_time() as f32)
                {
                    engine_error!("comet::demo", "waiting frame failed: {}", error);
                }
                drop(renderer);
                if self.state.get() == EngineState::ShutdownAfterLoad {
                    self.state.set(EngineState::Shutdown);
                }
            }
            EngineState::Running => {
                if !self.final_setup_done {
                    let mut renderer = self.renderer.lock().expect("renderer lock");
                    if let Err(error) = renderer.final_setup() {
                        engine_fatal!("comet::demo", "final setup failed: {}", error);
                        self.state.set(EngineState::Shutdown);
                        return;
                    }
                    self.final_setup_done = true;
                }

                self.clock.update();
                let delta_time = self.clock.delta_time() as f32;
                self.cameras.update(delta_time);

                let mut scene = self.scene.lock().expect("scene lock");
                let scene = &mut *scene;
                let mut renderer = self.renderer.lock().expect("renderer lock");

                scene.game_objects.update_dynamic_objects(
                    &mut scene.renders,
                    renderer.as_mut(),
                    delta_time,
                );

                let mut frame = FrameContext {
                    cameras: &mut self.cameras,
                    renders: &scene.renders,
                    delta_time,
                };
                let result = renderer
                    .update(&mut frame)
                    .and_then(|_| renderer.draw_frame(&mut frame));
                if let Err(error) = result {
                    match error {
                        comet_engine::EngineError::DeviceLost => {
                            engine_fatal!("comet::demo", "device lost");
                            self.state.set(EngineState::Shutdown);
                        }
                        other => {
                            engine_error!("comet::demo", "frame failed: {}", other);
                        }
                    }
                }
            }
            EngineState::Suspended => {
                // Nothing to do until a non-zero resize arrives
            }
            EngineState::Shutdown => {
                // Let the loader finish before tearing anything down
                let (lock, condvar) = &*self.loading_done;
                let mut done = lock.lock().expect("loading flag");
                while !*done {
                    done = condvar.wait(done).expect("loading wait");
                }
                self.renderer.lock().expect("renderer lock").wait_idle();
                event_loop.exit();
            }
        }
    }
}

fn map_key(code: KeyCode) -> Key {
    match code {
        KeyCode::Escape => Key::Escape,
        KeyCode::KeyW => Key::W,
        KeyCode::KeyA => Key::A,
        KeyCode::KeyS => Key::S,
        KeyCode::KeyD => Key::D,
        KeyCode::F1 => Key::F1,
        KeyCode::F2 => Key::F2,
        KeyCode::F3 => Key::F3,
        KeyCode::F4 => Key::F4,
        _ => Key::Other(0),
    }
}

impl ApplicationHandler for DemoApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        let attributes = Window::default_attributes()
            .with_title("Comet Engine")
            .with_inner_size(winit::dpi::PhysicalSize::new(
                INITIAL_WINDOW_WIDTH,
                INITIAL_WINDOW_HEIGHT,
            ));
        let window = match event_loop.create_window(attributes) {
            Ok(window) => Arc::new(window),
            Err(error) => {
                engine_fatal!("comet::demo", "window creation failed: {}", error);
                self.init_failed = true;
                event_loop.exit();
                return;
            }
        };

        let size = window.inner_size();
        let handles = match (window.display_handle(), window.window_handle()) {
            (Ok(display), Ok(handle)) => WindowHandles {
                display: display.as_raw(),
                window: handle.as_raw(),
                width: size.width,
                height: size.height,
            },
            _ => {
                engine_fatal!("comet::demo", "no native window handles");
                self.init_failed = true;
                event_loop.exit();
                return;
            }
        };

        {
            let mut renderer = self.renderer.lock().expect("renderer lock");
            if let Err(error) = renderer.init(&handles) {
                engine_fatal!("comet::demo", "renderer init failed: {}", error);
                self.init_failed = true;
                event_loop.exit();
                return;
            }
        }

        self.cameras.on_window_resize(size.width, size.height);
        let camera = self.cameras.main_camera_mut();
        camera.position = glam::Vec3::from_array(CAMERA_INITIAL_POSITION);
        camera.dirty = true;
        camera.update(0.0);

        self.window = Some(window);
        self.spawn_loader();
        engine_info!("comet::demo", "engine booted");
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        match event {
            WindowEvent::CloseRequested => {
                self.fire(Event::ShutdownRequested);
            }
            WindowEvent::Resized(size) => {
                self.fire(Event::WindowResize {
                    width: size.width,
                    height: size.height,
                });
                if size.width > 0 && size.height > 0 {
                    self.renderer
                        .lock()
                        .expect("renderer lock")
                        .resize(size.width, size.height);
                }
            }
            WindowEvent::KeyboardInput { event, .. } => {
                if let PhysicalKey::Code(code) = event.physical_key {
                    let key = map_key(code);
                    let engine_event = if event.state == ElementState::Pressed {
                        Event::KeyPressed(key)
                    } else {
                        Event::KeyReleased(key)
                    };
                    self.fire(engine_event);
                }
            }
            WindowEvent::RedrawRequested => {
                self.tick(event_loop);
                if let Some(window) = &self.window {
                    window.request_redraw();
                }
            }
            _ => {}
        }
    }

    fn device_event(
        &mut self,
        _event_loop: &ActiveEventLoop,
        _device_id: DeviceId,
        event: DeviceEvent,
    ) {
        if let DeviceEvent::MouseMotion { delta } = event {
            self.fire(Event::MouseMoved {
                dx: delta.0 as f32,
                dy: delta.1 as f32,
            });
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        // Shutdown must progress even when the window stops redrawing
        // (minimized / suspended)
        if self.state.get() == EngineState::Shutdown {
            self.tick(event_loop);
            return;
        }
        if let Some(window) = &self.window {
            window.request_redraw();
        }
    }
}

fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let scene_args = parse_scene_args(&args);

    let event_loop = match EventLoop::new() {
        Ok(event_loop) => event_loop,
        Err(error) => {
            engine_fatal!("comet::demo", "event loop creation failed: {}", error);
            std::process::exit(1);
        }
    };
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = DemoApp::new(scene_args);
    if let Err(error) = event_loop.run_app(&mut app) {
        engine_fatal!("comet::demo", "event loop error: {}", error);
        std::process::exit(1);
    }
    if app.init_failed {
        std::process::exit(1);
    }
    engine_info!("comet::demo", "clean shutdown");
}

use anyhow::{Context, Result};
use glutin::{
    config::ConfigTemplateBuilder,
    context::{ContextApi, ContextAttributesBuilder, GlProfile, PossiblyCurrentContext, Version},
    display::{GetGlDisplay, GlDisplay},
    prelude::*,
    surface::{Surface, SwapInterval, WindowSurface},
};
use glutin_winit::{DisplayBuilder, GlWindow};
use log::{error, info, LevelFilter};
use raw_window_handle::HasRawWindowHandle;
use simple_logger::SimpleLogger;
use std::{ffi::CString, num::NonZeroU32};
use winit::{
    dpi::LogicalSize,
    event::{ElementState, Event, WindowEvent},
    event_loop::{EventLoop, EventLoopBuilder},
    keyboard::{Key, NamedKey},
    window::{Window, WindowBuilder},
};

use glforge::{triangle_shaders, ShaderProgram, WindowConfig};

// One triangle in normalized device coordinates.
const TRIANGLE_VERTICES: [f32; 9] = [
    -0.5, -0.5, 0.0, //
    0.5, -0.5, 0.0, //
    0.0, 0.5, 0.0,
];

struct App {
    window: Window,
    gl_context: PossiblyCurrentContext,
    gl_surface: Surface<WindowSurface>,
    shader: ShaderProgram,
    vao: u32,
    vbo: u32,
}

impl App {
    fn new() -> Result<(Self, EventLoop<()>)> {
        SimpleLogger::new().with_level(LevelFilter::Info).init()?;
        info!("Initializing application...");

        let config = WindowConfig::load_or_default("glforge.toml");

        let event_loop = EventLoopBuilder::new().build()?;
        let window_builder = WindowBuilder::new()
            .with_title(&config.title)
            .with_inner_size(LogicalSize::new(config.width, config.height))
            .with_resizable(false);

        let template = ConfigTemplateBuilder::new().with_alpha_size(8);
        let display_builder = DisplayBuilder::new().with_window_builder(Some(window_builder));

        let (window, gl_config) = display_builder
            .build(&event_loop, template, |configs| {
                configs
                    .reduce(|accum, config| {
                        if config.num_samples() > accum.num_samples() {
                            config
                        } else {
                            accum
                        }
                    })
                    .expect("no GL configs available")
            })
            .map_err(|e| anyhow::anyhow!("failed to create window: {e}"))?;

        let window = window.context("display builder returned no window")?;
        let raw_window_handle = window.raw_window_handle();

        let context_attributes = ContextAttributesBuilder::new()
            .with_context_api(ContextApi::OpenGl(Some(Version::new(3, 3))))
            .with_profile(GlProfile::Core)
            .build(Some(raw_window_handle));

        let gl_display = gl_config.display();

        let gl_context = unsafe {
            gl_display
                .create_context(&gl_config, &context_attributes)
                .context("failed to create OpenGL context")?
        };

        let attrs = window.build_surface_attributes(<_>::default());
        let gl_surface = unsafe {
            gl_display
                .create_window_surface(&gl_config, &attrs)
                .context("failed to create GL surface")?
        };

        let gl_context = gl_context
            .make_current(&gl_surface)
            .context("failed to make context current")?;

        // Load OpenGL functions
        gl::load_with(|symbol| {
            let symbol = CString::new(symbol).unwrap();
            gl_display.get_proc_address(symbol.as_c_str()) as *const _
        });

        if config.vsync {
            if let Err(e) = gl_surface
                .set_swap_interval(&gl_context, SwapInterval::Wait(NonZeroU32::new(1).unwrap()))
            {
                log::warn!("Failed to enable vsync: {e}");
            }
        }

        let size = window.inner_size();
        unsafe {
            gl::Viewport(0, 0, size.width as i32, size.height as i32);
            gl::ClearColor(0.0, 0.0, 0.0, 1.0);
        }

        let shader = Self::build_shader()?;
        let (vao, vbo) = Self::set_up_triangle();

        Ok((
            Self {
                window,
                gl_context,
                gl_surface,
                shader,
                vao,
                vbo,
            },
            event_loop,
        ))
    }

    // A failed build leaves no usable program id, so log the compiler or
    // linker diagnostic and abort initialization.
    fn build_shader() -> Result<ShaderProgram> {
        let mut shader = ShaderProgram::new();
        shader.load_vertex_shader_from_string(triangle_shaders::VERTEX_SRC);
        shader.load_fragment_shader_from_string(triangle_shaders::FRAGMENT_SRC);
        if let Err(e) = shader.create() {
            error!("Could not create a shader program: {e}");
            anyhow::bail!("shader program build failed");
        }
        info!("Shader program ready (id {})", shader.id());
        Ok(shader)
    }

    fn set_up_triangle() -> (u32, u32) {
        let mut vao = 0;
        let mut vbo = 0;
        unsafe {
            gl::GenVertexArrays(1, &mut vao);
            gl::GenBuffers(1, &mut vbo);

            gl::BindVertexArray(vao);
            gl::BindBuffer(gl::ARRAY_BUFFER, vbo);
            gl::BufferData(
                gl::ARRAY_BUFFER,
                std::mem::size_of_val(&TRIANGLE_VERTICES) as isize,
                TRIANGLE_VERTICES.as_ptr() as *const _,
                gl::STATIC_DRAW,
            );

            // Position attribute, tightly packed vec3.
            gl::VertexAttribPointer(
                0,
                3,
                gl::FLOAT,
                gl::FALSE,
                3 * std::mem::size_of::<f32>() as i32,
                std::ptr::null(),
            );
            gl::EnableVertexAttribArray(0);

            gl::BindBuffer(gl::ARRAY_BUFFER, 0);
            gl::BindVertexArray(0);
        }
        (vao, vbo)
    }

    fn handle_window_event(&mut self, event: &WindowEvent) -> bool {
        match event {
            WindowEvent::CloseRequested => true,
            WindowEvent::KeyboardInput { event, .. } => {
                event.state == ElementState::Pressed
                    && event.logical_key == Key::Named(NamedKey::Escape)
            }
            WindowEvent::Resized(size) if size.width != 0 && size.height != 0 => {
                self.gl_surface.resize(
                    &self.gl_context,
                    NonZeroU32::new(size.width).unwrap(),
                    NonZeroU32::new(size.height).unwrap(),
                );
                unsafe {
                    gl::Viewport(0, 0, size.width as i32, size.height as i32);
                }
                false
            }
            _ => false,
        }
    }

    fn draw(&self) {
        unsafe {
            gl::Clear(gl::COLOR_BUFFER_BIT);
        }

        self.shader.set_used();
        unsafe {
            gl::BindVertexArray(self.vao);
            gl::DrawArrays(gl::TRIANGLES, 0, 3);
            gl::BindVertexArray(0);
        }

        if let Err(e) = self.gl_surface.swap_buffers(&self.gl_context) {
            error!("Failed to swap buffers: {e}");
        }
    }

    fn cleanup(&mut self) {
        unsafe {
            gl::DeleteVertexArrays(1, &self.vao);
            gl::DeleteBuffers(1, &self.vbo);
        }
    }
}

fn main() -> Result<()> {
    let (mut app, event_loop) = App::new()?;

    event_loop.run(move |event, elwt| match event {
        Event::WindowEvent { event, .. } => match event {
            WindowEvent::RedrawRequested => app.draw(),
            event => {
                if app.handle_window_event(&event) {
                    app.cleanup();
                    elwt.exit();
                }
            }
        },
        Event::AboutToWait => {
            app.window.request_redraw();
        }
        _ => (),
    })?;

    Ok(())
}

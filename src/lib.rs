pub mod config;
pub mod render;

// Re-export commonly used types
pub use config::WindowConfig;
pub use render::backend::{GlBackend, RawHandle, ShaderBackend, ShaderStage};
pub use render::shader::{triangle_shaders, ShaderError, ShaderProgram};

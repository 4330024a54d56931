pub mod backend;
pub mod shader;

pub use backend::{GlBackend, RawHandle, ShaderBackend, ShaderStage};
pub use shader::{ShaderError, ShaderProgram};

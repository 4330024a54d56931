use gl::types::*;
use std::ffi::CString;
use std::ptr;

use super::shader::ShaderError;

/// Raw shader/program object name as handed out by the graphics context.
/// Zero is the "no object" sentinel, matching the underlying API.
pub type RawHandle = u32;

/// Info logs longer than this are truncated before being surfaced.
pub const MAX_INFO_LOG_LEN: usize = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl ShaderStage {
    fn gl_kind(self) -> GLenum {
        match self {
            ShaderStage::Vertex => gl::VERTEX_SHADER,
            ShaderStage::Fragment => gl::FRAGMENT_SHADER,
        }
    }
}

impl std::fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShaderStage::Vertex => write!(f, "vertex"),
            ShaderStage::Fragment => write!(f, "fragment"),
        }
    }
}

/// The two capabilities the shader pipeline needs from the graphics context,
/// plus object cleanup and activation. All calls block and must run on the
/// thread that owns the context; implementations are not assumed Send or Sync.
pub trait ShaderBackend {
    /// Compiles one stage's source. Returns a non-zero stage handle, or a
    /// `Compilation` error carrying the compiler's log.
    fn compile(&self, source: &str, stage: ShaderStage) -> Result<RawHandle, ShaderError>;

    /// Links two compiled stages into a program. Returns a non-zero program
    /// handle, or a `Linking` error carrying the linker's log. Does not
    /// release the stage objects; the caller owns that step.
    fn link(&self, vertex: RawHandle, fragment: RawHandle) -> Result<RawHandle, ShaderError>;

    fn delete_shader(&self, handle: RawHandle);

    fn delete_program(&self, handle: RawHandle);

    /// Makes `handle` the current program in the context.
    fn use_program(&self, handle: RawHandle);
}

/// Production backend over the `gl` crate. Requires `gl::load_with` to have
/// run against a current context before any call.
#[derive(Debug, Default, Clone, Copy)]
pub struct GlBackend;

impl ShaderBackend for GlBackend {
    fn compile(&self, source: &str, stage: ShaderStage) -> Result<RawHandle, ShaderError> {
        let c_src = CString::new(source.as_bytes())?;
        let shader = unsafe { gl::CreateShader(stage.gl_kind()) };

        unsafe {
            gl::ShaderSource(shader, 1, &c_src.as_ptr(), ptr::null());
            gl::CompileShader(shader);
        }

        let mut success = 1;
        unsafe {
            gl::GetShaderiv(shader, gl::COMPILE_STATUS, &mut success);
        }

        if success == 0 {
            let mut len = 0;
            unsafe {
                gl::GetShaderiv(shader, gl::INFO_LOG_LENGTH, &mut len);
            }
            let log = whitespace_cstring(len as usize);
            unsafe {
                gl::GetShaderInfoLog(shader, len, ptr::null_mut(), log.as_ptr() as *mut GLchar);
                gl::DeleteShader(shader);
            }
            return Err(ShaderError::Compilation(truncate_log(
                log.to_string_lossy().into_owned(),
            )));
        }

        Ok(shader)
    }

    fn link(&self, vertex: RawHandle, fragment: RawHandle) -> Result<RawHandle, ShaderError> {
        let program = unsafe { gl::CreateProgram() };
        unsafe {
            gl::AttachShader(program, vertex);
            gl::AttachShader(program, fragment);
            gl::LinkProgram(program);
        }

        let mut success = 1;
        unsafe {
            gl::GetProgramiv(program, gl::LINK_STATUS, &mut success);
        }

        if success == 0 {
            let mut len = 0;
            unsafe {
                gl::GetProgramiv(program, gl::INFO_LOG_LENGTH, &mut len);
            }
            let log = whitespace_cstring(len as usize);
            unsafe {
                gl::GetProgramInfoLog(program, len, ptr::null_mut(), log.as_ptr() as *mut GLchar);
                gl::DeleteProgram(program);
            }
            return Err(ShaderError::Linking(truncate_log(
                log.to_string_lossy().into_owned(),
            )));
        }

        Ok(program)
    }

    fn delete_shader(&self, handle: RawHandle) {
        unsafe { gl::DeleteShader(handle) };
    }

    fn delete_program(&self, handle: RawHandle) {
        unsafe { gl::DeleteProgram(handle) };
    }

    fn use_program(&self, handle: RawHandle) {
        unsafe { gl::UseProgram(handle) };
    }
}

/// Trims an info log to `MAX_INFO_LOG_LEN` characters. Logs must stay
/// non-empty on failure, so a silent driver still yields a readable message.
pub(crate) fn truncate_log(log: String) -> String {
    let log = log.trim_end_matches(['\0', ' ']).to_string();
    let capped: String = log.chars().take(MAX_INFO_LOG_LEN).collect();
    if capped.is_empty() {
        "no info log provided by the driver".to_string()
    } else {
        capped
    }
}

fn whitespace_cstring(len: usize) -> CString {
    let mut buffer: Vec<u8> = Vec::with_capacity(len + 1);
    buffer.extend([b' '].iter().cycle().take(len));
    unsafe { CString::from_vec_unchecked(buffer) }
}

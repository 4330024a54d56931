//! Shader-program build pipeline: load sources, compile each stage, link,
//! cache the resulting program object.
//!
//! One `ShaderProgram` instance corresponds to one pair of shader sources.
//! A build that fails poisons the instance; callers start over with a fresh
//! instance rather than retrying with edited sources.

use std::ffi::NulError;
use std::fs;
use std::path::Path;

use thiserror::Error;

use super::backend::{GlBackend, RawHandle, ShaderBackend, ShaderStage};

#[derive(Debug, Error)]
pub enum ShaderError {
    #[error("shader compilation failed: {0}")]
    Compilation(String),
    #[error("program linking failed: {0}")]
    Linking(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("null byte in shader source: {0}")]
    Nul(#[from] NulError),
    #[error("no {0} shader source loaded")]
    MissingSource(ShaderStage),
    #[error("a previous build failed; create a new program for new sources")]
    AlreadyFailed,
}

/// Owns a pair of shader sources and drives them through compile and link.
///
/// Build state machine: sources loaded -> vertex compiled -> fragment
/// compiled -> linked. `create` short-circuits at the first failing step and
/// the failure is terminal for the instance. A successful build is cached so
/// repeated `create` calls are no-ops.
pub struct ShaderProgram<B: ShaderBackend = GlBackend> {
    backend: B,
    vertex_src: String,
    fragment_src: String,
    // Stage objects live only for the duration of a build; both are
    // released once linking has run, whatever its outcome.
    vertex_shader: RawHandle,
    fragment_shader: RawHandle,
    program_id: RawHandle,
    built: bool,
    failed: bool,
    info_log: String,
}

impl ShaderProgram {
    /// Program backed by the live OpenGL context.
    pub fn new() -> Self {
        Self::with_backend(GlBackend)
    }
}

impl Default for ShaderProgram {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: ShaderBackend> ShaderProgram<B> {
    pub fn with_backend(backend: B) -> Self {
        Self {
            backend,
            vertex_src: String::new(),
            fragment_src: String::new(),
            vertex_shader: 0,
            fragment_shader: 0,
            program_id: 0,
            built: false,
            failed: false,
            info_log: String::new(),
        }
    }

    /// Assigns the vertex stage source verbatim, replacing any prior source.
    pub fn load_vertex_shader_from_string(&mut self, source: &str) {
        self.vertex_src = source.to_string();
    }

    /// Assigns the fragment stage source verbatim, replacing any prior source.
    pub fn load_fragment_shader_from_string(&mut self, source: &str) {
        self.fragment_src = source.to_string();
    }

    /// Reads the whole file into the vertex stage source, no preprocessing.
    /// On a read error the previously loaded source is left untouched.
    pub fn load_vertex_shader_from_file<P: AsRef<Path>>(
        &mut self,
        path: P,
    ) -> Result<(), ShaderError> {
        self.vertex_src = fs::read_to_string(path)?;
        Ok(())
    }

    /// Reads the whole file into the fragment stage source, no preprocessing.
    /// On a read error the previously loaded source is left untouched.
    pub fn load_fragment_shader_from_file<P: AsRef<Path>>(
        &mut self,
        path: P,
    ) -> Result<(), ShaderError> {
        self.fragment_src = fs::read_to_string(path)?;
        Ok(())
    }

    /// Builds the program: compile vertex, compile fragment, link. Stops at
    /// the first failing step and surfaces that step's diagnostic.
    ///
    /// Once a build has succeeded this returns `Ok` immediately without
    /// recompiling; the cached program id stays valid. Once a build has
    /// failed the instance is unusable and this returns `AlreadyFailed`.
    pub fn create(&mut self) -> Result<(), ShaderError> {
        if self.built {
            return Ok(());
        }
        if self.failed {
            return Err(ShaderError::AlreadyFailed);
        }
        if self.vertex_src.is_empty() {
            return Err(ShaderError::MissingSource(ShaderStage::Vertex));
        }
        if self.fragment_src.is_empty() {
            return Err(ShaderError::MissingSource(ShaderStage::Fragment));
        }

        match self.build_stages() {
            Ok(()) => {
                self.built = true;
                Ok(())
            }
            Err(err) => {
                self.failed = true;
                self.info_log = err.to_string();
                Err(err)
            }
        }
    }

    fn build_stages(&mut self) -> Result<(), ShaderError> {
        self.vertex_shader = self.backend.compile(&self.vertex_src, ShaderStage::Vertex)?;

        match self.backend.compile(&self.fragment_src, ShaderStage::Fragment) {
            Ok(handle) => self.fragment_shader = handle,
            Err(err) => {
                // The vertex stage object must not outlive the failed build.
                self.backend.delete_shader(self.vertex_shader);
                self.vertex_shader = 0;
                return Err(err);
            }
        }

        self.link_program()
    }

    /// Links the two compiled stages. The stage objects are released exactly
    /// once here, whether or not linking succeeds.
    fn link_program(&mut self) -> Result<(), ShaderError> {
        let result = self.backend.link(self.vertex_shader, self.fragment_shader);

        self.backend.delete_shader(self.vertex_shader);
        self.backend.delete_shader(self.fragment_shader);
        self.vertex_shader = 0;
        self.fragment_shader = 0;

        self.program_id = result?;
        Ok(())
    }

    /// The linked program object name; zero until a build succeeds.
    pub fn id(&self) -> RawHandle {
        self.program_id
    }

    pub fn is_built(&self) -> bool {
        self.built
    }

    /// Diagnostic from the last failed build step, empty if none failed.
    pub fn info_log(&self) -> &str {
        &self.info_log
    }

    /// Makes this program current in the graphics context.
    pub fn set_used(&self) {
        self.backend.use_program(self.program_id);
    }
}

impl<B: ShaderBackend> Drop for ShaderProgram<B> {
    fn drop(&mut self) {
        if self.vertex_shader != 0 {
            self.backend.delete_shader(self.vertex_shader);
        }
        if self.fragment_shader != 0 {
            self.backend.delete_shader(self.fragment_shader);
        }
        if self.program_id != 0 {
            self.backend.delete_program(self.program_id);
        }
    }
}

/// Minimal pass-through shader pair: position straight to clip space,
/// constant orange output.
pub mod triangle_shaders {
    pub const VERTEX_SRC: &str = "#version 330 core\n\
        layout (location = 0) in vec3 position;\n\
        \n\
        void main() {\n\
        gl_Position = vec4(position.x, position.y, position.z, 1.0f);\n\
        }\n";

    pub const FRAGMENT_SRC: &str = "#version 330 core\n\
        out vec4 color;\n\
        void main() {\n\
        color = vec4(1.0f, 0.5f, 0.2f, 1.0f);\n\
        }\n";
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::backend::truncate_log;
    use std::cell::RefCell;
    use std::collections::HashSet;
    use std::io::Write;
    use std::rc::Rc;

    const BAD_TOKEN: &str = "asdasdjqw;rjdekl";

    #[derive(Default)]
    struct FakeState {
        next_handle: RawHandle,
        live_shaders: HashSet<RawHandle>,
        live_programs: HashSet<RawHandle>,
        compile_calls: usize,
        link_calls: usize,
        fail_link: bool,
        active_program: RawHandle,
        sources_seen: Vec<String>,
    }

    /// In-memory stand-in for the GL context: hands out sequential handles,
    /// tracks which objects are alive, and rejects sources containing
    /// `BAD_TOKEN` the way a driver rejects a syntax error.
    #[derive(Clone, Default)]
    struct FakeGl {
        state: Rc<RefCell<FakeState>>,
    }

    impl FakeGl {
        fn failing_link() -> Self {
            let fake = Self::default();
            fake.state.borrow_mut().fail_link = true;
            fake
        }

        fn live_shaders(&self) -> usize {
            self.state.borrow().live_shaders.len()
        }

        fn live_programs(&self) -> usize {
            self.state.borrow().live_programs.len()
        }

        fn compile_calls(&self) -> usize {
            self.state.borrow().compile_calls
        }
    }

    impl ShaderBackend for FakeGl {
        fn compile(&self, source: &str, _stage: ShaderStage) -> Result<RawHandle, ShaderError> {
            let mut state = self.state.borrow_mut();
            state.compile_calls += 1;
            state.sources_seen.push(source.to_string());
            if source.contains(BAD_TOKEN) {
                return Err(ShaderError::Compilation(truncate_log(
                    "0:6(1): error: syntax error, unexpected IDENTIFIER".to_string(),
                )));
            }
            state.next_handle += 1;
            let handle = state.next_handle;
            state.live_shaders.insert(handle);
            Ok(handle)
        }

        fn link(&self, vertex: RawHandle, fragment: RawHandle) -> Result<RawHandle, ShaderError> {
            let mut state = self.state.borrow_mut();
            state.link_calls += 1;
            assert!(
                state.live_shaders.contains(&vertex) && state.live_shaders.contains(&fragment),
                "link called with a released or unknown stage handle"
            );
            if state.fail_link {
                return Err(ShaderError::Linking(truncate_log(
                    "error: vertex and fragment interface mismatch".to_string(),
                )));
            }
            state.next_handle += 1;
            let handle = state.next_handle;
            state.live_programs.insert(handle);
            Ok(handle)
        }

        fn delete_shader(&self, handle: RawHandle) {
            assert!(
                self.state.borrow_mut().live_shaders.remove(&handle),
                "double release of shader handle {handle}"
            );
        }

        fn delete_program(&self, handle: RawHandle) {
            assert!(
                self.state.borrow_mut().live_programs.remove(&handle),
                "double release of program handle {handle}"
            );
        }

        fn use_program(&self, handle: RawHandle) {
            self.state.borrow_mut().active_program = handle;
        }
    }

    fn loaded_program(fake: &FakeGl) -> ShaderProgram<FakeGl> {
        let mut program = ShaderProgram::with_backend(fake.clone());
        program.load_vertex_shader_from_string(triangle_shaders::VERTEX_SRC);
        program.load_fragment_shader_from_string(triangle_shaders::FRAGMENT_SRC);
        program
    }

    #[test]
    fn create_from_valid_sources() {
        let fake = FakeGl::default();
        let mut program = loaded_program(&fake);
        assert!(program.create().is_ok());
        assert!(program.is_built());
        assert!(program.id() > 0);
    }

    #[test]
    fn create_from_invalid_vertex_source() {
        let fake = FakeGl::default();
        let mut program = ShaderProgram::with_backend(fake.clone());
        program.load_vertex_shader_from_string(
            &format!("{}{}", triangle_shaders::VERTEX_SRC, BAD_TOKEN),
        );
        program.load_fragment_shader_from_string(triangle_shaders::FRAGMENT_SRC);

        let err = program.create().unwrap_err();
        assert!(matches!(err, ShaderError::Compilation(_)));
        assert!(!err.to_string().is_empty());
        assert_eq!(program.id(), 0);
        assert!(!program.is_built());
        // Short-circuit: the fragment stage is never attempted.
        assert_eq!(fake.compile_calls(), 1);
    }

    #[test]
    fn fragment_failure_releases_vertex_stage() {
        let fake = FakeGl::default();
        let mut program = ShaderProgram::with_backend(fake.clone());
        program.load_vertex_shader_from_string(triangle_shaders::VERTEX_SRC);
        program.load_fragment_shader_from_string(
            &format!("{}{}", triangle_shaders::FRAGMENT_SRC, BAD_TOKEN),
        );

        assert!(program.create().is_err());
        assert_eq!(fake.live_shaders(), 0);
        assert_eq!(program.id(), 0);
    }

    #[test]
    fn link_releases_stages_on_success() {
        let fake = FakeGl::default();
        let mut program = loaded_program(&fake);
        assert!(program.create().is_ok());
        assert_eq!(fake.live_shaders(), 0);
        assert_eq!(fake.live_programs(), 1);
    }

    #[test]
    fn link_releases_stages_on_failure() {
        let fake = FakeGl::failing_link();
        let mut program = loaded_program(&fake);

        let err = program.create().unwrap_err();
        assert!(matches!(err, ShaderError::Linking(_)));
        assert!(!err.to_string().is_empty());
        assert_eq!(fake.live_shaders(), 0);
        assert_eq!(fake.live_programs(), 0);
        assert!(!program.is_built());
        assert_eq!(program.id(), 0);
    }

    #[test]
    fn create_is_idempotent_once_built() {
        let fake = FakeGl::default();
        let mut program = loaded_program(&fake);
        assert!(program.create().is_ok());
        let first_id = program.id();
        let compiles = fake.compile_calls();

        assert!(program.create().is_ok());
        assert_eq!(program.id(), first_id);
        assert_eq!(fake.compile_calls(), compiles);
    }

    #[test]
    fn create_after_failure_is_rejected() {
        let fake = FakeGl::failing_link();
        let mut program = loaded_program(&fake);
        assert!(program.create().is_err());

        let err = program.create().unwrap_err();
        assert!(matches!(err, ShaderError::AlreadyFailed));
        assert!(!program.info_log().is_empty());
    }

    #[test]
    fn create_without_sources_is_rejected() {
        let fake = FakeGl::default();
        let mut program: ShaderProgram<FakeGl> = ShaderProgram::with_backend(fake.clone());
        assert!(matches!(
            program.create(),
            Err(ShaderError::MissingSource(ShaderStage::Vertex))
        ));

        program.load_vertex_shader_from_string(triangle_shaders::VERTEX_SRC);
        assert!(matches!(
            program.create(),
            Err(ShaderError::MissingSource(ShaderStage::Fragment))
        ));
        assert_eq!(fake.compile_calls(), 0);
    }

    #[test]
    fn string_load_reaches_compiler_verbatim() {
        let fake = FakeGl::default();
        let source = "#version 330 core\nvoid main() { gl_Position = vec4(0.0); }\n";
        let mut program = ShaderProgram::with_backend(fake.clone());
        program.load_vertex_shader_from_string(source);
        program.load_fragment_shader_from_string(triangle_shaders::FRAGMENT_SRC);
        assert!(program.create().is_ok());
        assert_eq!(fake.state.borrow().sources_seen[0], source);
    }

    #[test]
    fn file_load_reads_whole_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(triangle_shaders::FRAGMENT_SRC.as_bytes())
            .unwrap();

        let fake = FakeGl::default();
        let mut program = ShaderProgram::with_backend(fake.clone());
        program.load_vertex_shader_from_string(triangle_shaders::VERTEX_SRC);
        program.load_fragment_shader_from_file(file.path()).unwrap();
        assert!(program.create().is_ok());
        assert_eq!(
            fake.state.borrow().sources_seen[1],
            triangle_shaders::FRAGMENT_SRC
        );
    }

    #[test]
    fn file_load_failure_keeps_previous_source() {
        let fake = FakeGl::default();
        let mut program = ShaderProgram::with_backend(fake.clone());
        program.load_vertex_shader_from_string(triangle_shaders::VERTEX_SRC);
        program.load_fragment_shader_from_string(triangle_shaders::FRAGMENT_SRC);

        let err = program
            .load_fragment_shader_from_file("/no/such/shader.frag")
            .unwrap_err();
        assert!(matches!(err, ShaderError::Io(_)));

        // The earlier string load still backs the build.
        assert!(program.create().is_ok());
        assert_eq!(
            fake.state.borrow().sources_seen[1],
            triangle_shaders::FRAGMENT_SRC
        );
    }

    #[test]
    fn set_used_activates_program() {
        let fake = FakeGl::default();
        let mut program = loaded_program(&fake);
        assert!(program.create().is_ok());
        program.set_used();
        assert_eq!(fake.state.borrow().active_program, program.id());
    }

    #[test]
    fn drop_releases_program_handle() {
        let fake = FakeGl::default();
        {
            let mut program = loaded_program(&fake);
            assert!(program.create().is_ok());
            assert_eq!(fake.live_programs(), 1);
        }
        assert_eq!(fake.live_programs(), 0);
        assert_eq!(fake.live_shaders(), 0);
    }
}

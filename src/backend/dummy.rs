//! Dummy device for testing and development.
//!
//! This backend doesn't talk to a GPU. It simulates the parts of a GL
//! context that geometry and shader resources depend on: object handles,
//! buffer storage, bindings, enabled attribute arrays, a minimal GLSL
//! front end and program introspection. Every state-changing call is
//! recorded as a [`DeviceCall`] so tests can assert on upload and draw
//! traffic.

use std::cell::RefCell;
use std::collections::{BTreeSet, HashMap, HashSet};

use crate::error::GraphicsError;
use crate::types::{
    gl, ActiveVariable, AttribPointer, BufferId, BufferTarget, BufferUsage, OwnedUniformValue,
    PrimitiveType, ProgramId, ShaderObjectId, ShaderStage, UniformValue, VertexArrayId,
};

use super::GlDevice;

/// A recorded device call.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceCall {
    RestoreContext,
    CreateBuffer(BufferId),
    DeleteBuffer(BufferId),
    BindBuffer {
        target: BufferTarget,
        buffer: BufferId,
    },
    BufferData {
        target: BufferTarget,
        buffer: BufferId,
        len: usize,
        usage: BufferUsage,
    },
    BufferStorage {
        target: BufferTarget,
        buffer: BufferId,
        size: usize,
    },
    BufferSubData {
        target: BufferTarget,
        buffer: BufferId,
        offset: usize,
        len: usize,
    },
    CreateVertexArray(VertexArrayId),
    DeleteVertexArray(VertexArrayId),
    BindVertexArray(VertexArrayId),
    EnableVertexAttribArray(u32),
    DisableVertexAttribArray(u32),
    VertexAttribPointer {
        location: u32,
        pointer: AttribPointer,
        client: bool,
    },
    VertexAttrib {
        location: u32,
        value: [f32; 4],
    },
    CreateShader {
        shader: ShaderObjectId,
        stage: ShaderStage,
    },
    CompileShader(ShaderObjectId),
    DeleteShader(ShaderObjectId),
    CreateProgram(ProgramId),
    LinkProgram(ProgramId),
    DeleteProgram(ProgramId),
    UseProgram(ProgramId),
    Uniform {
        program: ProgramId,
        location: i32,
        value: OwnedUniformValue,
    },
    DrawArrays {
        primitive: PrimitiveType,
        first: i32,
        count: i32,
    },
    DrawElements {
        primitive: PrimitiveType,
        count: i32,
        offset: usize,
        client: bool,
    },
}

impl DeviceCall {
    /// Whether this call transfers vertex or index data to the device.
    pub fn is_upload(&self) -> bool {
        matches!(
            self,
            Self::BufferData { .. } | Self::BufferSubData { .. }
        )
    }

    /// Whether this call is a draw.
    pub fn is_draw(&self) -> bool {
        matches!(self, Self::DrawArrays { .. } | Self::DrawElements { .. })
    }
}

#[derive(Debug)]
struct ShaderObject {
    stage: ShaderStage,
    source: String,
    compiled: bool,
    info_log: String,
}

#[derive(Debug, Default)]
struct ProgramObject {
    shaders: Vec<u32>,
    linked: bool,
    info_log: String,
    attributes: Vec<ActiveVariable>,
    uniforms: Vec<ActiveVariable>,
    uniform_values: HashMap<i32, OwnedUniformValue>,
}

#[derive(Debug, Default)]
struct DummyState {
    next_handle: u32,
    buffers: HashMap<u32, Vec<u8>>,
    vertex_arrays: HashSet<u32>,
    shaders: HashMap<u32, ShaderObject>,
    programs: HashMap<u32, ProgramObject>,
    array_buffer: BufferId,
    element_buffer: BufferId,
    vertex_array: VertexArrayId,
    current_program: ProgramId,
    enabled_attributes: BTreeSet<u32>,
    calls: Vec<DeviceCall>,
    errors: Vec<String>,
    context_generation: u32,
    context_lost: bool,
    fail_allocations: bool,
}

impl DummyState {
    fn allocate(&mut self, what: &str) -> Result<u32, GraphicsError> {
        if self.context_lost {
            return Err(GraphicsError::ResourceCreationFailed(format!(
                "cannot create {what} while the context is lost"
            )));
        }
        if self.fail_allocations {
            return Err(GraphicsError::ResourceCreationFailed(format!(
                "dummy device refused to create {what}"
            )));
        }
        self.next_handle += 1;
        Ok(self.next_handle)
    }

    fn bound(&self, target: BufferTarget) -> BufferId {
        match target {
            BufferTarget::Array => self.array_buffer,
            BufferTarget::ElementArray => self.element_buffer,
        }
    }

    fn error(&mut self, message: String) {
        log::error!("DummyDevice: {}", message);
        self.errors.push(message);
    }
}

/// Dummy GL device.
#[derive(Debug, Default)]
pub struct DummyDevice {
    state: RefCell<DummyState>,
}

impl DummyDevice {
    /// Create a new dummy device.
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate context loss: every object and binding disappears.
    ///
    /// Object creation fails until [`GlDevice::restore_context`] is called.
    /// Handle numbering continues, so handles created afterwards never
    /// collide with the stale ones.
    pub fn lose_context(&self) {
        let mut state = self.state.borrow_mut();
        log::warn!(
            "DummyDevice: context lost ({} buffers, {} programs dropped)",
            state.buffers.len(),
            state.programs.len()
        );
        state.buffers.clear();
        state.vertex_arrays.clear();
        state.shaders.clear();
        state.programs.clear();
        state.array_buffer = BufferId::NONE;
        state.element_buffer = BufferId::NONE;
        state.vertex_array = VertexArrayId::NONE;
        state.current_program = ProgramId::NONE;
        state.enabled_attributes.clear();
        state.context_generation += 1;
        state.context_lost = true;
    }

    /// Whether the context is lost and not yet restored.
    pub fn is_context_lost(&self) -> bool {
        self.state.borrow().context_lost
    }

    /// Number of times the context has been lost.
    pub fn context_generation(&self) -> u32 {
        self.state.borrow().context_generation
    }

    /// Make every subsequent `create_*` call fail.
    pub fn set_fail_allocations(&self, fail: bool) {
        self.state.borrow_mut().fail_allocations = fail;
    }

    /// All recorded calls, oldest first.
    pub fn calls(&self) -> Vec<DeviceCall> {
        self.state.borrow().calls.clone()
    }

    /// Forget the recorded calls.
    pub fn clear_calls(&self) {
        self.state.borrow_mut().calls.clear();
    }

    /// Count recorded calls matching a predicate.
    pub fn count_calls(&self, predicate: impl Fn(&DeviceCall) -> bool) -> usize {
        self.state.borrow().calls.iter().filter(|c| predicate(c)).count()
    }

    /// Number of recorded uploads (full or partial).
    pub fn upload_count(&self) -> usize {
        self.count_calls(DeviceCall::is_upload)
    }

    /// Recorded draw calls.
    pub fn draw_calls(&self) -> Vec<DeviceCall> {
        self.state
            .borrow()
            .calls
            .iter()
            .filter(|c| c.is_draw())
            .cloned()
            .collect()
    }

    /// GL errors raised so far.
    pub fn errors(&self) -> Vec<String> {
        self.state.borrow().errors.clone()
    }

    /// Contents of a buffer object.
    pub fn buffer_contents(&self, buffer: BufferId) -> Option<Vec<u8>> {
        self.state.borrow().buffers.get(&buffer.0).cloned()
    }

    /// Contents of a buffer object read as floats.
    pub fn buffer_f32(&self, buffer: BufferId) -> Option<Vec<f32>> {
        self.buffer_contents(buffer)
            .map(|bytes| bytemuck::pod_collect_to_vec(&bytes))
    }

    /// Contents of a buffer object read as 32-bit indices.
    pub fn buffer_u32(&self, buffer: BufferId) -> Option<Vec<u32>> {
        self.buffer_contents(buffer)
            .map(|bytes| bytemuck::pod_collect_to_vec(&bytes))
    }

    /// Whether a buffer object exists.
    pub fn is_buffer(&self, buffer: BufferId) -> bool {
        self.state.borrow().buffers.contains_key(&buffer.0)
    }

    /// Whether a vertex array object exists.
    pub fn is_vertex_array(&self, vao: VertexArrayId) -> bool {
        self.state.borrow().vertex_arrays.contains(&vao.0)
    }

    /// Whether a program object exists.
    pub fn is_program(&self, program: ProgramId) -> bool {
        self.state.borrow().programs.contains_key(&program.0)
    }

    /// Number of live buffer objects.
    pub fn live_buffers(&self) -> usize {
        self.state.borrow().buffers.len()
    }

    /// Number of live shader stage objects.
    pub fn live_shaders(&self) -> usize {
        self.state.borrow().shaders.len()
    }

    /// Number of live program objects.
    pub fn live_programs(&self) -> usize {
        self.state.borrow().programs.len()
    }

    /// Buffer currently bound to a target.
    pub fn bound_buffer(&self, target: BufferTarget) -> BufferId {
        self.state.borrow().bound(target)
    }

    /// Currently bound vertex array.
    pub fn bound_vertex_array(&self) -> VertexArrayId {
        self.state.borrow().vertex_array
    }

    /// Currently used program.
    pub fn current_program(&self) -> ProgramId {
        self.state.borrow().current_program
    }

    /// Enabled attribute array locations, ascending.
    pub fn enabled_attributes(&self) -> Vec<u32> {
        self.state.borrow().enabled_attributes.iter().copied().collect()
    }

    /// Last value written to a uniform location of a program.
    pub fn uniform_value(&self, program: ProgramId, location: i32) -> Option<OwnedUniformValue> {
        self.state
            .borrow()
            .programs
            .get(&program.0)
            .and_then(|p| p.uniform_values.get(&location).cloned())
    }

    /// Source last given to a shader stage object.
    pub fn shader_source_of(&self, shader: ShaderObjectId) -> Option<String> {
        self.state
            .borrow()
            .shaders
            .get(&shader.0)
            .map(|s| s.source.clone())
    }

    fn record(&self, call: DeviceCall) {
        log::trace!("DummyDevice: {:?}", call);
        self.state.borrow_mut().calls.push(call);
    }
}

impl GlDevice for DummyDevice {
    fn name(&self) -> &'static str {
        "Dummy"
    }

    fn restore_context(&self) -> Result<(), GraphicsError> {
        log::info!("DummyDevice: context restored");
        self.state.borrow_mut().context_lost = false;
        self.record(DeviceCall::RestoreContext);
        Ok(())
    }

    fn create_buffer(&self) -> Result<BufferId, GraphicsError> {
        let id = {
            let mut state = self.state.borrow_mut();
            let id = BufferId(state.allocate("buffer")?);
            state.buffers.insert(id.0, Vec::new());
            id
        };
        self.record(DeviceCall::CreateBuffer(id));
        Ok(id)
    }

    fn delete_buffer(&self, buffer: BufferId) {
        {
            let mut state = self.state.borrow_mut();
            state.buffers.remove(&buffer.0);
            if state.array_buffer == buffer {
                state.array_buffer = BufferId::NONE;
            }
            if state.element_buffer == buffer {
                state.element_buffer = BufferId::NONE;
            }
        }
        self.record(DeviceCall::DeleteBuffer(buffer));
    }

    fn bind_buffer(&self, target: BufferTarget, buffer: BufferId) {
        {
            let mut state = self.state.borrow_mut();
            if buffer.is_valid() && !state.buffers.contains_key(&buffer.0) {
                state.error(format!(
                    "GL_INVALID_OPERATION: bind of unknown buffer {}",
                    buffer.0
                ));
            }
            match target {
                BufferTarget::Array => state.array_buffer = buffer,
                BufferTarget::ElementArray => state.element_buffer = buffer,
            }
        }
        self.record(DeviceCall::BindBuffer { target, buffer });
    }

    fn buffer_data(&self, target: BufferTarget, data: &[u8], usage: BufferUsage) {
        let buffer = {
            let mut state = self.state.borrow_mut();
            let buffer = state.bound(target);
            match state.buffers.get_mut(&buffer.0) {
                Some(storage) => {
                    storage.clear();
                    storage.extend_from_slice(data);
                }
                None => state.error(format!(
                    "GL_INVALID_OPERATION: buffer_data with no buffer bound to {target:?}"
                )),
            }
            buffer
        };
        self.record(DeviceCall::BufferData {
            target,
            buffer,
            len: data.len(),
            usage,
        });
    }

    fn buffer_storage(&self, target: BufferTarget, size: usize, _usage: BufferUsage) {
        let buffer = {
            let mut state = self.state.borrow_mut();
            let buffer = state.bound(target);
            match state.buffers.get_mut(&buffer.0) {
                Some(storage) => *storage = vec![0; size],
                None => state.error(format!(
                    "GL_INVALID_OPERATION: buffer_storage with no buffer bound to {target:?}"
                )),
            }
            buffer
        };
        self.record(DeviceCall::BufferStorage {
            target,
            buffer,
            size,
        });
    }

    fn buffer_sub_data(&self, target: BufferTarget, offset: usize, data: &[u8]) {
        let buffer = {
            let mut state = self.state.borrow_mut();
            let buffer = state.bound(target);
            let result = match state.buffers.get_mut(&buffer.0) {
                Some(storage) if offset + data.len() <= storage.len() => {
                    storage[offset..offset + data.len()].copy_from_slice(data);
                    Ok(())
                }
                Some(storage) => Err(format!(
                    "GL_INVALID_VALUE: sub data {}..{} outside buffer of {} bytes",
                    offset,
                    offset + data.len(),
                    storage.len()
                )),
                None => Err(format!(
                    "GL_INVALID_OPERATION: buffer_sub_data with no buffer bound to {target:?}"
                )),
            };
            if let Err(message) = result {
                state.error(message);
            }
            buffer
        };
        self.record(DeviceCall::BufferSubData {
            target,
            buffer,
            offset,
            len: data.len(),
        });
    }

    fn create_vertex_array(&self) -> Result<VertexArrayId, GraphicsError> {
        let id = {
            let mut state = self.state.borrow_mut();
            let id = VertexArrayId(state.allocate("vertex array")?);
            state.vertex_arrays.insert(id.0);
            id
        };
        self.record(DeviceCall::CreateVertexArray(id));
        Ok(id)
    }

    fn delete_vertex_array(&self, vao: VertexArrayId) {
        {
            let mut state = self.state.borrow_mut();
            state.vertex_arrays.remove(&vao.0);
            if state.vertex_array == vao {
                state.vertex_array = VertexArrayId::NONE;
            }
        }
        self.record(DeviceCall::DeleteVertexArray(vao));
    }

    fn bind_vertex_array(&self, vao: VertexArrayId) {
        {
            let mut state = self.state.borrow_mut();
            if vao.is_valid() && !state.vertex_arrays.contains(&vao.0) {
                state.error(format!(
                    "GL_INVALID_OPERATION: bind of unknown vertex array {}",
                    vao.0
                ));
            }
            state.vertex_array = vao;
        }
        self.record(DeviceCall::BindVertexArray(vao));
    }

    fn enable_vertex_attrib_array(&self, location: u32) {
        self.state.borrow_mut().enabled_attributes.insert(location);
        self.record(DeviceCall::EnableVertexAttribArray(location));
    }

    fn disable_vertex_attrib_array(&self, location: u32) {
        self.state.borrow_mut().enabled_attributes.remove(&location);
        self.record(DeviceCall::DisableVertexAttribArray(location));
    }

    fn vertex_attrib_pointer(
        &self,
        location: u32,
        pointer: &AttribPointer,
        client_data: Option<&[u8]>,
    ) {
        {
            let mut state = self.state.borrow_mut();
            if client_data.is_none() && !state.array_buffer.is_valid() {
                state.error(format!(
                    "GL_INVALID_OPERATION: attribute {location} pointer with no array buffer bound"
                ));
            }
        }
        self.record(DeviceCall::VertexAttribPointer {
            location,
            pointer: *pointer,
            client: client_data.is_some(),
        });
    }

    fn vertex_attrib(&self, location: u32, value: [f32; 4]) {
        self.record(DeviceCall::VertexAttrib { location, value });
    }

    fn create_shader(&self, stage: ShaderStage) -> Result<ShaderObjectId, GraphicsError> {
        let id = {
            let mut state = self.state.borrow_mut();
            let id = ShaderObjectId(state.allocate("shader")?);
            state.shaders.insert(
                id.0,
                ShaderObject {
                    stage,
                    source: String::new(),
                    compiled: false,
                    info_log: String::new(),
                },
            );
            id
        };
        self.record(DeviceCall::CreateShader { shader: id, stage });
        Ok(id)
    }

    fn shader_source(&self, shader: ShaderObjectId, source: &str) {
        let mut state = self.state.borrow_mut();
        match state.shaders.get_mut(&shader.0) {
            Some(object) => object.source = source.to_string(),
            None => state.error(format!(
                "GL_INVALID_VALUE: source for unknown shader {}",
                shader.0
            )),
        }
    }

    fn compile_shader(&self, shader: ShaderObjectId) {
        {
            let mut state = self.state.borrow_mut();
            match state.shaders.get_mut(&shader.0) {
                Some(object) => match glsl::validate(&object.source, object.stage) {
                    Ok(()) => {
                        object.compiled = true;
                        object.info_log.clear();
                    }
                    Err(log) => {
                        object.compiled = false;
                        object.info_log = log;
                    }
                },
                None => state.error(format!(
                    "GL_INVALID_VALUE: compile of unknown shader {}",
                    shader.0
                )),
            }
        }
        self.record(DeviceCall::CompileShader(shader));
    }

    fn shader_compile_status(&self, shader: ShaderObjectId) -> bool {
        self.state
            .borrow()
            .shaders
            .get(&shader.0)
            .is_some_and(|s| s.compiled)
    }

    fn shader_info_log(&self, shader: ShaderObjectId) -> String {
        self.state
            .borrow()
            .shaders
            .get(&shader.0)
            .map(|s| s.info_log.clone())
            .unwrap_or_default()
    }

    fn delete_shader(&self, shader: ShaderObjectId) {
        self.state.borrow_mut().shaders.remove(&shader.0);
        self.record(DeviceCall::DeleteShader(shader));
    }

    fn create_program(&self) -> Result<ProgramId, GraphicsError> {
        let id = {
            let mut state = self.state.borrow_mut();
            let id = ProgramId(state.allocate("program")?);
            state.programs.insert(id.0, ProgramObject::default());
            id
        };
        self.record(DeviceCall::CreateProgram(id));
        Ok(id)
    }

    fn attach_shader(&self, program: ProgramId, shader: ShaderObjectId) {
        let mut state = self.state.borrow_mut();
        match state.programs.get_mut(&program.0) {
            Some(object) => object.shaders.push(shader.0),
            None => state.error(format!(
                "GL_INVALID_VALUE: attach to unknown program {}",
                program.0
            )),
        }
    }

    fn link_program(&self, program: ProgramId) {
        {
            let mut guard = self.state.borrow_mut();
            let state = &mut *guard;
            match state.programs.get_mut(&program.0) {
                Some(object) => {
                    let mut vertex = None;
                    let mut fragment = None;
                    for handle in &object.shaders {
                        if let Some(shader) = state.shaders.get(handle) {
                            if !shader.compiled {
                                continue;
                            }
                            match shader.stage {
                                ShaderStage::Vertex => vertex = Some(shader.source.as_str()),
                                ShaderStage::Fragment => fragment = Some(shader.source.as_str()),
                            }
                        }
                    }
                    match (vertex, fragment) {
                        (Some(vs), Some(fs)) => match glsl::link(vs, fs) {
                            Ok((attributes, uniforms)) => {
                                object.linked = true;
                                object.info_log.clear();
                                object.attributes = attributes;
                                object.uniforms = uniforms;
                            }
                            Err(log) => {
                                object.linked = false;
                                object.info_log = log;
                            }
                        },
                        _ => {
                            object.linked = false;
                            object.info_log =
                                "error: program needs a compiled vertex and fragment shader"
                                    .to_string();
                        }
                    }
                }
                None => state.error(format!(
                    "GL_INVALID_VALUE: link of unknown program {}",
                    program.0
                )),
            }
        }
        self.record(DeviceCall::LinkProgram(program));
    }

    fn program_link_status(&self, program: ProgramId) -> bool {
        self.state
            .borrow()
            .programs
            .get(&program.0)
            .is_some_and(|p| p.linked)
    }

    fn program_info_log(&self, program: ProgramId) -> String {
        self.state
            .borrow()
            .programs
            .get(&program.0)
            .map(|p| p.info_log.clone())
            .unwrap_or_default()
    }

    fn delete_program(&self, program: ProgramId) {
        {
            let mut state = self.state.borrow_mut();
            state.programs.remove(&program.0);
            if state.current_program == program {
                state.current_program = ProgramId::NONE;
            }
        }
        self.record(DeviceCall::DeleteProgram(program));
    }

    fn use_program(&self, program: ProgramId) {
        {
            let mut state = self.state.borrow_mut();
            let usable = state.programs.get(&program.0).is_some_and(|p| p.linked);
            if program.is_valid() && !usable {
                state.error(format!(
                    "GL_INVALID_OPERATION: use of unlinked program {}",
                    program.0
                ));
            }
            state.current_program = program;
        }
        self.record(DeviceCall::UseProgram(program));
    }

    fn active_attributes(&self, program: ProgramId) -> Vec<ActiveVariable> {
        self.state
            .borrow()
            .programs
            .get(&program.0)
            .map(|p| p.attributes.clone())
            .unwrap_or_default()
    }

    fn active_uniforms(&self, program: ProgramId) -> Vec<ActiveVariable> {
        self.state
            .borrow()
            .programs
            .get(&program.0)
            .map(|p| p.uniforms.clone())
            .unwrap_or_default()
    }

    fn attrib_location(&self, program: ProgramId, name: &str) -> i32 {
        self.state
            .borrow()
            .programs
            .get(&program.0)
            .and_then(|p| p.attributes.iter().find(|a| a.name == name))
            .map_or(-1, |a| a.location)
    }

    fn uniform_location(&self, program: ProgramId, name: &str) -> i32 {
        let state = self.state.borrow();
        let Some(object) = state.programs.get(&program.0) else {
            return -1;
        };
        let (base, element) = glsl::split_array_name(name);
        object
            .uniforms
            .iter()
            .find(|u| u.name == base && element < u.size)
            .map_or(-1, |u| u.location + element)
    }

    fn uniform(&self, location: i32, value: UniformValue<'_>) {
        if location < 0 {
            return;
        }
        let program = {
            let mut state = self.state.borrow_mut();
            let program = state.current_program;
            match state.programs.get_mut(&program.0) {
                Some(object) => {
                    object
                        .uniform_values
                        .insert(location, value.to_owned_value());
                }
                None => state.error(format!(
                    "GL_INVALID_OPERATION: uniform {location} written with no program in use"
                )),
            }
            program
        };
        self.record(DeviceCall::Uniform {
            program,
            location,
            value: value.to_owned_value(),
        });
    }

    fn draw_arrays(&self, primitive: PrimitiveType, first: i32, count: i32) {
        self.record(DeviceCall::DrawArrays {
            primitive,
            first,
            count,
        });
    }

    fn draw_elements(
        &self,
        primitive: PrimitiveType,
        count: i32,
        offset: usize,
        client_indices: Option<&[u8]>,
    ) {
        {
            let mut state = self.state.borrow_mut();
            let needed = offset + count.max(0) as usize * 4;
            let available = match client_indices {
                Some(indices) => Some(indices.len()),
                None => {
                    let buffer = state.element_buffer;
                    state.buffers.get(&buffer.0).map(Vec::len)
                }
            };
            match available {
                Some(len) if needed <= len => {}
                Some(len) => state.error(format!(
                    "GL_INVALID_OPERATION: draw reads {needed} index bytes from {len}"
                )),
                None => state.error(
                    "GL_INVALID_OPERATION: indexed draw with no element buffer bound".to_string(),
                ),
            }
        }
        self.record(DeviceCall::DrawElements {
            primitive,
            count,
            offset,
            client: client_indices.is_some(),
        });
    }
}

/// Minimal GLSL front end: enough to reject malformed sources and to
/// report declared attributes and uniforms.
/// Shader front end.
///
/// Sources declaring `#version 440`, `450` or `460` are parsed, validated and
/// reflected through naga; those need explicit input locations and put
/// non-opaque uniforms in blocks. Older dialects (GLSL ES 1.00 `attribute`
/// and `varying`, desktop 1xx-3xx) go through a declaration scanner that
/// catches only what every driver would.
mod glsl {
    use super::*;

    const NAGA_VERSIONS: [u32; 3] = [440, 450, 460];

    fn version(source: &str) -> Option<u32> {
        source
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())?
            .strip_prefix("#version")?
            .split_whitespace()
            .next()?
            .parse()
            .ok()
    }

    fn uses_naga(source: &str) -> bool {
        version(source).is_some_and(|v| NAGA_VERSIONS.contains(&v))
    }

    fn parse_module(source: &str, stage: ShaderStage) -> Result<naga::Module, String> {
        let options = naga::front::glsl::Options {
            stage: match stage {
                ShaderStage::Vertex => naga::ShaderStage::Vertex,
                ShaderStage::Fragment => naga::ShaderStage::Fragment,
            },
            defines: naga::FastHashMap::default(),
        };
        let mut frontend = naga::front::glsl::Frontend::default();
        let module = frontend
            .parse(&options, source)
            .map_err(|errors| format!("ERROR: {errors}\n"))?;

        let mut validator = naga::valid::Validator::new(
            naga::valid::ValidationFlags::all(),
            naga::valid::Capabilities::all(),
        );
        validator
            .validate(&module)
            .map_err(|e| format!("ERROR: validation: {e}\n"))?;
        Ok(module)
    }

    /// Check a source for compile errors.
    pub(super) fn validate(source: &str, stage: ShaderStage) -> Result<(), String> {
        if uses_naga(source) {
            return parse_module(source, stage).map(|_| ());
        }
        let mut braces = 0i32;
        let mut parens = 0i32;
        for (index, line) in source.lines().enumerate() {
            let line_number = index + 1;
            let trimmed = line.trim();
            if let Some(message) = trimmed.strip_prefix("#error") {
                return Err(format!(
                    "ERROR: 0:{line_number}: '#error' : {}\n",
                    message.trim()
                ));
            }
            let code = strip_comment(line);
            for c in code.chars() {
                match c {
                    '{' => braces += 1,
                    '}' => braces -= 1,
                    '(' => parens += 1,
                    ')' => parens -= 1,
                    _ => {}
                }
                if braces < 0 || parens < 0 {
                    return Err(format!(
                        "ERROR: 0:{line_number}: '{c}' : syntax error, unexpected '{c}'\n"
                    ));
                }
            }
        }
        let last_line = source.lines().count().max(1);
        if braces != 0 || parens != 0 {
            return Err(format!(
                "ERROR: 0:{last_line}: '' : syntax error, unexpected end of file\n"
            ));
        }
        if !has_main(source) {
            return Err("ERROR: 0:1: 'main' : function not defined\n".to_string());
        }
        Ok(())
    }

    /// Link a vertex and fragment source, returning (attributes, uniforms).
    pub(super) fn link(
        vertex: &str,
        fragment: &str,
    ) -> Result<(Vec<ActiveVariable>, Vec<ActiveVariable>), String> {
        let vertex_decls = interface(vertex, ShaderStage::Vertex)?;
        let fragment_decls = interface(fragment, ShaderStage::Fragment)?;

        let mut attributes: Vec<ActiveVariable> = Vec::new();
        let mut pending = Vec::new();
        let mut used = BTreeSet::new();
        for decl in vertex_decls.iter().filter(|d| d.kind == DeclKind::Input) {
            match decl.explicit_location {
                Some(location) => {
                    used.insert(location);
                    attributes.push(decl.to_variable(location));
                }
                None => pending.push(decl),
            }
        }
        let mut next = 0;
        for decl in pending {
            while used.contains(&next) {
                next += 1;
            }
            used.insert(next);
            attributes.push(decl.to_variable(next));
        }

        let mut uniforms: Vec<ActiveVariable> = Vec::new();
        let mut next_uniform = 0;
        for decl in vertex_decls
            .iter()
            .chain(fragment_decls.iter())
            .filter(|d| d.kind == DeclKind::Uniform)
        {
            if let Some(existing) = uniforms.iter().find(|u| u.name == decl.name) {
                if existing.gl_type != decl.gl_type || existing.size != decl.size {
                    return Err(format!(
                        "error: uniform '{}' declared with conflicting types\n",
                        decl.name
                    ));
                }
                continue;
            }
            uniforms.push(decl.to_variable(next_uniform));
            next_uniform += decl.size;
        }

        Ok((attributes, uniforms))
    }

    /// Split `name[3]` into (`name`, 3); plain names map to element 0.
    pub(super) fn split_array_name(name: &str) -> (&str, i32) {
        if let Some(open) = name.find('[') {
            if let Some(index) = name[open + 1..]
                .strip_suffix(']')
                .and_then(|i| i.trim().parse().ok())
            {
                return (&name[..open], index);
            }
        }
        (name, 0)
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum DeclKind {
        Input,
        Uniform,
    }

    #[derive(Debug)]
    struct Declaration {
        kind: DeclKind,
        name: String,
        gl_type: u32,
        size: i32,
        explicit_location: Option<i32>,
    }

    impl Declaration {
        fn to_variable(&self, location: i32) -> ActiveVariable {
            ActiveVariable {
                name: self.name.clone(),
                location,
                gl_type: self.gl_type,
                size: self.size,
            }
        }
    }

    fn interface(source: &str, stage: ShaderStage) -> Result<Vec<Declaration>, String> {
        if uses_naga(source) {
            Ok(reflect(&parse_module(source, stage)?))
        } else {
            Ok(declarations(source))
        }
    }

    /// Entry point inputs and uniforms of a parsed module. Uniform block
    /// members are reported by member name.
    fn reflect(module: &naga::Module) -> Vec<Declaration> {
        let mut result = Vec::new();
        for entry in module.entry_points.iter().filter(|e| e.name == "main") {
            for argument in &entry.function.arguments {
                let (Some(name), Some(naga::Binding::Location { location, .. })) =
                    (&argument.name, &argument.binding)
                else {
                    continue;
                };
                if let Some((gl_type, size)) = naga_type(module, argument.ty) {
                    result.push(Declaration {
                        kind: DeclKind::Input,
                        name: name.clone(),
                        gl_type,
                        size,
                        explicit_location: Some(*location as i32),
                    });
                }
            }
        }

        let mut uniform = |name: &Option<String>, ty: naga::Handle<naga::Type>| {
            if let (Some(name), Some((gl_type, size))) = (name, naga_type(module, ty)) {
                result.push(Declaration {
                    kind: DeclKind::Uniform,
                    name: name.clone(),
                    gl_type,
                    size,
                    explicit_location: None,
                });
            }
        };
        for (_, variable) in module.global_variables.iter() {
            match variable.space {
                naga::AddressSpace::Uniform => {
                    if let naga::TypeInner::Struct { members, .. } = &module.types[variable.ty].inner
                    {
                        for member in members {
                            uniform(&member.name, member.ty);
                        }
                    }
                }
                naga::AddressSpace::Handle => uniform(&variable.name, variable.ty),
                _ => {}
            }
        }
        result
    }

    /// GL type enum and array length of a naga type.
    fn naga_type(module: &naga::Module, ty: naga::Handle<naga::Type>) -> Option<(u32, i32)> {
        use naga::{ScalarKind, TypeInner, VectorSize};

        let gl_type = match &module.types[ty].inner {
            TypeInner::Array {
                base,
                size: naga::ArraySize::Constant(count),
                ..
            } => {
                let (gl_type, _) = naga_type(module, *base)?;
                return Some((gl_type, count.get() as i32));
            }
            TypeInner::Scalar(scalar) => match scalar.kind {
                ScalarKind::Float => gl::FLOAT,
                ScalarKind::Sint => gl::INT,
                ScalarKind::Bool => gl::BOOL,
                _ => return None,
            },
            TypeInner::Vector { size, scalar } => {
                let by_size = match scalar.kind {
                    ScalarKind::Float => [gl::FLOAT_VEC2, gl::FLOAT_VEC3, gl::FLOAT_VEC4],
                    ScalarKind::Sint => [gl::INT_VEC2, gl::INT_VEC3, gl::INT_VEC4],
                    ScalarKind::Bool => [gl::BOOL_VEC2, gl::BOOL_VEC3, gl::BOOL_VEC4],
                    _ => return None,
                };
                by_size[*size as usize - 2]
            }
            TypeInner::Matrix { columns, rows, .. } if columns == rows => match columns {
                VectorSize::Bi => gl::FLOAT_MAT2,
                VectorSize::Tri => gl::FLOAT_MAT3,
                VectorSize::Quad => gl::FLOAT_MAT4,
            },
            TypeInner::Image { dim, .. } => match dim {
                naga::ImageDimension::D2 => gl::SAMPLER_2D,
                naga::ImageDimension::Cube => gl::SAMPLER_CUBE,
                _ => return None,
            },
            _ => return None,
        };
        Some((gl_type, 1))
    }

    fn strip_comment(line: &str) -> &str {
        line.find("//").map_or(line, |i| &line[..i])
    }

    fn has_main(source: &str) -> bool {
        source.match_indices("main").any(|(index, _)| {
            let before_ok = source[..index]
                .chars()
                .next_back()
                .map_or(true, |c| !(c.is_alphanumeric() || c == '_'));
            before_ok && source[index + 4..].trim_start().starts_with('(')
        })
    }

    fn type_enum(name: &str) -> Option<u32> {
        Some(match name {
            "float" => gl::FLOAT,
            "vec2" => gl::FLOAT_VEC2,
            "vec3" => gl::FLOAT_VEC3,
            "vec4" => gl::FLOAT_VEC4,
            "int" => gl::INT,
            "ivec2" => gl::INT_VEC2,
            "ivec3" => gl::INT_VEC3,
            "ivec4" => gl::INT_VEC4,
            "bool" => gl::BOOL,
            "bvec2" => gl::BOOL_VEC2,
            "bvec3" => gl::BOOL_VEC3,
            "bvec4" => gl::BOOL_VEC4,
            "mat2" => gl::FLOAT_MAT2,
            "mat3" => gl::FLOAT_MAT3,
            "mat4" => gl::FLOAT_MAT4,
            "sampler2D" => gl::SAMPLER_2D,
            "samplerCube" => gl::SAMPLER_CUBE,
            _ => return None,
        })
    }

    /// Parse top-level `attribute`/`in`/`uniform` declarations.
    fn declarations(source: &str) -> Vec<Declaration> {
        let code: String = source
            .lines()
            .filter(|line| !line.trim_start().starts_with('#'))
            .map(strip_comment)
            .collect::<Vec<_>>()
            .join("\n");

        let mut result = Vec::new();
        for statement in code.split(';') {
            // Only the text after the last block boundary can be a declaration.
            let statement = statement
                .rfind(['{', '}'])
                .map_or(statement, |i| &statement[i + 1..])
                .trim();

            let (explicit_location, rest) = parse_layout(statement);
            let mut tokens = rest.split_whitespace().peekable();
            let kind = match tokens.next() {
                Some("attribute") | Some("in") => DeclKind::Input,
                Some("uniform") => DeclKind::Uniform,
                _ => continue,
            };
            while matches!(tokens.peek(), Some(&("lowp" | "mediump" | "highp" | "flat"))) {
                tokens.next();
            }
            let Some(gl_type) = tokens.next().and_then(type_enum) else {
                continue;
            };
            let names: String = tokens.collect::<Vec<_>>().join(" ");
            for (i, raw) in names.split(',').enumerate() {
                let raw = raw.trim();
                if raw.is_empty() {
                    continue;
                }
                let (name, size) = match raw.find('[') {
                    Some(open) => {
                        let size = raw[open + 1..]
                            .trim_end_matches(']')
                            .trim()
                            .parse()
                            .unwrap_or(1);
                        (raw[..open].trim(), size)
                    }
                    None => (raw, 1),
                };
                result.push(Declaration {
                    kind,
                    name: name.to_string(),
                    gl_type,
                    size,
                    explicit_location: explicit_location.map(|l| l + i as i32),
                });
            }
        }
        result
    }

    /// Strip a leading `layout(...)` qualifier, returning its location.
    fn parse_layout(statement: &str) -> (Option<i32>, &str) {
        let Some(rest) = statement.strip_prefix("layout") else {
            return (None, statement);
        };
        let rest = rest.trim_start();
        let (Some(inner), Some(close)) = (rest.strip_prefix('('), rest.find(')')) else {
            return (None, statement);
        };
        let qualifiers = &inner[..close - 1];
        let location = qualifiers.split(',').find_map(|q| {
            let (key, value) = q.split_once('=')?;
            (key.trim() == "location")
                .then(|| value.trim().parse().ok())
                .flatten()
        });
        (location, rest[close + 1..].trim_start())
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_validate() {
            let fragment = |source| validate(source, ShaderStage::Fragment);
            assert!(fragment("void main() { gl_FragColor = vec4(1.0); }").is_ok());
            assert!(fragment("void main() { ").is_err());
            assert!(fragment("void helper() {}").is_err());
            let err = fragment("#error broken\nvoid main() {}").unwrap_err();
            assert!(err.contains("broken"));
        }

        #[test]
        fn test_declarations() {
            let source = r#"
#version 330 core
layout(location = 3) in vec3 a_position;
in vec2 a_texCoord0; // uv
uniform highp mat4 u_projTrans;
uniform vec4 u_colors[4], u_tint;
void main() {
    gl_Position = u_projTrans * vec4(a_position, 1.0);
}
"#;
            let decls = declarations(source);
            assert_eq!(decls.len(), 5);
            assert_eq!(decls[0].explicit_location, Some(3));
            assert_eq!(decls[1].name, "a_texCoord0");
            assert_eq!(decls[2].gl_type, gl::FLOAT_MAT4);
            assert_eq!(decls[3].size, 4);
            assert_eq!(decls[4].name, "u_tint");
        }

        #[test]
        fn test_link_assigns_locations() {
            let vs = "layout(location = 0) in vec3 a_position;\nattribute vec4 a_color;\nuniform mat4 u_mvp;\nvoid main() {}";
            let fs = "uniform mat4 u_mvp;\nuniform float u_alpha;\nvoid main() {}";
            let (attributes, uniforms) = link(vs, fs).unwrap();
            assert_eq!(attributes[0].location, 0);
            assert_eq!(attributes[1].name, "a_color");
            assert_eq!(attributes[1].location, 1);
            assert_eq!(uniforms.len(), 2);
            assert_eq!(uniforms[1].location, 1);

            let bad_fs = "uniform vec3 u_mvp;\nvoid main() {}";
            assert!(link(vs, bad_fs).is_err());
        }

        const VS_450: &str = "#version 450
layout(location = 0) in vec3 a_position;
layout(location = 2) in vec2 a_texCoord0;
layout(location = 0) out vec2 v_uv;
layout(set = 0, binding = 0) uniform Globals {
    mat4 u_projTrans;
    vec4 u_tint;
};
void main() {
    v_uv = a_texCoord0;
    gl_Position = u_projTrans * vec4(a_position, 1.0);
}
";

        const FS_450: &str = "#version 450
layout(location = 0) in vec2 v_uv;
layout(location = 0) out vec4 o_color;
layout(set = 0, binding = 0) uniform Globals {
    mat4 u_projTrans;
    vec4 u_tint;
};
void main() {
    o_color = u_tint * vec4(v_uv, 0.0, 1.0);
}
";

        #[test]
        fn test_version_selects_front_end() {
            assert_eq!(version("\n#version 450\nvoid main() {}"), Some(450));
            assert_eq!(version("#version 330 core\n"), Some(330));
            assert_eq!(version("attribute vec3 a_position;"), None);
            assert!(uses_naga(VS_450));
            assert!(!uses_naga("#version 100\nvoid main() {}"));
        }

        #[test]
        fn test_naga_rejects_semantic_errors() {
            assert!(validate(VS_450, ShaderStage::Vertex).is_ok());
            assert!(validate(FS_450, ShaderStage::Fragment).is_ok());

            // Balanced and with a main, but referencing an unknown name.
            let unknown = "#version 450\nlayout(location = 0) out vec4 o_color;\nvoid main() {\n    o_color = missing_value;\n}\n";
            let err = validate(unknown, ShaderStage::Fragment).unwrap_err();
            assert!(err.starts_with("ERROR"), "{err}");
        }

        #[test]
        fn test_naga_reflection() {
            let (attributes, uniforms) = link(VS_450, FS_450).unwrap();
            assert_eq!(attributes.len(), 2);
            assert_eq!(attributes[0].name, "a_position");
            assert_eq!(attributes[0].location, 0);
            assert_eq!(attributes[0].gl_type, gl::FLOAT_VEC3);
            assert_eq!(attributes[1].name, "a_texCoord0");
            assert_eq!(attributes[1].location, 2);

            let names: Vec<_> = uniforms.iter().map(|u| u.name.as_str()).collect();
            assert_eq!(names, ["u_projTrans", "u_tint"]);
            assert_eq!(uniforms[0].gl_type, gl::FLOAT_MAT4);
            assert_eq!(uniforms[1].location, 1);
        }

        #[test]
        fn test_split_array_name() {
            assert_eq!(split_array_name("u_bones[2]"), ("u_bones", 2));
            assert_eq!(split_array_name("u_bones"), ("u_bones", 0));
        }
    }
}

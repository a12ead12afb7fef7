//! OpenGL backend on top of `glow`.
//!
//! Core profiles have neither client-side arrays nor a default vertex array
//! object. The backend emulates both: client vertex and index data are
//! streamed through two internal buffers right before use, and
//! [`VertexArrayId::NONE`] maps to a vertex array created with the device.
//!
//! These internal objects die with the context like any other. After the
//! context comes back, recover in this order:
//!
//! 1. [`GlDevice::restore_context`] recreates the internal objects;
//! 2. `ShaderRegistry::invalidate_all` (or `ShaderProgram::invalidate`)
//!    recompiles or marks the programs;
//! 3. `Mesh::invalidate` / `VertexData::invalidate` / `IndexData::invalidate`
//!    allocate fresh buffers, uploaded again at the next bind.

use std::cell::Cell;
use std::num::NonZeroU32;

use glow::HasContext;

use crate::error::GraphicsError;
use crate::types::{
    ActiveVariable, AttribPointer, BufferId, BufferTarget, BufferUsage, GlEnum, PrimitiveType,
    ProgramId, ShaderObjectId, ShaderStage, UniformValue, VertexArrayId,
};

use super::GlDevice;

/// Objects the device owns for emulating client arrays and the default VAO.
#[derive(Clone, Copy)]
struct InternalObjects {
    default_vao: glow::NativeVertexArray,
    stream_vertices: glow::NativeBuffer,
    stream_indices: glow::NativeBuffer,
}

impl InternalObjects {
    fn create(gl: &glow::Context) -> Result<Self, GraphicsError> {
        unsafe {
            let default_vao = gl
                .create_vertex_array()
                .map_err(|e| creation_failed("default vertex array", e))?;
            gl.bind_vertex_array(Some(default_vao));
            let stream_vertices = gl
                .create_buffer()
                .map_err(|e| creation_failed("client vertex stream", e))?;
            let stream_indices = gl
                .create_buffer()
                .map_err(|e| creation_failed("client index stream", e))?;
            Ok(Self {
                default_vao,
                stream_vertices,
                stream_indices,
            })
        }
    }

    fn delete(&self, gl: &glow::Context) {
        unsafe {
            gl.delete_buffer(self.stream_vertices);
            gl.delete_buffer(self.stream_indices);
            gl.delete_vertex_array(self.default_vao);
        }
    }
}

/// OpenGL device.
pub struct GlowDevice {
    gl: glow::Context,
    internal: Cell<InternalObjects>,
    array_buffer: Cell<BufferId>,
    element_buffer: Cell<BufferId>,
}

fn buffer(id: BufferId) -> Option<glow::NativeBuffer> {
    NonZeroU32::new(id.0).map(glow::NativeBuffer)
}

fn vertex_array(id: VertexArrayId) -> Option<glow::NativeVertexArray> {
    NonZeroU32::new(id.0).map(glow::NativeVertexArray)
}

fn shader(id: ShaderObjectId) -> Option<glow::NativeShader> {
    NonZeroU32::new(id.0).map(glow::NativeShader)
}

fn program(id: ProgramId) -> Option<glow::NativeProgram> {
    NonZeroU32::new(id.0).map(glow::NativeProgram)
}

fn creation_failed(what: &str, message: String) -> GraphicsError {
    GraphicsError::ResourceCreationFailed(format!("{what}: {message}"))
}

impl GlowDevice {
    /// Wrap a current GL context.
    pub fn new(gl: glow::Context) -> Result<Self, GraphicsError> {
        let internal = InternalObjects::create(&gl)?;
        log::info!("Created OpenGL device: {}", unsafe {
            gl.get_parameter_string(glow::VERSION)
        });
        Ok(Self {
            gl,
            internal: Cell::new(internal),
            array_buffer: Cell::new(BufferId::NONE),
            element_buffer: Cell::new(BufferId::NONE),
        })
    }

    /// The wrapped context.
    pub fn context(&self) -> &glow::Context {
        &self.gl
    }

    fn write_uniform(&self, location: &glow::NativeUniformLocation, value: UniformValue<'_>) {
        let location = Some(location);
        unsafe {
            match value {
                UniformValue::Int1(x) => self.gl.uniform_1_i32(location, x),
                UniformValue::Int2(x, y) => self.gl.uniform_2_i32(location, x, y),
                UniformValue::Int3(x, y, z) => self.gl.uniform_3_i32(location, x, y, z),
                UniformValue::Int4(x, y, z, w) => self.gl.uniform_4_i32(location, x, y, z, w),
                UniformValue::Float1(x) => self.gl.uniform_1_f32(location, x),
                UniformValue::Float2(x, y) => self.gl.uniform_2_f32(location, x, y),
                UniformValue::Float3(x, y, z) => self.gl.uniform_3_f32(location, x, y, z),
                UniformValue::Float4(x, y, z, w) => self.gl.uniform_4_f32(location, x, y, z, w),
                UniformValue::IntArray { components, values } => match components {
                    1 => self.gl.uniform_1_i32_slice(location, values),
                    2 => self.gl.uniform_2_i32_slice(location, values),
                    3 => self.gl.uniform_3_i32_slice(location, values),
                    _ => self.gl.uniform_4_i32_slice(location, values),
                },
                UniformValue::FloatArray { components, values } => match components {
                    1 => self.gl.uniform_1_f32_slice(location, values),
                    2 => self.gl.uniform_2_f32_slice(location, values),
                    3 => self.gl.uniform_3_f32_slice(location, values),
                    _ => self.gl.uniform_4_f32_slice(location, values),
                },
                UniformValue::Matrix2 { transpose, values } => {
                    self.gl
                        .uniform_matrix_2_f32_slice(location, transpose, values)
                }
                UniformValue::Matrix3 { transpose, values } => {
                    self.gl
                        .uniform_matrix_3_f32_slice(location, transpose, values)
                }
                UniformValue::Matrix4 { transpose, values } => {
                    self.gl
                        .uniform_matrix_4_f32_slice(location, transpose, values)
                }
            }
        }
    }
}

impl GlDevice for GlowDevice {
    fn name(&self) -> &'static str {
        "OpenGL"
    }

    /// The old internal objects died with the context and are not deleted.
    fn restore_context(&self) -> Result<(), GraphicsError> {
        log::warn!("OpenGL context restored, recreating internal objects");
        self.internal.set(InternalObjects::create(&self.gl)?);
        self.array_buffer.set(BufferId::NONE);
        self.element_buffer.set(BufferId::NONE);
        Ok(())
    }

    fn create_buffer(&self) -> Result<BufferId, GraphicsError> {
        let buffer = unsafe { self.gl.create_buffer() }.map_err(|e| creation_failed("buffer", e))?;
        Ok(BufferId(buffer.0.get()))
    }

    fn delete_buffer(&self, id: BufferId) {
        if let Some(native) = buffer(id) {
            unsafe { self.gl.delete_buffer(native) };
        }
        if self.array_buffer.get() == id {
            self.array_buffer.set(BufferId::NONE);
        }
        if self.element_buffer.get() == id {
            self.element_buffer.set(BufferId::NONE);
        }
    }

    fn bind_buffer(&self, target: BufferTarget, id: BufferId) {
        unsafe { self.gl.bind_buffer(target.gl_enum(), buffer(id)) };
        match target {
            BufferTarget::Array => self.array_buffer.set(id),
            BufferTarget::ElementArray => self.element_buffer.set(id),
        }
    }

    fn buffer_data(&self, target: BufferTarget, data: &[u8], usage: BufferUsage) {
        unsafe {
            self.gl
                .buffer_data_u8_slice(target.gl_enum(), data, usage.gl_enum())
        };
    }

    fn buffer_storage(&self, target: BufferTarget, size: usize, usage: BufferUsage) {
        unsafe {
            self.gl
                .buffer_data_size(target.gl_enum(), size as i32, usage.gl_enum())
        };
    }

    fn buffer_sub_data(&self, target: BufferTarget, offset: usize, data: &[u8]) {
        unsafe {
            self.gl
                .buffer_sub_data_u8_slice(target.gl_enum(), offset as i32, data)
        };
    }

    fn create_vertex_array(&self) -> Result<VertexArrayId, GraphicsError> {
        let vao = unsafe { self.gl.create_vertex_array() }
            .map_err(|e| creation_failed("vertex array", e))?;
        Ok(VertexArrayId(vao.0.get()))
    }

    fn delete_vertex_array(&self, id: VertexArrayId) {
        if let Some(native) = vertex_array(id) {
            unsafe { self.gl.delete_vertex_array(native) };
        }
    }

    fn bind_vertex_array(&self, id: VertexArrayId) {
        let vao = vertex_array(id).unwrap_or(self.internal.get().default_vao);
        unsafe { self.gl.bind_vertex_array(Some(vao)) };
    }

    fn enable_vertex_attrib_array(&self, location: u32) {
        unsafe { self.gl.enable_vertex_attrib_array(location) };
    }

    fn disable_vertex_attrib_array(&self, location: u32) {
        unsafe { self.gl.disable_vertex_attrib_array(location) };
    }

    fn vertex_attrib_pointer(
        &self,
        location: u32,
        pointer: &AttribPointer,
        client_data: Option<&[u8]>,
    ) {
        unsafe {
            if let Some(data) = client_data {
                let stream = self.internal.get().stream_vertices;
                self.gl.bind_buffer(glow::ARRAY_BUFFER, Some(stream));
                self.gl
                    .buffer_data_u8_slice(glow::ARRAY_BUFFER, data, glow::STREAM_DRAW);
            }
            self.gl.vertex_attrib_pointer_f32(
                location,
                pointer.components as i32,
                pointer.component_type.gl_enum(),
                pointer.normalized,
                pointer.stride as i32,
                pointer.offset as i32,
            );
            if client_data.is_some() {
                self.gl
                    .bind_buffer(glow::ARRAY_BUFFER, buffer(self.array_buffer.get()));
            }
        }
    }

    fn vertex_attrib(&self, location: u32, value: [f32; 4]) {
        unsafe {
            self.gl
                .vertex_attrib_4_f32(location, value[0], value[1], value[2], value[3])
        };
    }

    fn create_shader(&self, stage: ShaderStage) -> Result<ShaderObjectId, GraphicsError> {
        let shader = unsafe { self.gl.create_shader(stage.gl_enum()) }
            .map_err(|e| creation_failed("shader", e))?;
        Ok(ShaderObjectId(shader.0.get()))
    }

    fn shader_source(&self, id: ShaderObjectId, source: &str) {
        if let Some(native) = shader(id) {
            unsafe { self.gl.shader_source(native, source) };
        }
    }

    fn compile_shader(&self, id: ShaderObjectId) {
        if let Some(native) = shader(id) {
            unsafe { self.gl.compile_shader(native) };
        }
    }

    fn shader_compile_status(&self, id: ShaderObjectId) -> bool {
        shader(id).is_some_and(|native| unsafe { self.gl.get_shader_compile_status(native) })
    }

    fn shader_info_log(&self, id: ShaderObjectId) -> String {
        shader(id)
            .map(|native| unsafe { self.gl.get_shader_info_log(native) })
            .unwrap_or_default()
    }

    fn delete_shader(&self, id: ShaderObjectId) {
        if let Some(native) = shader(id) {
            unsafe { self.gl.delete_shader(native) };
        }
    }

    fn create_program(&self) -> Result<ProgramId, GraphicsError> {
        let program = unsafe { self.gl.create_program() }
            .map_err(|e| creation_failed("program", e))?;
        Ok(ProgramId(program.0.get()))
    }

    fn attach_shader(&self, program_id: ProgramId, shader_id: ShaderObjectId) {
        if let (Some(p), Some(s)) = (program(program_id), shader(shader_id)) {
            unsafe { self.gl.attach_shader(p, s) };
        }
    }

    fn link_program(&self, id: ProgramId) {
        if let Some(native) = program(id) {
            unsafe { self.gl.link_program(native) };
        }
    }

    fn program_link_status(&self, id: ProgramId) -> bool {
        program(id).is_some_and(|native| unsafe { self.gl.get_program_link_status(native) })
    }

    fn program_info_log(&self, id: ProgramId) -> String {
        program(id)
            .map(|native| unsafe { self.gl.get_program_info_log(native) })
            .unwrap_or_default()
    }

    fn delete_program(&self, id: ProgramId) {
        if let Some(native) = program(id) {
            unsafe { self.gl.delete_program(native) };
        }
    }

    fn use_program(&self, id: ProgramId) {
        unsafe { self.gl.use_program(program(id)) };
    }

    fn active_attributes(&self, id: ProgramId) -> Vec<ActiveVariable> {
        let Some(native) = program(id) else {
            return Vec::new();
        };
        unsafe {
            (0..self.gl.get_active_attributes(native))
                .filter_map(|index| self.gl.get_active_attribute(native, index))
                .map(|attribute| ActiveVariable {
                    location: self
                        .gl
                        .get_attrib_location(native, &attribute.name)
                        .map_or(-1, |l| l as i32),
                    name: attribute.name,
                    gl_type: attribute.atype,
                    size: attribute.size,
                })
                .collect()
        }
    }

    fn active_uniforms(&self, id: ProgramId) -> Vec<ActiveVariable> {
        let Some(native) = program(id) else {
            return Vec::new();
        };
        unsafe {
            (0..self.gl.get_active_uniforms(native))
                .filter_map(|index| self.gl.get_active_uniform(native, index))
                .map(|uniform| ActiveVariable {
                    location: self
                        .gl
                        .get_uniform_location(native, &uniform.name)
                        .map_or(-1, |l| l.0 as i32),
                    name: uniform.name,
                    gl_type: uniform.utype,
                    size: uniform.size,
                })
                .collect()
        }
    }

    fn attrib_location(&self, id: ProgramId, name: &str) -> i32 {
        program(id)
            .and_then(|native| unsafe { self.gl.get_attrib_location(native, name) })
            .map_or(-1, |l| l as i32)
    }

    fn uniform_location(&self, id: ProgramId, name: &str) -> i32 {
        program(id)
            .and_then(|native| unsafe { self.gl.get_uniform_location(native, name) })
            .map_or(-1, |l| l.0 as i32)
    }

    fn uniform(&self, location: i32, value: UniformValue<'_>) {
        if location < 0 {
            return;
        }
        self.write_uniform(&glow::NativeUniformLocation(location as u32), value);
    }

    fn draw_arrays(&self, primitive: PrimitiveType, first: i32, count: i32) {
        unsafe { self.gl.draw_arrays(primitive.gl_enum(), first, count) };
    }

    fn draw_elements(
        &self,
        primitive: PrimitiveType,
        count: i32,
        offset: usize,
        client_indices: Option<&[u8]>,
    ) {
        unsafe {
            if let Some(indices) = client_indices {
                let stream = self.internal.get().stream_indices;
                self.gl.bind_buffer(glow::ELEMENT_ARRAY_BUFFER, Some(stream));
                self.gl
                    .buffer_data_u8_slice(glow::ELEMENT_ARRAY_BUFFER, indices, glow::STREAM_DRAW);
            }
            self.gl.draw_elements(
                primitive.gl_enum(),
                count,
                glow::UNSIGNED_INT,
                offset as i32,
            );
            if client_indices.is_some() {
                self.gl.bind_buffer(
                    glow::ELEMENT_ARRAY_BUFFER,
                    buffer(self.element_buffer.get()),
                );
            }
        }
    }
}

impl Drop for GlowDevice {
    fn drop(&mut self) {
        self.internal.get().delete(&self.gl);
    }
}

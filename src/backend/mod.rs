//! Device backend abstraction layer.
//!
//! This module provides the call surface that geometry buffers and shader
//! programs drive. It is deliberately shaped like GL: objects are integer
//! handles, state is bound to targets, and every call completes synchronously.
//!
//! # Available Backends
//!
//! - `dummy` (always available): In-memory GL simulator for testing
//! - `glow-backend`: OpenGL / GLES through `glow` (native targets only)
//!
//! # Threading
//!
//! A rendering context belongs to one thread, so [`GlDevice`] is neither
//! `Send` nor `Sync` and resources share it through `Rc<dyn GlDevice>`.
//! All methods take `&self`; implementations use interior mutability.

pub mod dummy;

#[cfg(all(feature = "glow-backend", not(target_arch = "wasm32")))]
pub mod glow_backend;

use std::rc::Rc;

use crate::error::GraphicsError;
use crate::types::{
    ActiveVariable, AttribPointer, BufferId, BufferTarget, BufferUsage, PrimitiveType,
    ProgramId, ShaderObjectId, ShaderStage, UniformValue, VertexArrayId,
};

pub use dummy::{DeviceCall, DummyDevice};
#[cfg(all(feature = "glow-backend", not(target_arch = "wasm32")))]
pub use glow_backend::GlowDevice;

/// Shared handle to the device that owns the rendering context.
pub type SharedDevice = Rc<dyn GlDevice>;

/// GL-style device trait.
///
/// Handles returned by the `create_*` methods are never `0`; locations
/// returned by the lookups are `-1` when the name is unknown.
pub trait GlDevice {
    /// Get the backend name.
    fn name(&self) -> &'static str;

    /// Recreate backend-owned objects once a lost context is usable again.
    ///
    /// Call it before invalidating programs and geometry; object creation
    /// fails between the loss and this call.
    fn restore_context(&self) -> Result<(), GraphicsError>;

    // ---------------------------------------------------------------------
    // Buffers
    // ---------------------------------------------------------------------

    /// Create a buffer object.
    fn create_buffer(&self) -> Result<BufferId, GraphicsError>;

    /// Delete a buffer object.
    fn delete_buffer(&self, buffer: BufferId);

    /// Bind a buffer to a target, or unbind the target with [`BufferId::NONE`].
    fn bind_buffer(&self, target: BufferTarget, buffer: BufferId);

    /// Replace the storage of the buffer bound to `target` with `data`.
    fn buffer_data(&self, target: BufferTarget, data: &[u8], usage: BufferUsage);

    /// Reserve `size` bytes of uninitialized storage for the bound buffer.
    fn buffer_storage(&self, target: BufferTarget, size: usize, usage: BufferUsage);

    /// Overwrite part of the bound buffer's storage starting at `offset` bytes.
    fn buffer_sub_data(&self, target: BufferTarget, offset: usize, data: &[u8]);

    // ---------------------------------------------------------------------
    // Vertex arrays and attributes
    // ---------------------------------------------------------------------

    /// Create a vertex array object.
    fn create_vertex_array(&self) -> Result<VertexArrayId, GraphicsError>;

    /// Delete a vertex array object.
    fn delete_vertex_array(&self, vao: VertexArrayId);

    /// Bind a vertex array object, or the default one with [`VertexArrayId::NONE`].
    fn bind_vertex_array(&self, vao: VertexArrayId);

    /// Enable the attribute array at `location`.
    fn enable_vertex_attrib_array(&self, location: u32);

    /// Disable the attribute array at `location`.
    fn disable_vertex_attrib_array(&self, location: u32);

    /// Describe where attribute `location` reads its data from.
    ///
    /// With `client_data` the attribute reads from CPU memory (client arrays);
    /// otherwise `pointer.offset` is relative to the bound array buffer.
    fn vertex_attrib_pointer(
        &self,
        location: u32,
        pointer: &AttribPointer,
        client_data: Option<&[u8]>,
    );

    /// Set a constant value for a disabled attribute array.
    fn vertex_attrib(&self, location: u32, value: [f32; 4]);

    // ---------------------------------------------------------------------
    // Shaders and programs
    // ---------------------------------------------------------------------

    /// Create a shader stage object.
    fn create_shader(&self, stage: ShaderStage) -> Result<ShaderObjectId, GraphicsError>;

    /// Set the source of a shader stage object.
    fn shader_source(&self, shader: ShaderObjectId, source: &str);

    /// Compile a shader stage object.
    fn compile_shader(&self, shader: ShaderObjectId);

    /// Whether the last compile succeeded.
    fn shader_compile_status(&self, shader: ShaderObjectId) -> bool;

    /// Diagnostic output of the last compile.
    fn shader_info_log(&self, shader: ShaderObjectId) -> String;

    /// Delete a shader stage object.
    fn delete_shader(&self, shader: ShaderObjectId);

    /// Create a program object.
    fn create_program(&self) -> Result<ProgramId, GraphicsError>;

    /// Attach a compiled stage to a program.
    fn attach_shader(&self, program: ProgramId, shader: ShaderObjectId);

    /// Link a program.
    fn link_program(&self, program: ProgramId);

    /// Whether the last link succeeded.
    fn program_link_status(&self, program: ProgramId) -> bool;

    /// Diagnostic output of the last link.
    fn program_info_log(&self, program: ProgramId) -> String;

    /// Delete a program object.
    fn delete_program(&self, program: ProgramId);

    /// Make a program current, or none with [`ProgramId::NONE`].
    fn use_program(&self, program: ProgramId);

    /// Active vertex attributes of a linked program.
    fn active_attributes(&self, program: ProgramId) -> Vec<ActiveVariable>;

    /// Active uniforms of a linked program.
    fn active_uniforms(&self, program: ProgramId) -> Vec<ActiveVariable>;

    /// Location of a named attribute, or `-1`.
    fn attrib_location(&self, program: ProgramId, name: &str) -> i32;

    /// Location of a named uniform, or `-1`.
    fn uniform_location(&self, program: ProgramId, name: &str) -> i32;

    /// Write a value to a uniform of the current program.
    fn uniform(&self, location: i32, value: UniformValue<'_>);

    // ---------------------------------------------------------------------
    // Draws
    // ---------------------------------------------------------------------

    /// Draw `count` vertices starting at `first`.
    fn draw_arrays(&self, primitive: PrimitiveType, first: i32, count: i32);

    /// Draw `count` 32-bit indices starting at byte `offset`.
    ///
    /// With `client_indices` the indices are read from CPU memory and
    /// `offset` is relative to that slice; otherwise from the bound element
    /// array buffer.
    fn draw_elements(
        &self,
        primitive: PrimitiveType,
        count: i32,
        offset: usize,
        client_indices: Option<&[u8]>,
    );
}

/// Create the default device for tests and headless use.
pub fn create_dummy_device() -> SharedDevice {
    log::info!("Using dummy device");
    Rc::new(DummyDevice::new())
}

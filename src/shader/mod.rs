//! Shader programs.
//!
//! A [`ShaderProgram`] compiles a vertex/fragment pair on the device,
//! introspects its active attributes and uniforms, and caches name to
//! location lookups. Programs survive context loss: [`ShaderProgram::invalidate`]
//! marks a program stale and the next [`ShaderProgram::begin`] recompiles it
//! from the stored sources. [`ShaderRegistry`] tracks programs per
//! application tag so a whole group can be recompiled at once.
//!
//! # Example
//!
//! ```ignore
//! let config = ShaderConfig::default().with_prepend_vertex("#version 330 core\n");
//! let mut shader = ShaderProgram::new(device.clone(), &config, VERTEX_SRC, FRAGMENT_SRC)?;
//! if !shader.is_compiled() {
//!     log::error!("{}", shader.log());
//! }
//!
//! shader.begin();
//! shader.set_uniform_matrix4("u_projTrans", &camera.combined, false);
//! mesh.render(&mut shader, PrimitiveType::Triangles, 0, 6)?;
//! shader.end();
//! ```

pub mod registry;

use std::cell::RefCell;
use std::collections::HashMap;

use glam::Vec4;

use crate::backend::SharedDevice;
use crate::error::GraphicsError;
use crate::math::{Mat3, Mat4, Vec2, Vec3};
use crate::types::{
    ActiveVariable, AttribPointer, ComponentType, ProgramId, ShaderObjectId, ShaderStage,
    UniformValue, LOCATION_NOT_FOUND,
};

pub use registry::{ShaderId, ShaderRegistry};

/// Default name of the position attribute.
pub const POSITION_ATTRIBUTE: &str = "a_position";
/// Default name of the normal attribute.
pub const NORMAL_ATTRIBUTE: &str = "a_normal";
/// Default name of the color attribute.
pub const COLOR_ATTRIBUTE: &str = "a_color";
/// Prefix of the texture coordinate attributes, followed by the unit.
pub const TEXCOORD_ATTRIBUTE: &str = "a_texCoord";
/// Default name of the tangent attribute.
pub const TANGENT_ATTRIBUTE: &str = "a_tangent";
/// Default name of the binormal attribute.
pub const BINORMAL_ATTRIBUTE: &str = "a_binormal";
/// Prefix of the bone weight attributes, followed by the unit.
pub const BONEWEIGHT_ATTRIBUTE: &str = "a_boneWeight";

const VERTEX_LOG_MARKER: &str = "Vertex shader\n";
const FRAGMENT_LOG_MARKER: &str = "Fragment shader:\n";

/// Settings applied to every program compiled with them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderConfig {
    /// Text placed before every vertex source, typically a `#version` line.
    pub prepend_vertex: String,
    /// Text placed before every fragment source.
    pub prepend_fragment: String,
    /// Warn whenever a uniform name does not resolve to a location.
    pub pedantic: bool,
}

impl Default for ShaderConfig {
    fn default() -> Self {
        Self {
            prepend_vertex: String::new(),
            prepend_fragment: String::new(),
            pedantic: true,
        }
    }
}

impl ShaderConfig {
    /// Set the vertex prefix.
    pub fn with_prepend_vertex(mut self, prefix: impl Into<String>) -> Self {
        self.prepend_vertex = prefix.into();
        self
    }

    /// Set the fragment prefix.
    pub fn with_prepend_fragment(mut self, prefix: impl Into<String>) -> Self {
        self.prepend_fragment = prefix.into();
        self
    }

    /// Set the pedantic flag.
    pub fn with_pedantic(mut self, pedantic: bool) -> Self {
        self.pedantic = pedantic;
        self
    }
}

/// Lifecycle state of a program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderState {
    /// No compile attempted yet.
    Uninitialized,
    /// A compile is in progress.
    Compiling,
    /// Compiled and linked; tables are populated.
    Compiled,
    /// Compiling or linking failed; see [`ShaderProgram::log`].
    Failed,
    /// Device objects are stale; the next [`ShaderProgram::begin`] recompiles.
    Invalidated,
}

/// A linked vertex/fragment program.
pub struct ShaderProgram {
    device: SharedDevice,
    vertex_source: String,
    fragment_source: String,
    pedantic: bool,
    state: ShaderState,
    program: ProgramId,
    vertex_shader: ShaderObjectId,
    fragment_shader: ShaderObjectId,
    log: String,
    attributes: HashMap<String, ActiveVariable>,
    uniforms: HashMap<String, ActiveVariable>,
    attribute_names: Vec<String>,
    uniform_names: Vec<String>,
    attribute_locations: RefCell<HashMap<String, i32>>,
    uniform_locations: RefCell<HashMap<String, i32>>,
    active: bool,
}

impl ShaderProgram {
    /// Compile a program from vertex and fragment sources.
    ///
    /// The configured prefixes are prepended. A compile or link failure is
    /// not an error: check [`is_compiled`](Self::is_compiled) and
    /// [`log`](Self::log). An error is returned only when the device
    /// refuses to create the objects.
    pub fn new(
        device: SharedDevice,
        config: &ShaderConfig,
        vertex: &str,
        fragment: &str,
    ) -> Result<Self, GraphicsError> {
        let mut program = Self {
            device,
            vertex_source: format!("{}{}", config.prepend_vertex, vertex),
            fragment_source: format!("{}{}", config.prepend_fragment, fragment),
            pedantic: config.pedantic,
            state: ShaderState::Uninitialized,
            program: ProgramId::NONE,
            vertex_shader: ShaderObjectId::NONE,
            fragment_shader: ShaderObjectId::NONE,
            log: String::new(),
            attributes: HashMap::new(),
            uniforms: HashMap::new(),
            attribute_names: Vec::new(),
            uniform_names: Vec::new(),
            attribute_locations: RefCell::new(HashMap::new()),
            uniform_locations: RefCell::new(HashMap::new()),
            active: false,
        };
        program.compile()?;
        Ok(program)
    }

    fn compile(&mut self) -> Result<(), GraphicsError> {
        self.state = ShaderState::Compiling;
        self.log.clear();
        self.attributes.clear();
        self.uniforms.clear();
        self.attribute_names.clear();
        self.uniform_names.clear();
        self.attribute_locations.get_mut().clear();
        self.uniform_locations.get_mut().clear();
        // Handles from a previous compile died with the context.
        self.program = ProgramId::NONE;
        self.vertex_shader = ShaderObjectId::NONE;
        self.fragment_shader = ShaderObjectId::NONE;

        let result = self.compile_stages();
        match &result {
            Ok(true) => {
                self.fetch_attributes();
                self.fetch_uniforms();
                self.state = ShaderState::Compiled;
                log::debug!(
                    "Compiled program {:?} ({} attributes, {} uniforms)",
                    self.program,
                    self.attribute_names.len(),
                    self.uniform_names.len()
                );
            }
            Ok(false) => {
                self.state = ShaderState::Failed;
                log::debug!("Program failed to compile:\n{}", self.log);
            }
            Err(e) => {
                self.state = ShaderState::Failed;
                self.log.push_str(&e.to_string());
            }
        }
        result.map(|_| ())
    }

    fn compile_stages(&mut self) -> Result<bool, GraphicsError> {
        self.vertex_shader = self.device.create_shader(ShaderStage::Vertex)?;
        let vertex_ok = self.load_shader(self.vertex_shader, ShaderStage::Vertex);
        self.fragment_shader = self.device.create_shader(ShaderStage::Fragment)?;
        let fragment_ok = self.load_shader(self.fragment_shader, ShaderStage::Fragment);
        if !vertex_ok || !fragment_ok {
            return Ok(false);
        }

        self.program = self.device.create_program()?;
        self.device.attach_shader(self.program, self.vertex_shader);
        self.device.attach_shader(self.program, self.fragment_shader);
        self.device.link_program(self.program);
        if !self.device.program_link_status(self.program) {
            self.log = self.device.program_info_log(self.program);
            return Ok(false);
        }
        Ok(true)
    }

    fn load_shader(&mut self, shader: ShaderObjectId, stage: ShaderStage) -> bool {
        let source = match stage {
            ShaderStage::Vertex => &self.vertex_source,
            ShaderStage::Fragment => &self.fragment_source,
        };
        self.device.shader_source(shader, source);
        self.device.compile_shader(shader);
        if self.device.shader_compile_status(shader) {
            return true;
        }
        self.log.push_str(match stage {
            ShaderStage::Vertex => VERTEX_LOG_MARKER,
            ShaderStage::Fragment => FRAGMENT_LOG_MARKER,
        });
        self.log.push_str(&self.device.shader_info_log(shader));
        false
    }

    fn fetch_attributes(&mut self) {
        let locations = self.attribute_locations.get_mut();
        for variable in self.device.active_attributes(self.program) {
            locations.insert(variable.name.clone(), variable.location);
            self.attribute_names.push(variable.name.clone());
            self.attributes.insert(variable.name.clone(), variable);
        }
    }

    fn fetch_uniforms(&mut self) {
        let locations = self.uniform_locations.get_mut();
        for variable in self.device.active_uniforms(self.program) {
            locations.insert(variable.name.clone(), variable.location);
            self.uniform_names.push(variable.name.clone());
            self.uniforms.insert(variable.name.clone(), variable);
        }
    }

    /// Whether the last compile and link succeeded.
    pub fn is_compiled(&self) -> bool {
        self.state == ShaderState::Compiled
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ShaderState {
        self.state
    }

    /// Compiler and linker output of the last compile.
    pub fn log(&self) -> &str {
        &self.log
    }

    /// Vertex source including its prefix.
    pub fn vertex_source(&self) -> &str {
        &self.vertex_source
    }

    /// Fragment source including its prefix.
    pub fn fragment_source(&self) -> &str {
        &self.fragment_source
    }

    /// Device program handle.
    pub fn handle(&self) -> ProgramId {
        self.program
    }

    /// Mark the device objects stale after context loss.
    pub fn invalidate(&mut self) {
        self.state = ShaderState::Invalidated;
        self.active = false;
    }

    /// Whether the program waits for a recompile.
    pub fn is_invalidated(&self) -> bool {
        self.state == ShaderState::Invalidated
    }

    /// Recompile from the stored sources if the program was invalidated.
    pub fn check_managed(&mut self) {
        if self.state != ShaderState::Invalidated {
            return;
        }
        log::debug!("Recompiling invalidated program");
        if let Err(e) = self.compile() {
            log::error!("Failed to recompile program: {}", e);
        }
    }

    /// Make this program current.
    pub fn begin(&mut self) {
        self.check_managed();
        debug_assert!(
            self.is_compiled(),
            "begin() on a program that is not compiled:\n{}",
            self.log
        );
        self.device.use_program(self.program);
        self.active = true;
    }

    /// Stop using this program.
    pub fn end(&mut self) {
        self.device.use_program(ProgramId::NONE);
        self.active = false;
    }

    /// Whether [`begin`](Self::begin) was called without a matching [`end`](Self::end).
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Whether uniform lookups warn on misses by default.
    pub fn is_pedantic(&self) -> bool {
        self.pedantic
    }

    // ---------------------------------------------------------------------
    // Location lookups
    // ---------------------------------------------------------------------

    /// Location of an attribute, or `-1`.
    ///
    /// Misses are cached as well, so a name is queried at most once per compile.
    pub fn fetch_attribute_location(&self, name: &str) -> i32 {
        if let Some(&location) = self.attribute_locations.borrow().get(name) {
            return location;
        }
        let location = self.device.attrib_location(self.program, name);
        if location == LOCATION_NOT_FOUND {
            if self.pedantic {
                log::warn!("No attribute with name '{}' in shader", name);
            } else {
                log::debug!("No attribute '{}' in program {:?}", name, self.program);
            }
        }
        self.attribute_locations
            .borrow_mut()
            .insert(name.to_string(), location);
        location
    }

    /// Location of a uniform, or `-1`; a miss warns when `pedantic` is set.
    pub fn fetch_uniform_location(&self, name: &str, pedantic: bool) -> i32 {
        let cached = self.uniform_locations.borrow().get(name).copied();
        let location = match cached {
            Some(location) => location,
            None => {
                let location = self.device.uniform_location(self.program, name);
                self.uniform_locations
                    .borrow_mut()
                    .insert(name.to_string(), location);
                location
            }
        };
        if location == LOCATION_NOT_FOUND && pedantic {
            log::warn!("No uniform with name '{}' in shader", name);
        }
        location
    }

    /// Location of a uniform using the configured pedantic flag.
    pub fn uniform_location_of(&self, name: &str) -> i32 {
        self.fetch_uniform_location(name, self.pedantic)
    }

    // ---------------------------------------------------------------------
    // Introspected tables
    // ---------------------------------------------------------------------

    /// Whether the linked program has an active attribute `name`.
    pub fn has_attribute(&self, name: &str) -> bool {
        self.attributes.contains_key(name)
    }

    /// GL type of an active attribute, `0` if absent.
    pub fn attribute_type(&self, name: &str) -> u32 {
        self.attributes.get(name).map_or(0, |a| a.gl_type)
    }

    /// Array size of an active attribute, `0` if absent.
    pub fn attribute_size(&self, name: &str) -> i32 {
        self.attributes.get(name).map_or(0, |a| a.size)
    }

    /// Introspected location of an attribute, `-1` if absent.
    pub fn attribute_location(&self, name: &str) -> i32 {
        self.attributes
            .get(name)
            .map_or(LOCATION_NOT_FOUND, |a| a.location)
    }

    /// Names of the active attributes, in introspection order.
    pub fn attribute_names(&self) -> &[String] {
        &self.attribute_names
    }

    /// Whether the linked program has an active uniform `name`.
    pub fn has_uniform(&self, name: &str) -> bool {
        self.uniforms.contains_key(name)
    }

    /// GL type of an active uniform, `0` if absent.
    pub fn uniform_type(&self, name: &str) -> u32 {
        self.uniforms.get(name).map_or(0, |u| u.gl_type)
    }

    /// Array size of an active uniform, `0` if absent.
    pub fn uniform_size(&self, name: &str) -> i32 {
        self.uniforms.get(name).map_or(0, |u| u.size)
    }

    /// Introspected location of a uniform, `-1` if absent.
    pub fn uniform_location(&self, name: &str) -> i32 {
        self.uniforms
            .get(name)
            .map_or(LOCATION_NOT_FOUND, |u| u.location)
    }

    /// Names of the active uniforms, in introspection order.
    pub fn uniform_names(&self) -> &[String] {
        &self.uniform_names
    }

    // ---------------------------------------------------------------------
    // Uniforms
    // ---------------------------------------------------------------------

    /// Write a uniform by name.
    pub fn set_uniform(&mut self, name: &str, value: UniformValue<'_>) {
        self.check_managed();
        let location = self.fetch_uniform_location(name, self.pedantic);
        self.set_uniform_at_location(location, value);
    }

    /// Write a uniform by location; `-1` is ignored.
    pub fn set_uniform_at_location(&self, location: i32, value: UniformValue<'_>) {
        if !self.active {
            log::warn!(
                "Uniform {} written while program {:?} is not active",
                location,
                self.program
            );
            return;
        }
        if location == LOCATION_NOT_FOUND {
            return;
        }
        self.device.uniform(location, value);
    }

    pub fn set_uniformi(&mut self, name: &str, value: i32) {
        self.set_uniform(name, UniformValue::Int1(value));
    }

    pub fn set_uniformi_at_location(&self, location: i32, value: i32) {
        self.set_uniform_at_location(location, UniformValue::Int1(value));
    }

    pub fn set_uniformi2(&mut self, name: &str, x: i32, y: i32) {
        self.set_uniform(name, UniformValue::Int2(x, y));
    }

    pub fn set_uniformi3(&mut self, name: &str, x: i32, y: i32, z: i32) {
        self.set_uniform(name, UniformValue::Int3(x, y, z));
    }

    pub fn set_uniformi4(&mut self, name: &str, x: i32, y: i32, z: i32, w: i32) {
        self.set_uniform(name, UniformValue::Int4(x, y, z, w));
    }

    pub fn set_uniformf(&mut self, name: &str, value: f32) {
        self.set_uniform(name, UniformValue::Float1(value));
    }

    pub fn set_uniformf_at_location(&self, location: i32, value: f32) {
        self.set_uniform_at_location(location, UniformValue::Float1(value));
    }

    pub fn set_uniformf2(&mut self, name: &str, x: f32, y: f32) {
        self.set_uniform(name, UniformValue::Float2(x, y));
    }

    pub fn set_uniformf3(&mut self, name: &str, x: f32, y: f32, z: f32) {
        self.set_uniform(name, UniformValue::Float3(x, y, z));
    }

    pub fn set_uniformf4(&mut self, name: &str, x: f32, y: f32, z: f32, w: f32) {
        self.set_uniform(name, UniformValue::Float4(x, y, z, w));
    }

    pub fn set_uniform_vec2(&mut self, name: &str, value: Vec2) {
        self.set_uniformf2(name, value.x, value.y);
    }

    pub fn set_uniform_vec3(&mut self, name: &str, value: Vec3) {
        self.set_uniformf3(name, value.x, value.y, value.z);
    }

    pub fn set_uniform_vec4(&mut self, name: &str, value: Vec4) {
        self.set_uniformf4(name, value.x, value.y, value.z, value.w);
    }

    /// Write an array of floats.
    pub fn set_uniform1fv(&mut self, name: &str, values: &[f32]) {
        self.set_float_array(name, 1, values);
    }

    /// Write an array of 2-component vectors.
    pub fn set_uniform2fv(&mut self, name: &str, values: &[f32]) {
        self.set_float_array(name, 2, values);
    }

    /// Write an array of 3-component vectors.
    pub fn set_uniform3fv(&mut self, name: &str, values: &[f32]) {
        self.set_float_array(name, 3, values);
    }

    /// Write an array of 4-component vectors.
    pub fn set_uniform4fv(&mut self, name: &str, values: &[f32]) {
        self.set_float_array(name, 4, values);
    }

    fn set_float_array(&mut self, name: &str, components: u32, values: &[f32]) {
        if values.len() % components as usize != 0 {
            log::warn!(
                "Uniform '{}' given {} floats, not a multiple of {}",
                name,
                values.len(),
                components
            );
            return;
        }
        self.set_uniform(name, UniformValue::FloatArray { components, values });
    }

    /// Write a 3x3 matrix.
    pub fn set_uniform_matrix3(&mut self, name: &str, matrix: &Mat3, transpose: bool) {
        let values = matrix.to_cols_array();
        self.set_uniform(
            name,
            UniformValue::Matrix3 {
                transpose,
                values: &values,
            },
        );
    }

    /// Write a 4x4 matrix.
    pub fn set_uniform_matrix4(&mut self, name: &str, matrix: &Mat4, transpose: bool) {
        let values = matrix.to_cols_array();
        self.set_uniform(
            name,
            UniformValue::Matrix4 {
                transpose,
                values: &values,
            },
        );
    }

    pub fn set_uniform_matrix4_at_location(&self, location: i32, matrix: &Mat4, transpose: bool) {
        let values = matrix.to_cols_array();
        self.set_uniform_at_location(
            location,
            UniformValue::Matrix4 {
                transpose,
                values: &values,
            },
        );
    }

    /// Write an array of 4x4 matrices given as consecutive column-major floats.
    pub fn set_uniform_matrix4fv(&mut self, name: &str, values: &[f32], transpose: bool) {
        if values.len() % 16 != 0 {
            log::warn!(
                "Uniform '{}' given {} floats, not a whole number of 4x4 matrices",
                name,
                values.len()
            );
            return;
        }
        self.set_uniform(name, UniformValue::Matrix4 { transpose, values });
    }

    // ---------------------------------------------------------------------
    // Attributes
    // ---------------------------------------------------------------------

    /// Point attribute `name` at the bound array buffer.
    pub fn set_vertex_attribute(
        &mut self,
        name: &str,
        components: u32,
        component_type: ComponentType,
        normalized: bool,
        stride: u32,
        offset: u32,
    ) {
        self.check_managed();
        let location = self.fetch_attribute_location(name);
        self.set_vertex_attribute_at_location(
            location,
            components,
            component_type,
            normalized,
            stride,
            offset,
        );
    }

    /// Point the attribute at `location` at the bound array buffer; `-1` is ignored.
    pub fn set_vertex_attribute_at_location(
        &self,
        location: i32,
        components: u32,
        component_type: ComponentType,
        normalized: bool,
        stride: u32,
        offset: u32,
    ) {
        if location < 0 {
            return;
        }
        let pointer = AttribPointer {
            components,
            component_type,
            normalized,
            stride,
            offset,
        };
        self.device
            .vertex_attrib_pointer(location as u32, &pointer, None);
    }

    pub fn enable_vertex_attribute(&mut self, name: &str) {
        self.check_managed();
        let location = self.fetch_attribute_location(name);
        self.enable_vertex_attribute_at_location(location);
    }

    pub fn enable_vertex_attribute_at_location(&self, location: i32) {
        if location >= 0 {
            self.device.enable_vertex_attrib_array(location as u32);
        }
    }

    pub fn disable_vertex_attribute(&mut self, name: &str) {
        self.check_managed();
        let location = self.fetch_attribute_location(name);
        self.disable_vertex_attribute_at_location(location);
    }

    pub fn disable_vertex_attribute_at_location(&self, location: i32) {
        if location >= 0 {
            self.device.disable_vertex_attrib_array(location as u32);
        }
    }

    /// Set a constant value for a disabled attribute.
    pub fn set_attributef(&mut self, name: &str, x: f32, y: f32, z: f32, w: f32) {
        self.check_managed();
        let location = self.fetch_attribute_location(name);
        if location >= 0 {
            self.device.vertex_attrib(location as u32, [x, y, z, w]);
        }
    }
}

impl Drop for ShaderProgram {
    fn drop(&mut self) {
        if self.active {
            self.device.use_program(ProgramId::NONE);
        }
        if self.vertex_shader.is_valid() {
            self.device.delete_shader(self.vertex_shader);
        }
        if self.fragment_shader.is_valid() {
            self.device.delete_shader(self.fragment_shader);
        }
        if self.program.is_valid() {
            self.device.delete_program(self.program);
        }
    }
}

impl std::fmt::Debug for ShaderProgram {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShaderProgram")
            .field("program", &self.program)
            .field("state", &self.state)
            .field("attributes", &self.attribute_names)
            .field("uniforms", &self.uniform_names)
            .finish()
    }
}

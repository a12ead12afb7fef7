//! Device-level types shared by the backends and the resources.
//!
//! The enums mirror the GL enumerants they stand for; [`GlEnum::gl_enum`] values are
//! what backends pass to the driver.

/// GL enumerant values used by the device surface.
pub mod gl {
    pub const BYTE: u32 = 0x1400;
    pub const UNSIGNED_BYTE: u32 = 0x1401;
    pub const SHORT: u32 = 0x1402;
    pub const UNSIGNED_SHORT: u32 = 0x1403;
    pub const INT: u32 = 0x1404;
    pub const UNSIGNED_INT: u32 = 0x1405;
    pub const FLOAT: u32 = 0x1406;
    pub const FIXED: u32 = 0x140C;

    pub const FLOAT_VEC2: u32 = 0x8B50;
    pub const FLOAT_VEC3: u32 = 0x8B51;
    pub const FLOAT_VEC4: u32 = 0x8B52;
    pub const INT_VEC2: u32 = 0x8B53;
    pub const INT_VEC3: u32 = 0x8B54;
    pub const INT_VEC4: u32 = 0x8B55;
    pub const BOOL: u32 = 0x8B56;
    pub const BOOL_VEC2: u32 = 0x8B57;
    pub const BOOL_VEC3: u32 = 0x8B58;
    pub const BOOL_VEC4: u32 = 0x8B59;
    pub const FLOAT_MAT2: u32 = 0x8B5A;
    pub const FLOAT_MAT3: u32 = 0x8B5B;
    pub const FLOAT_MAT4: u32 = 0x8B5C;
    pub const SAMPLER_2D: u32 = 0x8B5E;
    pub const SAMPLER_CUBE: u32 = 0x8B60;

    pub const POINTS: u32 = 0x0000;
    pub const LINES: u32 = 0x0001;
    pub const LINE_LOOP: u32 = 0x0002;
    pub const LINE_STRIP: u32 = 0x0003;
    pub const TRIANGLES: u32 = 0x0004;
    pub const TRIANGLE_STRIP: u32 = 0x0005;
    pub const TRIANGLE_FAN: u32 = 0x0006;

    pub const ARRAY_BUFFER: u32 = 0x8892;
    pub const ELEMENT_ARRAY_BUFFER: u32 = 0x8893;

    pub const STREAM_DRAW: u32 = 0x88E0;
    pub const STATIC_DRAW: u32 = 0x88E4;
    pub const DYNAMIC_DRAW: u32 = 0x88E8;

    pub const FRAGMENT_SHADER: u32 = 0x8B30;
    pub const VERTEX_SHADER: u32 = 0x8B31;
}

/// Trait for types that map onto a GL enumerant.
pub trait GlEnum {
    /// The GL enumerant value.
    fn gl_enum(&self) -> u32;
}

macro_rules! handle_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
        pub struct $name(pub u32);

        impl $name {
            /// The reserved "no object" handle.
            pub const NONE: Self = Self(0);

            /// Check whether the handle refers to an object.
            pub fn is_valid(&self) -> bool {
                self.0 != 0
            }
        }
    };
}

handle_type!(
    /// Handle to a device buffer object.
    BufferId
);
handle_type!(
    /// Handle to a device vertex array object.
    VertexArrayId
);
handle_type!(
    /// Handle to a linked (or linkable) program object.
    ProgramId
);
handle_type!(
    /// Handle to a single shader stage object.
    ShaderObjectId
);

/// Sentinel for a missing attribute or uniform location.
pub const LOCATION_NOT_FOUND: i32 = -1;

/// Binding target of a buffer object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferTarget {
    /// Vertex attribute data.
    Array,
    /// Index data.
    ElementArray,
}

impl GlEnum for BufferTarget {
    fn gl_enum(&self) -> u32 {
        match self {
            Self::Array => gl::ARRAY_BUFFER,
            Self::ElementArray => gl::ELEMENT_ARRAY_BUFFER,
        }
    }
}

/// Upload frequency hint passed along with buffer data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BufferUsage {
    /// Written once, drawn many times.
    #[default]
    StaticDraw,
    /// Rewritten repeatedly.
    DynamicDraw,
    /// Rewritten before nearly every draw.
    StreamDraw,
}

impl BufferUsage {
    /// Pick the hint for a static or dynamic mesh.
    pub fn from_static(is_static: bool) -> Self {
        if is_static {
            Self::StaticDraw
        } else {
            Self::DynamicDraw
        }
    }
}

impl GlEnum for BufferUsage {
    fn gl_enum(&self) -> u32 {
        match self {
            Self::StaticDraw => gl::STATIC_DRAW,
            Self::DynamicDraw => gl::DYNAMIC_DRAW,
            Self::StreamDraw => gl::STREAM_DRAW,
        }
    }
}

/// Component type of a vertex attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ComponentType {
    /// 32-bit float.
    Float,
    /// 16.16 fixed point.
    Fixed,
    /// Signed byte.
    Byte,
    /// Unsigned byte.
    UnsignedByte,
    /// Signed 16-bit integer.
    Short,
    /// Unsigned 16-bit integer.
    UnsignedShort,
}

impl ComponentType {
    /// Size in bytes of one component.
    pub fn size(&self) -> usize {
        match self {
            Self::Float | Self::Fixed => 4,
            Self::Byte | Self::UnsignedByte => 1,
            Self::Short | Self::UnsignedShort => 2,
        }
    }
}

impl GlEnum for ComponentType {
    fn gl_enum(&self) -> u32 {
        match self {
            Self::Float => gl::FLOAT,
            Self::Fixed => gl::FIXED,
            Self::Byte => gl::BYTE,
            Self::UnsignedByte => gl::UNSIGNED_BYTE,
            Self::Short => gl::SHORT,
            Self::UnsignedShort => gl::UNSIGNED_SHORT,
        }
    }
}

/// How vertices are assembled into primitives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PrimitiveType {
    /// Each vertex is a point.
    Points,
    /// Every two vertices form a line.
    Lines,
    /// Connected lines, closed at the end.
    LineLoop,
    /// Connected lines.
    LineStrip,
    /// Every three vertices form a triangle.
    #[default]
    Triangles,
    /// Connected strip of triangles.
    TriangleStrip,
    /// Triangles sharing the first vertex.
    TriangleFan,
}

impl GlEnum for PrimitiveType {
    fn gl_enum(&self) -> u32 {
        match self {
            Self::Points => gl::POINTS,
            Self::Lines => gl::LINES,
            Self::LineLoop => gl::LINE_LOOP,
            Self::LineStrip => gl::LINE_STRIP,
            Self::Triangles => gl::TRIANGLES,
            Self::TriangleStrip => gl::TRIANGLE_STRIP,
            Self::TriangleFan => gl::TRIANGLE_FAN,
        }
    }
}

/// Programmable pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    /// Vertex stage.
    Vertex,
    /// Fragment stage.
    Fragment,
}

impl GlEnum for ShaderStage {
    fn gl_enum(&self) -> u32 {
        match self {
            Self::Vertex => gl::VERTEX_SHADER,
            Self::Fragment => gl::FRAGMENT_SHADER,
        }
    }
}

/// Layout of one vertex attribute pointer call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AttribPointer {
    /// Number of components (1-4).
    pub components: u32,
    /// Component type.
    pub component_type: ComponentType,
    /// Whether integer components are normalized to [0, 1] / [-1, 1].
    pub normalized: bool,
    /// Byte distance between consecutive vertices.
    pub stride: u32,
    /// Byte offset of the first component.
    pub offset: u32,
}

/// An active attribute or uniform reported by program introspection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ActiveVariable {
    /// Name as declared in the source.
    pub name: String,
    /// Location assigned by the linker.
    pub location: i32,
    /// GL type enumerant (see [`gl`]).
    pub gl_type: u32,
    /// Array size, 1 for non-arrays.
    pub size: i32,
}

/// A value written to a uniform location.
///
/// The slice variants carry `count` tightly packed elements; the arity is
/// encoded in the variant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UniformValue<'a> {
    Int1(i32),
    Int2(i32, i32),
    Int3(i32, i32, i32),
    Int4(i32, i32, i32, i32),
    Float1(f32),
    Float2(f32, f32),
    Float3(f32, f32, f32),
    Float4(f32, f32, f32, f32),
    /// Array of `N`-component int vectors, `N` in 1..=4.
    IntArray { components: u32, values: &'a [i32] },
    /// Array of `N`-component float vectors, `N` in 1..=4.
    FloatArray { components: u32, values: &'a [f32] },
    Matrix2 { transpose: bool, values: &'a [f32] },
    Matrix3 { transpose: bool, values: &'a [f32] },
    Matrix4 { transpose: bool, values: &'a [f32] },
}

impl UniformValue<'_> {
    /// Copy the value into an owned form (used for call recording).
    pub fn to_owned_value(&self) -> OwnedUniformValue {
        match *self {
            Self::Int1(a) => OwnedUniformValue::Ints(vec![a]),
            Self::Int2(a, b) => OwnedUniformValue::Ints(vec![a, b]),
            Self::Int3(a, b, c) => OwnedUniformValue::Ints(vec![a, b, c]),
            Self::Int4(a, b, c, d) => OwnedUniformValue::Ints(vec![a, b, c, d]),
            Self::Float1(a) => OwnedUniformValue::Floats(vec![a]),
            Self::Float2(a, b) => OwnedUniformValue::Floats(vec![a, b]),
            Self::Float3(a, b, c) => OwnedUniformValue::Floats(vec![a, b, c]),
            Self::Float4(a, b, c, d) => OwnedUniformValue::Floats(vec![a, b, c, d]),
            Self::IntArray { values, .. } => OwnedUniformValue::Ints(values.to_vec()),
            Self::FloatArray { values, .. } => OwnedUniformValue::Floats(values.to_vec()),
            Self::Matrix2 { transpose, values }
            | Self::Matrix3 { transpose, values }
            | Self::Matrix4 { transpose, values } => OwnedUniformValue::Matrix {
                transpose,
                values: values.to_vec(),
            },
        }
    }
}

/// Owned copy of a [`UniformValue`].
#[derive(Debug, Clone, PartialEq)]
pub enum OwnedUniformValue {
    Ints(Vec<i32>),
    Floats(Vec<f32>),
    Matrix { transpose: bool, values: Vec<f32> },
}

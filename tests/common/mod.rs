//! Shared fixtures for the integration tests.

use std::rc::Rc;

use meshkit::{DummyDevice, ShaderConfig, ShaderProgram};

/// Vertex shader reading positions and colors.
pub const VERTEX_SHADER: &str = "attribute vec3 a_position;
attribute vec4 a_color;
uniform mat4 u_projTrans;
varying vec4 v_color;
void main() {
    v_color = a_color;
    gl_Position = u_projTrans * vec4(a_position, 1.0);
}";

/// Fragment shader passing the interpolated color through.
pub const FRAGMENT_SHADER: &str = "varying vec4 v_color;
uniform vec4 u_tint;
void main() {
    gl_FragColor = v_color * u_tint;
}";

/// Three positions forming a right triangle.
pub const TRIANGLE: [f32; 9] = [0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0];

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Fresh dummy device with logging enabled.
pub fn device() -> Rc<DummyDevice> {
    init_logging();
    Rc::new(DummyDevice::new())
}

/// Compile the default shader pair on `device`.
pub fn shader(device: &Rc<DummyDevice>) -> ShaderProgram {
    let program = ShaderProgram::new(
        device.clone(),
        &ShaderConfig::default(),
        VERTEX_SHADER,
        FRAGMENT_SHADER,
    )
    .expect("shader objects");
    assert!(program.is_compiled(), "{}", program.log());
    program
}

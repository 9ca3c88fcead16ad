//! GLSL sources for the batch vertex layouts.
//!
//! All shaders target GLSL 3.30 core. They share two uniforms:
//!
//! | Name           | Type    | Description                                 |
//! |----------------|---------|---------------------------------------------|
//! | `u_z_max`      | `float` | Highest z-level assigned this frame         |
//! | `u_projection` | `mat4`  | The target's orthographic projection        |
//!
//! The vertex z is an unbounded per-shape counter; each shader maps it onto
//! a bounded eye-space depth via `z' = -(u_z_max - z) / (u_z_max + 1.0)`,
//! so later submissions come out nearer to the camera and win the depth
//! test against earlier opaque geometry.
//!
//! Rotated layouts carry the pivot and angle per vertex (`a_trans` =
//! `(cx, cy, angle)`); the shader builds the rotate-about-pivot matrix
//! instead of the CPU rebaking vertices on every angle change.
//!
//! Fragment outputs are premultiplied by alpha; the frame driver blends
//! with `(ONE, ONE_MINUS_SRC_ALPHA)` accordingly.

/// Vertex shader for point primitives (7 floats: position + color).
pub(crate) const POINT_VERTEX_SRC: &str = r"#version 330 core
layout (location = 0) in vec3 a_pos;
layout (location = 1) in vec4 a_color;

uniform float u_z_max;
uniform mat4 u_projection;

out vec4 v_color;

void main() {
    float z = -(u_z_max - a_pos.z) / (u_z_max + 1.0);
    gl_Position = u_projection * vec4(a_pos.xy, z, 1.0);
    v_color = a_color;
}
";

/// Vertex shader for shape primitives (10 floats: position + color +
/// rotation pivot/angle).
pub(crate) const SHAPE_VERTEX_SRC: &str = r"#version 330 core
layout (location = 0) in vec3 a_pos;
layout (location = 1) in vec4 a_color;
layout (location = 2) in vec3 a_trans;

uniform float u_z_max;
uniform mat4 u_projection;

out vec4 v_color;

void main() {
    float c = cos(a_trans.z);
    float s = sin(a_trans.z);
    float x = a_trans.x;
    float y = a_trans.y;
    float m30 = -x * c + y * s + x;
    float m31 = -x * s - y * c + y;
    mat4 trans = mat4(
        vec4(c,   s,   0.0, 0.0),
        vec4(-s,  c,   0.0, 0.0),
        vec4(0.0, 0.0, 1.0, 0.0),
        vec4(m30, m31, 0.0, 1.0)
    );

    float z = -(u_z_max - a_pos.z) / (u_z_max + 1.0);
    gl_Position = u_projection * trans * vec4(a_pos.xy, z, 1.0);
    v_color = a_color;
}
";

/// Fragment shader shared by the point and shape layouts.
pub(crate) const FLAT_FRAGMENT_SRC: &str = r"#version 330 core
in vec4 v_color;

out vec4 frag_color;

void main() {
    frag_color = vec4(v_color.rgb * v_color.a, v_color.a);
}
";

/// Vertex shader for textured quads (12 floats: position + color + uv +
/// rotation pivot/angle).
pub(crate) const TEXTURE_VERTEX_SRC: &str = r"#version 330 core
layout (location = 0) in vec3 a_pos;
layout (location = 1) in vec4 a_color;
layout (location = 2) in vec2 a_uv;
layout (location = 3) in vec3 a_trans;

uniform float u_z_max;
uniform mat4 u_projection;

out vec4 v_color;
out vec2 v_uv;

void main() {
    float c = cos(a_trans.z);
    float s = sin(a_trans.z);
    float x = a_trans.x;
    float y = a_trans.y;
    float m30 = -x * c + y * s + x;
    float m31 = -x * s - y * c + y;
    mat4 trans = mat4(
        vec4(c,   s,   0.0, 0.0),
        vec4(-s,  c,   0.0, 0.0),
        vec4(0.0, 0.0, 1.0, 0.0),
        vec4(m30, m31, 0.0, 1.0)
    );

    float z = -(u_z_max - a_pos.z) / (u_z_max + 1.0);
    gl_Position = u_projection * trans * vec4(a_pos.xy, z, 1.0);
    v_color = a_color;
    v_uv = a_uv;
}
";

/// Fragment shader for textured quads; the sampled texel is tinted by the
/// vertex color, then premultiplied.
pub(crate) const TEXTURE_FRAGMENT_SRC: &str = r"#version 330 core
in vec4 v_color;
in vec2 v_uv;

uniform sampler2D u_texture;

out vec4 frag_color;

void main() {
    frag_color = v_color * texture(u_texture, v_uv);
    frag_color.rgb *= frag_color.a;
}
";

//! Graphics-context seam.
//!
//! The pipeline layer never talks to a GL binding directly; it drives a [`GlApi`]. The
//! `glow::Context` implementation covers desktop GL and WebGL.

mod api;
mod glow_backend;

#[cfg(test)]
pub(crate) mod testing;

pub use api::{ActiveVariable, GlApi, ShaderStage};

/// Uploads `data` into a new `ARRAY_BUFFER` with `STATIC_DRAW` usage.
pub fn create_f32_buffer<G: GlApi>(gl: &G, data: &[f32]) -> Result<G::Buffer, String> {
    let buffer = gl.create_buffer(glow::ARRAY_BUFFER, bytemuck::cast_slice(data), glow::STATIC_DRAW)?;
    gl.bind_buffer(glow::ARRAY_BUFFER, None);
    Ok(buffer)
}

/// Uploads 16-bit vertex indices into a new `ELEMENT_ARRAY_BUFFER`.
pub fn create_index_buffer<G: GlApi>(gl: &G, indices: &[u16]) -> Result<G::Buffer, String> {
    let buffer = gl.create_buffer(
        glow::ELEMENT_ARRAY_BUFFER,
        bytemuck::cast_slice(indices),
        glow::STATIC_DRAW,
    )?;
    gl.bind_buffer(glow::ELEMENT_ARRAY_BUFFER, None);
    Ok(buffer)
}

//! Off-screen render targets keyed by string id.

use std::collections::HashMap;
use std::fmt;

use crate::gl::GlApi;

use super::error::{PipelineError, Result};

/// Reserved target every model program renders into once post-processing is active.
pub const MODELS_TARGET_ID: &str = "models";

/// Framebuffer with an RGBA color texture and an optional 16-bit depth renderbuffer.
pub struct RenderTarget<G: GlApi> {
    pub texture: G::Texture,
    pub framebuffer: G::Framebuffer,
    pub depth_buffer: Option<G::Renderbuffer>,
    pub width: u32,
    pub height: u32,
}

impl<G: GlApi> Clone for RenderTarget<G> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<G: GlApi> Copy for RenderTarget<G> {}

impl<G: GlApi> fmt::Debug for RenderTarget<G> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderTarget")
            .field("texture", &self.texture)
            .field("framebuffer", &self.framebuffer)
            .field("depth_buffer", &self.depth_buffer)
            .field("width", &self.width)
            .field("height", &self.height)
            .finish()
    }
}

/// Flat map of render targets, all sized to the current viewport. No eviction.
pub struct RenderTargetPool<G: GlApi> {
    targets: HashMap<String, RenderTarget<G>>,
    width: u32,
    height: u32,
}

fn gl_error(reason: String) -> PipelineError {
    PipelineError::Gl { reason }
}

/// GL sizes are signed and zero-sized storage is pointless.
fn gl_extent(width: u32, height: u32) -> (i32, i32) {
    let clamp = |v: u32| v.clamp(1, i32::MAX as u32) as i32;
    (clamp(width), clamp(height))
}

impl<G: GlApi> RenderTargetPool<G> {
    pub fn new(width: u32, height: u32) -> Self {
        Self { targets: HashMap::new(), width, height }
    }

    /// Viewport size new targets are allocated with.
    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Allocates `id` at the current size. An existing id is returned unchanged.
    pub fn create(&mut self, gl: &G, id: &str, with_depth: bool) -> Result<RenderTarget<G>> {
        if let Some(existing) = self.targets.get(id) {
            return Ok(*existing);
        }

        let (w, h) = gl_extent(self.width, self.height);

        let texture = gl.create_texture().map_err(gl_error)?;
        gl.bind_texture(glow::TEXTURE_2D, Some(texture));
        for (parameter, value) in [
            (glow::TEXTURE_WRAP_S, glow::CLAMP_TO_EDGE),
            (glow::TEXTURE_WRAP_T, glow::CLAMP_TO_EDGE),
            (glow::TEXTURE_MIN_FILTER, glow::NEAREST),
            (glow::TEXTURE_MAG_FILTER, glow::NEAREST),
        ] {
            gl.tex_parameter_i32(glow::TEXTURE_2D, parameter, value as i32);
        }
        gl.tex_storage_rgba(w, h);
        gl.bind_texture(glow::TEXTURE_2D, None);

        let depth_buffer = if with_depth {
            let renderbuffer = match gl.create_renderbuffer() {
                Ok(rb) => rb,
                Err(reason) => {
                    gl.delete_texture(texture);
                    return Err(gl_error(reason));
                }
            };
            gl.bind_renderbuffer(Some(renderbuffer));
            gl.renderbuffer_storage(glow::DEPTH_COMPONENT16, w, h);
            gl.bind_renderbuffer(None);
            Some(renderbuffer)
        } else {
            None
        };

        let framebuffer = match gl.create_framebuffer() {
            Ok(fb) => fb,
            Err(reason) => {
                gl.delete_texture(texture);
                if let Some(rb) = depth_buffer {
                    gl.delete_renderbuffer(rb);
                }
                return Err(gl_error(reason));
            }
        };
        gl.bind_framebuffer(Some(framebuffer));
        gl.framebuffer_texture_2d(glow::COLOR_ATTACHMENT0, Some(texture));
        if depth_buffer.is_some() {
            gl.framebuffer_renderbuffer(glow::DEPTH_ATTACHMENT, depth_buffer);
        }
        let status = gl.check_framebuffer_status();
        if status != glow::FRAMEBUFFER_COMPLETE {
            log::warn!("render target `{id}`: framebuffer incomplete (status 0x{status:04X})");
        }
        gl.bind_framebuffer(None);

        log::debug!("render target `{id}` allocated ({w}x{h}, depth: {with_depth})");

        let target = RenderTarget {
            texture,
            framebuffer,
            depth_buffer,
            width: self.width,
            height: self.height,
        };
        self.targets.insert(id.to_string(), target);
        Ok(target)
    }

    pub fn get(&self, id: &str) -> Option<RenderTarget<G>> {
        self.targets.get(id).copied()
    }

    pub fn texture(&self, id: &str) -> Option<G::Texture> {
        self.targets.get(id).map(|t| t.texture)
    }

    pub fn framebuffer(&self, id: &str) -> Option<G::Framebuffer> {
        self.targets.get(id).map(|t| t.framebuffer)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.targets.contains_key(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.targets.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Re-specifies storage of every target at `width` x `height`.
    ///
    /// Handles are kept; only the storage behind them changes, so anything holding a texture
    /// or framebuffer handle keeps working.
    pub fn resize(&mut self, gl: &G, width: u32, height: u32) {
        self.width = width;
        self.height = height;
        let (w, h) = gl_extent(width, height);

        for target in self.targets.values_mut() {
            gl.bind_texture(glow::TEXTURE_2D, Some(target.texture));
            gl.tex_storage_rgba(w, h);
            if let Some(rb) = target.depth_buffer {
                gl.bind_renderbuffer(Some(rb));
                gl.renderbuffer_storage(glow::DEPTH_COMPONENT16, w, h);
            }
            target.width = width;
            target.height = height;
        }
        gl.bind_texture(glow::TEXTURE_2D, None);
        gl.bind_renderbuffer(None);

        log::debug!("resized {} render targets to {width}x{height}", self.targets.len());
    }

    /// Deletes the GPU objects behind `id`. Returns whether the target existed.
    pub fn release(&mut self, gl: &G, id: &str) -> bool {
        let Some(target) = self.targets.remove(id) else {
            return false;
        };
        gl.delete_framebuffer(target.framebuffer);
        gl.delete_texture(target.texture);
        if let Some(rb) = target.depth_buffer {
            gl.delete_renderbuffer(rb);
        }
        log::debug!("render target `{id}` released");
        true
    }
}

impl<G: GlApi> fmt::Debug for RenderTargetPool<G> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderTargetPool")
            .field("targets", &self.targets)
            .field("width", &self.width)
            .field("height", &self.height)
            .finish()
    }
}

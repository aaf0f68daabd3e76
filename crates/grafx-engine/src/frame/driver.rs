use std::rc::Rc;

use crate::gl::GlApi;
use crate::pipeline::{PipelineRegistry, RenderProgram, MODELS_TARGET_ID};

/// Context state applied at the start of every frame.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameDriverConfig {
    pub clear_color: [f32; 4],
    pub clear_depth: f32,
    pub depth_test: bool,
}

impl Default for FrameDriverConfig {
    fn default() -> Self {
        Self {
            clear_color: [0.0, 0.0, 0.0, 1.0],
            clear_depth: 1.0,
            depth_test: true,
        }
    }
}

/// Counters for one `draw_frame` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub frame_index: u64,
    /// Ready model programs visited.
    pub model_programs: usize,
    /// Times a model program was made current.
    pub program_switches: usize,
    /// Draw callbacks that returned `Ok`.
    pub draw_callbacks: usize,
    /// Post-processing programs that drew successfully.
    pub post_processors: usize,
    /// Failed activations, callbacks and passes. Each one is logged.
    pub errors: usize,
}

/// Drives one registry per frame.
///
/// A failing callback or pass is logged and skipped; the frame always completes.
#[derive(Debug, Default)]
pub struct FrameDriver {
    config: FrameDriverConfig,
    frame_index: u64,
}

impl FrameDriver {
    pub fn new(config: FrameDriverConfig) -> Self {
        Self { config, frame_index: 0 }
    }

    pub fn config(&self) -> &FrameDriverConfig {
        &self.config
    }

    /// Frames drawn so far.
    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    /// One-time context setup: clear values and depth testing.
    pub fn init_context<G: GlApi>(&self, gl: &G) {
        let [r, g, b, a] = self.config.clear_color;
        gl.clear_color(r, g, b, a);
        gl.clear_depth(self.config.clear_depth);
        if self.config.depth_test {
            gl.enable(glow::DEPTH_TEST);
            gl.depth_func(glow::LEQUAL);
        }
    }

    /// Applies a new drawable size to the GL viewport and every render target.
    pub fn resize<G: GlApi>(&self, registry: &PipelineRegistry<G>, width: u32, height: u32) {
        let (width, height) = (width.max(1), height.max(1));
        registry.gl().viewport(0, 0, width as i32, height as i32);
        registry.resize_all_targets(width, height);
        log::debug!("viewport resized to {width}x{height}");
    }

    /// Draws one frame.
    ///
    /// Pending program loads are polled first, so programs that finished compiling since the
    /// last frame take part in this one.
    pub fn draw_frame<G: GlApi>(&mut self, registry: &PipelineRegistry<G>) -> FrameStats {
        registry.poll_pending();

        let mut stats = FrameStats { frame_index: self.frame_index, ..FrameStats::default() };
        self.frame_index += 1;

        let gl = registry.gl();
        if self.config.depth_test {
            // Post-processing state hooks may have switched it off last frame.
            gl.enable(glow::DEPTH_TEST);
        }
        gl.bind_framebuffer(None);
        gl.clear(glow::COLOR_BUFFER_BIT | glow::DEPTH_BUFFER_BIT);

        let post_processing = registry.is_using_post_processing();
        if post_processing {
            match registry.framebuffer(MODELS_TARGET_ID) {
                Some(framebuffer) => {
                    gl.bind_framebuffer(Some(framebuffer));
                    gl.clear(glow::COLOR_BUFFER_BIT | glow::DEPTH_BUFFER_BIT);
                }
                None => {
                    log::error!("models target missing; drawing models to the screen");
                    stats.errors += 1;
                }
            }
        }

        self.draw_models(registry, &mut stats);

        if post_processing {
            gl.bind_framebuffer(None);
            gl.use_program(None);
            registry.for_each_post_processor(|program| match program.draw_post_process(registry) {
                Ok(()) => stats.post_processors += 1,
                Err(err) => {
                    log::error!("post-processing pass `{}` skipped: {err}", program.id());
                    stats.errors += 1;
                }
            });
        }

        stats
    }

    fn draw_models<G: GlApi>(&self, registry: &PipelineRegistry<G>, stats: &mut FrameStats) {
        let mut current: Option<Rc<RenderProgram<G>>> = None;

        registry.for_each_model_program(|program, callbacks| {
            stats.model_programs += 1;
            if callbacks.is_empty() {
                return;
            }

            let switched = current.as_ref().is_none_or(|c| !Rc::ptr_eq(c, program));
            if switched {
                if let Err(err) = program.set_active() {
                    log::error!("model program `{}` skipped: {err}", program.id());
                    stats.errors += 1;
                    current = None;
                    return;
                }
                stats.program_switches += 1;
                current = Some(Rc::clone(program));
            }

            for callback in callbacks {
                match callback.invoke(program) {
                    Ok(()) => stats.draw_callbacks += 1,
                    Err(err) => {
                        log::error!("draw callback on `{}` failed: {err}", program.id());
                        stats.errors += 1;
                    }
                }
            }
        });
    }
}

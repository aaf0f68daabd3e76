//! Bloom: bright areas of the rendered scene bleed light into their surroundings.
//!
//! The effect is a composite of four passes. A brightness filter copies the bright parts of the
//! models target into the first ping-pong target, alternating horizontal and vertical Gaussian
//! blurs bounce the image between the two ping-pong targets, and a blend pass adds the result
//! back onto the scene on the screen.

use crate::gl::GlApi;
use crate::pipeline::{
    ExecutionPlanStep, ProgramDescriptor, ShaderSource, TargetDecl, MODELS_TARGET_ID,
};

use super::fullscreen::FullscreenPass;

pub const BLOOM_PROGRAM_ID: &str = "bloom-program";

const POST_PROCESSOR_VERT: &str = include_str!("shaders/post-processor.vert");
const BRIGHTNESS_FRAG: &str = include_str!("shaders/brightness-filter.frag");
const BLUR_HORIZONTAL_FRAG: &str = include_str!("shaders/blur-horizontal.frag");
const BLUR_VERTICAL_FRAG: &str = include_str!("shaders/blur-vertical.frag");
const BLEND_FRAG: &str = include_str!("shaders/blend.frag");

#[derive(Debug, Clone, PartialEq)]
pub struct BloomConfig {
    pub id: String,
    pub render_priority: i32,
    /// Horizontal + vertical blur pairs. More pairs widen the glow.
    pub blur_passes: usize,
    /// Relative luminance above which a pixel contributes to the glow.
    pub brightness_threshold: f32,
}

impl Default for BloomConfig {
    fn default() -> Self {
        Self {
            id: BLOOM_PROGRAM_ID.to_string(),
            render_priority: 1,
            blur_passes: 4,
            brightness_threshold: 0.7,
        }
    }
}

/// Child program and target ids of one bloom instance, all prefixed with its id so that
/// several instances can be registered side by side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BloomIds {
    pub brightness: String,
    pub blur_horizontal: String,
    pub blur_vertical: String,
    pub blend: String,
    /// Cleared at the start of every bloom draw.
    pub target_1: String,
    pub target_2: String,
}

impl BloomIds {
    pub fn new(id: &str) -> Self {
        Self {
            brightness: format!("{id}-brightness"),
            blur_horizontal: format!("{id}-blur-horizontal"),
            blur_vertical: format!("{id}-blur-vertical"),
            blend: format!("{id}-blend"),
            target_1: format!("{id}-framebuffer-1"),
            target_2: format!("{id}-framebuffer-2"),
        }
    }
}

impl BloomConfig {
    pub fn ids(&self) -> BloomIds {
        BloomIds::new(&self.id)
    }
}

/// brightness(models -> 1), `blur_passes` x [horizontal(1 -> 2), vertical(2 -> 1)],
/// blend([models, 1] -> screen).
pub fn bloom_plan(ids: &BloomIds, blur_passes: usize) -> Vec<ExecutionPlanStep> {
    let (t1, t2) = (ids.target_1.as_str(), ids.target_2.as_str());
    let mut plan = Vec::with_capacity(2 * blur_passes + 2);
    plan.push(ExecutionPlanStep::new(&ids.brightness, &[MODELS_TARGET_ID], Some(t1)));
    for _ in 0..blur_passes {
        plan.push(ExecutionPlanStep::new(&ids.blur_horizontal, &[t1], Some(t2)));
        plan.push(ExecutionPlanStep::new(&ids.blur_vertical, &[t2], Some(t1)));
    }
    plan.push(ExecutionPlanStep::new(&ids.blend, &[MODELS_TARGET_ID, t1], None));
    plan
}

fn pass<G: GlApi>(id: &str, fragment: &'static str, pass: FullscreenPass<G>) -> ProgramDescriptor<G> {
    ProgramDescriptor::leaf(id, ShaderSource::inline(POST_PROCESSOR_VERT), ShaderSource::inline(fragment))
        .pass_variables(pass)
}

/// Builds the bloom composite, ready for `PipelineRegistry::register`.
pub fn bloom_descriptor<G: GlApi>(config: &BloomConfig) -> ProgramDescriptor<G> {
    let ids = config.ids();
    let children = vec![
        pass(
            &ids.brightness,
            BRIGHTNESS_FRAG,
            FullscreenPass::new(&ids.brightness, &["uSampler"])
                .with_uniform("uBrightnessThreshold", config.brightness_threshold),
        ),
        pass(
            &ids.blur_horizontal,
            BLUR_HORIZONTAL_FRAG,
            FullscreenPass::new(&ids.blur_horizontal, &["uSampler"])
                .with_size_uniform("uSamplerSize"),
        ),
        pass(
            &ids.blur_vertical,
            BLUR_VERTICAL_FRAG,
            FullscreenPass::new(&ids.blur_vertical, &["uSampler"])
                .with_size_uniform("uSamplerSize"),
        ),
        pass(
            &ids.blend,
            BLEND_FRAG,
            FullscreenPass::new(&ids.blend, &["uModelsSampler", "uBrightnessSampler"]),
        ),
    ];

    let plan = bloom_plan(&ids, config.blur_passes);
    let targets = vec![TargetDecl::new(&ids.target_1).cleared(), TargetDecl::new(&ids.target_2)];

    ProgramDescriptor::composite(config.id.clone(), children, plan, targets)
        .priority(config.render_priority)
        .on_state_bind(|gl: &G| {
            gl.disable(glow::DEPTH_TEST);
            gl.disable(glow::BLEND);
        })
}

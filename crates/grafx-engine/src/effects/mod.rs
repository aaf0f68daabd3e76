//! Ready-made post-processing effects.

mod bloom;
mod fullscreen;

pub use bloom::{bloom_descriptor, bloom_plan, BloomConfig, BloomIds, BLOOM_PROGRAM_ID};
pub use fullscreen::{
    create_2d_square_positions, FullscreenPass, POSITION_ATTRIBUTE, SQUARE_VERTEX_COUNT,
};

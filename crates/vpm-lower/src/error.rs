use thiserror::Error;
use vpm_ir::{Stage, VerifyError};

use crate::limits::{MAX_GS_VERTEX_DATA_SIZE, MAX_VARYING_SLOTS};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LowerIoError {
    #[error("VPM output lowering is not supported for {0} shaders")]
    UnsupportedStage(Stage),
    #[error("compile key is for a {key} shader but the shader is a {shader} shader")]
    KeyStageMismatch { key: Stage, shader: Stage },
    #[error("{count} used outputs exceed the limit of {}", MAX_VARYING_SLOTS)]
    TooManyUsedOutputs { count: usize },
    #[error(
        "geometry vertex data size {size} exceeds the header field maximum of {}",
        MAX_GS_VERTEX_DATA_SIZE
    )]
    VertexDataTooLarge { size: u32 },
    #[error("invalid shader: {0}")]
    InvalidShader(#[from] VerifyError),
}

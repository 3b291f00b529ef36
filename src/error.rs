/// Convenience result type used by the rendering core.
pub type Result<T> = std::result::Result<T, FxError>;

/// Errors raised by the render graph, the guided filter and the compositor.
///
/// Construction-time failures (context, capabilities, shader compile/link)
/// abort `setup()` and must reach the caller. Per-frame problems such as an
/// incomplete render target are logged instead of returned.
#[derive(thiserror::Error, Debug)]
pub enum FxError {
    /// The rendering context could not be created or has been lost.
    #[error("rendering context unavailable: {0}")]
    ContextUnavailable(String),

    /// A capability the pipeline depends on is missing from the backend.
    #[error("missing capability: {0}")]
    MissingCapability(&'static str),

    /// A fragment program failed interface validation.
    #[error("shader compile failed for `{stage}`: {reason}")]
    ShaderCompile { stage: String, reason: String },

    /// The vertex stage does not produce what the fragment stage consumes.
    #[error("shader link failed for `{stage}`: {reason}")]
    ShaderLink { stage: String, reason: String },

    /// A stage name was used before it was compiled.
    #[error("unknown shader stage `{0}`")]
    UnknownStage(String),

    /// A texture name was read before it was created or uploaded.
    #[error("unknown texture `{0}`")]
    UnknownTexture(String),

    /// A render target name was bound before it was created.
    #[error("unknown render target `{0}`")]
    UnknownTarget(String),

    /// A draw was issued without an active stage.
    #[error("no active shader stage")]
    NoActiveStage,

    /// A draw would read a texture attached to the bound write target.
    #[error("feedback loop: texture `{0}` is both read and written")]
    FeedbackLoop(String),

    /// Pixel data or dimensions do not agree.
    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),

    /// A draw was requested before its inputs were provided.
    #[error("missing input: {0}")]
    MissingInput(&'static str),

    /// The wgpu device rejected a pipeline, copy or buffer mapping.
    #[error("gpu device error: {0}")]
    Device(String),
}

impl FxError {
    pub fn compile(stage: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ShaderCompile {
            stage: stage.into(),
            reason: reason.into(),
        }
    }

    pub fn link(stage: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ShaderLink {
            stage: stage.into(),
            reason: reason.into(),
        }
    }

    pub fn shape(msg: impl Into<String>) -> Self {
        Self::ShapeMismatch(msg.into())
    }
}

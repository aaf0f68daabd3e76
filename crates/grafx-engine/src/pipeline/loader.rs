//! Shader source providers for `ShaderSource::Path`.

use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::{anyhow, Context as _};
use futures_util::future::{self, FutureExt, LocalBoxFuture};

/// Asynchronously resolves a shader path to GLSL text.
pub trait ShaderLoader {
    fn load(&self, path: &str) -> LocalBoxFuture<'static, anyhow::Result<String>>;
}

/// Rejects every path; for registries that only ever see inline sources.
#[derive(Debug, Default, Copy, Clone)]
pub struct InlineOnly;

impl ShaderLoader for InlineOnly {
    fn load(&self, path: &str) -> LocalBoxFuture<'static, anyhow::Result<String>> {
        future::ready(Err(anyhow!("no shader loader configured (requested `{path}`)"))).boxed_local()
    }
}

/// Reads shader files relative to a root directory.
#[derive(Debug, Clone)]
pub struct FsShaderLoader {
    root: PathBuf,
}

impl FsShaderLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl ShaderLoader for FsShaderLoader {
    fn load(&self, path: &str) -> LocalBoxFuture<'static, anyhow::Result<String>> {
        let full = self.root.join(path);
        let result = std::fs::read_to_string(&full)
            .with_context(|| format!("failed to read {}", full.display()));
        future::ready(result).boxed_local()
    }
}

/// In-memory sources, e.g. shaders embedded with `include_str!`.
#[derive(Debug, Clone, Default)]
pub struct StaticShaderLoader {
    sources: HashMap<String, String>,
}

impl StaticShaderLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, path: impl Into<String>, source: impl Into<String>) -> Self {
        self.sources.insert(path.into(), source.into());
        self
    }
}

impl ShaderLoader for StaticShaderLoader {
    fn load(&self, path: &str) -> LocalBoxFuture<'static, anyhow::Result<String>> {
        let result = self
            .sources
            .get(path)
            .cloned()
            .ok_or_else(|| anyhow!("unknown shader `{path}`"));
        future::ready(result).boxed_local()
    }
}

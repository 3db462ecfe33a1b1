//! Shader code resolution.
//!
//! A shader is named by an identifier (a path without extension). Resolution
//! prefers a precompiled SPIR-V binary at `identifier.<binary_extension>` and
//! falls back to source at `identifier.<source_extension>`, which the device
//! compiles when the shader object is created.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// First word of every SPIR-V module.
const SPIRV_MAGIC: u32 = 0x0723_0203;

/// Pipeline stage a shader targets.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl ShaderStage {
    pub fn name(self) -> &'static str {
        match self {
            ShaderStage::Vertex => "vertex",
            ShaderStage::Fragment => "fragment",
        }
    }
}

/// Resolved shader code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShaderCode {
    /// Precompiled SPIR-V words.
    Binary(Vec<u32>),
    /// WGSL source, compiled by the device.
    Source(String),
}

/// Everything a device needs to create one shader object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderProgram {
    pub stage: ShaderStage,
    pub entry_point: String,
    /// Compile sources with full validation.
    pub strict: bool,
    pub code: ShaderCode,
    /// File the code was read from.
    pub origin: PathBuf,
}

impl ShaderProgram {
    pub fn is_source(&self) -> bool {
        matches!(self.code, ShaderCode::Source(_))
    }
}

/// Shader lookup and compilation options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderConfig {
    /// Extension of precompiled binaries (without the dot).
    pub binary_extension: String,

    /// Extension of shader sources (without the dot).
    pub source_extension: String,

    /// Entry point every stage is compiled from.
    pub entry_point: String,

    /// Enables strict validation when compiling sources.
    pub strict: bool,
}

impl Default for ShaderConfig {
    fn default() -> Self {
        Self {
            binary_extension: "spv".to_string(),
            source_extension: "wgsl".to_string(),
            entry_point: "main".to_string(),
            strict: true,
        }
    }
}

#[derive(Debug, Error)]
pub enum ShaderError {
    #[error(
        "no shader for `{identifier}`: {} and {} are both unavailable ({reason})",
        .binary_path.display(),
        .source_path.display()
    )]
    NotFound {
        identifier: String,
        binary_path: PathBuf,
        source_path: PathBuf,
        reason: io::Error,
    },

    #[error("failed to compile {}: {message}", .path.display())]
    Compilation { path: PathBuf, message: String },
}

/// Resolves shader identifiers to [`ShaderProgram`]s.
#[derive(Debug, Clone, Default)]
pub struct ShaderResolver {
    config: ShaderConfig,
}

impl ShaderResolver {
    pub fn new(config: ShaderConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ShaderConfig {
        &self.config
    }

    pub fn binary_path(&self, identifier: &str) -> PathBuf {
        PathBuf::from(format!("{identifier}.{}", self.config.binary_extension))
    }

    pub fn source_path(&self, identifier: &str) -> PathBuf {
        PathBuf::from(format!("{identifier}.{}", self.config.source_extension))
    }

    /// Resolves `identifier` for `stage`.
    ///
    /// A binary that is missing, unreadable or not SPIR-V falls through to the
    /// source form. Fails only when neither form can be read.
    pub fn resolve(&self, identifier: &str, stage: ShaderStage) -> Result<ShaderProgram, ShaderError> {
        let binary_path = self.binary_path(identifier);
        match read_spirv(&binary_path) {
            Ok(words) => {
                log::debug!(
                    "loaded precompiled {} shader {} ({} words)",
                    stage.name(),
                    binary_path.display(),
                    words.len()
                );
                return Ok(self.program(stage, ShaderCode::Binary(words), binary_path));
            }
            Err(err) if err.kind() == io::ErrorKind::InvalidData => {
                log::warn!("ignoring {}: {err}", binary_path.display());
            }
            Err(err) => {
                log::debug!("no precompiled shader at {}: {err}", binary_path.display());
            }
        }

        let source_path = self.source_path(identifier);
        match std::fs::read_to_string(&source_path) {
            Ok(text) => {
                log::debug!("compiling {} shader from {}", stage.name(), source_path.display());
                Ok(self.program(stage, ShaderCode::Source(text), source_path))
            }
            Err(reason) => Err(ShaderError::NotFound {
                identifier: identifier.to_string(),
                binary_path,
                source_path,
                reason,
            }),
        }
    }

    fn program(&self, stage: ShaderStage, code: ShaderCode, origin: PathBuf) -> ShaderProgram {
        ShaderProgram {
            stage,
            entry_point: self.config.entry_point.clone(),
            strict: self.config.strict,
            code,
            origin,
        }
    }
}

/// Reads a SPIR-V module, accepting either byte order.
fn read_spirv(path: &Path) -> io::Result<Vec<u32>> {
    let bytes = std::fs::read(path)?;
    if bytes.is_empty() || bytes.len() % 4 != 0 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("{} bytes is not a whole number of SPIR-V words", bytes.len()),
        ));
    }

    let mut words: Vec<u32> = bytes
        .chunks_exact(4)
        .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect();

    if words[0] == SPIRV_MAGIC.swap_bytes() {
        for w in &mut words {
            *w = w.swap_bytes();
        }
    }

    if words[0] != SPIRV_MAGIC {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("bad SPIR-V magic {:#010x}", words[0]),
        ));
    }

    Ok(words)
}

//! Shader stage and shader model abstractions.
//!
//! A shader model has two independent encodings: the target triple form
//! (`dxil-unknown-shadermodel6.7-compute`) and the module metadata form
//! (`!dx.shaderModel = !{!"cs", i32 6, i32 7}`). This module owns the triple
//! form; the metadata form lives in `crate::metadata`.

use crate::error::Result;
use crate::ir::Module;
use crate::{bail_triple, err_triple};
use std::fmt;

// =============================================================================
// Target triples
// =============================================================================

/// A parsed target descriptor `<arch>-<vendor>-<os>[-<env>]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Triple {
    pub arch: String,
    pub vendor: String,
    pub os: String,
    pub env: String,
}

impl Triple {
    /// Split a triple string into its four fields. Missing trailing fields
    /// are empty, never an error; validation happens at use sites.
    pub fn parse(s: &str) -> Triple {
        let mut parts = s.splitn(4, '-');
        let mut next = || parts.next().unwrap_or("").to_string();
        Triple {
            arch: next(),
            vendor: next(),
            os: next(),
            env: next(),
        }
    }

    pub fn is_dxil(&self) -> bool {
        self.arch == "dxil"
    }

    /// The OS field with its trailing version digits removed.
    fn os_name(&self) -> &str {
        let end = self
            .os
            .find(|c: char| c.is_ascii_digit())
            .unwrap_or(self.os.len());
        &self.os[..end]
    }

    pub fn is_shader_model_os(&self) -> bool {
        self.os_name() == "shadermodel"
    }

    /// Parse the `<major>[.<minor>]` suffix of the OS field.
    pub fn os_version(&self) -> Result<(u32, u32)> {
        let ver = &self.os[self.os_name().len()..];
        let mut parts = ver.splitn(2, '.');
        let major = parts
            .next()
            .filter(|s| !s.is_empty())
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| err_triple!("Invalid OS version in '{}'", self.os))?;
        let minor = match parts.next() {
            None => 0,
            Some(s) => s
                .parse()
                .map_err(|_| err_triple!("Invalid OS version in '{}'", self.os))?,
        };
        Ok((major, minor))
    }
}

// =============================================================================
// Shader stages
// =============================================================================

/// One of the nine shader stages. `Library` is the "no stage" sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShaderStage {
    Pixel,
    Vertex,
    Geometry,
    Hull,
    Domain,
    Compute,
    #[default]
    Library,
    Mesh,
    Amplification,
}

pub const ALL_STAGES: [ShaderStage; 9] = [
    ShaderStage::Pixel,
    ShaderStage::Vertex,
    ShaderStage::Geometry,
    ShaderStage::Hull,
    ShaderStage::Domain,
    ShaderStage::Compute,
    ShaderStage::Library,
    ShaderStage::Mesh,
    ShaderStage::Amplification,
];

impl ShaderStage {
    /// Decode the environment field of a triple. An absent environment is
    /// the library stage, not an error.
    pub fn from_triple(t: &Triple) -> Result<ShaderStage> {
        if t.env.is_empty() {
            return Ok(ShaderStage::Library);
        }
        ShaderStage::from_env_name(&t.env)
            .ok_or_else(|| err_triple!("Invalid shader stage '{}'", t.env))
    }

    /// Decode a long stage name as used in triple environments.
    pub fn from_env_name(name: &str) -> Option<ShaderStage> {
        match name {
            "pixel" => Some(ShaderStage::Pixel),
            "vertex" => Some(ShaderStage::Vertex),
            "geometry" => Some(ShaderStage::Geometry),
            "hull" => Some(ShaderStage::Hull),
            "domain" => Some(ShaderStage::Domain),
            "compute" => Some(ShaderStage::Compute),
            "library" => Some(ShaderStage::Library),
            "mesh" => Some(ShaderStage::Mesh),
            "amplification" => Some(ShaderStage::Amplification),
            _ => None,
        }
    }

    /// Decode a short stage name as used in DXIL metadata.
    pub fn from_short_name(name: &str) -> Result<ShaderStage> {
        let stage = match name {
            "ps" => ShaderStage::Pixel,
            "vs" => ShaderStage::Vertex,
            "gs" => ShaderStage::Geometry,
            "hs" => ShaderStage::Hull,
            "ds" => ShaderStage::Domain,
            "cs" => ShaderStage::Compute,
            "lib" => ShaderStage::Library,
            "ms" => ShaderStage::Mesh,
            "as" => ShaderStage::Amplification,
            _ => bail_triple!("Unknown short shader stage name: '{}'", name),
        };
        Ok(stage)
    }

    pub fn is_library(self) -> bool {
        self == ShaderStage::Library
    }

    /// Short name of the stage, suitable for DXIL metadata.
    pub fn short_name(self) -> &'static str {
        match self {
            ShaderStage::Pixel => "ps",
            ShaderStage::Vertex => "vs",
            ShaderStage::Geometry => "gs",
            ShaderStage::Hull => "hs",
            ShaderStage::Domain => "ds",
            ShaderStage::Compute => "cs",
            ShaderStage::Library => "lib",
            ShaderStage::Mesh => "ms",
            ShaderStage::Amplification => "as",
        }
    }

    /// Long name of the stage, suitable for the triple environment field.
    pub fn env_name(self) -> &'static str {
        match self {
            ShaderStage::Pixel => "pixel",
            ShaderStage::Vertex => "vertex",
            ShaderStage::Geometry => "geometry",
            ShaderStage::Hull => "hull",
            ShaderStage::Domain => "domain",
            ShaderStage::Compute => "compute",
            ShaderStage::Library => "library",
            ShaderStage::Mesh => "mesh",
            ShaderStage::Amplification => "amplification",
        }
    }
}

// =============================================================================
// Shader models
// =============================================================================

/// A shader stage plus a version. The default value (library, 0.0) means
/// "no shader model set".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ShaderModel {
    pub stage: ShaderStage,
    pub major: u32,
    pub minor: u32,
}

impl ShaderModel {
    pub fn new(stage: ShaderStage, major: u32, minor: u32) -> Self {
        ShaderModel { stage, major, minor }
    }

    /// True if no shader model is set.
    pub fn is_empty(&self) -> bool {
        self.stage.is_library() && self.major == 0 && self.minor == 0
    }

    /// Decode the shader model from a module's target triple.
    ///
    /// A completely blank OS field decodes as the empty shader model, to
    /// match how an unversioned shader model behaves.
    pub fn from_triple(m: &Module) -> Result<ShaderModel> {
        let t = Triple::parse(&m.triple);

        if !t.is_dxil() {
            bail_triple!("Cannot get DXIL shader model for arch '{}'", t.arch);
        }
        if t.os.is_empty() {
            return Ok(ShaderModel::default());
        }
        if !t.is_shader_model_os() {
            bail_triple!("Invalid shader model '{}'", t.os);
        }
        let (major, minor) = t.os_version()?;
        let stage = ShaderStage::from_triple(&t)?;

        Ok(ShaderModel::new(stage, major, minor))
    }

    /// The canonical triple string for this shader model.
    pub fn triple_string(&self) -> String {
        format!(
            "dxil-unknown-shadermodel{}.{}-{}",
            self.major,
            self.minor,
            self.stage.env_name()
        )
    }

    /// Serialize this shader model into the module's target triple.
    pub fn embed(&self, m: &mut Module) {
        m.triple = self.triple_string();
    }

    /// Reset the module's triple to a bare target identifier, discarding
    /// version and stage.
    pub fn strip(m: &mut Module) {
        m.triple = "dxil-ms-dx".to_string();
    }

    /// The DXIL version implied by this shader model. Shader model 6.x
    /// corresponds to DXIL 1.x; anything unversioned is DXIL 1.0.
    pub fn dxil_version(&self) -> (u32, u32) {
        if self.major == 6 {
            (1, self.minor)
        } else {
            (1, 0)
        }
    }
}

impl fmt::Display for ShaderModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Format like dxc's target profile option, e.g. "cs_6_7".
        write!(f, "{}_{}", self.stage.short_name(), self.major)?;
        if self.minor == 0xF {
            write!(f, "_x")
        } else {
            write!(f, "_{}", self.minor)
        }
    }
}

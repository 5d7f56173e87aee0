//! DXIL metadata encodings of the shader model and validator version.
//!
//! The named metadata node names (`dx.shaderModel`, `dx.valver`) are part of
//! the wire format and must match exactly. Decoding is strict: a malformed
//! record is surfaced as an error, never guessed at.

use crate::error::Result;
use crate::ir::{MdNode, MdOperand, Module};
use crate::shader_model::{ShaderModel, ShaderStage};
use crate::{bail_metadata, err_metadata};

pub const SHADER_MODEL_MD: &str = "dx.shaderModel";
pub const VALIDATOR_VERSION_MD: &str = "dx.valver";

/// Read the shader model from the `dx.shaderModel` metadata. Zero such
/// metadata decodes as the empty shader model; anything other than exactly
/// one three-operand entry is an encoding error.
pub fn read_dxil(m: &Module) -> Result<ShaderModel> {
    let nodes = match m.named_metadata(SHADER_MODEL_MD) {
        None => return Ok(ShaderModel::default()),
        Some(nodes) => nodes,
    };

    if nodes.len() != 1 {
        bail_metadata!("{} must have one operand", SHADER_MODEL_MD);
    }
    let node = &nodes[0];
    if node.0.len() != 3 {
        bail_metadata!("Shader model must have 3 components, not {}", node.0.len());
    }

    let stage = match &node.0[0] {
        MdOperand::Str(s) => ShaderStage::from_short_name(s)
            .map_err(|e| err_metadata!("{}", e))?,
        _ => bail_metadata!("Shader model stage must be a string"),
    };
    let major = match &node.0[1] {
        MdOperand::Int(i) => *i as u32,
        _ => bail_metadata!("Shader model major version must be an integer"),
    };
    let minor = match &node.0[2] {
        MdOperand::Int(i) => *i as u32,
        _ => bail_metadata!("Shader model minor version must be an integer"),
    };

    Ok(ShaderModel::new(stage, major, minor))
}

/// Embed the shader model as `dx.shaderModel` metadata, replacing any
/// existing entry rather than accumulating duplicates.
pub fn embed_dxil(m: &mut Module, sm: &ShaderModel) {
    let node = MdNode(vec![
        MdOperand::Str(sm.stage.short_name().to_string()),
        MdOperand::Int(sm.major as u64),
        MdOperand::Int(sm.minor as u64),
    ]);
    m.set_named_metadata(SHADER_MODEL_MD, vec![node]);
}

/// Delete the `dx.shaderModel` metadata node entirely, if present.
pub fn strip_dxil(m: &mut Module) -> bool {
    m.erase_named_metadata(SHADER_MODEL_MD)
}

/// Read the deprecated `dx.valver` record, if present. The record is a
/// single node with two integer operands.
pub fn validator_version(m: &Module) -> Result<Option<(u64, u64)>> {
    let nodes = match m.named_metadata(VALIDATOR_VERSION_MD) {
        None => return Ok(None),
        Some(nodes) => nodes,
    };
    if nodes.len() != 1 || nodes[0].0.len() != 2 {
        bail_metadata!("{} must be a single two-component record", VALIDATOR_VERSION_MD);
    }
    match (&nodes[0].0[0], &nodes[0].0[1]) {
        (MdOperand::Int(x), MdOperand::Int(y)) => Ok(Some((*x, *y))),
        _ => Err(err_metadata!(
            "{} components must be integers",
            VALIDATOR_VERSION_MD
        )),
    }
}

/// Delete the `dx.valver` record, if present.
pub fn delete_validator_version(m: &mut Module) -> bool {
    m.erase_named_metadata(VALIDATOR_VERSION_MD)
}

/// Write a `dx.valver` record, replacing any existing one.
pub fn set_validator_version(m: &mut Module, major: u64, minor: u64) {
    let node = MdNode(vec![MdOperand::Int(major), MdOperand::Int(minor)]);
    m.set_named_metadata(VALIDATOR_VERSION_MD, vec![node]);
}

//! Final metadata emission before the module is handed to the container
//! writer.
//!
//! Serializes the shader model back into metadata form, installs a validator
//! version if none survived, and records the resource bindings and
//! per-entry-point shader flags the runtime loader reads.

use crate::error::Result;
use crate::ir::{MdNode, MdOperand, Module};
use crate::metadata;
use crate::resources::ResourceMap;
use crate::shader_model::ShaderModel;
use crate::{bail_metadata, PassStatus};

pub const RESOURCES_MD: &str = "dx.resources";
pub const ENTRY_POINTS_MD: &str = "dx.entryPoints";

/// Validator version written when the module does not carry one.
pub const DEFAULT_VALIDATOR_VERSION: (u64, u64) = (1, 0);

/// Emit the output metadata. `flags` is the module-wide capability flags
/// word computed by the shader flags analysis.
pub fn run(m: &mut Module, resources: &ResourceMap, flags: u64) -> Result<PassStatus> {
    // A missing record gets the default; a record the decoder rejects is
    // replaced rather than aborting emission, since the upgrade pass would
    // have deleted it anyway.
    if !matches!(metadata::validator_version(m), Ok(Some(_))) {
        let (major, minor) = DEFAULT_VALIDATOR_VERSION;
        metadata::set_validator_version(m, major, minor);
    }

    // A module without a resolved shader model cannot be serialized: the
    // stage short name is part of the wire format.
    let sm = ShaderModel::from_triple(m)?;
    if sm.is_empty() {
        bail_metadata!("Module has no shader model in its target triple");
    }
    metadata::embed_dxil(m, &sm);

    if !resources.is_empty() {
        let nodes: Vec<MdNode> = resources
            .iter()
            .map(|(_, info)| {
                MdNode(vec![
                    MdOperand::Int(info.binding.record_id as u64),
                    MdOperand::Int(info.class as u64),
                    MdOperand::Int(info.binding.space as u64),
                    MdOperand::Int(info.binding.lower_bound as u64),
                    MdOperand::Int(info.binding.size as u64),
                ])
            })
            .collect();
        m.set_named_metadata(RESOURCES_MD, nodes);
    }

    let entries: Vec<MdNode> = m
        .functions()
        .filter(|(_, f)| !f.is_declaration())
        .map(|(_, f)| {
            MdNode(vec![
                MdOperand::Str(f.name.clone()),
                MdOperand::Int(flags),
            ])
        })
        .collect();
    m.set_named_metadata(ENTRY_POINTS_MD, entries);

    Ok(PassStatus::Changed)
}

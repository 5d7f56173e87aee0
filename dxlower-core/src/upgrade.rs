//! Upgrade of legacy DXIL metadata into the target triple.
//!
//! Modules produced by older front ends carry the shader model as
//! `dx.shaderModel` metadata and may carry a `dx.valver` record. The rest of
//! the backend reads the shader model from the triple, so this pass moves it
//! there and drops both metadata records.

use crate::error::Result;
use crate::ir::Module;
use crate::metadata;
use crate::PassStatus;
use log::debug;

pub fn run(m: &mut Module) -> Result<PassStatus> {
    let mut changed = false;

    // The validator version record is deleted no matter its shape; this is
    // a one-way migration and the record is never re-derived.
    match metadata::validator_version(m) {
        Ok(Some((major, minor))) => debug!("dropping validator version {}.{} record", major, minor),
        Ok(None) => {}
        Err(e) => debug!("dropping malformed validator version record: {}", e),
    }
    if metadata::delete_validator_version(m) {
        changed = true;
    }

    // Malformed shader model metadata is fatal: silently keeping a stale
    // triple would change which handle-creation path later stages pick.
    let sm = metadata::read_dxil(m)?;
    if !sm.is_empty() {
        sm.embed(m);
        metadata::strip_dxil(m);
        changed = true;
    }

    Ok(if changed {
        PassStatus::Changed
    } else {
        PassStatus::Unchanged
    })
}

//! Static catalog of DXIL operations.
//!
//! Each operation is described by one `OpDesc` record: its stable numeric
//! opcode, its op class name (used in the emitted symbol name), an optional
//! overload rule, and a signature template. The set of opcodes is closed and
//! known at compile time; asking for a descriptor that is not in the table
//! is a programming error, not a recoverable one.

use crate::error::Result;
use crate::ir::{Module, Type, TypeId, ValueId};
use crate::{bail_lower, err_lower};

/// Identifier of one concrete DXIL operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpCode {
    FAbs,
    Saturate,
    IsInf,
    Cos,
    Sin,
    Exp2,
    Frac,
    Log2,
    Sqrt,
    RSqrt,
    RoundNe,
    Floor,
    Ceil,
    Dot2,
    Dot3,
    Dot4,
    CreateHandle,
    BufferLoad,
    BufferStore,
    ThreadId,
    GroupId,
    ThreadIdInGroup,
    FlattenedThreadIdInGroup,
    AnnotateHandle,
    CreateHandleFromBinding,
}

/// Type placeholder used in signature templates and overload sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeSpec {
    Void,
    I1,
    I8,
    I16,
    I32,
    I64,
    F16,
    F32,
    F64,
    /// The resolved overload type of the call.
    Overload,
    /// The reserved `dx.types.Handle` aggregate.
    Handle,
    /// The reserved `dx.types.ResBind` aggregate.
    ResBind,
    /// The reserved `dx.types.ResourceProperties` aggregate.
    ResProps,
    /// The `dx.types.ResRet.*` aggregate parameterized by the overload.
    ResRet,
}

/// Which value a rule inspects to resolve the overload type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverloadAt {
    /// The type of the argument at this position.
    Arg(usize),
    /// The scalar element of the desired result type.
    Ret,
}

#[derive(Debug, Clone, Copy)]
pub struct OverloadRule {
    pub at: OverloadAt,
    pub allowed: &'static [TypeSpec],
}

/// One record of the operation catalog.
#[derive(Debug, Clone, Copy)]
pub struct OpDesc {
    pub op: OpCode,
    /// Stable numeric opcode, injected as the first call argument.
    pub value: u32,
    pub name: &'static str,
    /// Op class name; the emitted symbol is `dx.op.<class>[.<suffix>]`.
    pub class: &'static str,
    pub overload: Option<OverloadRule>,
    pub ret: TypeSpec,
    pub params: &'static [TypeSpec],
}

const FLOATS_ALL: &[TypeSpec] = &[TypeSpec::F16, TypeSpec::F32, TypeSpec::F64];
const FLOATS_HALF_SINGLE: &[TypeSpec] = &[TypeSpec::F16, TypeSpec::F32];
const BUFFER_ELEMS: &[TypeSpec] = &[TypeSpec::F16, TypeSpec::F32, TypeSpec::I16, TypeSpec::I32];
const I32_ONLY: &[TypeSpec] = &[TypeSpec::I32];

const fn arg0(allowed: &'static [TypeSpec]) -> Option<OverloadRule> {
    Some(OverloadRule {
        at: OverloadAt::Arg(0),
        allowed,
    })
}

/// The operation catalog. Ordered by opcode value.
pub const OPS: &[OpDesc] = &[
    OpDesc {
        op: OpCode::FAbs,
        value: 6,
        name: "FAbs",
        class: "unary",
        overload: arg0(FLOATS_ALL),
        ret: TypeSpec::Overload,
        params: &[TypeSpec::Overload],
    },
    OpDesc {
        op: OpCode::Saturate,
        value: 7,
        name: "Saturate",
        class: "unary",
        overload: arg0(FLOATS_ALL),
        ret: TypeSpec::Overload,
        params: &[TypeSpec::Overload],
    },
    OpDesc {
        op: OpCode::IsInf,
        value: 9,
        name: "IsInf",
        class: "isSpecialFloat",
        overload: arg0(FLOATS_HALF_SINGLE),
        ret: TypeSpec::I1,
        params: &[TypeSpec::Overload],
    },
    OpDesc {
        op: OpCode::Cos,
        value: 12,
        name: "Cos",
        class: "unary",
        overload: arg0(FLOATS_HALF_SINGLE),
        ret: TypeSpec::Overload,
        params: &[TypeSpec::Overload],
    },
    OpDesc {
        op: OpCode::Sin,
        value: 13,
        name: "Sin",
        class: "unary",
        overload: arg0(FLOATS_HALF_SINGLE),
        ret: TypeSpec::Overload,
        params: &[TypeSpec::Overload],
    },
    OpDesc {
        op: OpCode::Exp2,
        value: 21,
        name: "Exp",
        class: "unary",
        overload: arg0(FLOATS_HALF_SINGLE),
        ret: TypeSpec::Overload,
        params: &[TypeSpec::Overload],
    },
    OpDesc {
        op: OpCode::Frac,
        value: 22,
        name: "Frc",
        class: "unary",
        overload: arg0(FLOATS_HALF_SINGLE),
        ret: TypeSpec::Overload,
        params: &[TypeSpec::Overload],
    },
    OpDesc {
        op: OpCode::Log2,
        value: 23,
        name: "Log",
        class: "unary",
        overload: arg0(FLOATS_HALF_SINGLE),
        ret: TypeSpec::Overload,
        params: &[TypeSpec::Overload],
    },
    OpDesc {
        op: OpCode::Sqrt,
        value: 24,
        name: "Sqrt",
        class: "unary",
        overload: arg0(FLOATS_HALF_SINGLE),
        ret: TypeSpec::Overload,
        params: &[TypeSpec::Overload],
    },
    OpDesc {
        op: OpCode::RSqrt,
        value: 25,
        name: "Rsqrt",
        class: "unary",
        overload: arg0(FLOATS_HALF_SINGLE),
        ret: TypeSpec::Overload,
        params: &[TypeSpec::Overload],
    },
    OpDesc {
        op: OpCode::RoundNe,
        value: 26,
        name: "Round_ne",
        class: "unary",
        overload: arg0(FLOATS_HALF_SINGLE),
        ret: TypeSpec::Overload,
        params: &[TypeSpec::Overload],
    },
    OpDesc {
        op: OpCode::Floor,
        value: 27,
        name: "Round_ni",
        class: "unary",
        overload: arg0(FLOATS_HALF_SINGLE),
        ret: TypeSpec::Overload,
        params: &[TypeSpec::Overload],
    },
    OpDesc {
        op: OpCode::Ceil,
        value: 28,
        name: "Round_pi",
        class: "unary",
        overload: arg0(FLOATS_HALF_SINGLE),
        ret: TypeSpec::Overload,
        params: &[TypeSpec::Overload],
    },
    OpDesc {
        op: OpCode::Dot2,
        value: 54,
        name: "Dot2",
        class: "dot2",
        overload: arg0(FLOATS_HALF_SINGLE),
        ret: TypeSpec::Overload,
        params: &[TypeSpec::Overload; 4],
    },
    OpDesc {
        op: OpCode::Dot3,
        value: 55,
        name: "Dot3",
        class: "dot3",
        overload: arg0(FLOATS_HALF_SINGLE),
        ret: TypeSpec::Overload,
        params: &[TypeSpec::Overload; 6],
    },
    OpDesc {
        op: OpCode::Dot4,
        value: 56,
        name: "Dot4",
        class: "dot4",
        overload: arg0(FLOATS_HALF_SINGLE),
        ret: TypeSpec::Overload,
        params: &[TypeSpec::Overload; 8],
    },
    OpDesc {
        op: OpCode::CreateHandle,
        value: 57,
        name: "CreateHandle",
        class: "createHandle",
        overload: None,
        ret: TypeSpec::Handle,
        params: &[TypeSpec::I8, TypeSpec::I32, TypeSpec::I32, TypeSpec::I1],
    },
    OpDesc {
        op: OpCode::BufferLoad,
        value: 68,
        name: "BufferLoad",
        class: "bufferLoad",
        overload: Some(OverloadRule {
            at: OverloadAt::Ret,
            allowed: BUFFER_ELEMS,
        }),
        ret: TypeSpec::ResRet,
        params: &[TypeSpec::Handle, TypeSpec::I32, TypeSpec::I32],
    },
    OpDesc {
        op: OpCode::BufferStore,
        value: 69,
        name: "BufferStore",
        class: "bufferStore",
        overload: Some(OverloadRule {
            at: OverloadAt::Arg(3),
            allowed: BUFFER_ELEMS,
        }),
        ret: TypeSpec::Void,
        params: &[
            TypeSpec::Handle,
            TypeSpec::I32,
            TypeSpec::I32,
            TypeSpec::Overload,
            TypeSpec::Overload,
            TypeSpec::Overload,
            TypeSpec::Overload,
            TypeSpec::I8,
        ],
    },
    OpDesc {
        op: OpCode::ThreadId,
        value: 93,
        name: "ThreadId",
        class: "threadId",
        overload: arg0(I32_ONLY),
        ret: TypeSpec::Overload,
        params: &[TypeSpec::I32],
    },
    OpDesc {
        op: OpCode::GroupId,
        value: 94,
        name: "GroupId",
        class: "groupId",
        overload: arg0(I32_ONLY),
        ret: TypeSpec::Overload,
        params: &[TypeSpec::I32],
    },
    OpDesc {
        op: OpCode::ThreadIdInGroup,
        value: 95,
        name: "ThreadIdInGroup",
        class: "threadIdInGroup",
        overload: arg0(I32_ONLY),
        ret: TypeSpec::Overload,
        params: &[TypeSpec::I32],
    },
    OpDesc {
        op: OpCode::FlattenedThreadIdInGroup,
        value: 96,
        name: "FlattenedThreadIdInGroup",
        class: "flattenedThreadIdInGroup",
        overload: Some(OverloadRule {
            at: OverloadAt::Ret,
            allowed: I32_ONLY,
        }),
        ret: TypeSpec::Overload,
        params: &[],
    },
    OpDesc {
        op: OpCode::AnnotateHandle,
        value: 216,
        name: "AnnotateHandle",
        class: "annotateHandle",
        overload: None,
        ret: TypeSpec::Handle,
        params: &[TypeSpec::Handle, TypeSpec::ResProps],
    },
    OpDesc {
        op: OpCode::CreateHandleFromBinding,
        value: 217,
        name: "CreateHandleFromBinding",
        class: "createHandleFromBinding",
        overload: None,
        ret: TypeSpec::Handle,
        params: &[TypeSpec::ResBind, TypeSpec::I32, TypeSpec::I1],
    },
];

/// Look up the catalog record for an opcode.
pub fn descriptor(op: OpCode) -> &'static OpDesc {
    OPS.iter()
        .find(|d| d.op == op)
        .expect("BUG: opcode missing from catalog")
}

/// True if the concrete type matches a scalar type spec.
fn spec_matches(m: &Module, spec: TypeSpec, ty: TypeId) -> bool {
    match (spec, m.ty(ty)) {
        (TypeSpec::Void, Type::Void) => true,
        (TypeSpec::I1, Type::Int { bits: 1 }) => true,
        (TypeSpec::I8, Type::Int { bits: 8 }) => true,
        (TypeSpec::I16, Type::Int { bits: 16 }) => true,
        (TypeSpec::I32, Type::Int { bits: 32 }) => true,
        (TypeSpec::I64, Type::Int { bits: 64 }) => true,
        (TypeSpec::F16, Type::Float { bits: 16 }) => true,
        (TypeSpec::F32, Type::Float { bits: 32 }) => true,
        (TypeSpec::F64, Type::Float { bits: 64 }) => true,
        _ => false,
    }
}

/// Resolve the overload type for an operation against concrete arguments.
///
/// Returns `Ok(None)` when the operation is not overloaded. Fails when the
/// argument list is shorter than the rule requires or when no candidate in
/// the rule's set matches.
pub fn overload_type(
    m: &Module,
    op: OpCode,
    args: &[ValueId],
    ret_ty: TypeId,
) -> Result<Option<TypeId>> {
    let desc = descriptor(op);
    let rule = match &desc.overload {
        None => return Ok(None),
        Some(rule) => rule,
    };

    let candidate = match rule.at {
        OverloadAt::Arg(i) => {
            if i >= args.len() {
                bail_lower!("not enough arguments for DXIL op {}", desc.name);
            }
            m.type_of(args[i])
        }
        OverloadAt::Ret => m.scalar_ty(ret_ty),
    };

    if rule.allowed.iter().any(|&s| spec_matches(m, s, candidate)) {
        return Ok(Some(candidate));
    }
    Err(err_lower!("Invalid overload for DXIL op {}", desc.name))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn concrete(m: &mut Module, spec: TypeSpec) -> TypeId {
        match spec {
            TypeSpec::Void => m.void_ty(),
            TypeSpec::I1 => m.int_ty(1),
            TypeSpec::I8 => m.int_ty(8),
            TypeSpec::I16 => m.int_ty(16),
            TypeSpec::I32 => m.int_ty(32),
            TypeSpec::I64 => m.int_ty(64),
            TypeSpec::F16 => m.float_ty(16),
            TypeSpec::F32 => m.float_ty(32),
            TypeSpec::F64 => m.float_ty(64),
            _ => panic!("not a scalar spec"),
        }
    }

    #[test]
    fn every_rule_resolves_its_allowed_types() {
        for desc in OPS {
            let rule = match &desc.overload {
                None => continue,
                Some(rule) => rule,
            };
            for &allowed in rule.allowed {
                let mut m = Module::new("dxil-unknown-shadermodel6.0-compute");
                let ty = concrete(&mut m, allowed);
                let i32_ty = m.int_ty(32);
                let (args, ret_ty) = match rule.at {
                    OverloadAt::Arg(i) => {
                        let mut args = vec![m.undef(i32_ty); i];
                        args.push(m.undef(ty));
                        (args, m.void_ty())
                    }
                    OverloadAt::Ret => (Vec::new(), ty),
                };
                let resolved = overload_type(&m, desc.op, &args, ret_ty).unwrap();
                assert_eq!(resolved, Some(ty), "op {}", desc.name);
            }
        }
    }

    #[test]
    fn mismatched_type_is_invalid_argument() {
        // A two-element vector matches no scalar spec in any rule.
        for desc in OPS {
            let rule = match &desc.overload {
                None => continue,
                Some(rule) => rule,
            };
            let mut m = Module::new("dxil-unknown-shadermodel6.0-compute");
            let f32_ty = m.float_ty(32);
            let bad = m.vector_ty(f32_ty, 2);
            let (args, ret_ty) = match rule.at {
                OverloadAt::Arg(i) => {
                    let mut args = vec![m.undef(bad); i];
                    args.push(m.undef(bad));
                    (args, m.void_ty())
                }
                // Ret rules look through vectors, so use a bare vector of an
                // unsupported scalar instead.
                OverloadAt::Ret => {
                    let f64_ty = m.float_ty(64);
                    let ret = if desc.op == OpCode::BufferLoad {
                        m.vector_ty(f64_ty, 4)
                    } else {
                        f64_ty
                    };
                    (Vec::new(), ret)
                }
            };
            assert!(
                overload_type(&m, desc.op, &args, ret_ty).is_err(),
                "op {} accepted a mismatched overload",
                desc.name
            );
        }
    }

    #[test]
    fn short_argument_list_is_invalid_argument() {
        for desc in OPS {
            if let Some(OverloadRule {
                at: OverloadAt::Arg(_),
                ..
            }) = desc.overload
            {
                let mut m = Module::new("dxil-unknown-shadermodel6.0-compute");
                let void = m.void_ty();
                let err = overload_type(&m, desc.op, &[], void);
                assert!(err.is_err(), "op {} accepted an empty argument list", desc.name);
            }
        }
    }

    #[test]
    fn non_overloaded_ops_resolve_to_none() {
        for op in [
            OpCode::CreateHandle,
            OpCode::CreateHandleFromBinding,
            OpCode::AnnotateHandle,
        ] {
            let mut m = Module::new("dxil-unknown-shadermodel6.0-compute");
            let void = m.void_ty();
            assert_eq!(overload_type(&m, op, &[], void).unwrap(), None);
        }
    }

    #[test]
    fn opcode_values_are_unique_and_ordered() {
        for pair in OPS.windows(2) {
            assert!(pair[0].value < pair[1].value);
        }
    }
}

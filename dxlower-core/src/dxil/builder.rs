//! Builder for calls to DXIL operations.
//!
//! `OpBuilder` wraps a module-scoped insertion cursor with an API that
//! resolves overloads against the catalog, declares `dx.op.*` functions on
//! first use, and owns the three reserved aggregate types every resource
//! operation traffics in. One builder per module; the reserved types are
//! created exactly once, at construction.

use super::ops::{self, OpCode, TypeSpec};
use crate::error::Result;
use crate::ir::{FuncId, Module, Type, TypeId, ValueId, ValueKind};
use crate::resources::ResourceClass;

pub const OP_NAME_PREFIX: &str = "dx.op.";
pub const HANDLE_TYPE_NAME: &str = "dx.types.Handle";
pub const RES_BIND_TYPE_NAME: &str = "dx.types.ResBind";
pub const RES_PROPS_TYPE_NAME: &str = "dx.types.ResourceProperties";
pub const RES_RET_TYPE_PREFIX: &str = "dx.types.ResRet.";

/// Position in a function body where new instructions are spliced in.
#[derive(Debug, Clone, Copy)]
pub struct InsertPoint {
    pub func: FuncId,
    pub at: usize,
}

pub struct OpBuilder {
    cursor: Option<InsertPoint>,
    handle_ty: TypeId,
    res_bind_ty: TypeId,
    res_props_ty: TypeId,
}

/// Overload suffix for a concrete type: canonical short names for the
/// scalar HLSL types, the raw struct name for aggregates, and the default
/// textual form for anything else.
pub fn overload_suffix(m: &Module, ty: TypeId) -> String {
    match m.ty(ty) {
        Type::Struct { name: Some(name), .. } => name.clone(),
        Type::Float { bits: 16 } => "f16".to_string(),
        Type::Float { bits: 32 } => "f32".to_string(),
        Type::Float { bits: 64 } => "f64".to_string(),
        Type::Int { bits: 1 } => "i1".to_string(),
        Type::Int { bits: 16 } => "i16".to_string(),
        Type::Int { bits: 32 } => "i32".to_string(),
        Type::Int { bits: 64 } => "i64".to_string(),
        _ => m.type_string(ty),
    }
}

impl OpBuilder {
    /// Create the builder and the reserved aggregate types. A pre-existing
    /// definition of any reserved name means some earlier stage already
    /// claimed it, which is a fatal precondition violation (the module's
    /// named-struct registry panics on the collision).
    pub fn new(m: &mut Module) -> Self {
        let ptr = m.ptr_ty();
        let i8_ty = m.int_ty(8);
        let i32_ty = m.int_ty(32);

        let handle_ty = m.named_struct(HANDLE_TYPE_NAME, vec![ptr]);
        let res_bind_ty = m.named_struct(RES_BIND_TYPE_NAME, vec![i32_ty, i32_ty, i32_ty, i8_ty]);
        let res_props_ty = m.named_struct(RES_PROPS_TYPE_NAME, vec![i32_ty, i32_ty]);

        OpBuilder {
            cursor: None,
            handle_ty,
            res_bind_ty,
            res_props_ty,
        }
    }

    pub fn handle_ty(&self) -> TypeId {
        self.handle_ty
    }

    pub fn res_bind_ty(&self) -> TypeId {
        self.res_bind_ty
    }

    pub fn res_props_ty(&self) -> TypeId {
        self.res_props_ty
    }

    /// Get the `dx.types.ResRet.*` aggregate for a scalar element type,
    /// creating it on first use.
    pub fn res_ret_ty(&self, m: &mut Module, scalar: TypeId) -> TypeId {
        let name = format!("{}{}", RES_RET_TYPE_PREFIX, overload_suffix(m, scalar));
        if let Some(ty) = m.get_named_struct(&name) {
            return ty;
        }
        let i32_ty = m.int_ty(32);
        m.named_struct(&name, vec![scalar, scalar, scalar, scalar, i32_ty])
    }

    // -------------------------------------------------------------------------
    // Insertion
    // -------------------------------------------------------------------------

    pub fn set_insert_point_before(&mut self, m: &Module, inst: ValueId) {
        let (func, at) = m
            .position_of(inst)
            .expect("BUG: insertion point is not in a function body");
        self.cursor = Some(InsertPoint { func, at });
    }

    /// Emit an instruction at the cursor and advance past it.
    pub fn emit(&mut self, m: &mut Module, ty: TypeId, kind: ValueKind) -> ValueId {
        let cursor = self
            .cursor
            .as_mut()
            .expect("BUG: emitting without an insertion point");
        let id = m.insert_inst(cursor.func, cursor.at, ty, kind);
        cursor.at += 1;
        id
    }

    pub fn extract_element(&mut self, m: &mut Module, vector: ValueId, index: u32) -> ValueId {
        let elem_ty = match m.ty(m.type_of(vector)) {
            Type::Vector { elem, .. } => *elem,
            _ => panic!("BUG: extractelement from a non-vector"),
        };
        let index = m.const_i32(index as i64);
        self.emit(m, elem_ty, ValueKind::ExtractElement { vector, index })
    }

    pub fn insert_element(
        &mut self,
        m: &mut Module,
        vector: ValueId,
        elem: ValueId,
        index: u32,
    ) -> ValueId {
        let ty = m.type_of(vector);
        let index = m.const_i32(index as i64);
        self.emit(m, ty, ValueKind::InsertElement { vector, elem, index })
    }

    pub fn extract_value(&mut self, m: &mut Module, agg: ValueId, index: u32) -> ValueId {
        let field_ty = match m.ty(m.type_of(agg)) {
            Type::Struct { fields, .. } => fields[index as usize],
            _ => panic!("BUG: extractvalue from a non-aggregate"),
        };
        self.emit(m, field_ty, ValueKind::ExtractValue { agg, index })
    }

    // -------------------------------------------------------------------------
    // DXIL op calls
    // -------------------------------------------------------------------------

    fn materialize(&self, m: &mut Module, spec: TypeSpec, overload: Option<TypeId>) -> TypeId {
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
            TypeSpec::Handle => self.handle_ty,
            TypeSpec::ResBind => self.res_bind_ty,
            TypeSpec::ResProps => self.res_props_ty,
            TypeSpec::Overload => {
                overload.expect("BUG: signature template needs an overload but none was resolved")
            }
            TypeSpec::ResRet => {
                let scalar = overload
                    .expect("BUG: signature template needs an overload but none was resolved");
                self.res_ret_ty(m, scalar)
            }
        }
    }

    /// The complete function type for an opcode once its overload is
    /// resolved: ordered parameter types with the implicit leading opcode
    /// id, plus the return type.
    pub fn op_function_type(
        &self,
        m: &mut Module,
        op: OpCode,
        overload: Option<TypeId>,
    ) -> (Vec<TypeId>, TypeId) {
        let desc = ops::descriptor(op);
        let mut params = vec![m.int_ty(32)];
        for &spec in desc.params {
            params.push(self.materialize(m, spec, overload));
        }
        let ret = self.materialize(m, desc.ret, overload);
        (params, ret)
    }

    /// Build a call to a DXIL operation at the cursor: resolve the overload,
    /// declare the `dx.op.<class>[.<suffix>]` function if needed, prepend
    /// the opcode id, and emit the call. Overload resolution failures
    /// propagate to the caller.
    pub fn try_create_op(
        &mut self,
        m: &mut Module,
        op: OpCode,
        args: Vec<ValueId>,
        ret_ty: TypeId,
    ) -> Result<ValueId> {
        let desc = ops::descriptor(op);
        let overload = ops::overload_type(m, op, &args, ret_ty)?;

        let mut name = format!("{}{}", OP_NAME_PREFIX, desc.class);
        if let Some(overload) = overload {
            name.push('.');
            name.push_str(&overload_suffix(m, overload));
        }

        let (params, ret) = self.op_function_type(m, op, overload);
        let callee = m.get_or_insert_function(&name, params, ret, None);

        // The opcode is injected as the first call argument.
        let mut call_args = vec![m.const_i32(desc.value as i64)];
        call_args.extend(args);

        Ok(self.emit(m, ret, ValueKind::Call { callee, args: call_args }))
    }

    /// Like `try_create_op`, for callers that have already guaranteed the
    /// arguments are valid.
    pub fn create_op(
        &mut self,
        m: &mut Module,
        op: OpCode,
        args: Vec<ValueId>,
        ret_ty: TypeId,
    ) -> ValueId {
        match self.try_create_op(m, op, args, ret_ty) {
            Ok(call) => call,
            Err(e) => panic!("BUG: invalid arguments for operation: {}", e),
        }
    }

    // -------------------------------------------------------------------------
    // Reserved-type constants
    // -------------------------------------------------------------------------

    /// A constant `dx.types.ResBind` value.
    pub fn res_bind(
        &self,
        m: &mut Module,
        lower_bound: u32,
        upper_bound: u32,
        space: u32,
        class: ResourceClass,
    ) -> ValueId {
        let fields = vec![
            m.const_i32(lower_bound as i64),
            m.const_i32(upper_bound as i64),
            m.const_i32(space as i64),
            m.const_i8(class as i64),
        ];
        m.const_struct(self.res_bind_ty, fields)
    }

    /// A constant `dx.types.ResourceProperties` value.
    pub fn res_props(&self, m: &mut Module, word0: u32, word1: u32) -> ValueId {
        let fields = vec![m.const_i32(word0 as i64), m.const_i32(word1 as i64)];
        m.const_struct(self.res_props_ty, fields)
    }
}

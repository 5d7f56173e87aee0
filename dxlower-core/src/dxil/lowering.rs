//! Lowering of generic intrinsics to DXIL operations.
//!
//! For every recognized intrinsic declaration, each call site is rewritten
//! to one or more `dx.op.*` calls through the `OpBuilder`. A call site that
//! fails to lower is recorded as a diagnostic and left in the IR for a later
//! validation stage; the intrinsic function itself is deleted once it has no
//! remaining users.

use super::builder::OpBuilder;
use super::ops::OpCode;
use crate::diags::Diagnostic;
use crate::err_lower;
use crate::error::Result;
use crate::ir::{FuncId, Intrinsic, Module, Type, ValueId, ValueKind};
use crate::resources::ResourceMap;
use crate::shader_model::ShaderModel;
use crate::PassStatus;

/// Which handle-creation sequence the target version uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlePath {
    /// Single `createHandle` op, DXIL versions below 1.6.
    Legacy,
    /// `createHandleFromBinding` followed by `annotateHandle`, 1.6 and up.
    BindAndAnnotate,
}

impl HandlePath {
    pub fn select(sm: &ShaderModel) -> HandlePath {
        if sm.dxil_version() < (1, 6) {
            HandlePath::Legacy
        } else {
            HandlePath::BindAndAnnotate
        }
    }
}

/// Mapping from directly lowered intrinsics to their target opcode.
const INTRINSIC_OPS: &[(Intrinsic, OpCode)] = &[
    (Intrinsic::FAbs, OpCode::FAbs),
    (Intrinsic::Saturate, OpCode::Saturate),
    (Intrinsic::IsInf, OpCode::IsInf),
    (Intrinsic::Cos, OpCode::Cos),
    (Intrinsic::Sin, OpCode::Sin),
    (Intrinsic::Exp2, OpCode::Exp2),
    (Intrinsic::Frac, OpCode::Frac),
    (Intrinsic::Log2, OpCode::Log2),
    (Intrinsic::Sqrt, OpCode::Sqrt),
    (Intrinsic::RSqrt, OpCode::RSqrt),
    (Intrinsic::RoundNe, OpCode::RoundNe),
    (Intrinsic::Floor, OpCode::Floor),
    (Intrinsic::Ceil, OpCode::Ceil),
    (Intrinsic::Dot2, OpCode::Dot2),
    (Intrinsic::Dot3, OpCode::Dot3),
    (Intrinsic::Dot4, OpCode::Dot4),
    (Intrinsic::ThreadId, OpCode::ThreadId),
    (Intrinsic::GroupId, OpCode::GroupId),
    (Intrinsic::ThreadIdInGroup, OpCode::ThreadIdInGroup),
    (Intrinsic::FlattenedThreadIdInGroup, OpCode::FlattenedThreadIdInGroup),
];

fn direct_op(intrinsic: Intrinsic) -> Option<OpCode> {
    INTRINSIC_OPS
        .iter()
        .find(|(i, _)| *i == intrinsic)
        .map(|&(_, op)| op)
}

/// Dot products take their vector arguments flattened to scalars.
fn is_vector_arg_expansion(intrinsic: Intrinsic) -> bool {
    matches!(intrinsic, Intrinsic::Dot2 | Intrinsic::Dot3 | Intrinsic::Dot4)
}

/// Outcome of a lowering run: whether the module changed, plus any
/// per-call-site diagnostics for sites left unlowered.
#[derive(Debug)]
pub struct LowerResult {
    pub status: PassStatus,
    pub diags: Vec<Diagnostic>,
}

pub struct OpLowerer<'a> {
    builder: OpBuilder,
    resources: &'a ResourceMap,
    /// Temporary handle casts pending reconciliation, in creation order.
    cleanup_casts: Vec<ValueId>,
    diags: Vec<Diagnostic>,
}

/// Lower all recognized intrinsics in the module. Running on a module with
/// no recognized intrinsics is a no-op and reports `Unchanged`.
pub fn run(m: &mut Module, resources: &ResourceMap) -> Result<LowerResult> {
    let targets: Vec<(FuncId, Intrinsic)> = m
        .functions()
        .filter(|(_, f)| f.is_declaration())
        .filter_map(|(id, f)| f.intrinsic.map(|i| (id, i)))
        .filter(|&(_, i)| i != Intrinsic::CastHandle)
        .collect();

    if targets.is_empty() {
        return Ok(LowerResult {
            status: PassStatus::Unchanged,
            diags: Vec::new(),
        });
    }

    let mut lowerer = OpLowerer::new(m, resources);
    for (f, intrinsic) in targets {
        match intrinsic {
            Intrinsic::HandleFromBinding => lowerer.lower_handle_from_binding(m, f)?,
            Intrinsic::TypedBufferLoad => lowerer.lower_typed_buffer_load(m, f),
            Intrinsic::TypedBufferStore => lowerer.lower_typed_buffer_store(m, f),
            Intrinsic::CastHandle => unreachable!(),
            other => {
                let op = direct_op(other).expect("BUG: intrinsic without a target opcode");
                lowerer.replace_function_with_op(m, f, op, is_vector_arg_expansion(other));
            }
        }
    }
    lowerer.cleanup_handle_casts(m);

    Ok(LowerResult {
        status: PassStatus::Changed,
        diags: lowerer.diags,
    })
}

impl<'a> OpLowerer<'a> {
    pub fn new(m: &mut Module, resources: &'a ResourceMap) -> Self {
        OpLowerer {
            builder: OpBuilder::new(m),
            resources,
            cleanup_casts: Vec::new(),
            diags: Vec::new(),
        }
    }

    fn call_args(m: &Module, call: ValueId) -> Vec<ValueId> {
        match &m.value(call).kind {
            ValueKind::Call { args, .. } => args.clone(),
            _ => panic!("BUG: intrinsic user is not a call"),
        }
    }

    /// Apply `transform` to every call site of `f`. Failures become
    /// diagnostics and leave the call site untouched. Once all sites are
    /// processed, `f` is deleted if nothing uses it anymore.
    fn replace_function<F>(&mut self, m: &mut Module, f: FuncId, mut transform: F)
    where
        F: FnMut(&mut Self, &mut Module, ValueId) -> Result<()>,
    {
        for call in m.calls_of(f) {
            if let Err(e) = transform(self, m, call) {
                let function = m
                    .containing_function(call)
                    .unwrap_or("<unknown>")
                    .to_string();
                self.diags.push(Diagnostic {
                    function,
                    call,
                    message: e.to_string(),
                });
            }
        }
        if m.calls_of(f).is_empty() {
            m.remove_function(f);
        }
    }

    /// Direct 1:1 lowering: forward the arguments (flattening vectors for
    /// dot products) and call the target op with the intrinsic's declared
    /// return type as the desired result type.
    fn replace_function_with_op(&mut self, m: &mut Module, f: FuncId, op: OpCode, flatten: bool) {
        let ret_ty = m.func(f).ret;
        self.replace_function(m, f, |this, m, call| {
            this.builder.set_insert_point_before(m, call);
            let orig_args = Self::call_args(m, call);
            let args = if flatten {
                this.arg_vector_flatten(m, &orig_args)
            } else {
                orig_args
            };

            let op_call = this.builder.try_create_op(m, op, args, ret_ty)?;

            m.replace_all_uses(call, op_call);
            m.erase_inst(call);
            Ok(())
        });
    }

    /// Flatten every vector argument into its scalar elements, concatenated
    /// in argument order. All vector arguments must share the same element
    /// type and length.
    fn arg_vector_flatten(&mut self, m: &mut Module, args: &[ValueId]) -> Vec<ValueId> {
        assert!(!args.is_empty(), "BUG: flattening an empty argument list");
        let first = match m.ty(m.type_of(args[0])) {
            Type::Vector { elem, count } => (*elem, *count),
            _ => panic!("BUG: vector flattening on a non-vector argument"),
        };

        let mut flattened = Vec::new();
        for &arg in args {
            match m.ty(m.type_of(arg)) {
                Type::Vector { elem, count } => {
                    assert!(
                        (*elem, *count) == first,
                        "BUG: mismatched vector shapes in flattened arguments"
                    );
                }
                _ => panic!("BUG: vector flattening on a non-vector argument"),
            }
            for i in 0..first.1 {
                flattened.push(self.builder.extract_element(m, arg, i));
            }
        }
        flattened
    }

    // -------------------------------------------------------------------------
    // Handle creation
    // -------------------------------------------------------------------------

    /// Dispatch handle creation on the target version.
    fn lower_handle_from_binding(&mut self, m: &mut Module, f: FuncId) -> Result<()> {
        let sm = ShaderModel::from_triple(m)?;
        match HandlePath::select(&sm) {
            HandlePath::Legacy => self.lower_to_create_handle(m, f),
            HandlePath::BindAndAnnotate => self.lower_to_bind_and_annotate_handle(m, f),
        }
        Ok(())
    }

    fn resource_info(
        &self,
        call: ValueId,
    ) -> Result<crate::resources::ResourceInfo> {
        self.resources
            .by_call_site(call)
            .copied()
            .ok_or_else(|| err_lower!("no resource information for handle creation"))
    }

    fn lower_to_create_handle(&mut self, m: &mut Module, f: FuncId) {
        self.replace_function(m, f, |this, m, call| {
            this.builder.set_insert_point_before(m, call);
            let args = Self::call_args(m, call);
            let ri = this.resource_info(call)?;

            let class = m.const_i8(ri.class as i64);
            let record_id = m.const_i32(ri.binding.record_id as i64);
            let op_args = vec![class, record_id, args[3], args[4]];
            let handle_ty = this.builder.handle_ty();
            let op_call = this
                .builder
                .try_create_op(m, OpCode::CreateHandle, op_args, handle_ty)?;

            let cast = this.create_tmp_handle_cast(m, op_call, m.type_of(call));
            m.replace_all_uses(call, cast);
            m.erase_inst(call);
            Ok(())
        });
    }

    fn lower_to_bind_and_annotate_handle(&mut self, m: &mut Module, f: FuncId) {
        self.replace_function(m, f, |this, m, call| {
            this.builder.set_insert_point_before(m, call);
            let args = Self::call_args(m, call);
            let ri = this.resource_info(call)?;

            let res_bind = this.builder.res_bind(
                m,
                ri.binding.lower_bound,
                ri.binding.upper_bound(),
                ri.binding.space,
                ri.class,
            );
            let handle_ty = this.builder.handle_ty();
            let bind = this.builder.try_create_op(
                m,
                OpCode::CreateHandleFromBinding,
                vec![res_bind, args[3], args[4]],
                handle_ty,
            )?;

            let (word0, word1) = ri.annotate_props;
            let props = this.builder.res_props(m, word0, word1);
            let annotated = this.builder.try_create_op(
                m,
                OpCode::AnnotateHandle,
                vec![bind, props],
                handle_ty,
            )?;

            let cast = this.create_tmp_handle_cast(m, annotated, m.type_of(call));
            m.replace_all_uses(call, cast);
            m.erase_inst(call);
            Ok(())
        });
    }

    // -------------------------------------------------------------------------
    // Typed buffer access
    // -------------------------------------------------------------------------

    fn lower_typed_buffer_load(&mut self, m: &mut Module, f: FuncId) {
        self.replace_function(m, f, |this, m, call| {
            this.builder.set_insert_point_before(m, call);
            let args = Self::call_args(m, call);

            let handle = this.create_tmp_handle_cast(m, args[0], this.builder.handle_ty());
            let index0 = args[1];
            let i32_ty = m.int_ty(32);
            let index1 = m.undef(i32_ty);
            let call_ty = m.type_of(call);
            let scalar = m.scalar_ty(call_ty);
            let ret_ty = this.builder.res_ret_ty(m, scalar);

            let op_call =
                this.builder
                    .try_create_op(m, OpCode::BufferLoad, vec![handle, index0, index1], ret_ty)?;

            // The return type switched from a vector to a struct. Forward
            // constant-index element extracts straight to struct fields
            // rather than rebuilding a vector they would immediately pick
            // apart.
            let mut extracts: [Option<ValueId>; 4] = [None; 4];
            for user in m.users_of(call) {
                let kind = m.value(user).kind.clone();
                if let ValueKind::ExtractElement { vector, index } = kind {
                    if vector != call {
                        continue;
                    }
                    if let Some(idx) = m.as_const_int(index) {
                        let idx = idx as usize;
                        assert!(idx < 4, "BUG: index into buffer load out of range");
                        if extracts[idx].is_none() {
                            extracts[idx] =
                                Some(this.builder.extract_value(m, op_call, idx as u32));
                        }
                        m.replace_all_uses(user, extracts[idx].unwrap());
                        m.erase_inst(user);
                    }
                }
            }

            // If there are still uses we need the whole vector after all.
            if !m.users_of(call).is_empty() {
                for (i, slot) in extracts.iter_mut().enumerate() {
                    if slot.is_none() {
                        *slot = Some(this.builder.extract_value(m, op_call, i as u32));
                    }
                }
                let mut vec = m.undef(call_ty);
                for (i, slot) in extracts.iter().enumerate() {
                    vec = this.builder.insert_element(m, vec, slot.unwrap(), i as u32);
                }
                m.replace_all_uses(call, vec);
            }

            m.erase_inst(call);
            Ok(())
        });
    }

    fn lower_typed_buffer_store(&mut self, m: &mut Module, f: FuncId) {
        self.replace_function(m, f, |this, m, call| {
            this.builder.set_insert_point_before(m, call);
            let args = Self::call_args(m, call);

            let handle = this.create_tmp_handle_cast(m, args[0], this.builder.handle_ty());
            let index0 = args[1];
            let i32_ty = m.int_ty(32);
            let index1 = m.undef(i32_ty);
            // Typed stores always cover all four elements.
            let mask = m.const_i8(0xF);

            let data = args[2];
            let data0 = this.builder.extract_element(m, data, 0);
            let data1 = this.builder.extract_element(m, data, 1);
            let data2 = this.builder.extract_element(m, data, 2);
            let data3 = this.builder.extract_element(m, data, 3);

            let void = m.void_ty();
            this.builder.try_create_op(
                m,
                OpCode::BufferStore,
                vec![handle, index0, index1, data0, data1, data2, data3, mask],
                void,
            )?;

            m.erase_inst(call);
            Ok(())
        });
    }

    // -------------------------------------------------------------------------
    // Temporary handle casts
    // -------------------------------------------------------------------------

    /// Insert a bridging cast from `v` to `ty`, tracked for reconciliation
    /// once every intrinsic has been swept.
    fn create_tmp_handle_cast(&mut self, m: &mut Module, v: ValueId, ty: crate::ir::TypeId) -> ValueId {
        let from_ty = m.type_of(v);
        let name = format!(
            "dx.cast.handle.{}.{}",
            super::builder::overload_suffix(m, ty),
            super::builder::overload_suffix(m, from_ty)
        );
        let cast_fn =
            m.get_or_insert_function(&name, vec![from_ty], ty, Some(Intrinsic::CastHandle));
        let cast = self.builder.emit(
            m,
            ty,
            ValueKind::Call {
                callee: cast_fn,
                args: vec![v],
            },
        );
        self.cleanup_casts.push(cast);
        cast
    }

    /// Reconcile temporary handle cast pairs. Every op produces
    /// `dx.types.Handle` at this point, so a cast that yields the handle
    /// type is the second of a pair: forward the original value and delete
    /// it. Casts away from the handle type must end up unused, and all
    /// cast-declaring functions are deleted afterward.
    fn cleanup_handle_casts(&mut self, m: &mut Module) {
        let mut to_remove = Vec::new();
        let mut cast_fns = Vec::new();

        for &cast in &self.cleanup_casts {
            let (callee, operand) = match &m.value(cast).kind {
                ValueKind::Call { callee, args } => (*callee, args[0]),
                _ => panic!("BUG: tracked cast is not a call"),
            };
            cast_fns.push(callee);

            if m.type_of(cast) != self.builder.handle_ty() {
                to_remove.push(cast);
                continue;
            }
            // Second cast of a pair: its operand must be the paired cast.
            let original = match &m.value(operand).kind {
                ValueKind::Call { callee, args }
                    if m.func(*callee).intrinsic == Some(Intrinsic::CastHandle) =>
                {
                    args[0]
                }
                _ => panic!("BUG: unbalanced pair of temporary handle casts"),
            };
            m.replace_all_uses(cast, original);
            m.erase_inst(cast);
        }

        for cast in to_remove {
            assert!(
                m.users_of(cast).is_empty(),
                "BUG: temporary handle cast still has users"
            );
            m.erase_inst(cast);
        }

        cast_fns.sort_unstable_by_key(|f| f.0);
        cast_fns.dedup();
        for f in cast_fns {
            m.remove_function(f);
        }

        self.cleanup_casts.clear();
    }
}

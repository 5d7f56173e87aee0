//! Generic IR substrate for the DXIL lowering backend.
//!
//! This representation uses an arena-based approach where:
//! - Types are interned in a flat arena indexed by `TypeId`
//! - Values (constants, arguments, and instructions) live in a flat arena
//!   indexed by `ValueId`
//! - Functions are tracked in an arena indexed by `FuncId`, with bodies as
//!   ordered lists of instruction `ValueId`s
//!
//! Assumptions:
//! - A front end has already produced the module; this crate only rewrites it
//! - All mutation is single-threaded: replacing and erasing call sites
//!   touches shared use information, so no two passes run concurrently on
//!   one module

use crate::IdArena;
use indexmap::IndexMap;
use std::collections::HashMap;

pub mod display;

// =============================================================================
// ID Types
// =============================================================================

/// Index into the type arena of a module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeId(pub u32);

impl From<u32> for TypeId {
    fn from(id: u32) -> Self {
        TypeId(id)
    }
}

/// Index into the value arena of a module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ValueId(pub u32);

impl From<u32> for ValueId {
    fn from(id: u32) -> Self {
        ValueId(id)
    }
}

/// Index into the function arena of a module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FuncId(pub u32);

impl From<u32> for FuncId {
    fn from(id: u32) -> Self {
        FuncId(id)
    }
}

// =============================================================================
// Types
// =============================================================================

/// A concrete IR type. Anonymous types are interned structurally; struct
/// types are registered by name and never deduplicated across names.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    Void,
    /// Integer of the given bit width (1, 8, 16, 32, 64).
    Int { bits: u32 },
    /// Floating point of the given bit width (16, 32, 64).
    Float { bits: u32 },
    /// Fixed-width vector.
    Vector { elem: TypeId, count: u32 },
    /// Opaque pointer.
    Ptr,
    /// Aggregate. `name` is `Some` for named structs (e.g. the reserved
    /// `dx.types.*` aggregates).
    Struct {
        name: Option<String>,
        fields: Vec<TypeId>,
    },
}

// =============================================================================
// Values and instructions
// =============================================================================

/// Payload of a value. Constants and arguments are free-standing; the
/// instruction variants additionally appear in exactly one function body.
#[derive(Debug, Clone, PartialEq)]
pub enum ValueKind {
    ConstInt { value: i64 },
    ConstFloat { bits: u64 },
    ConstStruct { fields: Vec<ValueId> },
    Undef,
    Argument { func: FuncId, index: u32 },
    Call { callee: FuncId, args: Vec<ValueId> },
    ExtractElement { vector: ValueId, index: ValueId },
    InsertElement { vector: ValueId, elem: ValueId, index: ValueId },
    ExtractValue { agg: ValueId, index: u32 },
}

#[derive(Debug, Clone)]
pub struct ValueData {
    pub ty: TypeId,
    pub kind: ValueKind,
}

impl ValueKind {
    /// Operands of this value, in order. Only instruction operands
    /// participate in use tracking; constant aggregates are leaves from the
    /// perspective of function bodies.
    fn operands(&self) -> Vec<ValueId> {
        match self {
            ValueKind::ConstInt { .. }
            | ValueKind::ConstFloat { .. }
            | ValueKind::Undef
            | ValueKind::Argument { .. } => Vec::new(),
            ValueKind::ConstStruct { fields } => fields.clone(),
            ValueKind::Call { args, .. } => args.clone(),
            ValueKind::ExtractElement { vector, index } => vec![*vector, *index],
            ValueKind::InsertElement { vector, elem, index } => vec![*vector, *elem, *index],
            ValueKind::ExtractValue { agg, .. } => vec![*agg],
        }
    }

    fn replace_operand(&mut self, old: ValueId, new: ValueId) {
        let subst = |v: &mut ValueId| {
            if *v == old {
                *v = new;
            }
        };
        match self {
            ValueKind::ConstInt { .. }
            | ValueKind::ConstFloat { .. }
            | ValueKind::Undef
            | ValueKind::Argument { .. } => {}
            ValueKind::ConstStruct { fields } => fields.iter_mut().for_each(subst),
            ValueKind::Call { args, .. } => args.iter_mut().for_each(subst),
            ValueKind::ExtractElement { vector, index } => {
                subst(vector);
                subst(index);
            }
            ValueKind::InsertElement { vector, elem, index } => {
                subst(vector);
                subst(elem);
                subst(index);
            }
            ValueKind::ExtractValue { agg, .. } => subst(agg),
        }
    }
}

// =============================================================================
// Functions
// =============================================================================

/// Recognized generic intrinsics. The lowering engine dispatches on this tag
/// rather than on function names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Intrinsic {
    // Resource and buffer intrinsics with bespoke lowering.
    HandleFromBinding,
    TypedBufferLoad,
    TypedBufferStore,
    /// Temporary bridge between handle representations. Only created by the
    /// lowering engine itself; must not appear in input IR.
    CastHandle,
    // Dot products: vector arguments are flattened to scalars when lowered.
    Dot2,
    Dot3,
    Dot4,
    // Directly mapped scalar intrinsics.
    FAbs,
    Saturate,
    IsInf,
    Sin,
    Cos,
    Exp2,
    Frac,
    Log2,
    Sqrt,
    RSqrt,
    RoundNe,
    Floor,
    Ceil,
    ThreadId,
    GroupId,
    ThreadIdInGroup,
    FlattenedThreadIdInGroup,
}

/// A function: either a declaration (no body) or a definition whose body is
/// an ordered list of instruction values.
#[derive(Debug, Clone)]
pub struct Function {
    pub name: String,
    pub params: Vec<TypeId>,
    pub ret: TypeId,
    /// Set when this declaration is a recognized generic intrinsic.
    pub intrinsic: Option<Intrinsic>,
    /// `None` for declarations.
    pub body: Option<Vec<ValueId>>,
}

impl Function {
    pub fn is_declaration(&self) -> bool {
        self.body.is_none()
    }
}

// =============================================================================
// Metadata
// =============================================================================

/// Operand of a metadata node: a string or an integer constant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MdOperand {
    Str(String),
    Int(u64),
}

/// A metadata node is an ordered list of operands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MdNode(pub Vec<MdOperand>);

// =============================================================================
// Module
// =============================================================================

/// Root of the IR: owns all types, values, functions, named metadata, and
/// the target triple string.
#[derive(Debug, Clone, Default)]
pub struct Module {
    /// Target descriptor string, `<arch>-<vendor>-<os>[-<env>]`.
    pub triple: String,

    types: Vec<Type>,
    type_cache: HashMap<Type, TypeId>,
    /// Named struct registry. Reserved names must be defined at most once.
    struct_names: IndexMap<String, TypeId>,

    values: IdArena<ValueId, ValueData>,

    funcs: IdArena<FuncId, Function>,
    func_names: IndexMap<String, FuncId>,

    /// Named metadata, e.g. `dx.shaderModel`. Iteration order is insertion
    /// order so printing is deterministic.
    named_md: IndexMap<String, Vec<MdNode>>,
}

impl Module {
    pub fn new(triple: impl Into<String>) -> Self {
        Module {
            triple: triple.into(),
            ..Default::default()
        }
    }

    // -------------------------------------------------------------------------
    // Types
    // -------------------------------------------------------------------------

    /// Intern an anonymous type.
    pub fn intern_type(&mut self, ty: Type) -> TypeId {
        debug_assert!(
            !matches!(&ty, Type::Struct { name: Some(_), .. }),
            "BUG: named structs go through named_struct()"
        );
        if let Some(&id) = self.type_cache.get(&ty) {
            return id;
        }
        let id = TypeId(self.types.len() as u32);
        self.type_cache.insert(ty.clone(), id);
        self.types.push(ty);
        id
    }

    pub fn void_ty(&mut self) -> TypeId {
        self.intern_type(Type::Void)
    }

    pub fn int_ty(&mut self, bits: u32) -> TypeId {
        self.intern_type(Type::Int { bits })
    }

    pub fn float_ty(&mut self, bits: u32) -> TypeId {
        self.intern_type(Type::Float { bits })
    }

    pub fn vector_ty(&mut self, elem: TypeId, count: u32) -> TypeId {
        self.intern_type(Type::Vector { elem, count })
    }

    pub fn ptr_ty(&mut self) -> TypeId {
        self.intern_type(Type::Ptr)
    }

    /// Define a named struct type. Panics if the name is already defined:
    /// reserved type names are a closed namespace owned by this backend.
    pub fn named_struct(&mut self, name: &str, fields: Vec<TypeId>) -> TypeId {
        assert!(
            !self.struct_names.contains_key(name),
            "BUG: named struct '{}' is already defined",
            name
        );
        let id = TypeId(self.types.len() as u32);
        self.types.push(Type::Struct {
            name: Some(name.to_string()),
            fields,
        });
        self.struct_names.insert(name.to_string(), id);
        id
    }

    pub fn get_named_struct(&self, name: &str) -> Option<TypeId> {
        self.struct_names.get(name).copied()
    }

    pub fn ty(&self, id: TypeId) -> &Type {
        &self.types[id.0 as usize]
    }

    /// Scalar element of a type: the element type for vectors, the first
    /// field for structs, the type itself otherwise.
    pub fn scalar_ty(&self, id: TypeId) -> TypeId {
        match self.ty(id) {
            Type::Vector { elem, .. } => *elem,
            Type::Struct { fields, .. } if !fields.is_empty() => fields[0],
            _ => id,
        }
    }

    // -------------------------------------------------------------------------
    // Values
    // -------------------------------------------------------------------------

    pub fn value(&self, id: ValueId) -> &ValueData {
        self.values.get(id).expect("BUG: dangling ValueId")
    }

    pub fn type_of(&self, id: ValueId) -> TypeId {
        self.value(id).ty
    }

    fn alloc_value(&mut self, ty: TypeId, kind: ValueKind) -> ValueId {
        self.values.alloc(ValueData { ty, kind })
    }

    pub fn const_int(&mut self, ty: TypeId, value: i64) -> ValueId {
        self.alloc_value(ty, ValueKind::ConstInt { value })
    }

    pub fn const_i32(&mut self, value: i64) -> ValueId {
        let ty = self.int_ty(32);
        self.const_int(ty, value)
    }

    pub fn const_i8(&mut self, value: i64) -> ValueId {
        let ty = self.int_ty(8);
        self.const_int(ty, value)
    }

    pub fn const_float(&mut self, ty: TypeId, bits: u64) -> ValueId {
        self.alloc_value(ty, ValueKind::ConstFloat { bits })
    }

    pub fn const_struct(&mut self, ty: TypeId, fields: Vec<ValueId>) -> ValueId {
        self.alloc_value(ty, ValueKind::ConstStruct { fields })
    }

    pub fn undef(&mut self, ty: TypeId) -> ValueId {
        self.alloc_value(ty, ValueKind::Undef)
    }

    pub fn argument(&mut self, func: FuncId, index: u32) -> ValueId {
        let ty = self.func(func).params[index as usize];
        self.alloc_value(ty, ValueKind::Argument { func, index })
    }

    /// If the value is a constant integer, return it.
    pub fn as_const_int(&self, id: ValueId) -> Option<i64> {
        match &self.value(id).kind {
            ValueKind::ConstInt { value } => Some(*value),
            _ => None,
        }
    }

    // -------------------------------------------------------------------------
    // Functions
    // -------------------------------------------------------------------------

    pub fn func(&self, id: FuncId) -> &Function {
        self.funcs.get(id).expect("BUG: dangling FuncId")
    }

    pub fn func_mut(&mut self, id: FuncId) -> &mut Function {
        self.funcs.get_mut(id).expect("BUG: dangling FuncId")
    }

    pub fn get_function(&self, name: &str) -> Option<FuncId> {
        self.func_names.get(name).copied()
    }

    /// Iterate over all live functions in insertion order.
    pub fn functions(&self) -> impl Iterator<Item = (FuncId, &Function)> {
        self.func_names.values().map(|&id| (id, self.func(id)))
    }

    /// Declare a function with no body. Panics on name collision.
    pub fn declare_function(
        &mut self,
        name: &str,
        params: Vec<TypeId>,
        ret: TypeId,
        intrinsic: Option<Intrinsic>,
    ) -> FuncId {
        assert!(
            !self.func_names.contains_key(name),
            "BUG: function '{}' is already defined",
            name
        );
        let id = self.funcs.alloc(Function {
            name: name.to_string(),
            params,
            ret,
            intrinsic,
            body: None,
        });
        self.func_names.insert(name.to_string(), id);
        id
    }

    /// Add a function with an empty body; instructions are appended with
    /// `append_inst`.
    pub fn define_function(&mut self, name: &str, params: Vec<TypeId>, ret: TypeId) -> FuncId {
        let id = self.declare_function(name, params, ret, None);
        self.func_mut(id).body = Some(Vec::new());
        id
    }

    /// Look up a declaration by name, declaring it with the given signature
    /// if absent.
    pub fn get_or_insert_function(
        &mut self,
        name: &str,
        params: Vec<TypeId>,
        ret: TypeId,
        intrinsic: Option<Intrinsic>,
    ) -> FuncId {
        if let Some(id) = self.get_function(name) {
            return id;
        }
        self.declare_function(name, params, ret, intrinsic)
    }

    /// Remove a function from the module. The function must have no
    /// remaining call sites.
    pub fn remove_function(&mut self, id: FuncId) {
        debug_assert!(
            self.calls_of(id).is_empty(),
            "BUG: removing function '{}' that still has users",
            self.func(id).name
        );
        let name = self.func(id).name.clone();
        self.func_names.shift_remove(&name);
        self.funcs.remove(id);
    }

    // -------------------------------------------------------------------------
    // Instructions
    // -------------------------------------------------------------------------

    /// Create an instruction value and append it to the function's body.
    pub fn append_inst(&mut self, func: FuncId, ty: TypeId, kind: ValueKind) -> ValueId {
        let at = self
            .func(func)
            .body
            .as_ref()
            .expect("BUG: appending to a declaration")
            .len();
        self.insert_inst(func, at, ty, kind)
    }

    /// Create an instruction value and insert it into the function's body at
    /// the given position.
    pub fn insert_inst(&mut self, func: FuncId, at: usize, ty: TypeId, kind: ValueKind) -> ValueId {
        let id = self.alloc_value(ty, kind);
        let body = self
            .func_mut(func)
            .body
            .as_mut()
            .expect("BUG: inserting into a declaration");
        body.insert(at, id);
        id
    }

    /// Find the function whose body contains the instruction, along with its
    /// position in that body.
    pub fn position_of(&self, inst: ValueId) -> Option<(FuncId, usize)> {
        for (&id, func) in self.funcs.iter() {
            if let Some(body) = &func.body {
                if let Some(at) = body.iter().position(|&v| v == inst) {
                    return Some((id, at));
                }
            }
        }
        None
    }

    /// Name of the function containing the instruction, for diagnostics.
    pub fn containing_function(&self, inst: ValueId) -> Option<&str> {
        let (func, _) = self.position_of(inst)?;
        Some(self.func(func).name.as_str())
    }

    /// All instructions that use `value` as an operand.
    pub fn users_of(&self, value: ValueId) -> Vec<ValueId> {
        let mut users = Vec::new();
        for (_, func) in self.funcs.iter() {
            if let Some(body) = &func.body {
                for &inst in body {
                    if self.value(inst).kind.operands().contains(&value) {
                        users.push(inst);
                    }
                }
            }
        }
        users
    }

    /// All call instructions whose callee is `func`.
    pub fn calls_of(&self, func: FuncId) -> Vec<ValueId> {
        let mut calls = Vec::new();
        for (_, f) in self.funcs.iter() {
            if let Some(body) = &f.body {
                for &inst in body {
                    if let ValueKind::Call { callee, .. } = &self.value(inst).kind {
                        if *callee == func {
                            calls.push(inst);
                        }
                    }
                }
            }
        }
        calls
    }

    /// Rewrite every instruction operand equal to `old` to `new`.
    pub fn replace_all_uses(&mut self, old: ValueId, new: ValueId) {
        assert_ne!(old, new, "BUG: replacing a value with itself");
        let insts: Vec<ValueId> = self
            .funcs
            .values()
            .filter_map(|f| f.body.as_ref())
            .flatten()
            .copied()
            .collect();
        for inst in insts {
            self.values
                .get_mut(inst)
                .expect("BUG: dangling ValueId")
                .kind
                .replace_operand(old, new);
        }
    }

    /// Remove an instruction from its function body. The value itself stays
    /// in the arena but is no longer reachable from any body.
    pub fn erase_inst(&mut self, inst: ValueId) {
        let (func, at) = self
            .position_of(inst)
            .expect("BUG: erasing an instruction that is not in a body");
        self.func_mut(func)
            .body
            .as_mut()
            .expect("BUG: erasing from a declaration")
            .remove(at);
    }

    // -------------------------------------------------------------------------
    // Named metadata
    // -------------------------------------------------------------------------

    pub fn named_metadata(&self, name: &str) -> Option<&Vec<MdNode>> {
        self.named_md.get(name)
    }

    pub fn set_named_metadata(&mut self, name: &str, nodes: Vec<MdNode>) {
        self.named_md.insert(name.to_string(), nodes);
    }

    pub fn erase_named_metadata(&mut self, name: &str) -> bool {
        self.named_md.shift_remove(name).is_some()
    }

    pub fn named_metadata_iter(&self) -> impl Iterator<Item = (&String, &Vec<MdNode>)> {
        self.named_md.iter()
    }
}

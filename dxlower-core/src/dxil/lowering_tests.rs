use super::lowering::{self, HandlePath};
use crate::ir::{FuncId, Intrinsic, Module, TypeId, ValueId, ValueKind};
use crate::resources::{ResourceBinding, ResourceClass, ResourceInfo, ResourceMap};
use crate::shader_model::ShaderModel;
use crate::PassStatus;

fn module(sm: &str) -> (Module, FuncId) {
    let mut m = Module::new(format!("dxil-unknown-shadermodel{}-compute", sm));
    let void = m.void_ty();
    let main = m.define_function("main", vec![], void);
    (m, main)
}

fn call_args(m: &Module, call: ValueId) -> Vec<ValueId> {
    match &m.value(call).kind {
        ValueKind::Call { args, .. } => args.clone(),
        other => panic!("not a call: {:?}", other),
    }
}

fn calls_to(m: &Module, name: &str) -> Vec<ValueId> {
    let f = m
        .get_function(name)
        .unwrap_or_else(|| panic!("no function named '{}'", name));
    m.calls_of(f)
}

fn body_of(m: &Module, f: FuncId) -> Vec<ValueId> {
    m.func(f).body.clone().unwrap()
}

/// Declares a front-end handle-creation intrinsic and returns it along with
/// the front-end handle type (an opaque pointer).
fn declare_handle_intrinsic(m: &mut Module) -> (FuncId, TypeId) {
    let i32_ty = m.int_ty(32);
    let i1_ty = m.int_ty(1);
    let ptr = m.ptr_ty();
    let f = m.declare_function(
        "hlsl.handle.frombinding",
        vec![i32_ty, i32_ty, i32_ty, i32_ty, i1_ty],
        ptr,
        Some(Intrinsic::HandleFromBinding),
    );
    (f, ptr)
}

fn create_handle_call(m: &mut Module, main: FuncId, f: FuncId, ptr: TypeId) -> ValueId {
    let space = m.const_i32(2);
    let lower = m.const_i32(5);
    let range = m.const_i32(4);
    let index = m.const_i32(5);
    let i1_ty = m.int_ty(1);
    let non_uniform = m.const_int(i1_ty, 0);
    m.append_inst(
        main,
        ptr,
        ValueKind::Call {
            callee: f,
            args: vec![space, lower, range, index, non_uniform],
        },
    )
}

fn sample_info() -> ResourceInfo {
    ResourceInfo {
        class: ResourceClass::Uav,
        binding: ResourceBinding {
            record_id: 3,
            space: 2,
            lower_bound: 5,
            size: 4,
        },
        annotate_props: (0x100a, 0x204),
    }
}

fn no_cast_functions_remain(m: &Module) -> bool {
    m.functions()
        .all(|(_, f)| f.intrinsic != Some(Intrinsic::CastHandle))
}

#[test]
fn no_recognized_intrinsics_is_a_no_op() {
    let (mut m, main) = module("6.6");
    let void = m.void_ty();
    let plain = m.declare_function("external.helper", vec![], void, None);
    m.append_inst(
        main,
        void,
        ValueKind::Call {
            callee: plain,
            args: vec![],
        },
    );

    let result = lowering::run(&mut m, &ResourceMap::new()).unwrap();
    assert_eq!(result.status, PassStatus::Unchanged);
    assert!(result.diags.is_empty());
    // The reserved types are only claimed when there is work to do.
    assert!(m.get_named_struct("dx.types.Handle").is_none());

    // Running again changes nothing, down to the printed IR.
    let before = m.to_string();
    let result = lowering::run(&mut m, &ResourceMap::new()).unwrap();
    assert_eq!(result.status, PassStatus::Unchanged);
    assert_eq!(m.to_string(), before);
}

#[test]
fn direct_map_replaces_calls_and_deletes_the_intrinsic() {
    let (mut m, main) = module("6.6");
    let f32_ty = m.float_ty(32);
    let sin = m.declare_function("hlsl.sin", vec![f32_ty], f32_ty, Some(Intrinsic::Sin));
    let x = m.undef(f32_ty);
    let inner = m.append_inst(
        main,
        f32_ty,
        ValueKind::Call {
            callee: sin,
            args: vec![x],
        },
    );
    m.append_inst(
        main,
        f32_ty,
        ValueKind::Call {
            callee: sin,
            args: vec![inner],
        },
    );

    let result = lowering::run(&mut m, &ResourceMap::new()).unwrap();
    assert_eq!(result.status, PassStatus::Changed);
    assert!(result.diags.is_empty());
    assert!(m.get_function("hlsl.sin").is_none());

    let ops = calls_to(&m, "dx.op.unary.f32");
    assert_eq!(ops.len(), 2);
    let first_args = call_args(&m, ops[0]);
    assert_eq!(m.as_const_int(first_args[0]), Some(13));
    assert_eq!(first_args[1], x);
    // The chained use follows the replacement.
    let second_args = call_args(&m, ops[1]);
    assert_eq!(second_args[1], ops[0]);
}

#[test]
fn dot_product_arguments_are_flattened_to_scalars() {
    let (mut m, main) = module("6.6");
    let f32_ty = m.float_ty(32);
    let v2 = m.vector_ty(f32_ty, 2);
    let dot = m.declare_function("hlsl.dot2", vec![v2, v2], f32_ty, Some(Intrinsic::Dot2));
    let a = m.undef(v2);
    let b = m.undef(v2);
    m.append_inst(
        main,
        f32_ty,
        ValueKind::Call {
            callee: dot,
            args: vec![a, b],
        },
    );

    let result = lowering::run(&mut m, &ResourceMap::new()).unwrap();
    assert!(result.diags.is_empty());

    let ops = calls_to(&m, "dx.op.dot2.f32");
    assert_eq!(ops.len(), 1);
    let args = call_args(&m, ops[0]);
    assert_eq!(m.as_const_int(args[0]), Some(54));
    // Opcode plus four scalars, each extracted from a vector argument.
    assert_eq!(args.len(), 5);
    for &arg in &args[1..] {
        assert!(matches!(
            m.value(arg).kind,
            ValueKind::ExtractElement { .. }
        ));
    }
}

#[test]
fn dot3_flattens_both_vectors_in_argument_order() {
    let (mut m, main) = module("6.6");
    let f32_ty = m.float_ty(32);
    let v3 = m.vector_ty(f32_ty, 3);
    let dot = m.declare_function("hlsl.dot3", vec![v3, v3], f32_ty, Some(Intrinsic::Dot3));
    let a = m.undef(v3);
    let b = m.undef(v3);
    m.append_inst(
        main,
        f32_ty,
        ValueKind::Call {
            callee: dot,
            args: vec![a, b],
        },
    );

    let result = lowering::run(&mut m, &ResourceMap::new()).unwrap();
    assert!(result.diags.is_empty());

    let ops = calls_to(&m, "dx.op.dot3.f32");
    assert_eq!(ops.len(), 1);
    let args = call_args(&m, ops[0]);
    assert_eq!(m.as_const_int(args[0]), Some(55));
    assert_eq!(args.len(), 7);

    // [a.x, a.y, a.z, b.x, b.y, b.z]
    let expected = [(a, 0), (a, 1), (a, 2), (b, 0), (b, 1), (b, 2)];
    for (&arg, &(src, elem)) in args[1..].iter().zip(expected.iter()) {
        match &m.value(arg).kind {
            ValueKind::ExtractElement { vector, index } => {
                assert_eq!(*vector, src);
                assert_eq!(m.as_const_int(*index), Some(elem));
            }
            other => panic!("expected a scalar extract: {:?}", other),
        }
    }
}

#[test]
fn handle_path_follows_the_target_version() {
    let legacy = ShaderModel::from_triple(&Module::new("dxil-unknown-shadermodel6.5-compute"))
        .unwrap();
    assert_eq!(HandlePath::select(&legacy), HandlePath::Legacy);

    let modern = ShaderModel::from_triple(&Module::new("dxil-unknown-shadermodel6.6-compute"))
        .unwrap();
    assert_eq!(HandlePath::select(&modern), HandlePath::BindAndAnnotate);

    let newer = ShaderModel::from_triple(&Module::new("dxil-unknown-shadermodel6.8-compute"))
        .unwrap();
    assert_eq!(HandlePath::select(&newer), HandlePath::BindAndAnnotate);
}

#[test]
fn legacy_handle_creation_below_dxil_1_6() {
    let (mut m, main) = module("6.5");
    let (f, ptr) = declare_handle_intrinsic(&mut m);
    let call = create_handle_call(&mut m, main, f, ptr);

    let mut resources = ResourceMap::new();
    resources.insert(call, sample_info());

    let result = lowering::run(&mut m, &resources).unwrap();
    assert_eq!(result.status, PassStatus::Changed);
    assert!(result.diags.is_empty());
    assert!(m.get_function("hlsl.handle.frombinding").is_none());
    assert!(m.get_function("dx.op.createHandleFromBinding").is_none());
    assert!(no_cast_functions_remain(&m));

    let ops = calls_to(&m, "dx.op.createHandle");
    assert_eq!(ops.len(), 1);
    let args = call_args(&m, ops[0]);
    assert_eq!(m.as_const_int(args[0]), Some(57));
    // Resource class and record id come from the analysis, not the call.
    assert_eq!(m.as_const_int(args[1]), Some(ResourceClass::Uav as i64));
    assert_eq!(m.as_const_int(args[2]), Some(3));
}

#[test]
fn bind_and_annotate_handle_creation_at_dxil_1_6() {
    let (mut m, main) = module("6.6");
    let (f, ptr) = declare_handle_intrinsic(&mut m);
    let call = create_handle_call(&mut m, main, f, ptr);

    let mut resources = ResourceMap::new();
    resources.insert(call, sample_info());

    let result = lowering::run(&mut m, &resources).unwrap();
    assert!(result.diags.is_empty());
    assert!(m.get_function("dx.op.createHandle").is_none());
    assert!(no_cast_functions_remain(&m));

    let binds = calls_to(&m, "dx.op.createHandleFromBinding");
    assert_eq!(binds.len(), 1);
    let bind_args = call_args(&m, binds[0]);
    assert_eq!(m.as_const_int(bind_args[0]), Some(217));
    // The binding constant covers [lower, upper] in its space.
    let fields = match &m.value(bind_args[1]).kind {
        ValueKind::ConstStruct { fields } => fields.clone(),
        other => panic!("expected a constant binding: {:?}", other),
    };
    let field_values: Vec<i64> = fields.iter().map(|&f| m.as_const_int(f).unwrap()).collect();
    assert_eq!(field_values, vec![5, 8, 2, ResourceClass::Uav as i64]);

    let annotates = calls_to(&m, "dx.op.annotateHandle");
    assert_eq!(annotates.len(), 1);
    let annotate_args = call_args(&m, annotates[0]);
    assert_eq!(annotate_args[1], binds[0]);
    let props = match &m.value(annotate_args[2]).kind {
        ValueKind::ConstStruct { fields } => fields.clone(),
        other => panic!("expected constant properties: {:?}", other),
    };
    assert_eq!(m.as_const_int(props[0]), Some(0x100a));
    assert_eq!(m.as_const_int(props[1]), Some(0x204));
}

#[test]
fn typed_buffer_load_forwards_constant_extracts() {
    let (mut m, main) = module("6.6");
    let (f, ptr) = declare_handle_intrinsic(&mut m);
    let handle = create_handle_call(&mut m, main, f, ptr);

    let f32_ty = m.float_ty(32);
    let v4 = m.vector_ty(f32_ty, 4);
    let i32_ty = m.int_ty(32);
    let load = m.declare_function(
        "hlsl.buffer.load",
        vec![ptr, i32_ty],
        v4,
        Some(Intrinsic::TypedBufferLoad),
    );
    let index = m.const_i32(7);
    let loaded = m.append_inst(
        main,
        v4,
        ValueKind::Call {
            callee: load,
            args: vec![handle, index],
        },
    );

    let two = m.const_i32(2);
    let e0 = m.append_inst(
        main,
        f32_ty,
        ValueKind::ExtractElement {
            vector: loaded,
            index: two,
        },
    );
    let e1 = m.append_inst(
        main,
        f32_ty,
        ValueKind::ExtractElement {
            vector: loaded,
            index: two,
        },
    );
    let void = m.void_ty();
    let consume = m.declare_function("use.scalar", vec![f32_ty], void, None);
    m.append_inst(
        main,
        void,
        ValueKind::Call {
            callee: consume,
            args: vec![e0],
        },
    );
    m.append_inst(
        main,
        void,
        ValueKind::Call {
            callee: consume,
            args: vec![e1],
        },
    );

    let mut resources = ResourceMap::new();
    resources.insert(handle, sample_info());

    let result = lowering::run(&mut m, &resources).unwrap();
    assert!(result.diags.is_empty());
    assert!(no_cast_functions_remain(&m));

    let loads = calls_to(&m, "dx.op.bufferLoad.f32");
    assert_eq!(loads.len(), 1);
    let load_args = call_args(&m, loads[0]);
    assert_eq!(m.as_const_int(load_args[0]), Some(68));
    // The bridging casts cancel: the op consumes the annotated handle.
    assert_eq!(load_args[1], calls_to(&m, "dx.op.annotateHandle")[0]);
    assert_eq!(load_args[2], index);
    assert_eq!(m.type_of(loads[0]), m.get_named_struct("dx.types.ResRet.f32").unwrap());

    // Both element extracts were forwarded to the same struct field; the
    // vector was never rebuilt.
    let body = body_of(&m, main);
    let extract_values: Vec<ValueId> = body
        .iter()
        .copied()
        .filter(|&v| matches!(m.value(v).kind, ValueKind::ExtractValue { .. }))
        .collect();
    assert_eq!(extract_values.len(), 1);
    assert!(matches!(
        m.value(extract_values[0]).kind,
        ValueKind::ExtractValue { index: 2, .. }
    ));
    assert!(!body
        .iter()
        .any(|&v| matches!(m.value(v).kind, ValueKind::InsertElement { .. })));
    for call in m.calls_of(m.get_function("use.scalar").unwrap()) {
        assert_eq!(call_args(&m, call)[0], extract_values[0]);
    }
}

#[test]
fn typed_buffer_load_rebuilds_vector_for_whole_value_uses() {
    let (mut m, main) = module("6.6");
    let (f, ptr) = declare_handle_intrinsic(&mut m);
    let handle = create_handle_call(&mut m, main, f, ptr);

    let f32_ty = m.float_ty(32);
    let v4 = m.vector_ty(f32_ty, 4);
    let i32_ty = m.int_ty(32);
    let load = m.declare_function(
        "hlsl.buffer.load",
        vec![ptr, i32_ty],
        v4,
        Some(Intrinsic::TypedBufferLoad),
    );
    let index = m.const_i32(0);
    let loaded = m.append_inst(
        main,
        v4,
        ValueKind::Call {
            callee: load,
            args: vec![handle, index],
        },
    );
    let void = m.void_ty();
    let consume = m.declare_function("use.vector", vec![v4], void, None);
    let user = m.append_inst(
        main,
        void,
        ValueKind::Call {
            callee: consume,
            args: vec![loaded],
        },
    );

    let mut resources = ResourceMap::new();
    resources.insert(handle, sample_info());

    let result = lowering::run(&mut m, &resources).unwrap();
    assert!(result.diags.is_empty());

    // All four fields are extracted and reassembled.
    let body = body_of(&m, main);
    let extract_count = body
        .iter()
        .filter(|&&v| matches!(m.value(v).kind, ValueKind::ExtractValue { .. }))
        .count();
    assert_eq!(extract_count, 4);
    let replacement = call_args(&m, user)[0];
    match &m.value(replacement).kind {
        ValueKind::InsertElement { index, .. } => {
            assert_eq!(m.as_const_int(*index), Some(3));
        }
        other => panic!("expected the rebuilt vector: {:?}", other),
    }
}

#[test]
fn typed_buffer_store_decomposes_the_value() {
    let (mut m, main) = module("6.6");
    let (f, ptr) = declare_handle_intrinsic(&mut m);
    let handle = create_handle_call(&mut m, main, f, ptr);

    let f32_ty = m.float_ty(32);
    let v4 = m.vector_ty(f32_ty, 4);
    let i32_ty = m.int_ty(32);
    let void = m.void_ty();
    let store = m.declare_function(
        "hlsl.buffer.store",
        vec![ptr, i32_ty, v4],
        void,
        Some(Intrinsic::TypedBufferStore),
    );
    let index = m.const_i32(9);
    let data = m.undef(v4);
    m.append_inst(
        main,
        void,
        ValueKind::Call {
            callee: store,
            args: vec![handle, index, data],
        },
    );

    let mut resources = ResourceMap::new();
    resources.insert(handle, sample_info());

    let result = lowering::run(&mut m, &resources).unwrap();
    assert!(result.diags.is_empty());
    assert!(m.get_function("hlsl.buffer.store").is_none());
    assert!(no_cast_functions_remain(&m));

    let stores = calls_to(&m, "dx.op.bufferStore.f32");
    assert_eq!(stores.len(), 1);
    let args = call_args(&m, stores[0]);
    assert_eq!(args.len(), 9);
    assert_eq!(m.as_const_int(args[0]), Some(69));
    assert_eq!(args[2], index);
    for &elem in &args[4..8] {
        assert!(matches!(
            m.value(elem).kind,
            ValueKind::ExtractElement { .. }
        ));
    }
    assert_eq!(m.as_const_int(args[8]), Some(0xf));
    assert_eq!(m.type_of(stores[0]), void);
}

#[test]
fn failed_call_site_is_reported_and_left_in_place() {
    let (mut m, main) = module("6.6");
    let f64_ty = m.float_ty(64);
    let sin = m.declare_function("hlsl.sin", vec![f64_ty], f64_ty, Some(Intrinsic::Sin));
    let x = m.undef(f64_ty);
    m.append_inst(
        main,
        f64_ty,
        ValueKind::Call {
            callee: sin,
            args: vec![x],
        },
    );

    let result = lowering::run(&mut m, &ResourceMap::new()).unwrap();
    assert_eq!(result.diags.len(), 1);
    assert_eq!(result.diags[0].function, "main");
    assert!(result.diags[0].message.contains("Invalid overload"));

    // The unlowerable call and its declaration both survive.
    let sin = m.get_function("hlsl.sin").unwrap();
    assert_eq!(m.calls_of(sin).len(), 1);
}

#[test]
fn handle_creation_without_resource_info_is_reported() {
    let (mut m, main) = module("6.6");
    let (f, ptr) = declare_handle_intrinsic(&mut m);
    create_handle_call(&mut m, main, f, ptr);

    let result = lowering::run(&mut m, &ResourceMap::new()).unwrap();
    assert_eq!(result.diags.len(), 1);
    assert!(result.diags[0].message.contains("no resource information"));
    assert!(m.get_function("hlsl.handle.frombinding").is_some());
}

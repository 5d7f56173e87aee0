//! Textual printer for IR modules.
//!
//! The output is deterministic (arena and `IndexMap` iteration order), which
//! lets tests compare whole modules for equality after a pass runs.

use super::{MdOperand, Module, Type, TypeId, ValueId, ValueKind};
use std::fmt;

impl Module {
    pub fn type_string(&self, ty: TypeId) -> String {
        match self.ty(ty) {
            Type::Void => "void".to_string(),
            Type::Int { bits } => format!("i{}", bits),
            Type::Float { bits } => format!("f{}", bits),
            Type::Vector { elem, count } => {
                format!("<{} x {}>", count, self.type_string(*elem))
            }
            Type::Ptr => "ptr".to_string(),
            Type::Struct { name: Some(name), .. } => format!("%{}", name),
            Type::Struct { name: None, fields } => {
                let fields: Vec<_> = fields.iter().map(|&f| self.type_string(f)).collect();
                format!("{{ {} }}", fields.join(", "))
            }
        }
    }

    fn operand_string(&self, v: ValueId) -> String {
        let data = self.value(v);
        let ty = self.type_string(data.ty);
        match &data.kind {
            ValueKind::ConstInt { value } => format!("{} {}", ty, value),
            ValueKind::ConstFloat { bits } => format!("{} 0x{:X}", ty, bits),
            ValueKind::ConstStruct { fields } => {
                let fields: Vec<_> = fields.iter().map(|&f| self.operand_string(f)).collect();
                format!("{} {{ {} }}", ty, fields.join(", "))
            }
            ValueKind::Undef => format!("{} undef", ty),
            ValueKind::Argument { index, .. } => format!("{} %arg{}", ty, index),
            _ => format!("{} %v{}", ty, v.0),
        }
    }

    fn inst_string(&self, v: ValueId) -> String {
        let data = self.value(v);
        match &data.kind {
            ValueKind::Call { callee, args } => {
                let args: Vec<_> = args.iter().map(|&a| self.operand_string(a)).collect();
                format!(
                    "%v{} = call {} @{}({})",
                    v.0,
                    self.type_string(data.ty),
                    self.func(*callee).name,
                    args.join(", ")
                )
            }
            ValueKind::ExtractElement { vector, index } => format!(
                "%v{} = extractelement {}, {}",
                v.0,
                self.operand_string(*vector),
                self.operand_string(*index)
            ),
            ValueKind::InsertElement { vector, elem, index } => format!(
                "%v{} = insertelement {}, {}, {}",
                v.0,
                self.operand_string(*vector),
                self.operand_string(*elem),
                self.operand_string(*index)
            ),
            ValueKind::ExtractValue { agg, index } => format!(
                "%v{} = extractvalue {}, {}",
                v.0,
                self.operand_string(*agg),
                index
            ),
            _ => format!("%v{} = {}", v.0, self.operand_string(v)),
        }
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "target triple = \"{}\"", self.triple)?;

        for (_, func) in self.functions() {
            let params: Vec<_> = func.params.iter().map(|&p| self.type_string(p)).collect();
            let sig = format!(
                "{} @{}({})",
                self.type_string(func.ret),
                func.name,
                params.join(", ")
            );
            match &func.body {
                None => writeln!(f, "declare {}", sig)?,
                Some(body) => {
                    writeln!(f, "define {} {{", sig)?;
                    for &inst in body {
                        writeln!(f, "  {}", self.inst_string(inst))?;
                    }
                    writeln!(f, "}}")?;
                }
            }
        }

        for (name, nodes) in self.named_metadata_iter() {
            let nodes: Vec<_> = nodes
                .iter()
                .map(|node| {
                    let ops: Vec<_> = node
                        .0
                        .iter()
                        .map(|op| match op {
                            MdOperand::Str(s) => format!("!\"{}\"", s),
                            MdOperand::Int(i) => format!("i32 {}", i),
                        })
                        .collect();
                    format!("!{{{}}}", ops.join(", "))
                })
                .collect();
            writeln!(f, "!{} = {}", name, nodes.join(", "))?;
        }
        Ok(())
    }
}

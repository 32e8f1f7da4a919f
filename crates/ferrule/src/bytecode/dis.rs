//! Human-readable listing of code objects.

use std::fmt::Write as _;

use ahash::AHashSet;

use super::{
    code::{Code, Constant},
    op::{Opcode, split_call_arg},
};
use crate::{
    ops::{BinaryOp, CompareOp, UnaryOp},
    value::{bytes_repr, float_repr, str_repr},
};

/// Renders `code` and every nested code constant, one instruction per line.
///
/// ```text
///   3           0 LoadFast                 0 (x)
///               3 LoadConst                0 (1)
///               6 BinaryOp                 0 (+)
///          >>   9 ReturnValue
/// ```
#[must_use]
pub fn disassemble(code: &Code) -> String {
    let mut out = String::new();
    disassemble_into(code, &mut out);
    out
}

fn disassemble_into(code: &Code, out: &mut String) {
    let _ = writeln!(out, "Disassembly of <code object {}>:", code.name());
    let bytecode = code.bytecode();
    let targets = jump_targets(bytecode);
    let mut offset = 0;
    let mut last_line = None;
    while offset < bytecode.len() {
        let line = code.line_for(offset);
        if last_line.is_some() && last_line != Some(line) {
            out.push('\n');
        }
        let line_col = if last_line == Some(line) {
            String::new()
        } else {
            line.to_string()
        };
        last_line = Some(line);
        let marker = if targets.contains(&offset) { ">>" } else { "" };

        let Ok(op) = Opcode::try_from(bytecode[offset]) else {
            let _ = writeln!(out, "{line_col:>4} {marker:>6} {offset:>4} <invalid {}>", bytecode[offset]);
            offset += 1;
            continue;
        };
        let name: &'static str = op.into();
        if op.has_arg() && offset + 2 < bytecode.len() {
            let arg = u16::from_le_bytes([bytecode[offset + 1], bytecode[offset + 2]]);
            let detail = describe_arg(code, op, arg);
            let _ = writeln!(out, "{line_col:>4} {marker:>6} {offset:>4} {name:<20} {arg:>4} {detail}");
        } else {
            let _ = writeln!(out, "{line_col:>4} {marker:>6} {offset:>4} {name}");
        }
        offset += op.size();
    }

    for constant in code.constants() {
        if let Constant::Code(nested) = constant {
            out.push('\n');
            disassemble_into(nested, out);
        }
    }
}

fn jump_targets(bytecode: &[u8]) -> AHashSet<usize> {
    let mut targets = AHashSet::new();
    let mut offset = 0;
    while offset < bytecode.len() {
        let Ok(op) = Opcode::try_from(bytecode[offset]) else {
            offset += 1;
            continue;
        };
        if op.is_jump() && offset + 2 < bytecode.len() {
            targets.insert(usize::from(u16::from_le_bytes([bytecode[offset + 1], bytecode[offset + 2]])));
        }
        offset += op.size();
    }
    targets
}

fn describe_arg(code: &Code, op: Opcode, arg: u16) -> String {
    let index = usize::from(arg);
    let lookup = |table: &[std::sync::Arc<str>]| table.get(index).map_or_else(|| "?".to_owned(), |n| n.to_string());
    let detail = match op {
        Opcode::LoadConst => code
            .constants()
            .get(index)
            .map_or_else(|| "?".to_owned(), constant_repr),
        Opcode::LoadFast | Opcode::StoreFast | Opcode::DeleteFast => lookup(code.varnames()),
        Opcode::LoadGlobal
        | Opcode::StoreGlobal
        | Opcode::DeleteGlobal
        | Opcode::LoadAttr
        | Opcode::StoreAttr
        | Opcode::DeleteAttr
        | Opcode::LoadName
        | Opcode::StoreName
        | Opcode::DeleteName => lookup(code.names()),
        Opcode::LoadDeref | Opcode::StoreDeref | Opcode::LoadClosure => {
            code.deref_name(index).unwrap_or("?").to_owned()
        }
        Opcode::BinaryOp | Opcode::InplaceOp => u8::try_from(arg)
            .ok()
            .and_then(BinaryOp::from_repr)
            .map_or_else(|| "?".to_owned(), |op| op.symbol().to_owned()),
        Opcode::UnaryOp => u8::try_from(arg)
            .ok()
            .and_then(UnaryOp::from_repr)
            .map_or_else(|| "?".to_owned(), |op| op.symbol().to_owned()),
        Opcode::CompareOp => u8::try_from(arg)
            .ok()
            .and_then(CompareOp::from_repr)
            .map_or_else(|| "?".to_owned(), |op| op.symbol().to_owned()),
        Opcode::CallFunction | Opcode::CallFunctionVar | Opcode::CallFunctionKw | Opcode::CallFunctionVarKw => {
            let (positional, keywords) = split_call_arg(arg);
            format!("{positional} positional, {keywords} keyword pair")
        }
        op if op.is_jump() => format!("to {arg}"),
        _ => return String::new(),
    };
    format!("({detail})")
}

/// Source-like rendering of a constant.
#[must_use]
pub fn constant_repr(constant: &Constant) -> String {
    match constant {
        Constant::None => "None".to_owned(),
        Constant::Bool(true) => "True".to_owned(),
        Constant::Bool(false) => "False".to_owned(),
        Constant::Int(i) => i.to_string(),
        Constant::Float(f) => float_repr(*f),
        Constant::Str(s) => str_repr(s),
        Constant::Bytes(data) => bytes_repr(data),
        Constant::Tuple(items) => {
            let parts: Vec<String> = items.iter().map(constant_repr).collect();
            if parts.len() == 1 {
                format!("({},)", parts[0])
            } else {
                format!("({})", parts.join(", "))
            }
        }
        Constant::Code(code) => format!("<code object {}>", code.name()),
    }
}

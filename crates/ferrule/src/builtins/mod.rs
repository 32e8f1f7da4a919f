//! Builtin functions and the method tables of builtin types.
//!
//! Every builtin is a [`NativeFunction`]; the runtime installs [`FUNCTIONS`] and the types in
//! [`EXPOSED_TYPES`] into the builtins namespace and seeds each builtin type's namespace from
//! [`type_methods`].

mod attrs;
mod isinstance;
mod iteration;
mod print;
mod property;
mod type_;

pub(crate) use type_::construct;

use crate::{
    function::NativeFunction,
    types::{BuiltinType, bytes, dict, generator, list},
};

/// Builtin functions, in the order they are installed.
pub(crate) const FUNCTIONS: &[NativeFunction] = &[
    NativeFunction::new("print", print::builtin_print),
    NativeFunction::new("len", iteration::builtin_len),
    NativeFunction::new("iter", iteration::builtin_iter),
    NativeFunction::new("next", iteration::builtin_next),
    NativeFunction::new("repr", iteration::builtin_repr),
    NativeFunction::new("isinstance", isinstance::builtin_isinstance),
    NativeFunction::new("issubclass", isinstance::builtin_issubclass),
    NativeFunction::new("getattr", attrs::builtin_getattr),
    NativeFunction::new("setattr", attrs::builtin_setattr),
    NativeFunction::new("hasattr", attrs::builtin_hasattr),
];

/// Builtin types reachable by name from program code.
pub(crate) const EXPOSED_TYPES: &[BuiltinType] = &[
    BuiltinType::Object,
    BuiltinType::Type,
    BuiltinType::Int,
    BuiltinType::Bool,
    BuiltinType::Float,
    BuiltinType::Str,
    BuiltinType::Bytes,
    BuiltinType::ByteArray,
    BuiltinType::Tuple,
    BuiltinType::List,
    BuiltinType::Dict,
    BuiltinType::Range,
    BuiltinType::Slice,
    BuiltinType::StaticMethod,
    BuiltinType::ClassMethod,
    BuiltinType::Property,
];

/// Methods installed in the namespace of a builtin type.
#[must_use]
pub(crate) fn type_methods(builtin: BuiltinType) -> &'static [NativeFunction] {
    match builtin {
        BuiltinType::List => list::METHODS,
        BuiltinType::Dict => dict::METHODS,
        BuiltinType::Bytes => bytes::BYTES_METHODS,
        BuiltinType::ByteArray => bytes::BYTEARRAY_METHODS,
        BuiltinType::Generator => generator::METHODS,
        BuiltinType::Iterator => iteration::ITERATOR_METHODS,
        BuiltinType::Property => property::METHODS,
        _ => &[],
    }
}

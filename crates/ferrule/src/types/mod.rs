//! Object model: builtin types, the type registry, and the containers values point at.

pub mod byte_buffer;
pub mod bytes;
pub mod dict;
pub mod generator;
pub mod instance;
pub mod iter;
pub mod list;
pub mod mro;
pub mod range;
pub mod slice;
pub mod r#type;

use strum::{Display, EnumIter, IntoStaticStr};

pub use byte_buffer::{BufferError, ByteBuffer};
pub use generator::{Generator, GeneratorState, GeneratorStep};
pub use instance::Instance;
pub use iter::{ByteSource, IterState};
pub use range::Range;
pub use slice::{SliceIndices, SliceValue};
pub use r#type::{TypeId, TypeObject, TypeRegistry};

/// Types the runtime provides out of the box.
///
/// Each variant is registered once per [`Runtime`](crate::Runtime); the display form is the name
/// Python code sees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter, IntoStaticStr)]
pub enum BuiltinType {
    #[strum(serialize = "object")]
    Object,
    #[strum(serialize = "type")]
    Type,
    #[strum(serialize = "NoneType")]
    NoneType,
    #[strum(serialize = "int")]
    Int,
    #[strum(serialize = "bool")]
    Bool,
    #[strum(serialize = "float")]
    Float,
    #[strum(serialize = "str")]
    Str,
    #[strum(serialize = "bytes")]
    Bytes,
    #[strum(serialize = "bytearray")]
    ByteArray,
    #[strum(serialize = "tuple")]
    Tuple,
    #[strum(serialize = "list")]
    List,
    #[strum(serialize = "dict")]
    Dict,
    #[strum(serialize = "range")]
    Range,
    #[strum(serialize = "slice")]
    Slice,
    #[strum(serialize = "function")]
    Function,
    #[strum(serialize = "builtin_function_or_method")]
    BuiltinFunction,
    #[strum(serialize = "method")]
    Method,
    #[strum(serialize = "staticmethod")]
    StaticMethod,
    #[strum(serialize = "classmethod")]
    ClassMethod,
    #[strum(serialize = "property")]
    Property,
    #[strum(serialize = "cell")]
    Cell,
    #[strum(serialize = "code")]
    Code,
    #[strum(serialize = "iterator")]
    Iterator,
    #[strum(serialize = "generator")]
    Generator,
    #[strum(serialize = "traceback")]
    Traceback,
}

impl BuiltinType {
    /// Direct base, `None` for `object`.
    ///
    /// Variants are declared parents-first, so registering them in declaration order always
    /// sees a base before its subclasses.
    #[must_use]
    pub fn parent(self) -> Option<Self> {
        match self {
            Self::Object => None,
            Self::Bool => Some(Self::Int),
            _ => Some(Self::Object),
        }
    }

    /// Whether user classes may list this type as a base.
    #[must_use]
    pub fn is_subclassable(self) -> bool {
        matches!(self, Self::Object)
    }
}

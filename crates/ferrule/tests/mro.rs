//! Class creation through the runtime's type registry: C3 linearization, attribute lookup along
//! the MRO, and the subclass index.

use ferrule::{BuiltinType, Dict, Runtime, TypeId, Value};
use pretty_assertions::assert_eq;

fn class(rt: &Runtime, name: &str, bases: &[TypeId]) -> TypeId {
    rt.create_type(name, bases, Dict::default()).unwrap()
}

fn mro_names(rt: &Runtime, id: TypeId) -> Vec<String> {
    rt.mro(id).into_iter().map(|t| rt.type_name(t).to_string()).collect()
}

#[test]
fn class_without_bases_derives_from_object() {
    let rt = Runtime::new();
    let plain = class(&rt, "Plain", &[]);
    assert_eq!(mro_names(&rt, plain), ["Plain", "object"]);
    assert_eq!(rt.bases(plain), [rt.builtin_type(BuiltinType::Object)]);
}

#[test]
fn diamond_linearization() {
    let rt = Runtime::new();
    let a = class(&rt, "A", &[]);
    let b = class(&rt, "B", &[a]);
    let c = class(&rt, "C", &[a]);
    let d = class(&rt, "D", &[b, c]);
    assert_eq!(mro_names(&rt, d), ["D", "B", "C", "A", "object"]);
    assert!(rt.is_subtype(d, a));
    assert!(!rt.is_subtype(b, c));
}

/// The textbook example where local precedence and monotonicity both matter.
#[test]
fn nested_multiple_inheritance() {
    let rt = Runtime::new();
    let o = rt.builtin_type(BuiltinType::Object);
    let f = class(&rt, "F", &[o]);
    let e = class(&rt, "E", &[o]);
    let dd = class(&rt, "D", &[o]);
    let c = class(&rt, "C", &[dd, f]);
    let b = class(&rt, "B", &[dd, e]);
    let a = class(&rt, "A", &[b, c]);
    assert_eq!(mro_names(&rt, a), ["A", "B", "C", "D", "E", "F", "object"]);
}

#[test]
fn inconsistent_bases_are_rejected() {
    let rt = Runtime::new();
    let a = class(&rt, "A", &[]);
    let b = class(&rt, "B", &[]);
    let x = class(&rt, "X", &[a, b]);
    let y = class(&rt, "Y", &[b, a]);

    let err = rt.create_type("Z", &[x, y], Dict::default()).unwrap_err();
    assert_eq!(
        err.to_string(),
        "TypeError: Cannot create a consistent method resolution order (MRO) for bases A, B"
    );
    assert!(rt.subclasses(x).is_empty());
}

#[test]
fn duplicate_base_is_rejected() {
    let rt = Runtime::new();
    let a = class(&rt, "A", &[]);
    let err = rt.create_type("B", &[a, a], Dict::default()).unwrap_err();
    assert_eq!(err.to_string(), "TypeError: duplicate base class A");
}

#[test]
fn lookup_prefers_nearest_definition() {
    let rt = Runtime::new();
    let mut base_ns = Dict::default();
    base_ns.insert("greeting".into(), Value::str("base"));
    base_ns.insert("shared".into(), Value::Int(1));
    let base = rt.create_type("Base", &[], base_ns).unwrap();

    let mut child_ns = Dict::default();
    child_ns.insert("greeting".into(), Value::str("child"));
    let child = rt.create_type("Child", &[base], child_ns).unwrap();

    assert_eq!(rt.lookup_in_type(child, "greeting"), Some(Value::str("child")));
    assert_eq!(rt.lookup_in_type(child, "shared"), Some(Value::Int(1)));
    assert_eq!(rt.lookup_in_type(child, "missing"), None);
}

#[test]
fn base_mutation_is_visible_to_subclasses() {
    let rt = Runtime::new();
    let base = class(&rt, "Base", &[]);
    let child = class(&rt, "Child", &[base]);
    assert_eq!(rt.lookup_in_type(child, "late"), None);

    rt.set_type_attr(base, "late", Value::Int(7));
    assert_eq!(rt.lookup_in_type(child, "late"), Some(Value::Int(7)));

    rt.delete_type_attr(base, "late").unwrap();
    assert_eq!(rt.lookup_in_type(child, "late"), None);
    let err = rt.delete_type_attr(base, "late").unwrap_err();
    assert_eq!(err.to_string(), "AttributeError: 'Base' object has no attribute 'late'");
}

#[test]
fn retired_types_leave_the_subclass_index() {
    let rt = Runtime::new();
    let base = class(&rt, "Base", &[]);
    let first = class(&rt, "First", &[base]);
    let second = class(&rt, "Second", &[base]);
    assert_eq!(rt.subclasses(base), [first, second]);

    rt.retire_type(first);
    assert_eq!(rt.subclasses(base), [second]);
}

/// Retiring a class in the middle of a chain must not cut its descendants off from cache
/// invalidation.
#[test]
fn assignment_reaches_subclasses_of_retired_types() {
    let rt = Runtime::new();
    let base = class(&rt, "Base", &[]);
    let mid = class(&rt, "Mid", &[base]);
    let leaf = class(&rt, "Leaf", &[mid]);

    rt.set_type_attr(base, "x", Value::Int(1));
    assert_eq!(rt.lookup_in_type(leaf, "x"), Some(Value::Int(1)));
    assert_eq!(rt.lookup_in_type(mid, "x"), Some(Value::Int(1)));

    rt.retire_type(mid);
    rt.set_type_attr(base, "x", Value::Int(2));
    assert_eq!(rt.lookup_in_type(mid, "x"), Some(Value::Int(2)));
    assert_eq!(rt.lookup_in_type(leaf, "x"), Some(Value::Int(2)));
    assert_eq!(rt.subclasses(base), Vec::<TypeId>::new());
}

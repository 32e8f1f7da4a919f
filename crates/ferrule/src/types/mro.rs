//! C3 linearization.
//!
//! The merge is generic over the element type so the algorithm can be tested in isolation; the
//! type registry instantiates it with [`TypeId`].

use crate::{
    exception_private::{ExcType, RunResult},
    resource::{MAX_INHERITANCE_DEPTH, MAX_MRO_LENGTH},
    types::TypeId,
};

/// Merges `seeds` (the MROs of each base followed by the base list itself).
///
/// At every step the first head, in seed order, that appears in no seed's tail is taken and
/// removed from the front of every seed containing it. When no head qualifies the merge fails
/// and the remaining candidate heads are returned.
pub fn merge<T: Copy + Eq>(mut seeds: Vec<Vec<T>>) -> Result<Vec<T>, Vec<T>> {
    // Reversed so the head is at the end and removal is O(1).
    for seed in &mut seeds {
        seed.reverse();
    }
    let mut result = Vec::new();
    loop {
        seeds.retain(|seed| !seed.is_empty());
        if seeds.is_empty() {
            return Ok(result);
        }
        let in_tail = |candidate: T, seeds: &[Vec<T>]| {
            seeds
                .iter()
                .any(|seed| seed[..seed.len() - 1].contains(&candidate))
        };
        let next = seeds
            .iter()
            .filter_map(|seed| seed.last().copied())
            .find(|&candidate| !in_tail(candidate, &seeds));
        let Some(next) = next else {
            let mut candidates: Vec<T> = Vec::new();
            for head in seeds.iter().filter_map(|seed| seed.last().copied()) {
                if !candidates.contains(&head) {
                    candidates.push(head);
                }
            }
            return Err(candidates);
        };
        result.push(next);
        for seed in &mut seeds {
            if seed.last() == Some(&next) {
                seed.pop();
            }
        }
    }
}

/// Computes the MRO of a new type `this` with the given direct bases.
///
/// `base_mro` returns the already computed MRO of a base; `name_of` is used for error messages.
pub(crate) fn linearize(
    this: TypeId,
    bases: &[TypeId],
    object: TypeId,
    base_mro: impl Fn(TypeId) -> Vec<TypeId>,
    name_of: impl Fn(TypeId) -> String,
) -> RunResult<Vec<TypeId>> {
    if bases.is_empty() {
        return Ok(vec![this, object]);
    }
    if bases.contains(&this) {
        return Err(ExcType::type_error("a class cannot inherit from itself"));
    }
    for (i, base) in bases.iter().enumerate() {
        if bases[..i].contains(base) {
            return Err(ExcType::type_error(format_args!(
                "duplicate base class {}",
                name_of(*base)
            )));
        }
    }

    let mut seeds = Vec::with_capacity(bases.len() + 1);
    for &base in bases {
        let mro = base_mro(base);
        if mro.len() > MAX_INHERITANCE_DEPTH {
            return Err(ExcType::type_error(format_args!(
                "inheritance chain too deep (maximum depth {MAX_INHERITANCE_DEPTH})"
            )));
        }
        seeds.push(mro);
    }
    seeds.push(bases.to_vec());

    let tail = merge(seeds).map_err(|candidates| {
        let names: Vec<String> = candidates.into_iter().map(&name_of).collect();
        ExcType::type_error(format_args!(
            "Cannot create a consistent method resolution order (MRO) for bases {}",
            names.join(", ")
        ))
    })?;
    if tail.len() + 1 > MAX_MRO_LENGTH {
        return Err(ExcType::type_error("MRO exceeds maximum length"));
    }
    let mut mro = Vec::with_capacity(tail.len() + 1);
    mro.push(this);
    mro.extend(tail);
    Ok(mro)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chars(s: &str) -> Vec<char> {
        s.chars().collect()
    }

    #[test]
    fn single_inheritance_chain() {
        // C(B), B(A), A(O)
        let merged = merge(vec![chars("BAO"), chars("B")]).unwrap();
        assert_eq!(merged, chars("BAO"));
    }

    #[test]
    fn diamond() {
        // D(B, C), B(A), C(A)
        let merged = merge(vec![chars("BAO"), chars("CAO"), chars("BC")]).unwrap();
        assert_eq!(merged, chars("BCAO"));
    }

    #[test]
    fn earliest_seed_wins_ties() {
        let merged = merge(vec![chars("XO"), chars("YO"), chars("XY")]).unwrap();
        assert_eq!(merged, chars("XYO"));
    }

    #[test]
    fn inconsistent_order_reports_candidates() {
        // X(A, B) and Y(B, A): Z(X, Y) cannot be ordered.
        let err = merge(vec![chars("XABO"), chars("YBAO"), chars("XY")]).unwrap_err();
        assert_eq!(err, chars("AB"));
    }
}

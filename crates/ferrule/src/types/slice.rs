use std::fmt;

use crate::exception_private::{ExcType, RunResult};

/// A `slice(start, stop, step)` object as produced by `BuildSlice`.
///
/// Bounds are kept unresolved until the slice is applied to a sequence of known length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SliceValue {
    pub start: Option<i64>,
    pub stop: Option<i64>,
    pub step: Option<i64>,
}

/// Slice bounds resolved against a sequence length.
///
/// `start` and `stop` may be `-1` when the step is negative (meaning "before index 0");
/// `len` is the number of selected elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SliceIndices {
    pub start: isize,
    pub stop: isize,
    pub step: isize,
    pub len: usize,
}

impl SliceIndices {
    /// Iterates the selected positions in slice order.
    pub fn positions(self) -> impl Iterator<Item = usize> {
        (0..self.len).map(move |i| (self.start + i as isize * self.step) as usize)
    }
}

impl SliceValue {
    #[must_use]
    pub fn new(start: Option<i64>, stop: Option<i64>, step: Option<i64>) -> Self {
        Self { start, stop, step }
    }

    /// Resolves the slice against a sequence of `len` elements, clamping out-of-range bounds
    /// the way Python does.
    pub fn indices(&self, len: usize) -> RunResult<SliceIndices> {
        let step = self.step.unwrap_or(1);
        if step == 0 {
            return Err(ExcType::value_error("slice step cannot be zero"));
        }
        let len_i = i64::try_from(len).unwrap_or(i64::MAX);
        let (lower, upper) = if step < 0 { (-1, len_i - 1) } else { (0, len_i) };
        let adjust = |bound: Option<i64>, default: i64| match bound {
            None => default,
            Some(b) if b < 0 => (b.saturating_add(len_i)).max(lower),
            Some(b) => b.min(upper),
        };
        let start = adjust(self.start, if step < 0 { upper } else { lower });
        let stop = adjust(self.stop, if step < 0 { lower } else { upper });
        let step = step.clamp(-(isize::MAX as i64), isize::MAX as i64) as isize;
        let (start, stop) = (start as isize, stop as isize);
        Ok(SliceIndices {
            start,
            stop,
            step,
            len: slice_len(start, stop, step),
        })
    }
}

impl fmt::Display for SliceValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let part = |bound: Option<i64>| bound.map_or_else(|| "None".to_owned(), |b| b.to_string());
        write!(f, "slice({}, {}, {})", part(self.start), part(self.stop), part(self.step))
    }
}

/// Number of elements in the arithmetic progression `start, start+step, ...` that stops before
/// `stop`: `ceil((stop - start) / step)`, or zero when the range is empty or runs against the
/// step's sign. `step` must be non-zero.
#[must_use]
pub fn slice_len(start: isize, stop: isize, step: isize) -> usize {
    debug_assert!(step != 0, "slice step cannot be zero");
    if step > 0 && stop > start {
        (stop - start).unsigned_abs().div_ceil(step.unsigned_abs())
    } else if step < 0 && start > stop {
        (start - stop).unsigned_abs().div_ceil(step.unsigned_abs())
    } else {
        0
    }
}

/// Resolves a possibly negative sequence index, returning `None` when it is out of range.
#[must_use]
pub fn normalize_index(index: i64, len: usize) -> Option<usize> {
    let len_i = i64::try_from(len).ok()?;
    let resolved = if index < 0 { index + len_i } else { index };
    if (0..len_i).contains(&resolved) {
        Some(resolved as usize)
    } else {
        None
    }
}

/// Clamps an insertion position into `0..=len`, the way `list.insert` does.
#[must_use]
pub fn clamp_insert_index(index: i64, len: usize) -> usize {
    let len_i = i64::try_from(len).unwrap_or(i64::MAX);
    let resolved = if index < 0 { (index + len_i).max(0) } else { index.min(len_i) };
    resolved as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slice_len_rounds_up() {
        assert_eq!(slice_len(2, 12, 2), 5);
        assert_eq!(slice_len(2, 11, 2), 5);
        assert_eq!(slice_len(0, 10, 3), 4);
        assert_eq!(slice_len(9, -1, -1), 10);
        assert_eq!(slice_len(5, 2, 1), 0);
        assert_eq!(slice_len(2, 5, -1), 0);
    }

    #[test]
    fn indices_clamp_like_python() {
        let s = SliceValue::new(Some(-3), None, None);
        assert_eq!(
            s.indices(10).unwrap(),
            SliceIndices {
                start: 7,
                stop: 10,
                step: 1,
                len: 3
            }
        );
        let reversed = SliceValue::new(None, None, Some(-1));
        assert_eq!(
            reversed.indices(4).unwrap(),
            SliceIndices {
                start: 3,
                stop: -1,
                step: -1,
                len: 4
            }
        );
        let past_end = SliceValue::new(Some(50), Some(60), None);
        assert_eq!(past_end.indices(4).unwrap().len, 0);
        assert!(SliceValue::new(None, None, Some(0)).indices(4).is_err());
    }

    #[test]
    fn positions_follow_step() {
        let idx = SliceValue::new(Some(1), None, Some(3)).indices(10).unwrap();
        assert_eq!(idx.positions().collect::<Vec<_>>(), vec![1, 4, 7]);
    }

    #[test]
    fn index_helpers() {
        assert_eq!(normalize_index(-1, 3), Some(2));
        assert_eq!(normalize_index(3, 3), None);
        assert_eq!(clamp_insert_index(-10, 3), 0);
        assert_eq!(clamp_insert_index(10, 3), 3);
    }
}

use std::{
    fmt,
    time::{Duration, Instant},
};

use serde::{Deserialize, Serialize};

use crate::exception_private::{ExcType, ExceptionRaise, RaisedException, RunError, SimpleException};

/// Recommended maximum call depth if not otherwise specified.
pub const DEFAULT_MAX_RECURSION_DEPTH: usize = 1000;

/// Maximum length of a computed MRO.
///
/// Bounds the output of C3 linearization so adversarial diamond hierarchies cannot consume
/// unbounded memory.
pub const MAX_MRO_LENGTH: usize = 2600;

/// Maximum length of any base class's MRO when creating a subclass.
pub const MAX_INHERITANCE_DEPTH: usize = 1000;

/// Maximum number of nested protected regions (loops, try blocks, with blocks) in one frame.
pub const MAX_BLOCK_DEPTH: usize = 20;

/// Byte size above which operations call [`ResourceTracker::check_large_result`] before building
/// their result (sequence repetition, buffer concatenation).
pub const LARGE_RESULT_THRESHOLD: usize = 100_000;

/// Error returned when a resource limit is exceeded during execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceError {
    /// Maximum number of allocations exceeded.
    Allocation { limit: usize, count: usize },
    /// Maximum number of executed instructions exceeded.
    Operation { limit: usize, count: usize },
    /// Maximum execution time exceeded.
    Time { limit: Duration, elapsed: Duration },
    /// A single result would exceed the size limit.
    Memory { limit: usize, requested: usize },
    /// Maximum call depth exceeded.
    Recursion { limit: usize, depth: usize },
}

impl fmt::Display for ResourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Allocation { limit, count } => write!(f, "allocation limit exceeded: {count} > {limit}"),
            Self::Operation { limit, count } => write!(f, "operation limit exceeded: {count} > {limit}"),
            Self::Time { limit, elapsed } => write!(f, "time limit exceeded: {elapsed:?} > {limit:?}"),
            Self::Memory { limit, requested } => {
                write!(f, "memory limit exceeded: {requested} bytes > {limit} bytes")
            }
            Self::Recursion { .. } => f.write_str("maximum recursion depth exceeded"),
        }
    }
}

impl std::error::Error for ResourceError {}

impl ResourceError {
    /// Maps the violation onto the builtin exception class reported to the program or host.
    #[must_use]
    pub fn exc_type(&self) -> ExcType {
        match self {
            Self::Allocation { .. } | Self::Memory { .. } => ExcType::MemoryError,
            Self::Operation { .. } | Self::Time { .. } => ExcType::TimeoutError,
            Self::Recursion { .. } => ExcType::RecursionError,
        }
    }

    fn into_raise(self) -> ExceptionRaise {
        let exc = SimpleException::new_msg(self.exc_type(), &self);
        ExceptionRaise::new(RaisedException::Simple(exc))
    }
}

impl From<ResourceError> for RunError {
    fn from(err: ResourceError) -> Self {
        // RecursionError stays catchable so `except RecursionError:` works; the other limits
        // must not be swallowed by program code.
        if matches!(err, ResourceError::Recursion { .. }) {
            Self::Exc(Box::new(err.into_raise()))
        } else {
            Self::UncatchableExc(Box::new(err.into_raise()))
        }
    }
}

/// Hooks the VM calls to enforce resource limits.
///
/// The VM is generic over the tracker, so [`NoLimitTracker`] compiles down to (almost) nothing.
pub trait ResourceTracker: fmt::Debug {
    /// Called before the VM allocates a new container, instance or function object.
    fn on_allocate(&mut self, get_size: impl FnOnce() -> usize) -> Result<(), ResourceError>;

    /// Called once per executed instruction.
    fn check_time(&mut self) -> Result<(), ResourceError>;

    /// Called before a new frame is entered.
    ///
    /// # Arguments
    /// * `current_depth` - call depth before the new frame is pushed
    fn check_recursion_depth(&self, current_depth: usize) -> Result<(), ResourceError>;

    /// Called before building results larger than [`LARGE_RESULT_THRESHOLD`] bytes.
    fn check_large_result(&self, estimated_bytes: usize) -> Result<(), ResourceError>;
}

/// Tracker with no limits apart from the default recursion depth.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoLimitTracker;

impl ResourceTracker for NoLimitTracker {
    #[inline]
    fn on_allocate(&mut self, _get_size: impl FnOnce() -> usize) -> Result<(), ResourceError> {
        Ok(())
    }

    #[inline]
    fn check_time(&mut self) -> Result<(), ResourceError> {
        Ok(())
    }

    #[inline]
    fn check_recursion_depth(&self, current_depth: usize) -> Result<(), ResourceError> {
        if current_depth >= DEFAULT_MAX_RECURSION_DEPTH {
            Err(ResourceError::Recursion {
                limit: DEFAULT_MAX_RECURSION_DEPTH,
                depth: current_depth + 1,
            })
        } else {
            Ok(())
        }
    }

    #[inline]
    fn check_large_result(&self, _estimated_bytes: usize) -> Result<(), ResourceError> {
        Ok(())
    }
}

/// Configuration for resource limits.
///
/// All limits are optional; `None` disables a limit. Build with the chained setters:
///
/// ```
/// use std::time::Duration;
/// use ferrule::ResourceLimits;
///
/// let limits = ResourceLimits::new()
///     .max_operations(10_000)
///     .max_duration(Duration::from_millis(50));
/// assert_eq!(limits.max_recursion_depth, Some(1000));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceLimits {
    /// Maximum number of executed instructions.
    pub max_operations: Option<usize>,
    /// Maximum number of tracked allocations.
    pub max_allocations: Option<usize>,
    /// Maximum wall-clock execution time.
    pub max_duration: Option<Duration>,
    /// Maximum size in bytes of any single large result.
    pub max_result_bytes: Option<usize>,
    /// Maximum call depth.
    pub max_recursion_depth: Option<usize>,
}

impl ResourceLimits {
    /// All limits disabled except recursion depth, which defaults to
    /// [`DEFAULT_MAX_RECURSION_DEPTH`].
    #[must_use]
    pub fn new() -> Self {
        Self {
            max_recursion_depth: Some(DEFAULT_MAX_RECURSION_DEPTH),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn max_operations(mut self, limit: usize) -> Self {
        self.max_operations = Some(limit);
        self
    }

    #[must_use]
    pub fn max_allocations(mut self, limit: usize) -> Self {
        self.max_allocations = Some(limit);
        self
    }

    #[must_use]
    pub fn max_duration(mut self, limit: Duration) -> Self {
        self.max_duration = Some(limit);
        self
    }

    #[must_use]
    pub fn max_result_bytes(mut self, limit: usize) -> Self {
        self.max_result_bytes = Some(limit);
        self
    }

    #[must_use]
    pub fn max_recursion_depth(mut self, limit: Option<usize>) -> Self {
        self.max_recursion_depth = limit;
        self
    }
}

/// A resource tracker that enforces configurable limits.
///
/// The clock starts when the tracker is created; after deserialization it restarts from zero.
#[derive(Debug, Serialize, Deserialize)]
pub struct LimitedTracker {
    limits: ResourceLimits,
    #[serde(skip, default = "Instant::now")]
    start_time: Instant,
    allocation_count: usize,
    operation_count: usize,
}

impl LimitedTracker {
    #[must_use]
    pub fn new(limits: ResourceLimits) -> Self {
        Self {
            limits,
            start_time: Instant::now(),
            allocation_count: 0,
            operation_count: 0,
        }
    }

    #[must_use]
    pub fn allocation_count(&self) -> usize {
        self.allocation_count
    }

    #[must_use]
    pub fn operation_count(&self) -> usize {
        self.operation_count
    }

    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }
}

impl ResourceTracker for LimitedTracker {
    fn on_allocate(&mut self, _get_size: impl FnOnce() -> usize) -> Result<(), ResourceError> {
        if let Some(max) = self.limits.max_allocations
            && self.allocation_count >= max
        {
            return Err(ResourceError::Allocation {
                limit: max,
                count: self.allocation_count + 1,
            });
        }
        self.allocation_count += 1;
        Ok(())
    }

    fn check_time(&mut self) -> Result<(), ResourceError> {
        if let Some(max) = self.limits.max_operations {
            self.operation_count += 1;
            if self.operation_count > max {
                return Err(ResourceError::Operation {
                    limit: max,
                    count: self.operation_count,
                });
            }
        }

        if let Some(max) = self.limits.max_duration {
            let elapsed = self.start_time.elapsed();
            if elapsed > max {
                return Err(ResourceError::Time { limit: max, elapsed });
            }
        }
        Ok(())
    }

    fn check_recursion_depth(&self, current_depth: usize) -> Result<(), ResourceError> {
        if let Some(max) = self.limits.max_recursion_depth
            && current_depth >= max
        {
            return Err(ResourceError::Recursion {
                limit: max,
                depth: current_depth + 1,
            });
        }
        Ok(())
    }

    fn check_large_result(&self, estimated_bytes: usize) -> Result<(), ResourceError> {
        if let Some(max) = self.limits.max_result_bytes
            && estimated_bytes > max
        {
            return Err(ResourceError::Memory {
                limit: max,
                requested: estimated_bytes,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operation_limit_trips_after_max() {
        let mut tracker = LimitedTracker::new(ResourceLimits::new().max_operations(3));
        for _ in 0..3 {
            tracker.check_time().unwrap();
        }
        assert_eq!(
            tracker.check_time(),
            Err(ResourceError::Operation { limit: 3, count: 4 })
        );
    }

    #[test]
    fn recursion_error_is_catchable() {
        let err: RunError = ResourceError::Recursion { limit: 1, depth: 2 }.into();
        assert!(matches!(err, RunError::Exc(_)));
        let err: RunError = ResourceError::Operation { limit: 1, count: 2 }.into();
        assert!(matches!(err, RunError::UncatchableExc(_)));
    }
}

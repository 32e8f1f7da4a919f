//! VM execution tracing.
//!
//! The VM is parameterized as `VM<'a, T: ResourceTracker, P: PrintWriter, Tr: VmTracer>`, so the
//! tracer is chosen at construction time and [`NoopTracer`] hooks compile away entirely.
//!
//! | Tracer | Purpose |
//! |--------|---------|
//! | [`NoopTracer`] | No-op (production default) |
//! | [`StderrTracer`] | Human-readable execution log on stderr |
//! | [`ProfilingTracer`] | Opcode frequency counters and call depth |
//! | [`CoverageTracer`] | Which instruction offsets executed |
//! | [`RecordingTracer`] | Full event log for post-mortem analysis and tests |

use std::fmt;

use ahash::{AHashMap, AHashSet};
use strum::IntoStaticStr;

use crate::bytecode::{BlockKind, Opcode};

/// Why the interpreter left normal sequencing and started unwinding blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoStaticStr)]
pub enum UnwindReason {
    Exception,
    Reraise,
    Return,
    Break,
    Continue,
}

/// How a frame execution ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoStaticStr)]
pub enum FrameExitKind {
    Return,
    Yield,
    Raise,
}

/// Trace event captured by [`RecordingTracer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceEvent {
    /// An opcode was dispatched.
    Instruction { ip: usize, opcode: Opcode, stack_depth: usize },
    /// A frame was entered.
    Call { func_name: String, depth: usize },
    /// A frame was left (by return, yield or raise).
    Return { depth: usize },
    BlockPush { kind: BlockKind, level: usize },
    BlockPop { kind: BlockKind },
    /// The unwind procedure started for a pending control transfer.
    Unwind { reason: UnwindReason, open_blocks: usize },
    /// A frame execution finished.
    ///
    /// For `Return` and `Yield` the depth is taken when the opcode executes, before the value is
    /// popped; for `Raise` it is taken after the value stack has been drained.
    FrameExit { kind: FrameExitKind, stack_depth: usize },
    /// A suspended frame was resumed; depth after the saved stack was restored.
    Resume { stack_depth: usize },
}

/// Trait for VM execution tracing.
///
/// All methods default to no-ops; implementations override only the hooks they care about.
pub trait VmTracer: fmt::Debug {
    /// Called before each opcode dispatch. This is the hottest hook.
    #[inline(always)]
    fn on_instruction(&mut self, _ip: usize, _opcode: Opcode, _stack_depth: usize, _frame_depth: usize) {}

    /// Called when a frame starts executing.
    #[inline(always)]
    fn on_call(&mut self, _func_name: &str, _depth: usize) {}

    /// Called when a frame stops executing; `depth` is the call depth after leaving.
    #[inline(always)]
    fn on_return(&mut self, _depth: usize) {}

    #[inline(always)]
    fn on_block_push(&mut self, _kind: BlockKind, _level: usize) {}

    #[inline(always)]
    fn on_block_pop(&mut self, _kind: BlockKind) {}

    #[inline(always)]
    fn on_unwind(&mut self, _reason: UnwindReason, _open_blocks: usize) {}

    #[inline(always)]
    fn on_frame_exit(&mut self, _kind: FrameExitKind, _stack_depth: usize) {}

    #[inline(always)]
    fn on_resume(&mut self, _stack_depth: usize) {}
}

/// A tracer that does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTracer;

impl VmTracer for NoopTracer {}

/// Tracer that prints a human-readable execution log to stderr.
///
/// ```text
/// [    0] LoadConst  stack=0  frames=1
///   >>> CALL f                    depth=2
///   ~~~ UNWIND Exception blocks=1
///   <<< RETURN              depth=1
/// ```
#[derive(Debug, Default)]
pub struct StderrTracer {
    /// Stop tracing instructions after this many; `None` traces everything.
    limit: Option<usize>,
    count: usize,
    stopped: bool,
}

impl StderrTracer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stops producing output after `limit` instructions.
    #[must_use]
    pub fn with_limit(limit: usize) -> Self {
        Self {
            limit: Some(limit),
            ..Self::default()
        }
    }
}

impl VmTracer for StderrTracer {
    #[inline]
    fn on_instruction(&mut self, ip: usize, opcode: Opcode, stack_depth: usize, frame_depth: usize) {
        if self.stopped {
            return;
        }
        eprintln!("[{ip:>5}] {opcode:?}  stack={stack_depth}  frames={frame_depth}");
        self.count += 1;
        if let Some(limit) = self.limit
            && self.count >= limit
        {
            eprintln!("--- trace limit reached ({limit} instructions) ---");
            self.stopped = true;
        }
    }

    fn on_call(&mut self, func_name: &str, depth: usize) {
        if !self.stopped {
            eprintln!("  >>> CALL {func_name:<20} depth={depth}");
        }
    }

    fn on_return(&mut self, depth: usize) {
        if !self.stopped {
            eprintln!("  <<< RETURN              depth={depth}");
        }
    }

    fn on_unwind(&mut self, reason: UnwindReason, open_blocks: usize) {
        if !self.stopped {
            let reason: &'static str = reason.into();
            eprintln!("  ~~~ UNWIND {reason} blocks={open_blocks}");
        }
    }

    fn on_resume(&mut self, stack_depth: usize) {
        if !self.stopped {
            eprintln!("  ... RESUME stack={stack_depth}");
        }
    }
}

/// Tracer that collects execution statistics.
#[derive(Debug, Default)]
pub struct ProfilingTracer {
    opcode_counts: AHashMap<Opcode, u64>,
    total_instructions: u64,
    max_depth: usize,
    total_calls: u64,
    total_unwinds: u64,
}

/// Summary produced by [`ProfilingTracer::report`].
#[derive(Debug)]
pub struct ProfilingReport {
    /// Per-opcode execution counts, most frequent first.
    pub opcode_counts: Vec<(Opcode, u64)>,
    pub total_instructions: u64,
    pub max_depth: usize,
    pub total_calls: u64,
    pub total_unwinds: u64,
}

impl ProfilingTracer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn report(&self) -> ProfilingReport {
        let mut opcode_counts: Vec<_> = self.opcode_counts.iter().map(|(&k, &v)| (k, v)).collect();
        opcode_counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| (a.0 as u8).cmp(&(b.0 as u8))));
        ProfilingReport {
            opcode_counts,
            total_instructions: self.total_instructions,
            max_depth: self.max_depth,
            total_calls: self.total_calls,
            total_unwinds: self.total_unwinds,
        }
    }
}

impl VmTracer for ProfilingTracer {
    #[inline]
    fn on_instruction(&mut self, _ip: usize, opcode: Opcode, _stack_depth: usize, _frame_depth: usize) {
        *self.opcode_counts.entry(opcode).or_insert(0) += 1;
        self.total_instructions += 1;
    }

    fn on_call(&mut self, _func_name: &str, depth: usize) {
        self.total_calls += 1;
        self.max_depth = self.max_depth.max(depth);
    }

    fn on_unwind(&mut self, _reason: UnwindReason, _open_blocks: usize) {
        self.total_unwinds += 1;
    }
}

impl fmt::Display for ProfilingReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== VM Profiling Report ===")?;
        writeln!(f, "Total instructions: {}", self.total_instructions)?;
        writeln!(f, "Total calls:        {}", self.total_calls)?;
        writeln!(f, "Max call depth:     {}", self.max_depth)?;
        writeln!(f, "Unwinds:            {}", self.total_unwinds)?;
        writeln!(f)?;
        writeln!(f, "--- Opcode Frequency ---")?;
        for (opcode, count) in &self.opcode_counts {
            let pct = (*count as f64 / self.total_instructions as f64) * 100.0;
            writeln!(f, "  {opcode:<20?} {count:>10}  ({pct:>5.1}%)")?;
        }
        Ok(())
    }
}

/// Tracer that records which instruction offsets were executed.
#[derive(Debug, Default)]
pub struct CoverageTracer {
    ips: AHashSet<usize>,
}

impl CoverageTracer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn covered_ips(&self) -> &AHashSet<usize> {
        &self.ips
    }

    #[must_use]
    pub fn coverage_count(&self) -> usize {
        self.ips.len()
    }
}

impl VmTracer for CoverageTracer {
    #[inline]
    fn on_instruction(&mut self, ip: usize, _opcode: Opcode, _stack_depth: usize, _frame_depth: usize) {
        self.ips.insert(ip);
    }
}

/// Tracer that records every event.
///
/// Allocates per event, so use it for short runs: debugging and tests asserting on the exact
/// control flow the VM took.
#[derive(Debug, Default)]
pub struct RecordingTracer {
    events: Vec<TraceEvent>,
    limit: Option<usize>,
}

impl RecordingTracer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stops recording after `limit` events.
    #[must_use]
    pub fn with_limit(limit: usize) -> Self {
        Self {
            events: Vec::with_capacity(limit.min(1024)),
            limit: Some(limit),
        }
    }

    #[must_use]
    pub fn events(&self) -> &[TraceEvent] {
        &self.events
    }

    #[must_use]
    pub fn into_events(self) -> Vec<TraceEvent> {
        self.events
    }

    fn record(&mut self, event: TraceEvent) {
        if self.limit.is_none_or(|limit| self.events.len() < limit) {
            self.events.push(event);
        }
    }
}

impl VmTracer for RecordingTracer {
    fn on_instruction(&mut self, ip: usize, opcode: Opcode, stack_depth: usize, _frame_depth: usize) {
        self.record(TraceEvent::Instruction {
            ip,
            opcode,
            stack_depth,
        });
    }

    fn on_call(&mut self, func_name: &str, depth: usize) {
        self.record(TraceEvent::Call {
            func_name: func_name.to_owned(),
            depth,
        });
    }

    fn on_return(&mut self, depth: usize) {
        self.record(TraceEvent::Return { depth });
    }

    fn on_block_push(&mut self, kind: BlockKind, level: usize) {
        self.record(TraceEvent::BlockPush { kind, level });
    }

    fn on_block_pop(&mut self, kind: BlockKind) {
        self.record(TraceEvent::BlockPop { kind });
    }

    fn on_unwind(&mut self, reason: UnwindReason, open_blocks: usize) {
        self.record(TraceEvent::Unwind { reason, open_blocks });
    }

    fn on_frame_exit(&mut self, kind: FrameExitKind, stack_depth: usize) {
        self.record(TraceEvent::FrameExit { kind, stack_depth });
    }

    fn on_resume(&mut self, stack_depth: usize) {
        self.record(TraceEvent::Resume { stack_depth });
    }
}

//! Offloaded execution units and their dependency bookkeeping.

use crate::pool::UopId;

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum UopKind {
    Nop,
    Cf,
    Iadd,
    Imul,
    Idiv,
    Icmp,
    Logic,
    Shift,
    Fadd,
    Fmul,
    Fdiv,
    Fcmp,
    Fcvt,
    Ld,
    St,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum MemKind {
    NotMem,
    Load,
    Store,
}

/// Why a source uop is a dependency.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum DepKind {
    RegData,
    MemAddr,
    MemData,
    PrevUop,
}

/// Execution-unit classes; each backs one typed issue port.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum ExecUnit {
    Nop,
    Iadd,
    Imul,
    Idiv,
    Imisc,
    Fadd,
    Fmul,
    Fdiv,
    Fmisc,
    Cache,
}

impl ExecUnit {
    pub const COUNT: usize = 10;

    pub const ALL: [ExecUnit; ExecUnit::COUNT] = [
        ExecUnit::Nop,
        ExecUnit::Iadd,
        ExecUnit::Imul,
        ExecUnit::Idiv,
        ExecUnit::Imisc,
        ExecUnit::Fadd,
        ExecUnit::Fmul,
        ExecUnit::Fdiv,
        ExecUnit::Fmisc,
        ExecUnit::Cache,
    ];

    pub fn index(self) -> usize {
        self as usize
    }
}

impl UopKind {
    pub fn exec_unit(self) -> ExecUnit {
        match self {
            UopKind::Nop => ExecUnit::Nop,
            UopKind::Iadd => ExecUnit::Iadd,
            UopKind::Imul => ExecUnit::Imul,
            UopKind::Idiv => ExecUnit::Idiv,
            UopKind::Cf | UopKind::Icmp | UopKind::Logic | UopKind::Shift => ExecUnit::Imisc,
            UopKind::Fadd => ExecUnit::Fadd,
            UopKind::Fmul => ExecUnit::Fmul,
            UopKind::Fdiv => ExecUnit::Fdiv,
            UopKind::Fcmp | UopKind::Fcvt => ExecUnit::Fmisc,
            UopKind::Ld | UopKind::St => ExecUnit::Cache,
        }
    }
}

/// A source dependency. The pool slot may be released (and even reused)
/// before the dependent uop checks it, so the recorded `unique_id` is what
/// decides whether the slot still talks about the same uop; a mismatch means
/// the source already retired.
#[derive(Clone, Copy, Debug)]
pub struct SrcInfo {
    pub dep: DepKind,
    pub uop: UopId,
    pub unique_id: u64,
}

#[derive(Debug)]
pub struct Uop {
    pub core_id: u32,
    /// Driver-assigned unique number; ordering between uops follows it.
    pub unique_id: u64,
    pub kind: UopKind,
    pub mem: MemKind,
    pub valid: bool,
    pub addr: u64,
    pub latency: u64,
    pub exec_cycle: u64,
    /// Zero until execution finishes; dependents wait for a non-zero value
    /// at or before the current cycle.
    pub done_cycle: u64,
    pub src_ready: bool,
    pub sources: Vec<SrcInfo>,
}

impl Uop {
    pub fn new(
        core_id: u32,
        unique_id: u64,
        kind: UopKind,
        mem: MemKind,
        addr: u64,
        latency: u64,
    ) -> Self {
        Self {
            core_id,
            unique_id,
            kind,
            mem,
            valid: true,
            addr,
            latency,
            exec_cycle: 0,
            done_cycle: 0,
            src_ready: false,
            sources: Vec::new(),
        }
    }

    pub fn is_mem(&self) -> bool {
        self.mem != MemKind::NotMem
    }

    pub fn is_store(&self) -> bool {
        self.mem == MemKind::Store
    }
}

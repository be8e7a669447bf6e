//! Run configuration and statistics, the deobfuscator's analogue of the
//! teacher crate's `Options` struct and the `(in_size, out_size)` tuples its
//! compression routines return.

/// Tunables for a single [`crate::deobfuscate_with_options`] run.
///
/// All iteration caps are safety nets, not tuning knobs for correctness:
/// normal inputs converge in 1-3 iterations per phase (see pipeline §4.6).
#[derive(Clone, Debug)]
pub struct RunOptions {
    /// Cap on outer iterations of Phase 1 (P1 interleaved with P3).
    pub max_phase1_iterations: u32,
    /// Cap on outer iterations of Phase 2 (P2 interleaved with P1).
    pub max_phase2_iterations: u32,
    /// Cap on outer iterations of Phase 3 (P3 to fixed point).
    pub max_phase3_iterations: u32,
    /// Cap on outer iterations of Phase 4 (P4 to fixed point).
    pub max_phase4_iterations: u32,
    /// Whether to populate a [`RunStats`] record during the run.
    pub collect_stats: bool,
    /// Whether Phase 0 should attempt global-resolver discovery at all.
    pub discover_resolvers: bool,
}

pub const STD_OPTIONS: RunOptions = RunOptions {
    max_phase1_iterations: 10,
    max_phase2_iterations: 10,
    max_phase3_iterations: 10,
    max_phase4_iterations: 3,
    collect_stats: true,
    discover_resolvers: true,
};

impl Default for RunOptions {
    fn default() -> Self {
        STD_OPTIONS
    }
}

/// Counters describing what a run actually rewrote, handed back to the
/// caller for reporting. Never printed by the library itself.
#[derive(Clone, Debug, Default)]
pub struct RunStats {
    /// Array accesses (P1) replaced by a literal.
    pub array_accesses_inlined: u32,
    /// Decoder calls (P2) replaced by a string literal.
    pub decoder_calls_inlined: u32,
    /// Constant folds / string merges (P3) applied.
    pub constant_folds: u32,
    /// Global resolver calls (P4) replaced by a bare identifier.
    pub resolver_calls_inlined: u32,
    /// Hex numeric literals normalized to decimal (P5).
    pub hex_numerals_normalized: u32,
    /// Computed property accesses simplified to dotted form (P5).
    pub property_accesses_simplified: u32,
    /// `!0`/`!1` style booleans simplified (P5).
    pub booleans_simplified: u32,
    /// Dead branches / empty statements removed (P5).
    pub dead_code_removed: u32,
    /// Outer iterations actually consumed by each phase, in phase order.
    pub phase_iterations: [u32; 5],
}

impl RunStats {
    pub(crate) fn total_rewrites(&self) -> u32 {
        self.array_accesses_inlined
            + self.decoder_calls_inlined
            + self.constant_folds
            + self.resolver_calls_inlined
            + self.hex_numerals_normalized
            + self.property_accesses_simplified
            + self.booleans_simplified
            + self.dead_code_removed
    }
}

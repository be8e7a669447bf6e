//! Pipeline driver (C6)
//!
//! Runs discovery once, then the five inliner passes in the order and
//! fixed-point discipline fixed by §4.6: Phase 1 (array access + folding),
//! Phase 2 (decoder + array access, for nested indirection), Phase 3
//! (folding to fixed point), Phase 4 (resolver), Phase 5 (cosmetic cleanup
//! once, then a final fold).

use swc_ecma_ast::Program;
use swc_ecma_visit::VisitMutWith;

use crate::discovery::{self, Discovery};
use crate::error::Error;
use crate::options::{RunOptions, RunStats};
use crate::parsing;
use crate::passes::{ArrayAccessInliner, ConstantFolder, CosmeticCleanup, DecoderCallInliner, ResolverInliner};

/// Runs the full pipeline with default options, discarding statistics.
pub fn deobfuscate(source: &str) -> Result<String, Error> {
    deobfuscate_with_options(source, &RunOptions::default()).map(|(output, _)| output)
}

/// Runs the full pipeline, returning both the rewritten source and the
/// statistics record describing what each phase actually changed.
pub fn deobfuscate_with_options(
    source: &str,
    options: &RunOptions,
) -> Result<(String, RunStats), Error> {
    let mut parsed = parsing::parse(source)?;
    let discovery = discovery::discover(&parsed.program, source, options.discover_resolvers);
    let mut stats = RunStats::default();

    stats.phase_iterations[0] =
        run_phase1(&mut parsed.program, &discovery, options, &mut stats);

    if discovery.string_table.as_ref().and_then(|t| t.decoder.as_ref()).is_some() {
        stats.phase_iterations[1] =
            run_phase2(&mut parsed.program, &discovery, options, &mut stats);
    }

    stats.phase_iterations[2] = run_phase3(&mut parsed.program, options, &mut stats);

    if !discovery.resolvers.is_empty() {
        stats.phase_iterations[3] =
            run_phase4(&mut parsed.program, &discovery, options, &mut stats);
    }

    run_phase5(&mut parsed.program, &mut stats);
    stats.phase_iterations[4] = 1;

    let output = parsing::print(&parsed)?;
    Ok((output, stats))
}

fn run_phase1(
    program: &mut Program,
    discovery: &Discovery,
    options: &RunOptions,
    stats: &mut RunStats,
) -> u32 {
    let mut iterations = 0;
    loop {
        if iterations >= options.max_phase1_iterations {
            break;
        }
        let array = run_array_access(program, discovery, stats, options.collect_stats);
        let fold = run_constant_fold(program, stats, options.collect_stats);
        iterations += 1;
        if array == 0 && fold == 0 {
            break;
        }
    }
    iterations
}

fn run_phase2(
    program: &mut Program,
    discovery: &Discovery,
    options: &RunOptions,
    stats: &mut RunStats,
) -> u32 {
    let mut iterations = 0;
    loop {
        if iterations >= options.max_phase2_iterations {
            break;
        }
        let decoder = run_decoder_call(program, discovery, stats, options.collect_stats);
        let array = run_array_access(program, discovery, stats, options.collect_stats);
        iterations += 1;
        if decoder == 0 && array == 0 {
            break;
        }
    }
    iterations
}

fn run_phase3(program: &mut Program, options: &RunOptions, stats: &mut RunStats) -> u32 {
    let mut iterations = 0;
    loop {
        if iterations >= options.max_phase3_iterations {
            break;
        }
        let changes = run_constant_fold(program, stats, options.collect_stats);
        iterations += 1;
        if changes == 0 {
            break;
        }
    }
    iterations
}

fn run_phase4(
    program: &mut Program,
    discovery: &Discovery,
    options: &RunOptions,
    stats: &mut RunStats,
) -> u32 {
    let mut iterations = 0;
    loop {
        if iterations >= options.max_phase4_iterations {
            break;
        }
        let changes = run_resolver(program, discovery, stats, options.collect_stats);
        iterations += 1;
        if changes == 0 {
            break;
        }
    }
    iterations
}

fn run_phase5(program: &mut Program, stats: &mut RunStats) {
    let mut cleanup = CosmeticCleanup::default();
    program.visit_mut_with(&mut cleanup);
    stats.hex_numerals_normalized += cleanup.hex_numerals_normalized;
    stats.property_accesses_simplified += cleanup.property_accesses_simplified;
    stats.booleans_simplified += cleanup.booleans_simplified;
    stats.dead_code_removed += cleanup.dead_code_removed;

    let mut fold = ConstantFolder::default();
    program.visit_mut_with(&mut fold);
    stats.constant_folds += fold.changes;
}

fn run_array_access(
    program: &mut Program,
    discovery: &Discovery,
    stats: &mut RunStats,
    collect: bool,
) -> u32 {
    let mut pass = ArrayAccessInliner::new(discovery);
    program.visit_mut_with(&mut pass);
    if collect {
        stats.array_accesses_inlined += pass.changes;
    }
    pass.changes
}

fn run_decoder_call(
    program: &mut Program,
    discovery: &Discovery,
    stats: &mut RunStats,
    collect: bool,
) -> u32 {
    let mut pass = DecoderCallInliner::new(discovery);
    program.visit_mut_with(&mut pass);
    if collect {
        stats.decoder_calls_inlined += pass.changes;
    }
    pass.changes
}

fn run_constant_fold(program: &mut Program, stats: &mut RunStats, collect: bool) -> u32 {
    let mut pass = ConstantFolder::default();
    program.visit_mut_with(&mut pass);
    if collect {
        stats.constant_folds += pass.changes;
    }
    pass.changes
}

fn run_resolver(
    program: &mut Program,
    discovery: &Discovery,
    stats: &mut RunStats,
    collect: bool,
) -> u32 {
    let mut pass = ResolverInliner::new(discovery);
    program.visit_mut_with(&mut pass);
    if collect {
        stats.resolver_calls_inlined += pass.changes;
    }
    pass.changes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inlines_array_access_and_keeps_declaration() {
        let src = "const A=[0,1,2,3,4,5,6,7,8,9]; x = A[0x3];";
        let out = deobfuscate(src).expect("deobfuscate failed");
        assert!(out.contains("x = 3"));
        assert!(out.contains("const A"));
    }

    #[test]
    fn folds_string_concat_chain() {
        let out = deobfuscate(r#""foo" + "bar" + "baz";"#).expect("deobfuscate failed");
        assert!(out.contains("foobarbaz"));
    }

    #[test]
    fn dots_safe_property_and_keeps_reserved_word_computed() {
        let out = deobfuscate(r#"obj["length"]; obj["for"];"#).expect("deobfuscate failed");
        assert!(out.contains("obj.length"));
        assert!(out.contains("obj[\"for\"]") || out.contains("obj['for']"));
    }

    #[test]
    fn simplifies_bang_zero_and_bang_one() {
        let out = deobfuscate("x = !0 ? a : b; y = !1 && zzz();").expect("deobfuscate failed");
        assert!(out.contains('a'));
        assert!(!out.contains('b'));
        assert!(out.contains("false"));
    }

    #[test]
    fn inlines_resolver_call() {
        let src = r#"
            function R(k) {
                switch (k) {
                    case "D": return g["Date"];
                    case "C": return g["console"];
                    case "M": return g.Math;
                    case "J": return JSON;
                    case "F": return g["fetch"];
                }
            }
            R("D")();
        "#;
        let out = deobfuscate(src).expect("deobfuscate failed");
        assert!(out.contains("Date()"));
    }

    #[test]
    fn decodes_decoder_call_with_table_indirection() {
        let packed = crate::codec::compress_to_utf16("alpha|beta|gamma");
        // The encoder can emit any code unit in its 15-bit range, including
        // quote and backslash, so embed it as a sequence of `\uXXXX` escapes
        // rather than splicing it raw into a double-quoted literal.
        let escaped: String = packed.chars().map(|c| format!("\\u{:04x}", c as u32)).collect();
        let src = format!(
            r#"x.decompressFromUTF16("{escaped}"); D = function(i) {{ return T[i]; }}; y = D(2);"#
        );
        let out = deobfuscate(&src).expect("deobfuscate failed");
        assert!(out.contains("gamma"));
    }

    #[test]
    fn zero_discoveries_still_roundtrips() {
        let out = deobfuscate("function add(a, b) { return a + b; }").expect("deobfuscate failed");
        assert!(out.contains("function add"));
    }

    #[test]
    fn idempotent_on_second_pass() {
        let src = "const A=[0,1,2,3,4,5,6,7,8,9]; x = A[3]; y = !0;";
        let once = deobfuscate(src).expect("first pass failed");
        let twice = deobfuscate(&once).expect("second pass failed");
        assert_eq!(once, twice);
    }
}

//! Inliner passes (C5)
//!
//! Each pass is a `VisitMut` walker that mutates nodes in place. None of
//! them ever fail: a pass that finds nothing to rewrite simply reports
//! zero changes, which is also the fixed-point signal the pipeline driver
//! (`pipeline`) watches for.

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;
use swc_common::DUMMY_SP;
use swc_ecma_ast::*;
use swc_ecma_visit::{noop_visit_mut_type, VisitMut, VisitMutWith};

use crate::discovery::Discovery;
use crate::literal;

/// **P1** — replaces `ID[IDX]` with a literal when `ID` names a known
/// constant array and `IDX` evaluates to an in-range nonnegative integer.
pub struct ArrayAccessInliner<'a> {
    discovery: &'a Discovery,
    pub changes: u32,
}

impl<'a> ArrayAccessInliner<'a> {
    pub fn new(discovery: &'a Discovery) -> Self {
        Self { discovery, changes: 0 }
    }
}

impl<'a> VisitMut for ArrayAccessInliner<'a> {
    noop_visit_mut_type!();

    fn visit_mut_expr(&mut self, expr: &mut Expr) {
        expr.visit_mut_children_with(self);

        let Expr::Member(member) = expr else { return };
        let MemberProp::Computed(computed) = &member.prop else { return };
        let Expr::Ident(array_name) = member.obj.as_ref() else { return };
        let Some(array) = self.discovery.arrays.get(array_name.sym.as_str()) else { return };
        let Some(index_value) = literal::eval(&computed.expr) else { return };
        let Some(index) = index_value.as_index() else { return };
        let Some(element) = array.elements.get(index) else { return };
        let Some(replacement) = literal::materialize(element) else { return };

        *expr = replacement;
        self.changes += 1;
    }
}

/// **P2** — replaces a call to the known decoder function with the string
/// table entry its sole literal argument indexes.
pub struct DecoderCallInliner<'a> {
    discovery: &'a Discovery,
    pub changes: u32,
}

impl<'a> DecoderCallInliner<'a> {
    pub fn new(discovery: &'a Discovery) -> Self {
        Self { discovery, changes: 0 }
    }
}

impl<'a> VisitMut for DecoderCallInliner<'a> {
    noop_visit_mut_type!();

    fn visit_mut_expr(&mut self, expr: &mut Expr) {
        expr.visit_mut_children_with(self);

        let Some(table) = &self.discovery.string_table else { return };
        let Some(decoder_name) = &table.decoder else { return };
        let Expr::Call(call) = expr else { return };
        let Callee::Expr(callee) = &call.callee else { return };
        let Expr::Ident(callee_ident) = callee.as_ref() else { return };
        if callee_ident.sym.as_str() != decoder_name {
            return;
        }
        let [ExprOrSpread { spread: None, expr: arg }] = call.args.as_slice() else { return };
        let Some(index_value) = literal::eval(arg) else { return };
        let Some(index) = index_value.as_index() else { return };
        let Some(entry) = table.entries.get(index) else { return };

        *expr = Expr::Lit(Lit::Str(Str {
            span: DUMMY_SP,
            value: entry.as_str().into(),
            raw: None,
        }));
        self.changes += 1;
    }
}

/// **P3** — folds a binary expression to a literal on post-order exit,
/// handling both numeric folds and `+` string concatenation chains.
#[derive(Default)]
pub struct ConstantFolder {
    pub changes: u32,
}

impl VisitMut for ConstantFolder {
    noop_visit_mut_type!();

    fn visit_mut_expr(&mut self, expr: &mut Expr) {
        expr.visit_mut_children_with(self);

        let Expr::Bin(_) = expr else { return };
        let Some(value) = literal::eval(expr) else { return };
        let Some(replacement) = literal::materialize(&value) else { return };

        *expr = replacement;
        self.changes += 1;
    }
}

/// **P4** — replaces `NAME("KEY")` with a bare identifier, for each
/// discovered resolver `NAME`, when `KEY` maps to an allow-listed global.
pub struct ResolverInliner<'a> {
    discovery: &'a Discovery,
    pub changes: u32,
}

impl<'a> ResolverInliner<'a> {
    pub fn new(discovery: &'a Discovery) -> Self {
        Self { discovery, changes: 0 }
    }
}

impl<'a> VisitMut for ResolverInliner<'a> {
    noop_visit_mut_type!();

    fn visit_mut_expr(&mut self, expr: &mut Expr) {
        expr.visit_mut_children_with(self);

        let Expr::Call(call) = expr else { return };
        let Callee::Expr(callee) = &call.callee else { return };
        let Expr::Ident(callee_ident) = callee.as_ref() else { return };
        let Some(resolver) = self
            .discovery
            .resolvers
            .iter()
            .find(|r| r.name == callee_ident.sym.as_str())
        else {
            return;
        };
        let [ExprOrSpread { spread: None, expr: arg }] = call.args.as_slice() else { return };
        let Expr::Lit(Lit::Str(key)) = arg.as_ref() else { return };
        let Some(target) = resolver.map.get(key.value.as_str()) else { return };
        if !crate::allowlist::is_allowed(target) {
            return;
        }

        *expr = Expr::Ident(Ident::new(target.as_str().into(), DUMMY_SP));
        self.changes += 1;
    }
}

/// **P5** — the cosmetic cleanup walk: hex normalization, `obj["ident"]` →
/// `obj.ident`, `!0`/`!1` → `true`/`false`, boolean-literal collapse of
/// conditionals/if-statements/logical expressions, empty-statement
/// removal.
#[derive(Default)]
pub struct CosmeticCleanup {
    pub hex_numerals_normalized: u32,
    pub property_accesses_simplified: u32,
    pub booleans_simplified: u32,
    pub dead_code_removed: u32,
}

impl CosmeticCleanup {
    pub fn total_changes(&self) -> u32 {
        self.hex_numerals_normalized
            + self.property_accesses_simplified
            + self.booleans_simplified
            + self.dead_code_removed
    }
}

fn identifier_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z_$][A-Za-z0-9_$]*$").expect("fixed literal regex"))
}

fn reserved_words() -> &'static HashSet<&'static str> {
    static WORDS: OnceLock<HashSet<&'static str>> = OnceLock::new();
    WORDS.get_or_init(|| {
        [
            "break", "case", "catch", "class", "const", "continue", "debugger", "default",
            "delete", "do", "else", "export", "extends", "finally", "for", "function", "if",
            "import", "in", "instanceof", "new", "return", "super", "switch", "this", "throw",
            "try", "typeof", "var", "void", "while", "with", "yield", "let", "static", "enum",
            "await", "implements", "package", "protected", "interface", "private", "public",
            "null", "true", "false",
        ]
        .into_iter()
        .collect()
    })
}

/// Whether `name` is a legal identifier to use as a dotted property and is
/// not an ECMAScript reserved word (§4.5).
fn is_safe_property_name(name: &str) -> bool {
    identifier_regex().is_match(name) && !reserved_words().contains(name)
}

impl VisitMut for CosmeticCleanup {
    noop_visit_mut_type!();

    fn visit_mut_expr(&mut self, expr: &mut Expr) {
        expr.visit_mut_children_with(self);

        match expr {
            Expr::Lit(Lit::Num(n)) => {
                if n.raw.as_deref().is_some_and(|r| {
                    r.starts_with("0x") || r.starts_with("0X")
                }) {
                    n.raw = None;
                    self.hex_numerals_normalized += 1;
                }
            }
            Expr::Lit(Lit::Str(s)) => {
                if s.raw.is_some() {
                    s.raw = None;
                }
            }
            Expr::Unary(UnaryExpr { op: UnaryOp::Bang, arg, .. }) => {
                if let Expr::Lit(Lit::Num(n)) = arg.as_ref() {
                    let value = n.value != 0.0;
                    *expr = Expr::Lit(Lit::Bool(Bool { span: DUMMY_SP, value: !value }));
                    self.booleans_simplified += 1;
                    return;
                }
            }
            Expr::Member(member) => self.simplify_member(member),
            Expr::Cond(cond) => {
                if let Expr::Lit(Lit::Bool(b)) = cond.test.as_ref() {
                    let taken = if b.value { cond.cons.clone() } else { cond.alt.clone() };
                    *expr = *taken;
                    self.dead_code_removed += 1;
                }
            }
            Expr::Bin(bin) if matches!(bin.op, BinaryOp::LogicalAnd | BinaryOp::LogicalOr) => {
                if let Expr::Lit(Lit::Bool(left)) = bin.left.as_ref() {
                    let short_circuits = match bin.op {
                        BinaryOp::LogicalAnd => !left.value,
                        BinaryOp::LogicalOr => left.value,
                        _ => unreachable!(),
                    };
                    if short_circuits {
                        *expr = Expr::Lit(Lit::Bool(left.clone()));
                    } else {
                        *expr = *bin.right.clone();
                    }
                    self.dead_code_removed += 1;
                }
            }
            _ => {}
        }
    }

    fn visit_mut_stmts(&mut self, stmts: &mut Vec<Stmt>) {
        stmts.visit_mut_children_with(self);

        let mut i = 0;
        while i < stmts.len() {
            match &stmts[i] {
                Stmt::Empty(_) => {
                    stmts.remove(i);
                    self.dead_code_removed += 1;
                    continue;
                }
                Stmt::If(if_stmt) => {
                    let Some(test) = literal::eval(&if_stmt.test) else {
                        i += 1;
                        continue;
                    };
                    let taken = if test.is_truthy() {
                        Some(if_stmt.cons.clone())
                    } else {
                        if_stmt.alt.clone()
                    };
                    let replacement = match taken {
                        Some(branch) => match *branch {
                            Stmt::Block(block) => block.stmts,
                            other => vec![other],
                        },
                        None => Vec::new(),
                    };
                    let inserted = replacement.len();
                    stmts.splice(i..i + 1, replacement);
                    self.dead_code_removed += 1;
                    i += inserted;
                    continue;
                }
                _ => {}
            }
            i += 1;
        }
    }
}

impl CosmeticCleanup {
    /// Converts `obj["ident"]` to `obj.ident`, and collapses
    /// `obj[(junk, "ident")]` to `obj.ident` (or `obj[junk_last_operand]`
    /// when the sequence's last operand is not a safe identifier -- the
    /// asymmetric rule called out in the spec's open question on
    /// sequence-expression collapse).
    fn simplify_member(&mut self, member: &mut MemberExpr) {
        let MemberProp::Computed(computed) = &member.prop else { return };

        let candidate_name = match computed.expr.as_ref() {
            Expr::Lit(Lit::Str(s)) => Some(s.value.to_string()),
            Expr::Seq(seq) => match seq.exprs.last().map(|e| e.as_ref()) {
                Some(Expr::Lit(Lit::Str(s))) => Some(s.value.to_string()),
                _ => None,
            },
            _ => None,
        };

        let Some(name) = candidate_name else {
            if let Expr::Seq(seq) = computed.expr.as_ref() {
                if let Some(last) = seq.exprs.last() {
                    let replacement = (**last).clone();
                    member.prop = MemberProp::Computed(ComputedPropName {
                        span: DUMMY_SP,
                        expr: Box::new(replacement),
                    });
                    self.property_accesses_simplified += 1;
                }
            }
            return;
        };

        if !is_safe_property_name(&name) {
            if let Expr::Seq(seq) = computed.expr.as_ref() {
                if seq.exprs.len() > 1 {
                    let replacement = (**seq.exprs.last().unwrap()).clone();
                    member.prop = MemberProp::Computed(ComputedPropName {
                        span: DUMMY_SP,
                        expr: Box::new(replacement),
                    });
                    self.property_accesses_simplified += 1;
                }
            }
            return;
        }

        member.prop = MemberProp::Ident(IdentName::new(name.into(), DUMMY_SP));
        self.property_accesses_simplified += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsing;
    use swc_ecma_visit::VisitMutWith;

    fn fold(src: &str) -> String {
        let mut parsed = parsing::parse(src).expect("parse failed");
        let mut pass = ConstantFolder::default();
        parsed.program.visit_mut_with(&mut pass);
        parsing::print(&parsed).expect("print failed")
    }

    #[test]
    fn folds_string_concat_chain() {
        let out = fold(r#"x = "foo" + "bar" + "baz";"#);
        assert!(out.contains("foobarbaz"));
    }

    #[test]
    fn folds_numeric_addition() {
        let out = fold("x = 2 + 3;");
        assert!(out.contains('5'));
    }

    #[test]
    fn cleanup_replaces_bang_zero_and_bang_one() {
        let mut parsed = parsing::parse("x = !0; y = !1;").expect("parse failed");
        let mut pass = CosmeticCleanup::default();
        parsed.program.visit_mut_with(&mut pass);
        let out = parsing::print(&parsed).expect("print failed");
        assert!(out.contains("true"));
        assert!(out.contains("false"));
        assert_eq!(pass.booleans_simplified, 2);
    }

    #[test]
    fn cleanup_dots_safe_property_name() {
        let mut parsed = parsing::parse(r#"obj["length"];"#).expect("parse failed");
        let mut pass = CosmeticCleanup::default();
        parsed.program.visit_mut_with(&mut pass);
        let out = parsing::print(&parsed).expect("print failed");
        assert!(out.contains("obj.length"));
    }

    #[test]
    fn cleanup_leaves_reserved_word_property_computed() {
        let mut parsed = parsing::parse(r#"obj["for"];"#).expect("parse failed");
        let mut pass = CosmeticCleanup::default();
        parsed.program.visit_mut_with(&mut pass);
        let out = parsing::print(&parsed).expect("print failed");
        assert!(out.contains(r#"obj["for"]"#) || out.contains("obj[\"for\"]"));
    }

    #[test]
    fn cleanup_collapses_boolean_conditional() {
        // Post-order visitation folds the `!0` test into `true` while
        // descending into the conditional's children, so the conditional
        // itself sees an already-literal test on the way back out.
        let mut parsed = parsing::parse("x = !0 ? a : b;").expect("parse failed");
        let mut cleanup = CosmeticCleanup::default();
        parsed.program.visit_mut_with(&mut cleanup);
        let out = parsing::print(&parsed).expect("print failed");
        assert!(out.contains('a') && !out.contains('b'));
    }
}

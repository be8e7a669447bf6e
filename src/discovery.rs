//! Artifact discovery (C4)
//!
//! Runs once over the freshly parsed tree and produces the read-only
//! [`Discovery`] state that the pipeline driver (`pipeline`) hands to every
//! inliner pass. Nothing here mutates the tree; a discovery heuristic that
//! cannot confirm an artifact simply omits it, never aborts the run.

use std::collections::HashMap;

use regex::Regex;
use swc_ecma_ast::*;

use crate::codec;
use crate::literal::{self, LiteralValue};

/// A large all-literal array in the obfuscated input, keyed by its
/// declared identifier. Every element was successfully partially evaluated
/// at discovery time (§3 invariant); arrays with any non-literal element
/// are rejected wholesale rather than partially accepted.
#[derive(Debug, Clone)]
pub struct ConstantArray {
    pub elements: Vec<LiteralValue>,
}

/// The `|`-delimited decompressed string table, plus the name of the
/// one-argument decoder function that indexes into it (when discovery
/// could pin one down).
#[derive(Debug, Clone)]
pub struct StringTable {
    pub entries: Vec<String>,
    pub decoder: Option<String>,
}

/// A function whose switch body maps string keys to the names of host or
/// language globals, promoted only once it contributes at least 5 valid
/// mappings.
#[derive(Debug, Clone)]
pub struct GlobalResolver {
    pub name: String,
    pub map: HashMap<String, String>,
}

/// The complete, immutable artifact set produced by Phase 0.
#[derive(Debug, Clone, Default)]
pub struct Discovery {
    pub arrays: HashMap<String, ConstantArray>,
    pub string_table: Option<StringTable>,
    pub resolvers: Vec<GlobalResolver>,
}

const MIN_ARRAY_LEN: usize = 10;
const MIN_RESOLVER_MAPPINGS: usize = 5;
const TEXTUAL_FALLBACK_WINDOW: usize = 1000;

/// Runs every discovery heuristic over `program`, falling back to `source`
/// only where the AST strategy (decoder-name resolution) comes up empty.
pub fn discover(program: &Program, source: &str, discover_resolvers: bool) -> Discovery {
    let mut d = Discoverer {
        function_scope_stack: Vec::new(),
        arrays: HashMap::new(),
        resolver_candidates: Vec::new(),
        decompress_site: None,
    };
    d.walk_program(program);

    let string_table = d.decompress_site.take().and_then(|(arg, scope)| {
        let text = resolve_string_literal(arg, program)?;
        let decompressed = codec::decompress_from_utf16(&text);
        if decompressed.is_empty() {
            return None;
        }
        let entries: Vec<String> = decompressed.split('|').map(str::to_string).collect();
        let decoder = find_decoder_in_scope(scope).or_else(|| find_decoder_textual(source));
        log::debug!(
            target: "discovery",
            "string_table accepted: {} entries, decoder={:?}",
            entries.len(),
            decoder
        );
        Some(StringTable { entries, decoder })
    });

    let resolvers = if discover_resolvers {
        d.resolver_candidates
            .into_iter()
            .filter_map(|(name, map)| {
                if map.len() >= MIN_RESOLVER_MAPPINGS {
                    log::debug!(target: "discovery", "resolver accepted: {name} ({} mappings)", map.len());
                    Some(GlobalResolver { name, map })
                } else {
                    log::debug!(target: "discovery", "resolver rejected: {name} (only {} mappings)", map.len());
                    None
                }
            })
            .collect()
    } else {
        Vec::new()
    };

    Discovery {
        arrays: d.arrays,
        string_table,
        resolvers,
    }
}

/// Internal, tree-borrowing walker. Exists only for the duration of
/// `discover`; everything it hands back to the caller is deep-copied into
/// owned `Discovery` data so the AST can be mutated freely afterwards.
struct Discoverer<'a> {
    /// Stack of enclosing *function* top-level statement lists: the program
    /// body, then each function body entered so far. Deliberately NOT
    /// pushed for nested blocks/`if`/`try` bodies -- strategy 1 (§4.4) needs
    /// "the enclosing function body's top-level statements", which is a
    /// coarser scope than the nearest enclosing block.
    function_scope_stack: Vec<&'a [Stmt]>,
    arrays: HashMap<String, ConstantArray>,
    resolver_candidates: Vec<(String, HashMap<String, String>)>,
    /// The first `decompressFromUTF16` call site found: its argument
    /// expression plus the enclosing function's top-level statement list.
    decompress_site: Option<(&'a Expr, &'a [Stmt])>,
}

impl<'a> Discoverer<'a> {
    fn enclosing_function_scope(&self) -> &'a [Stmt] {
        self.function_scope_stack.last().copied().unwrap_or(&[])
    }

    fn walk_program(&mut self, program: &'a Program) {
        match program {
            Program::Module(m) => {
                // Only the plain-statement items matter for this obfuscation
                // scheme; import/export wrappers are not a pattern it uses.
                let stmts: Vec<&Stmt> = m
                    .body
                    .iter()
                    .filter_map(|item| match item {
                        ModuleItem::Stmt(s) => Some(s),
                        ModuleItem::ModuleDecl(_) => None,
                    })
                    .collect();
                self.walk_owned_stmt_refs(&stmts);
            }
            Program::Script(s) => {
                // `s.body` is a genuine contiguous `Vec<Stmt>`, so unlike the
                // module case it can be pushed straight onto the function
                // scope stack -- giving the decoder-name AST strategy a real
                // top-level scope to search when the decompress call site
                // sits at the outermost level, the common case.
                self.function_scope_stack.push(&s.body);
                self.walk_stmts(&s.body);
                self.function_scope_stack.pop();
            }
        }
    }

    /// Bridges a freshly collected `Vec<&Stmt>` (which cannot itself be
    /// pushed onto `function_scope_stack: Vec<&[Stmt]>` without an owner)
    /// back into the walk by visiting statements one at a time instead of
    /// pushing a borrowed slice of a temporary vector. Module-level top
    /// statements are therefore not available as an "enclosing function
    /// scope" hint; a decompress call directly at module top level (not
    /// inside any function) falls back to the textual strategy.
    fn walk_owned_stmt_refs(&mut self, stmts: &[&'a Stmt]) {
        for array in find_constant_arrays(stmts.iter().copied()) {
            self.arrays.insert(array.0, array.1);
        }
        for cand in find_resolver_candidates(stmts.iter().copied()) {
            self.resolver_candidates.push(cand);
        }
        for stmt in stmts {
            self.walk_stmt(stmt);
        }
    }

    /// Walks a statement list for array/resolver discovery and recurses
    /// into each statement. Does NOT touch `function_scope_stack` -- only
    /// `walk_function` pushes a new function-level scope; nested blocks
    /// reuse whatever function scope is already on top.
    fn walk_stmts(&mut self, stmts: &'a [Stmt]) {
        for array in find_constant_arrays(stmts.iter()) {
            self.arrays.insert(array.0, array.1);
        }
        for cand in find_resolver_candidates(stmts.iter()) {
            self.resolver_candidates.push(cand);
        }
        for stmt in stmts {
            self.walk_stmt(stmt);
        }
    }

    fn walk_stmt(&mut self, stmt: &'a Stmt) {
        match stmt {
            Stmt::Expr(e) => self.walk_expr(&e.expr),
            Stmt::Block(b) => self.walk_stmts(&b.stmts),
            Stmt::If(i) => {
                self.walk_expr(&i.test);
                self.walk_stmt(&i.cons);
                if let Some(alt) = &i.alt {
                    self.walk_stmt(alt);
                }
            }
            Stmt::Decl(Decl::Fn(f)) => self.walk_function(&f.function),
            Stmt::Decl(Decl::Var(v)) => {
                for decl in &v.decls {
                    if let Some(init) = &decl.init {
                        self.walk_expr(init);
                    }
                }
            }
            Stmt::Return(r) => {
                if let Some(arg) = &r.arg {
                    self.walk_expr(arg);
                }
            }
            Stmt::Switch(sw) => {
                self.walk_expr(&sw.discriminant);
                for case in &sw.cases {
                    if let Some(t) = &case.test {
                        self.walk_expr(t);
                    }
                    for s in &case.cons {
                        self.walk_stmt(s);
                    }
                }
            }
            Stmt::While(w) => {
                self.walk_expr(&w.test);
                self.walk_stmt(&w.body);
            }
            Stmt::DoWhile(w) => {
                self.walk_expr(&w.test);
                self.walk_stmt(&w.body);
            }
            Stmt::For(f) => {
                if let Some(test) = &f.test {
                    self.walk_expr(test);
                }
                if let Some(update) = &f.update {
                    self.walk_expr(update);
                }
                self.walk_stmt(&f.body);
            }
            Stmt::ForIn(f) => self.walk_stmt(&f.body),
            Stmt::ForOf(f) => self.walk_stmt(&f.body),
            Stmt::Try(t) => {
                self.walk_stmts(&t.block.stmts);
                if let Some(h) = &t.handler {
                    self.walk_stmts(&h.body.stmts);
                }
                if let Some(f) = &t.finalizer {
                    self.walk_stmts(&f.stmts);
                }
            }
            Stmt::Labeled(l) => self.walk_stmt(&l.body),
            _ => {}
        }
    }

    fn walk_function(&mut self, function: &'a Function) {
        if let Some(body) = &function.body {
            self.function_scope_stack.push(&body.stmts);
            self.walk_stmts(&body.stmts);
            self.function_scope_stack.pop();
        }
    }

    fn walk_expr(&mut self, expr: &'a Expr) {
        match expr {
            Expr::Call(call) => {
                if self.decompress_site.is_none() {
                    if is_decompress_call(call) {
                        if let Some(ExprOrSpread { spread: None, expr }) = call.args.first() {
                            self.decompress_site =
                                Some((expr.as_ref(), self.enclosing_function_scope()));
                        }
                    }
                }
                if let Callee::Expr(e) = &call.callee {
                    self.walk_expr(e);
                }
                for a in &call.args {
                    self.walk_expr(&a.expr);
                }
            }
            Expr::Fn(f) => self.walk_function(&f.function),
            Expr::Bin(b) => {
                self.walk_expr(&b.left);
                self.walk_expr(&b.right);
            }
            Expr::Unary(u) => self.walk_expr(&u.arg),
            Expr::Cond(c) => {
                self.walk_expr(&c.test);
                self.walk_expr(&c.cons);
                self.walk_expr(&c.alt);
            }
            Expr::Member(m) => {
                self.walk_expr(&m.obj);
                if let MemberProp::Computed(c) = &m.prop {
                    self.walk_expr(&c.expr);
                }
            }
            Expr::Assign(a) => self.walk_expr(&a.right),
            Expr::Seq(s) => {
                for e in &s.exprs {
                    self.walk_expr(e);
                }
            }
            Expr::Paren(p) => self.walk_expr(&p.expr),
            Expr::Array(arr) => {
                for el in arr.elems.iter().flatten() {
                    self.walk_expr(&el.expr);
                }
            }
            _ => {}
        }
    }
}

fn is_decompress_call(call: &CallExpr) -> bool {
    let Callee::Expr(callee) = &call.callee else {
        return false;
    };
    match callee.as_ref() {
        Expr::Member(m) => matches!(&m.prop, MemberProp::Ident(id) if id.sym == *"decompressFromUTF16"),
        _ => false,
    }
}

/// Resolves the `decompressFromUTF16` argument to a string literal, either
/// inline or via a declarator binding it somewhere in the program.
fn resolve_string_literal(expr: &Expr, program: &Program) -> Option<String> {
    if let Expr::Lit(Lit::Str(s)) = expr {
        return Some(s.value.to_string());
    }
    let Expr::Ident(ident) = expr else {
        return None;
    };
    find_string_binding(program, &ident.sym)
}

fn find_string_binding(program: &Program, name: &str) -> Option<String> {
    struct Finder<'a> {
        name: &'a str,
        found: Option<String>,
    }
    impl<'a> Finder<'a> {
        fn visit_stmts(&mut self, stmts: &[Stmt]) {
            for stmt in stmts {
                if self.found.is_some() {
                    return;
                }
                self.visit_stmt(stmt);
            }
        }
        fn visit_stmt(&mut self, stmt: &Stmt) {
            match stmt {
                Stmt::Decl(Decl::Var(v)) => {
                    for decl in &v.decls {
                        if let Pat::Ident(b) = &decl.name {
                            if b.id.sym == *self.name {
                                if let Some(init) = &decl.init {
                                    if let Expr::Lit(Lit::Str(s)) = init.as_ref() {
                                        self.found = Some(s.value.to_string());
                                    }
                                }
                            }
                        }
                    }
                }
                Stmt::Decl(Decl::Fn(f)) => {
                    if let Some(body) = &f.function.body {
                        self.visit_stmts(&body.stmts);
                    }
                }
                Stmt::Block(b) => self.visit_stmts(&b.stmts),
                Stmt::If(i) => {
                    self.visit_stmt(&i.cons);
                    if let Some(a) = &i.alt {
                        self.visit_stmt(a);
                    }
                }
                _ => {}
            }
        }
    }
    let mut finder = Finder { name, found: None };
    match program {
        Program::Module(m) => {
            for item in &m.body {
                if let ModuleItem::Stmt(s) = item {
                    finder.visit_stmt(s);
                }
            }
        }
        Program::Script(s) => finder.visit_stmts(&s.body),
    }
    finder.found
}

/// Strategy 1 (§4.4): within the decompress call's enclosing statement
/// list, look for `NAME = function (param) { return ARRAY[param]; }`.
fn find_decoder_in_scope(scope: &[Stmt]) -> Option<String> {
    for stmt in scope {
        let Stmt::Expr(expr_stmt) = stmt else { continue };
        let Expr::Assign(assign) = expr_stmt.expr.as_ref() else { continue };
        let AssignTarget::Simple(SimpleAssignTarget::Ident(target)) = &assign.left else {
            continue;
        };
        let func = match assign.right.as_ref() {
            Expr::Fn(f) => &f.function,
            _ => continue,
        };
        if func.params.len() != 1 {
            continue;
        }
        let Pat::Ident(param) = &func.params[0].pat else { continue };
        let Some(body) = &func.body else { continue };
        if body.stmts.len() != 1 {
            continue;
        }
        let Stmt::Return(ret) = &body.stmts[0] else { continue };
        let Some(arg) = &ret.arg else { continue };
        let Expr::Member(member) = arg.as_ref() else { continue };
        let Expr::Ident(_array_name) = member.obj.as_ref() else { continue };
        let MemberProp::Computed(computed) = &member.prop else { continue };
        let Expr::Ident(index_ident) = computed.expr.as_ref() else { continue };
        if index_ident.sym == param.id.sym {
            return Some(target.id.sym.to_string());
        }
    }
    None
}

/// Strategy 2 (§4.4/§9): starting at the *last* occurrence of
/// `decompressFromUTF16` in the raw source (the first occurrence is the
/// codec library's own definition, shipped embedded in the obfuscated
/// file), scan forward at most 1000 characters for the decoder pattern.
fn find_decoder_textual(source: &str) -> Option<String> {
    let marker_pos = source.rfind("decompressFromUTF16")?;
    let window_start = marker_pos;
    let window_end = (window_start + TEXTUAL_FALLBACK_WINDOW).min(source.len());
    let window = char_boundary_slice(source, window_start, window_end);

    // The `regex` crate guarantees linear-time matching and therefore has no
    // backreference support, so "the array index is the same identifier as
    // the parameter" can't be expressed inside the pattern itself -- capture
    // both identifiers and compare them afterward.
    static PATTERN: std::sync::OnceLock<Regex> = std::sync::OnceLock::new();
    let re = PATTERN.get_or_init(|| {
        Regex::new(r"(\w+)\s*=\s*function\s*\(\s*(\w+)\s*\)\s*\{\s*return\s+(\w+)\[\s*(\w+)\s*\]\s*;?\s*\}")
            .expect("decoder fallback regex is a fixed literal")
    });
    re.captures_iter(window).find_map(|c| {
        if c[2] == c[4] {
            Some(c[1].to_string())
        } else {
            None
        }
    })
}

fn char_boundary_slice(s: &str, start: usize, end: usize) -> &str {
    let mut start = start;
    while start < s.len() && !s.is_char_boundary(start) {
        start += 1;
    }
    let mut end = end;
    while end < s.len() && !s.is_char_boundary(end) {
        end += 1;
    }
    &s[start..end.min(s.len())]
}

fn find_constant_arrays<'a>(stmts: impl Iterator<Item = &'a Stmt>) -> Vec<(String, ConstantArray)> {
    let mut out = Vec::new();
    for stmt in stmts {
        let Stmt::Decl(Decl::Var(var_decl)) = stmt else { continue };
        for decl in &var_decl.decls {
            let Pat::Ident(binding) = &decl.name else { continue };
            let Some(init) = &decl.init else { continue };
            let Expr::Array(array_lit) = init.as_ref() else { continue };
            if array_lit.elems.len() < MIN_ARRAY_LEN {
                continue;
            }
            let mut elements = Vec::with_capacity(array_lit.elems.len());
            let mut all_evaluable = true;
            for elem in &array_lit.elems {
                match elem {
                    Some(ExprOrSpread { spread: None, expr }) => match literal::eval(expr) {
                        Some(v) => elements.push(v),
                        None => {
                            all_evaluable = false;
                            break;
                        }
                    },
                    _ => {
                        all_evaluable = false;
                        break;
                    }
                }
            }
            let name = binding.id.sym.to_string();
            if all_evaluable {
                log::debug!(target: "discovery", "constant_array accepted: {name} ({} elements)", elements.len());
                out.push((name, ConstantArray { elements }));
            } else {
                log::debug!(target: "discovery", "constant_array rejected: {name} (non-literal element)");
            }
        }
    }
    out
}

fn find_resolver_candidates<'a>(
    stmts: impl Iterator<Item = &'a Stmt>,
) -> Vec<(String, HashMap<String, String>)> {
    let mut out = Vec::new();
    for stmt in stmts {
        let (name, function) = match stmt {
            Stmt::Decl(Decl::Fn(f)) => (f.ident.sym.to_string(), &f.function),
            Stmt::Expr(e) => match e.expr.as_ref() {
                Expr::Fn(f) if f.ident.is_some() => {
                    (f.ident.as_ref().unwrap().sym.to_string(), &f.function)
                }
                _ => continue,
            },
            _ => continue,
        };
        if function.params.len() != 1 {
            continue;
        }
        let Pat::Ident(param) = &function.params[0].pat else { continue };
        let Some(body) = &function.body else { continue };
        let Some(map) = extract_resolver_map(&body.stmts, &param.id.sym) else { continue };
        out.push((name, map));
    }
    out
}

fn extract_resolver_map(stmts: &[Stmt], param_name: &str) -> Option<HashMap<String, String>> {
    let switch = stmts.iter().find_map(|s| match s {
        Stmt::Switch(sw) => Some(sw),
        _ => None,
    })?;
    let Expr::Ident(discriminant) = switch.discriminant.as_ref() else { return None };
    if discriminant.sym != *param_name {
        return None;
    }
    let mut map = HashMap::new();
    for case in &switch.cases {
        let Some(test) = &case.test else { continue };
        let Expr::Lit(Lit::Str(key)) = test.as_ref() else { continue };
        let Some(ret) = case.cons.iter().find_map(|s| match s {
            Stmt::Return(r) => Some(r),
            _ => None,
        }) else {
            continue;
        };
        let Some(arg) = &ret.arg else { continue };
        if let Some(target) = target_name(arg) {
            map.insert(key.value.to_string(), target);
        }
    }
    Some(map)
}

/// A resolver's return value is accepted as `OBJ["NAME"]`, `OBJ.NAME`, or a
/// bare identifier `NAME`.
fn target_name(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Ident(id) => Some(id.sym.to_string()),
        Expr::Member(m) => match &m.prop {
            MemberProp::Ident(id) => Some(id.sym.to_string()),
            MemberProp::Computed(c) => match c.expr.as_ref() {
                Expr::Lit(Lit::Str(s)) => Some(s.value.to_string()),
                _ => None,
            },
            MemberProp::PrivateName(_) => None,
        },
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsing;

    fn discover_src(src: &str) -> Discovery {
        let parsed = parsing::parse(src).expect("parse failed");
        discover(&parsed.program, src, true)
    }

    #[test]
    fn accepts_long_all_literal_array() {
        let d = discover_src("var A=[0,1,2,3,4,5,6,7,8,9,10];");
        assert!(d.arrays.contains_key("A"));
        assert_eq!(d.arrays["A"].elements.len(), 11);
    }

    #[test]
    fn rejects_short_array() {
        let d = discover_src("var A=[0,1,2];");
        assert!(!d.arrays.contains_key("A"));
    }

    #[test]
    fn rejects_array_with_non_literal_element() {
        let d = discover_src("var A=[0,1,2,3,4,5,6,7,8,f()];");
        assert!(!d.arrays.contains_key("A"));
    }

    #[test]
    fn discovers_resolver_with_enough_mappings() {
        let src = r#"
            function R(k) {
                switch (k) {
                    case "a": return g["Date"];
                    case "b": return g["console"];
                    case "c": return g.Math;
                    case "d": return JSON;
                    case "e": return g["fetch"];
                }
            }
        "#;
        let d = discover_src(src);
        assert_eq!(d.resolvers.len(), 1);
        assert_eq!(d.resolvers[0].map.get("a"), Some(&"Date".to_string()));
    }

    #[test]
    fn rejects_resolver_with_too_few_mappings() {
        let src = r#"
            function R(k) {
                switch (k) {
                    case "a": return g["Date"];
                    case "b": return g["console"];
                }
            }
        "#;
        let d = discover_src(src);
        assert!(d.resolvers.is_empty());
    }

    #[test]
    fn finds_decoder_via_textual_fallback_when_out_of_scope() {
        // The decompress call sits inside `wrapper`'s body, so the AST
        // strategy's scope search (which only looks at the call's own
        // enclosing statement list) comes up empty; the decoder assignment
        // is only reachable via the textual fallback scanning forward from
        // the last `decompressFromUTF16` occurrence.
        let packed = crate::codec::compress_to_utf16("alpha|beta|gamma");
        let escaped: String = packed.chars().map(|c| format!("\\u{:04x}", c as u32)).collect();
        let src = format!(
            r#"
            function wrapper() {{
                x.decompressFromUTF16("{escaped}");
            }}
            wrapper();
            D = function(i) {{ return T[i]; }};
            "#
        );
        let d = discover_src(&src);
        let table = d.string_table.expect("string table not discovered");
        assert_eq!(table.decoder.as_deref(), Some("D"));
    }

    #[test]
    fn finds_decoder_via_ast_strategy_when_call_nested_in_block() {
        // The decompress call sits inside an `if` nested in `f`'s body, but
        // the decoder assignment is a sibling of the call at `f`'s own
        // top level, not the `if`-block's. Placing the assignment *before*
        // the `if` means the (forward-scanning) textual fallback could never
        // find it either, so a pass here proves the AST strategy -- not the
        // fallback -- is what located it.
        let packed = crate::codec::compress_to_utf16("alpha|beta|gamma");
        let escaped: String = packed.chars().map(|c| format!("\\u{:04x}", c as u32)).collect();
        let src = format!(
            r#"
            function f(x) {{
                D = function(i) {{ return T[i]; }};
                if (x) {{
                    y.decompressFromUTF16("{escaped}");
                }}
            }}
            f(1);
            "#
        );
        let d = discover_src(&src);
        let table = d.string_table.expect("string table not discovered");
        assert_eq!(table.decoder.as_deref(), Some("D"));
    }

    #[test]
    fn finds_string_table_and_ast_decoder() {
        let packed = crate::codec::compress_to_utf16("alpha|beta|gamma");
        let escaped: String = packed.chars().map(|c| format!("\\u{:04x}", c as u32)).collect();
        let src = format!(
            r#"var T = x.decompressFromUTF16("{escaped}").split("|"); D = function(i) {{ return T[i]; }};"#
        );
        let d = discover_src(&src);
        let table = d.string_table.expect("string table not discovered");
        assert_eq!(table.decoder.as_deref(), Some("D"));
    }
}

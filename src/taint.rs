use std::collections::HashMap;

use tracing::debug;

use crate::guard::{self, Verdict};
use crate::ir::*;
use crate::matchers::sinks::{self, ConstructionForm};
use crate::matchers::sources;

/// What a local variable is known to hold at the current program point.
#[derive(Debug, Clone)]
enum Fact {
    /// Assigned from an archive entry's `getName()`.
    EntryName,
    /// Bound to a tainted path construction (index into `Walker::bindings`).
    Tainted(usize),
}

/// Flow state: taint facts plus the last definition of every local, used to
/// resolve guard operands. Cloned at branch entry and discarded at branch
/// exit; facts never merge back out of a branch.
#[derive(Debug, Clone, Default)]
struct State {
    env: HashMap<String, Fact>,
    defs: HashMap<String, Expr>,
}

/// A tainted path construction bound to a local variable.
#[derive(Debug)]
pub struct Binding {
    pub pos: usize,
    pub var: String,
    pub init: Expr,
    pub base_span: Span,
    pub base_core: Expr,
    pub base_ty: JavaType,
    pub value_ty: JavaType,
    pub decl_span: Span,
    pub io_ok: bool,
    /// `new File(a + sep + b)` bindings also get their constructor split
    /// into the two-argument form: (whole-argument span, base span, segment span).
    pub ctor_rewrite: Option<(Span, Span, Span)>,
    /// Set when the base variable is reassigned afterwards; sinks recorded
    /// past this point cannot trust the base and are skipped.
    invalidated_at: Option<usize>,
}

/// How the hoisted variable's initializer is printed.
#[derive(Debug, Clone, Copy)]
pub enum InitSource {
    /// Reuse the construction text as written (`new File(dir, name)`,
    /// `dir.resolve(name)`).
    Verbatim(Span),
    /// Synthesize `new File(base, segment)` from the two operand spans.
    JoinFile(Span, Span),
}

#[derive(Debug)]
struct GuardRec {
    pos: usize,
    chain: Vec<usize>,
    g: guard::RecognizedGuard,
}

#[derive(Debug)]
enum RawSink {
    Bound {
        binding: usize,
        pos: usize,
        chain: Vec<usize>,
        span: Span,
    },
    Inline {
        pos: usize,
        chain: Vec<usize>,
        expr: Expr,
        base_core: Expr,
        anchor_span: Span,
        replace_span: Span,
        init: InitSource,
        base_span: Span,
        base_ty: JavaType,
        value_ty: JavaType,
        io_ok: bool,
        span: Span,
    },
}

/// The remediation decided for one sink.
#[derive(Debug)]
pub enum Action {
    GuardAfterBinding {
        decl_span: Span,
        var: String,
        value_ty: JavaType,
        base_span: Span,
        base_ty: JavaType,
        io_ok: bool,
        ctor_rewrite: Option<(Span, Span, Span)>,
    },
    HoistAndGuard {
        anchor_span: Span,
        replace_span: Span,
        init: InitSource,
        value_ty: JavaType,
        base_span: Span,
        base_ty: JavaType,
        io_ok: bool,
    },
    /// Separator-qualify an existing weak string-prefix guard in place.
    Strengthen { insert_at: usize },
}

#[derive(Debug)]
pub struct SinkOutcome {
    pub span: Span,
    pub covered: bool,
    pub action: Option<Action>,
    /// Set when the sink was deliberately left alone (e.g. the tainted
    /// value escapes into a helper that may validate it).
    pub skipped: Option<&'static str>,
}

#[derive(Debug, Default)]
pub struct MethodAnalysis {
    pub sinks: Vec<SinkOutcome>,
}

struct Walker {
    policy: BaseDirEquality,
    throws_io: bool,
    catch_io: Vec<bool>,
    pos: usize,
    next_block: usize,
    bindings: Vec<Binding>,
    guards: Vec<GuardRec>,
    raw_sinks: Vec<RawSink>,
    /// Every (variable, position) assignment seen, for staleness checks.
    assigns: Vec<(String, usize)>,
    /// (binding, pos): the bound variable was passed whole into an
    /// unknown method, possibly a validate() helper we cannot see into.
    escapes: Vec<(usize, usize)>,
}

/// Analyze one method body: prove taint, decide coverage, plan fixes.
pub fn analyze_method(m: &MethodBody, policy: BaseDirEquality) -> MethodAnalysis {
    let mut w = Walker {
        policy,
        throws_io: m.throws.iter().any(|t| t == "IOException"),
        catch_io: Vec::new(),
        pos: 0,
        next_block: 0,
        bindings: Vec::new(),
        guards: Vec::new(),
        raw_sinks: Vec::new(),
        assigns: Vec::new(),
        escapes: Vec::new(),
    };
    let mut state = State::default();
    w.walk_block(&m.body, &mut state, Vec::new());
    debug!(
        target: "taint",
        method = %m.name,
        bindings = w.bindings.len(),
        guards = w.guards.len(),
        sinks = w.raw_sinks.len(),
        "taint walk finished"
    );
    w.resolve()
}

impl Walker {
    fn io_ok(&self) -> bool {
        self.throws_io || self.catch_io.iter().any(|&b| b)
    }

    fn tainted(&self, e: &Expr, state: &State) -> bool {
        if e.is_constant() {
            return false;
        }
        let mut t = false;
        e.walk(&mut |x| {
            if sources::is_entry_name_call(x) {
                t = true;
            }
            if let ExprKind::Ident(n) = &x.kind {
                if matches!(state.env.get(n), Some(Fact::EntryName)) {
                    t = true;
                }
            }
        });
        t
    }

    /// A usable base directory: path-ish type, and under the strict policy
    /// no call chains (only identifiers and field accesses are stable).
    fn base_ok(&self, base: &Expr, state: &State) -> bool {
        if !matches!(base.ty, JavaType::File | JavaType::Path | JavaType::Str) {
            return false;
        }
        if self.tainted(base, state) {
            return false;
        }
        if self.policy == BaseDirEquality::Strict {
            let mut has_call = false;
            base.walk(&mut |x| {
                if matches!(x.kind, ExprKind::Call { .. } | ExprKind::New { .. }) {
                    has_call = true;
                }
            });
            if has_call {
                return false;
            }
        }
        true
    }

    fn walk_block(&mut self, block: &Block, state: &mut State, mut chain: Vec<usize>) {
        chain.push(self.next_block);
        self.next_block += 1;

        for stmt in &block.stmts {
            self.pos += 1;
            let pos = self.pos;
            match &stmt.kind {
                StmtKind::Local { ty, name, init: Some(init), .. } => {
                    self.scan_consumers(stmt.span, pos, &chain, init, state);
                    self.classify_assignment(*ty, name, init, stmt.span, pos, state);
                }
                StmtKind::Local { name, init: None, .. } => {
                    self.assigns.push((name.clone(), pos));
                    state.env.remove(name);
                    state.defs.remove(name);
                }
                StmtKind::Expr(e) => {
                    self.scan_consumers(stmt.span, pos, &chain, e, state);
                    self.apply_assign_effects(e, stmt.span, pos, state);
                }
                StmtKind::If { cond, then_block, else_block } => {
                    if let Some(g) = guard::recognize_guard(stmt, &state.defs) {
                        debug!(target: "taint", pos, verdict = ?g.verdict, "recognized containment guard");
                        self.guards.push(GuardRec { pos, chain: chain.clone(), g });
                    }
                    self.scan_consumers(stmt.span, pos, &chain, cond, state);
                    self.apply_assign_effects(cond, stmt.span, pos, state);
                    let mut then_state = state.clone();
                    self.walk_block(then_block, &mut then_state, chain.clone());
                    if let Some(eb) = else_block {
                        let mut else_state = state.clone();
                        self.walk_block(eb, &mut else_state, chain.clone());
                    }
                }
                StmtKind::While { cond, body } => {
                    self.scan_consumers(stmt.span, pos, &chain, cond, state);
                    self.apply_assign_effects(cond, stmt.span, pos, state);
                    let mut body_state = state.clone();
                    self.walk_block(body, &mut body_state, chain.clone());
                }
                StmtKind::For { body } => {
                    let mut body_state = state.clone();
                    self.walk_block(body, &mut body_state, chain.clone());
                }
                StmtKind::Try { resources, body, catches, finally_block } => {
                    // Resource declarations sit outside the catch scope: a
                    // guard anchored on one lands before the whole `try`.
                    for r in resources {
                        self.pos += 1;
                        let rpos = self.pos;
                        if let StmtKind::Local { ty, name, init: Some(init), .. } = &r.kind {
                            self.scan_consumers(stmt.span, rpos, &chain, init, state);
                            self.classify_assignment(*ty, name, init, stmt.span, rpos, state);
                        }
                    }
                    let catches_io = catches
                        .iter()
                        .any(|c| c.type_names.iter().any(|t| t == "IOException"));
                    self.catch_io.push(catches_io);
                    let mut body_state = state.clone();
                    self.walk_block(body, &mut body_state, chain.clone());
                    self.catch_io.pop();
                    for c in catches {
                        let mut cstate = state.clone();
                        self.walk_block(&c.body, &mut cstate, chain.clone());
                    }
                    if let Some(f) = finally_block {
                        let mut fstate = state.clone();
                        self.walk_block(f, &mut fstate, chain.clone());
                    }
                }
                StmtKind::Block(b) => {
                    let mut bstate = state.clone();
                    self.walk_block(b, &mut bstate, chain.clone());
                }
                StmtKind::Throw
                | StmtKind::Return
                | StmtKind::Break
                | StmtKind::Continue
                | StmtKind::Other => {}
            }
        }
    }

    /// Record the effect of `name = value` / `Ty name = value` on the state,
    /// creating a binding when the value is a tainted path construction.
    fn classify_assignment(
        &mut self,
        decl_ty: JavaType,
        name: &str,
        value: &Expr,
        stmt_span: Span,
        pos: usize,
        state: &mut State,
    ) {
        self.assigns.push((name.to_owned(), pos));
        self.kill_dependents(name, pos, state);

        // Pre-compute the construction match so its taint predicate (which
        // borrows the walker and the state) is gone before we mutate either.
        let construction = {
            let pred = |e: &Expr| self.tainted(e, state);
            sinks::match_construction(value, &pred).map(|c| {
                let usable = matches!(decl_ty, JavaType::File | JavaType::Path)
                    && self.base_ok(c.base, state);
                let ctor_rewrite = match (&c.form, &value.kind) {
                    (ConstructionForm::ConcatFileCtor, ExprKind::New { args, .. }) => {
                        // span of the single concat argument, plus operands
                        Some((args[0].span, c.base.span, c.segment.span))
                    }
                    _ => None,
                };
                (usable, c.form, ctor_rewrite, c.base.span, guard::base_core(c.base), c.base.ty, c.value_ty)
            })
        };

        if sources::is_entry_name_call(value) {
            debug!(target: "taint", var = name, "entry name source");
            state.env.insert(name.to_owned(), Fact::EntryName);
        } else if let Some((usable, form, ctor_rewrite, base_span, base_core, base_ty, value_ty)) =
            construction
        {
            // Only File/Path-typed variables produce guardable bindings; a
            // tainted *string* join is left for the consumer-side match.
            if usable {
                let idx = self.bindings.len();
                self.bindings.push(Binding {
                    pos,
                    var: name.to_owned(),
                    init: value.clone(),
                    base_span,
                    base_core,
                    base_ty,
                    value_ty,
                    decl_span: stmt_span,
                    io_ok: self.io_ok(),
                    ctor_rewrite,
                    invalidated_at: None,
                });
                debug!(target: "taint", var = name, ?form, "tainted path binding");
                state.env.insert(name.to_owned(), Fact::Tainted(idx));
            } else {
                state.env.remove(name);
            }
        } else if let Some(alias) = value.ident_name().and_then(|n| state.env.get(n).cloned()) {
            // Plain alias keeps the fact; a path alias still points at the
            // original binding, which is what a guard would reference.
            state.env.insert(name.to_owned(), alias);
        } else {
            state.env.remove(name);
        }
        state.defs.insert(name.to_owned(), value.clone());
    }

    /// Assignments nested in an expression (`(entry = it.next()) != null`,
    /// plain assignment statements) feed the same classification.
    fn apply_assign_effects(
        &mut self,
        e: &Expr,
        stmt_span: Span,
        pos: usize,
        state: &mut State,
    ) {
        let mut assigns: Vec<(String, Expr)> = Vec::new();
        e.walk(&mut |x| {
            if let ExprKind::Assign { target, value } = &x.kind {
                if let Some(n) = target.ident_name() {
                    assigns.push((n.to_owned(), (**value).clone()));
                }
            }
        });
        for (name, value) in assigns {
            // No declared type on a reassignment; the value's own type
            // stands in for it.
            let decl_ty = value.ty;
            self.classify_assignment(decl_ty, &name, &value, stmt_span, pos, state);
        }
    }

    /// Reassigning a variable invalidates bindings whose base mentions it.
    fn kill_dependents(&mut self, name: &str, pos: usize, state: &State) {
        for fact in state.env.values() {
            if let Fact::Tainted(idx) = fact {
                let b = &self.bindings[*idx];
                if b.invalidated_at.is_some() {
                    continue;
                }
                let mut mentions = false;
                let core = b.base_core.clone();
                core.walk(&mut |x| {
                    if x.ident_name() == Some(name) {
                        mentions = true;
                    }
                });
                if mentions {
                    self.bindings[*idx].invalidated_at = Some(pos);
                }
            }
        }
    }

    /// Find file-opening consumers inside `e` and record the sinks they
    /// form with tainted operands.
    fn scan_consumers(
        &mut self,
        anchor_span: Span,
        pos: usize,
        chain: &[usize],
        e: &Expr,
        state: &State,
    ) {
        let mut found: Vec<RawSink> = Vec::new();
        let mut escapes: Vec<usize> = Vec::new();
        e.walk(&mut |x| {
            let Some(path_args) = sinks::consumer_path_args(x) else {
                // Not a consumer: a bound path passed whole into some other
                // method may be validated there, which we cannot prove, so
                // remember the escape and leave such sinks alone.
                if let ExprKind::Call { args, .. } | ExprKind::New { args, .. } = &x.kind {
                    for arg in args {
                        if let Some(n) = arg.ident_name() {
                            if let Some(Fact::Tainted(idx)) = state.env.get(n) {
                                escapes.push(*idx);
                            }
                        }
                    }
                }
                return;
            };
            for arg in path_args {
                if let Some(n) = arg.ident_name() {
                    if let Some(Fact::Tainted(idx)) = state.env.get(n) {
                        found.push(RawSink::Bound {
                            binding: *idx,
                            pos,
                            chain: chain.to_vec(),
                            span: arg.span,
                        });
                    }
                    continue;
                }
                let Some(c) = sinks::match_construction(arg, &|s| self.tainted(s, state)) else {
                    continue;
                };
                if !self.base_ok(c.base, state) {
                    continue;
                }
                let (replace_span, init, value_ty) = match c.form {
                    ConstructionForm::TwoArgJoin | ConstructionForm::Resolve => {
                        (arg.span, InitSource::Verbatim(arg.span), c.value_ty)
                    }
                    ConstructionForm::ConcatFileCtor | ConstructionForm::BareConcat => (
                        arg.span,
                        InitSource::JoinFile(c.base.span, c.segment.span),
                        JavaType::File,
                    ),
                };
                found.push(RawSink::Inline {
                    pos,
                    chain: chain.to_vec(),
                    expr: arg.clone(),
                    base_core: guard::base_core(c.base),
                    anchor_span,
                    replace_span,
                    init,
                    base_span: c.base.span,
                    base_ty: c.base.ty,
                    value_ty,
                    io_ok: self.io_ok(),
                    span: arg.span,
                });
            }
        });
        for s in found {
            debug!(target: "taint", pos, "sink candidate recorded");
            self.raw_sinks.push(s);
        }
        for idx in escapes {
            self.escapes.push((idx, pos));
        }
    }

    /// Decide coverage per sink and produce the outcome list in source order.
    fn resolve(self) -> MethodAnalysis {
        let mut sinks = Vec::new();
        for raw in &self.raw_sinks {
            match raw {
                RawSink::Bound { binding, pos, chain, span } => {
                    let b = &self.bindings[*binding];
                    if b.invalidated_at.map(|at| at < *pos).unwrap_or(false) {
                        // Base reassigned between binding and use: skip
                        // rather than guard against a stale base.
                        continue;
                    }
                    let matches_sink = |g: &GuardRec| {
                        g.pos > b.pos
                            && g.pos < *pos
                            && chain.starts_with(&g.chain)
                            && (g.g.candidate_core.ident_name() == Some(b.var.as_str())
                                || same_value(&g.g.candidate_core, &b.init, self.policy))
                            && same_value(&g.g.base_core, &b.base_core, self.policy)
                    };
                    let accepted = self
                        .guards
                        .iter()
                        .any(|g| g.g.verdict == Verdict::Accepted && matches_sink(g));
                    if accepted {
                        sinks.push(SinkOutcome {
                            span: *span,
                            covered: true,
                            action: None,
                            skipped: None,
                        });
                        continue;
                    }
                    let weak = self.guards.iter().find_map(|g| match g.g.verdict {
                        Verdict::Weak { insert_at } if matches_sink(g) => Some(insert_at),
                        _ => None,
                    });
                    if weak.is_none()
                        && self
                            .escapes
                            .iter()
                            .any(|&(bi, ep)| bi == *binding && ep > b.pos && ep < *pos)
                    {
                        sinks.push(SinkOutcome {
                            span: *span,
                            covered: false,
                            action: None,
                            skipped: Some("path escapes into a helper method before use"),
                        });
                        continue;
                    }
                    let action = match weak {
                        Some(insert_at) => Action::Strengthen { insert_at },
                        None => Action::GuardAfterBinding {
                            decl_span: b.decl_span,
                            var: b.var.clone(),
                            value_ty: b.value_ty,
                            base_span: b.base_span,
                            base_ty: b.base_ty,
                            io_ok: b.io_ok,
                            ctor_rewrite: b.ctor_rewrite,
                        },
                    };
                    sinks.push(SinkOutcome {
                        span: *span,
                        covered: false,
                        action: Some(action),
                        skipped: None,
                    });
                }
                RawSink::Inline {
                    pos,
                    chain,
                    expr,
                    base_core,
                    anchor_span,
                    replace_span,
                    init,
                    base_span,
                    base_ty,
                    value_ty,
                    io_ok,
                    span,
                } => {
                    // An inline construction carries no variable; a guard can
                    // still cover it by comparing the very same call chain
                    // (never equal under the strict policy), provided none of
                    // the chain's variables were reassigned in between.
                    let stale = |g: &GuardRec| {
                        let mut hit = false;
                        expr.walk(&mut |x| {
                            if let Some(n) = x.ident_name() {
                                if self
                                    .assigns
                                    .iter()
                                    .any(|(an, ap)| an == n && *ap > g.pos && *ap < *pos)
                                {
                                    hit = true;
                                }
                            }
                        });
                        hit
                    };
                    let covered = self.guards.iter().any(|g| {
                        g.g.verdict == Verdict::Accepted
                            && g.pos < *pos
                            && chain.starts_with(&g.chain)
                            && same_value(&g.g.candidate_core, expr, self.policy)
                            && same_value(&g.g.base_core, base_core, self.policy)
                            && !stale(g)
                    });
                    if covered {
                        sinks.push(SinkOutcome {
                            span: *span,
                            covered: true,
                            action: None,
                            skipped: None,
                        });
                        continue;
                    }
                    sinks.push(SinkOutcome {
                        span: *span,
                        covered: false,
                        action: Some(Action::HoistAndGuard {
                            anchor_span: *anchor_span,
                            replace_span: *replace_span,
                            init: *init,
                            value_ty: *value_ty,
                            base_span: *base_span,
                            base_ty: *base_ty,
                            io_ok: *io_ok,
                        }),
                        skipped: None,
                    });
                }
            }
        }
        MethodAnalysis { sinks }
    }
}

#[cfg(test)]
fn analyze(src: &str) -> MethodAnalysis {
    let tree = crate::lower::parse_java(src).unwrap();
    let m = &crate::lower::lower_methods(&tree, src)[0];
    analyze_method(m, BaseDirEquality::Syntactic)
}

#[test]
fn join_consumed_by_stream_is_an_uncovered_sink() {
    let out = analyze(
        r#"
        import java.io.File;
        import java.io.FileOutputStream;
        import java.util.zip.ZipEntry;

        class T {
            void m(ZipEntry entry, File dir) throws Exception {
                String name = entry.getName();
                File file = new File(dir, name);
                FileOutputStream os = new FileOutputStream(file);
            }
        }"#,
    );
    assert_eq!(out.sinks.len(), 1);
    assert!(!out.sinks[0].covered);
    assert!(matches!(
        out.sinks[0].action,
        Some(Action::GuardAfterBinding { ref var, .. }) if var == "file"
    ));
}

#[test]
fn normalized_guard_covers_the_sink() {
    let out = analyze(
        r#"
        class T {
            void m(java.util.zip.ZipEntry entry, java.io.File dir) throws Exception {
                String name = entry.getName();
                java.io.File file = new File(dir, name);
                if (!file.toPath().normalize().startsWith(dir.toPath().normalize()))
                    throw new Exception();
                java.io.FileOutputStream os = new FileOutputStream(file);
            }
        }"#,
    );
    assert_eq!(out.sinks.len(), 1);
    assert!(out.sinks[0].covered);
}

#[test]
fn guard_inside_a_sibling_branch_does_not_cover() {
    let out = analyze(
        r#"
        class T {
            void m(java.util.zip.ZipEntry entry, java.io.File dir) throws Exception {
                String name = entry.getName();
                java.io.File file = new File(dir, name);
                if (entry.isDirectory()) {
                    if (!file.toPath().normalize().startsWith(dir.toPath().normalize()))
                        throw new Exception();
                }
                java.io.FileOutputStream os = new FileOutputStream(file);
            }
        }"#,
    );
    assert_eq!(out.sinks.len(), 1);
    assert!(!out.sinks[0].covered, "a guard on one branch proves nothing for the other");
}

#[test]
fn unconsumed_join_is_not_a_sink() {
    let out = analyze(
        r#"
        class T {
            void m(java.util.zip.ZipEntry entry, java.io.File dir) {
                java.io.File d = new File(dir, entry.getName());
                d.mkdirs();
            }
        }"#,
    );
    assert!(out.sinks.is_empty());
}

#[test]
fn literal_segment_is_never_tainted() {
    let out = analyze(
        r#"
        class T {
            void m(java.io.File dir) throws Exception {
                java.io.File file = new File(dir, "static" + ".bin");
                java.io.FileOutputStream os = new FileOutputStream(file);
            }
        }"#,
    );
    assert!(out.sinks.is_empty());
}

#[test]
fn inline_resolve_needs_a_hoist() {
    let out = analyze(
        r#"
        class T {
            void m(java.util.zip.ZipEntry entry, java.nio.file.Path dir) throws Exception {
                String name = entry.getName();
                java.io.OutputStream os = Files.newOutputStream(dir.resolve(name));
            }
        }"#,
    );
    assert_eq!(out.sinks.len(), 1);
    assert!(matches!(
        out.sinks[0].action,
        Some(Action::HoistAndGuard { value_ty: JavaType::Path, .. })
    ));
}

#[test]
fn repeated_call_chain_guard_covers_an_inline_sink() {
    let out = analyze(
        r#"
        class T {
            void m(java.util.zip.ZipEntry entry, java.nio.file.Path dir) throws Exception {
                String name = entry.getName();
                if (!dir.resolve(name).normalize().startsWith(dir.normalize()))
                    throw new Exception();
                java.io.OutputStream os = Files.newOutputStream(dir.resolve(name));
            }
        }"#,
    );
    assert_eq!(out.sinks.len(), 1);
    assert!(out.sinks[0].covered, "the guard names the same resolve chain");
}

#[test]
fn reassignment_between_guard_and_inline_sink_defeats_coverage() {
    let out = analyze(
        r#"
        class T {
            void m(java.util.zip.ZipEntry entry, java.util.zip.ZipEntry other, java.nio.file.Path dir) throws Exception {
                String name = entry.getName();
                if (!dir.resolve(name).normalize().startsWith(dir.normalize()))
                    throw new Exception();
                name = other.getName();
                java.io.OutputStream os = Files.newOutputStream(dir.resolve(name));
            }
        }"#,
    );
    assert_eq!(out.sinks.len(), 1);
    assert!(!out.sinks[0].covered, "the guard checked the previous name");
}

#[test]
fn helper_method_validation_is_not_recognized() {
    let out = analyze(
        r#"
        class T {
            void m(java.util.zip.ZipEntry entry, java.io.File dir) throws Exception {
                String name = entry.getName();
                java.io.File file = new File(dir, name);
                validate(dir, file);
                java.io.FileOutputStream os = new FileOutputStream(file);
            }
        }"#,
    );
    // Interprocedural validation is a documented non-goal: the sink is
    // reported but never fixed.
    assert_eq!(out.sinks.len(), 1);
    assert!(!out.sinks[0].covered);
    assert!(out.sinks[0].action.is_none());
    assert!(out.sinks[0].skipped.is_some());
}

use std::collections::{HashMap, HashSet};

use crate::ir::{Expr, ExprKind, JavaType, Stmt, StmtKind};

/// Accessor wrappers a containment check may apply to either operand.
/// These never change the identity of the underlying path value.
const WRAPPERS: &[&str] = &[
  "toPath",
  "toFile",
  "normalize",
  "toAbsolutePath",
  "toRealPath",
  "getCanonicalFile",
  "getCanonicalPath",
  "getAbsoluteFile",
  "getAbsolutePath",
];

const CANONICAL: &[&str] = &["getCanonicalFile", "getCanonicalPath", "toRealPath"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
  /// One of the accepted containment-proof kinds.
  Accepted,
  /// A canonical-string prefix check missing the trailing-separator
  /// qualification, the partial-path-traversal weakness. `insert_at` is
  /// where ` + File.separator` strengthens it in place.
  Weak { insert_at: usize },
}

/// A conditional recognized as asserting containment of a candidate path
/// under a base directory, reduced to its two operand cores.
#[derive(Debug)]
pub struct RecognizedGuard {
  pub candidate_core: Expr,
  pub base_core: Expr,
  pub verdict: Verdict,
}

struct Resolved {
  core: Expr,
  ops: HashSet<String>,
  ty: JavaType,
}

/// Strip wrapper accessors, resolving identifiers through their local
/// definitions when the definition is itself a wrapper chain (one guard
/// operand is often `canFile` for `file.getCanonicalFile()`).
fn strip(e: &Expr, defs: &HashMap<String, Expr>, ops: &mut HashSet<String>, depth: usize) -> Expr {
  match &e.kind {
    ExprKind::Call { receiver: Some(r), name, args }
      if args.is_empty() && WRAPPERS.contains(&name.as_str()) =>
    {
      ops.insert(name.clone());
      strip(r, defs, ops, depth)
    }
    ExprKind::Cast { value } => strip(value, defs, ops, depth),
    ExprKind::Ident(n) if depth < 3 => match defs.get(n) {
      Some(def) if resolvable(def) => strip(def, defs, ops, depth + 1),
      _ => e.clone(),
    },
    _ => e.clone(),
  }
}

/// Only definitions that are pure accessor chains are looked through; a
/// variable bound to a construction stays a variable so it can be matched
/// against the sink's binding.
fn resolvable(def: &Expr) -> bool {
  matches!(
    &def.kind,
    ExprKind::Call { receiver: Some(_), name, args }
      if args.is_empty() && WRAPPERS.contains(&name.as_str())
  )
}

fn resolve(e: &Expr, defs: &HashMap<String, Expr>) -> Resolved {
  let mut ops = HashSet::new();
  let core = strip(e, defs, &mut ops, 0);
  Resolved { core, ops, ty: e.ty }
}

/// Strip wrappers without identifier resolution, used on a sink's base
/// expression so guard and sink compare at the same depth.
pub fn base_core(e: &Expr) -> Expr {
  let mut ops = HashSet::new();
  strip(e, &HashMap::new(), &mut ops, usize::MAX)
}

/// Recognize `stmt` as a containment guard: an `if` whose condition is
/// `!candidate.startsWith(base)` (modulo parentheses and local bindings)
/// and whose accept-failure branch exits.
pub fn recognize_guard(stmt: &Stmt, defs: &HashMap<String, Expr>) -> Option<RecognizedGuard> {
  let StmtKind::If { cond, then_block, .. } = &stmt.kind else { return None };
  if !then_block.exits() {
    return None;
  }
  let ExprKind::Not(inner) = &cond.kind else { return None };
  let ExprKind::Call { receiver: Some(cand_raw), name, args } = &inner.kind else {
    return None;
  };
  if name != "startsWith" || args.len() != 1 {
    return None;
  }
  let prefix_raw = &args[0];

  // Trailing-separator qualification on the prefix operand (kind 4).
  let (prefix_expr, sep_qualified) = match &prefix_raw.kind {
    ExprKind::Binary { op, lhs, rhs } if op == "+" && crate::matchers::sinks::is_separator_expr(rhs) => {
      (lhs.as_ref(), true)
    }
    _ => (prefix_raw, false),
  };

  let cand = resolve(cand_raw, defs);
  let base = resolve(prefix_expr, defs);

  let has = |r: &Resolved, names: &[&str]| r.ops.iter().any(|o| names.contains(&o.as_str()));
  let cand_canon = has(&cand, CANONICAL);
  let base_canon = has(&base, CANONICAL);
  let cand_norm = cand.ops.contains("normalize");
  let base_norm = base.ops.contains("normalize");

  let verdict = if cand_canon && base_canon {
    if cand.ty == JavaType::Path || base.ty == JavaType::Path {
      // Kind 1: canonicalized on both sides, compared as paths.
      // Path#startsWith is component-wise, no separator needed.
      Verdict::Accepted
    } else if sep_qualified {
      // Kind 4: canonical strings with the explicit separator suffix.
      Verdict::Accepted
    } else {
      // Canonical strings compared by raw string prefix: bypassable by a
      // sibling directory sharing the prefix.
      Verdict::Weak { insert_at: prefix_raw.span.end }
    }
  } else if cand_norm && base_norm {
    // Kinds 2 and 3: normalize (optionally absolute) on both sides.
    Verdict::Accepted
  } else if cand_norm && !base_norm && base.ty == JavaType::Str {
    // The synthesizer's own output when the base directory is a String:
    // the candidate side is normalized, the base is referenced verbatim.
    Verdict::Accepted
  } else {
    return None;
  };

  Some(RecognizedGuard { candidate_core: cand.core, base_core: base.core, verdict })
}

/// Any guard anywhere in the block, with flow-insensitive defs; the taint
/// walk calls `recognize_guard` with its live state instead.
#[cfg(test)]
fn recognize_all(body: &crate::ir::Block, defs: &HashMap<String, Expr>) -> Vec<RecognizedGuard> {
  let mut out = Vec::new();
  body.walk_stmts(&mut |s| {
    if let Some(g) = recognize_guard(s, defs) {
      out.push(g);
    }
  });
  out
}

#[cfg(test)]
fn guards_of(src: &str) -> Vec<RecognizedGuard> {
  let tree = crate::lower::parse_java(src).unwrap();
  let m = &crate::lower::lower_methods(&tree, src)[0];
  let mut defs = HashMap::new();
  m.body.walk_stmts(&mut |s| {
    if let StmtKind::Local { name, init: Some(e), .. } = &s.kind {
      defs.insert(name.clone(), e.clone());
    }
  });
  recognize_all(&m.body, &defs)
}

#[test]
fn normalize_both_sides_is_accepted() {
  let gs = guards_of(
    r#"
    class T {
      void m(java.io.File file, java.io.File dir) throws Exception {
        if (!file.toPath().normalize().startsWith(dir.toPath().normalize()))
          throw new Exception();
      }
    }"#,
  );
  assert_eq!(gs.len(), 1);
  assert_eq!(gs[0].verdict, Verdict::Accepted);
  assert_eq!(gs[0].candidate_core.ident_name(), Some("file"));
  assert_eq!(gs[0].base_core.ident_name(), Some("dir"));
}

#[test]
fn canonical_file_compared_as_path_is_accepted() {
  let gs = guards_of(
    r#"
    class T {
      void m(java.io.File file, java.io.File dir) throws Exception {
        java.io.File canFile = file.getCanonicalFile();
        String canDir = dir.getCanonicalPath();
        if (!canFile.toPath().startsWith(canDir)) {
          throw new Exception();
        }
      }
    }"#,
  );
  assert_eq!(gs.len(), 1);
  assert_eq!(gs[0].verdict, Verdict::Accepted);
  assert_eq!(gs[0].candidate_core.ident_name(), Some("file"));
  assert_eq!(gs[0].base_core.ident_name(), Some("dir"));
}

#[test]
fn absolute_then_normalize_is_accepted() {
  let gs = guards_of(
    r#"
    class T {
      void m(java.io.File file, java.io.File dir) throws Exception {
        java.nio.file.Path absfile = file.toPath().toAbsolutePath().normalize();
        java.nio.file.Path absdir = dir.toPath().toAbsolutePath().normalize();
        if (!absfile.startsWith(absdir))
          throw new Exception();
      }
    }"#,
  );
  assert_eq!(gs.len(), 1);
  assert_eq!(gs[0].verdict, Verdict::Accepted);
}

#[test]
fn canonical_string_with_separator_is_accepted() {
  let gs = guards_of(
    r#"
    class T {
      void m(java.nio.file.Path target, java.nio.file.Path dir) throws Exception {
        String canonicalDest = dir.toFile().getCanonicalPath();
        String canonicalTarget = target.toFile().getCanonicalPath();
        if (!canonicalTarget.startsWith(canonicalDest + File.separator))
          throw new Exception();
      }
    }"#,
  );
  assert_eq!(gs.len(), 1);
  assert_eq!(gs[0].verdict, Verdict::Accepted);
  assert_eq!(gs[0].candidate_core.ident_name(), Some("target"));
  assert_eq!(gs[0].base_core.ident_name(), Some("dir"));
}

#[test]
fn canonical_string_without_separator_is_weak() {
  let gs = guards_of(
    r#"
    class T {
      void m(java.io.File file, java.io.File dir) throws Exception {
        if (!file.getCanonicalPath().startsWith(dir.getCanonicalPath())) {
          throw new Exception();
        }
      }
    }"#,
  );
  assert_eq!(gs.len(), 1);
  assert!(matches!(gs[0].verdict, Verdict::Weak { .. }));
}

#[test]
fn one_sided_normalize_against_path_base_is_not_a_guard() {
  let gs = guards_of(
    r#"
    class T {
      void m(java.nio.file.Path path, java.nio.file.Path dir) throws Exception {
        if (!path.normalize().startsWith(dir))
          throw new Exception();
      }
    }"#,
  );
  assert!(gs.is_empty());
}

#[test]
fn guard_without_exit_branch_is_not_recognized() {
  let gs = guards_of(
    r#"
    class T {
      void m(java.io.File file, java.io.File dir) throws Exception {
        if (!file.toPath().normalize().startsWith(dir.toPath().normalize())) {
          System.out.println("suspicious");
        }
      }
    }"#,
  );
  assert!(gs.is_empty());
}

use serde::{Deserialize, Serialize};

/// Byte range of a node in the original source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
  pub start: usize,
  pub end: usize,
}

impl Span {
  pub fn text<'a>(&self, src: &'a str) -> &'a str {
    &src[self.start..self.end]
  }
}

/// The handful of static types the analysis distinguishes. Everything the
/// fix templates do not care about collapses into `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JavaType {
  File,
  Path,
  Str,
  Chr,
  Entry,
  Bool,
  Other,
  Unknown,
}

pub fn type_of_name(name: &str) -> JavaType {
  // Generic parameters and qualifiers are stripped by the lowering.
  match name {
    "File" => JavaType::File,
    "Path" => JavaType::Path,
    "String" => JavaType::Str,
    "char" | "Character" => JavaType::Chr,
    "boolean" | "Boolean" => JavaType::Bool,
    "ZipEntry" | "JarEntry" | "ZipArchiveEntry" | "ArchiveEntry" | "TarArchiveEntry" => {
      JavaType::Entry
    }
    _ => JavaType::Other,
  }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Lit {
  Str(String),
  Chr(char),
  Other,
}

#[derive(Debug, Clone)]
pub struct Expr {
  pub kind: ExprKind,
  pub ty: JavaType,
  pub span: Span,
}

#[derive(Debug, Clone)]
pub enum ExprKind {
  Ident(String),
  Literal(Lit),
  /// `object.field`, e.g. `File.separator`.
  FieldAccess { object: Box<Expr>, field: String },
  /// `receiver.name(args)`; receiver `None` for unqualified calls.
  Call {
    receiver: Option<Box<Expr>>,
    name: String,
    args: Vec<Expr>,
  },
  /// `new Class(args)`.
  New { class: String, args: Vec<Expr> },
  Binary {
    op: String,
    lhs: Box<Expr>,
    rhs: Box<Expr>,
  },
  Not(Box<Expr>),
  /// `target = value` used as an expression (`(entry = it.next()) != null`).
  Assign { target: Box<Expr>, value: Box<Expr> },
  Cast { value: Box<Expr> },
  Other,
}

#[derive(Debug, Clone)]
pub struct Stmt {
  pub kind: StmtKind,
  pub span: Span,
}

#[derive(Debug, Clone)]
pub enum StmtKind {
  Local {
    type_name: String,
    ty: JavaType,
    name: String,
    init: Option<Expr>,
    is_final: bool,
  },
  Expr(Expr),
  If {
    cond: Expr,
    then_block: Block,
    else_block: Option<Block>,
  },
  While { cond: Expr, body: Block },
  For { body: Block },
  Try {
    resources: Vec<Stmt>,
    body: Block,
    catches: Vec<Catch>,
    finally_block: Option<Block>,
  },
  Throw,
  Return,
  Break,
  Continue,
  Block(Block),
  Other,
}

#[derive(Debug, Clone)]
pub struct Catch {
  pub type_names: Vec<String>,
  pub body: Block,
}

#[derive(Debug, Clone)]
pub struct Block {
  pub stmts: Vec<Stmt>,
  pub span: Span,
}

#[derive(Debug, Clone)]
pub struct Param {
  pub type_name: String,
  pub ty: JavaType,
  pub name: String,
}

/// One method (or constructor) body, the unit the whole analysis runs over.
#[derive(Debug, Clone)]
pub struct MethodBody {
  pub name: String,
  pub params: Vec<Param>,
  pub throws: Vec<String>,
  pub body: Block,
}

/// Equality policy for "is this the same base-directory value" (see DESIGN.md).
#[derive(Debug, Serialize, Deserialize, Clone, Copy, Default, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum BaseDirEquality {
  /// Identifiers, field accesses, and repeated zero-effect accessor chains
  /// (`dir.getCanonicalPath()` twice) count as the same value.
  #[default]
  Syntactic,
  /// Only plain identifiers count; call chains are never "the same value".
  Strict,
}

/// Structural value equality, ignoring spans. The conservative workhorse for
/// matching a guard operand against a sink's base directory.
pub fn same_value(a: &Expr, b: &Expr, policy: BaseDirEquality) -> bool {
  match (&a.kind, &b.kind) {
    (ExprKind::Ident(x), ExprKind::Ident(y)) => x == y,
    (ExprKind::Literal(x), ExprKind::Literal(y)) => x == y,
    (
      ExprKind::FieldAccess { object: ao, field: af },
      ExprKind::FieldAccess { object: bo, field: bf },
    ) => af == bf && same_value(ao, bo, policy),
    (
      ExprKind::Call { receiver: ar, name: an, args: aa },
      ExprKind::Call { receiver: br, name: bn, args: ba },
    ) => {
      if policy == BaseDirEquality::Strict {
        return false;
      }
      an == bn
        && aa.len() == ba.len()
        && match (ar, br) {
          (Some(x), Some(y)) => same_value(x, y, policy),
          (None, None) => true,
          _ => false,
        }
        && aa.iter().zip(ba).all(|(x, y)| same_value(x, y, policy))
    }
    (ExprKind::Cast { value: av }, _) => same_value(av, b, policy),
    (_, ExprKind::Cast { value: bv }) => same_value(a, bv, policy),
    _ => false,
  }
}

impl Expr {
  pub fn ident_name(&self) -> Option<&str> {
    match &self.kind {
      ExprKind::Ident(n) => Some(n),
      _ => None,
    }
  }

  /// Pre-order walk over this expression and all sub-expressions.
  pub fn walk<'a>(&'a self, f: &mut impl FnMut(&'a Expr)) {
    f(self);
    match &self.kind {
      ExprKind::FieldAccess { object, .. } => object.walk(f),
      ExprKind::Call { receiver, args, .. } => {
        if let Some(r) = receiver {
          r.walk(f);
        }
        for a in args {
          a.walk(f);
        }
      }
      ExprKind::New { args, .. } => {
        for a in args {
          a.walk(f);
        }
      }
      ExprKind::Binary { lhs, rhs, .. } => {
        lhs.walk(f);
        rhs.walk(f);
      }
      ExprKind::Not(e) | ExprKind::Cast { value: e } => e.walk(f),
      ExprKind::Assign { target, value } => {
        target.walk(f);
        value.walk(f);
      }
      ExprKind::Ident(_) | ExprKind::Literal(_) | ExprKind::Other => {}
    }
  }

  /// True when the value is known at compile time: literals and
  /// concatenations of literals. Such segments are never untrusted.
  pub fn is_constant(&self) -> bool {
    match &self.kind {
      ExprKind::Literal(_) => true,
      ExprKind::Binary { op, lhs, rhs } => op == "+" && lhs.is_constant() && rhs.is_constant(),
      ExprKind::Cast { value } => value.is_constant(),
      _ => false,
    }
  }
}

impl Block {
  /// Pre-order walk over every statement, descending into nested blocks.
  pub fn walk_stmts<'a>(&'a self, f: &mut impl FnMut(&'a Stmt)) {
    for s in &self.stmts {
      f(s);
      match &s.kind {
        StmtKind::If { then_block, else_block, .. } => {
          then_block.walk_stmts(f);
          if let Some(e) = else_block {
            e.walk_stmts(f);
          }
        }
        StmtKind::While { body, .. } | StmtKind::For { body } => body.walk_stmts(f),
        StmtKind::Try { resources, body, catches, finally_block } => {
          for r in resources {
            f(r);
          }
          body.walk_stmts(f);
          for c in catches {
            c.body.walk_stmts(f);
          }
          if let Some(fin) = finally_block {
            fin.walk_stmts(f);
          }
        }
        StmtKind::Block(b) => b.walk_stmts(f),
        _ => {}
      }
    }
  }

  /// Visit every expression attached to any statement in this block,
  /// including sub-expressions.
  pub fn walk_exprs<'a>(&'a self, f: &mut impl FnMut(&'a Expr)) {
    self.walk_stmts(&mut |s| match &s.kind {
      StmtKind::Local { init: Some(e), .. } | StmtKind::Expr(e) => e.walk(f),
      StmtKind::If { cond, .. } | StmtKind::While { cond, .. } => cond.walk(f),
      _ => {}
    });
  }

  /// Does this block unconditionally leave the enclosing method/loop?
  /// Used to decide whether an `if` arm is a guard's "reject" branch.
  pub fn exits(&self) -> bool {
    self
      .stmts
      .iter()
      .any(|s| matches!(s.kind, StmtKind::Throw | StmtKind::Return | StmtKind::Continue | StmtKind::Break))
  }
}

impl MethodBody {
  /// Every identifier that already occurs in the body or parameter list.
  /// The fix synthesizer avoids these when inventing a variable name.
  pub fn taken_names(&self) -> std::collections::HashSet<String> {
    let mut names: std::collections::HashSet<String> =
      self.params.iter().map(|p| p.name.clone()).collect();
    self.body.walk_stmts(&mut |s| {
      if let StmtKind::Local { name, .. } = &s.kind {
        names.insert(name.clone());
      }
      let mut grab = |e: &Expr| {
        e.walk(&mut |x| {
          if let ExprKind::Ident(n) = &x.kind {
            names.insert(n.clone());
          }
        })
      };
      match &s.kind {
        StmtKind::Local { init: Some(e), .. } => grab(e),
        StmtKind::Expr(e) => grab(e),
        StmtKind::If { cond, .. } => grab(cond),
        StmtKind::While { cond, .. } => grab(cond),
        _ => {}
      }
    });
    names
  }
}

#[test]
fn constant_concat_is_constant() {
  let lit = |s: &str| Expr {
    kind: ExprKind::Literal(Lit::Str(s.into())),
    ty: JavaType::Str,
    span: Span { start: 0, end: 0 },
  };
  let concat = Expr {
    kind: ExprKind::Binary {
      op: "+".into(),
      lhs: Box::new(lit("a/")),
      rhs: Box::new(lit("b.txt")),
    },
    ty: JavaType::Str,
    span: Span { start: 0, end: 0 },
  };
  assert!(concat.is_constant());
}

#[test]
fn call_chains_equal_only_under_syntactic_policy() {
  let dir = || Expr {
    kind: ExprKind::Ident("dir".into()),
    ty: JavaType::File,
    span: Span { start: 0, end: 0 },
  };
  let canon = || Expr {
    kind: ExprKind::Call {
      receiver: Some(Box::new(dir())),
      name: "getCanonicalPath".into(),
      args: vec![],
    },
    ty: JavaType::Str,
    span: Span { start: 0, end: 0 },
  };
  assert!(same_value(&canon(), &canon(), BaseDirEquality::Syntactic));
  assert!(!same_value(&canon(), &canon(), BaseDirEquality::Strict));
  assert!(same_value(&dir(), &dir(), BaseDirEquality::Strict));
}

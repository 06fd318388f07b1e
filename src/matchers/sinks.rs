use crate::ir::{Expr, ExprKind, JavaType, Lit};

/// `File.separator`, `File.separatorChar`, a statically imported
/// `separator`, or a bare `"/"` / `"\\"` (char or string) literal.
pub fn is_separator_expr(e: &Expr) -> bool {
  match &e.kind {
    ExprKind::FieldAccess { object, field } => {
      (field == "separator" || field == "separatorChar")
        && object.ident_name() == Some("File")
    }
    ExprKind::Ident(name) => name == "separator" || name == "separatorChar",
    ExprKind::Literal(Lit::Str(s)) => s == "/" || s == "\\" || s == "\\\\",
    ExprKind::Literal(Lit::Chr(c)) => *c == '/' || *c == '\\',
    _ => false,
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstructionForm {
  /// `new File(dir, segment)`
  TwoArgJoin,
  /// `dir.resolve(segment)`
  Resolve,
  /// `new File(dir + sep + segment)`, one string argument
  ConcatFileCtor,
  /// `dir + sep + segment` directly in a consumer's argument list
  BareConcat,
}

/// A matched path construction: the join of a base directory with an
/// untrusted segment. `value_ty` is `File` or `Path`, what the guard will
/// be phrased in terms of.
#[derive(Debug)]
pub struct Construction<'a> {
  pub base: &'a Expr,
  pub segment: &'a Expr,
  pub value_ty: JavaType,
  pub form: ConstructionForm,
}

/// Match `e` as a tainted path construction. `tainted` decides whether a
/// candidate segment expression derives from an archive entry name; a
/// compile-time-constant segment never matches.
pub fn match_construction<'a>(
  e: &'a Expr,
  tainted: &dyn Fn(&Expr) -> bool,
) -> Option<Construction<'a>> {
  match &e.kind {
    ExprKind::New { class, args } if class == "File" => match args.as_slice() {
      [base, segment] => {
        if segment.is_constant() || !tainted(segment) {
          return None;
        }
        if !matches!(base.ty, JavaType::File | JavaType::Str | JavaType::Path) {
          return None;
        }
        Some(Construction { base, segment, value_ty: JavaType::File, form: ConstructionForm::TwoArgJoin })
      }
      [arg] => {
        let (base, segment) = split_concat(arg, tainted)?;
        Some(Construction { base, segment, value_ty: JavaType::File, form: ConstructionForm::ConcatFileCtor })
      }
      _ => None,
    },
    ExprKind::Call { receiver: Some(recv), name, args }
      if name == "resolve" && recv.ty == JavaType::Path && args.len() == 1 =>
    {
      let segment = &args[0];
      if segment.is_constant() || !tainted(segment) {
        return None;
      }
      Some(Construction { base: recv, segment, value_ty: JavaType::Path, form: ConstructionForm::Resolve })
    }
    ExprKind::Binary { .. } => {
      let (base, segment) = split_concat(e, tainted)?;
      Some(Construction { base, segment, value_ty: JavaType::File, form: ConstructionForm::BareConcat })
    }
    _ => None,
  }
}

/// Split `base + sep + segment` (or `base + segment` when the right operand
/// is itself a known entry-name expression) into its base and segment.
/// Left-associativity means the interesting `+` is the outermost one.
fn split_concat<'a>(e: &'a Expr, tainted: &dyn Fn(&Expr) -> bool) -> Option<(&'a Expr, &'a Expr)> {
  let ExprKind::Binary { op, lhs, rhs } = &e.kind else { return None };
  if op != "+" || rhs.is_constant() || !tainted(rhs) {
    return None;
  }
  match &lhs.kind {
    // `dir + File.separator + name` parses as `(dir + sep) + name`.
    ExprKind::Binary { op: lop, lhs: ll, rhs: lr } if lop == "+" && is_separator_expr(lr) => {
      Some((ll, rhs))
    }
    // `"base/" + name`, separator folded into the literal.
    ExprKind::Literal(Lit::Str(s)) if s.ends_with('/') || s.ends_with('\\') => Some((lhs, rhs)),
    // `dir + name` with no separator: accepted only because `tainted`
    // already proved the right operand is an entry-name expression.
    _ if matches!(lhs.ty, JavaType::File | JavaType::Str | JavaType::Path) => Some((lhs, rhs)),
    _ => None,
  }
}

/// File-opening constructors: the argument at index 0 is the path value.
const OPEN_CTORS: &[&str] = &[
  "FileOutputStream",
  "FileInputStream",
  "FileWriter",
  "FileReader",
  "RandomAccessFile",
  "PrintWriter",
];

/// `Files.*` calls that create or open the path at the given indices.
fn files_path_args(name: &str) -> Option<&'static [usize]> {
  match name {
    "newOutputStream" | "newInputStream" | "newBufferedReader" | "newBufferedWriter"
    | "write" | "createFile" => Some(&[0]),
    "copy" | "move" => Some(&[0, 1]),
    _ => None,
  }
}

/// If `e` opens or creates a file-backed resource, return the expressions
/// that name the path being opened. `mkdir`/`mkdirs` are not consumers:
/// bare directory creation is not a file open.
pub fn consumer_path_args(e: &Expr) -> Option<Vec<&Expr>> {
  match &e.kind {
    ExprKind::New { class, args } if OPEN_CTORS.contains(&class.as_str()) => {
      args.first().map(|a| vec![a])
    }
    ExprKind::Call { receiver, name, args } => {
      if let Some(idxs) = files_path_args(name) {
        if receiver.as_deref().and_then(|r| r.ident_name()) == Some("Files") {
          let picked: Vec<&Expr> = idxs.iter().filter_map(|&i| args.get(i)).collect();
          if !picked.is_empty() {
            return Some(picked);
          }
        }
        None
      } else if name == "createNewFile" && args.is_empty() {
        receiver.as_deref().map(|r| vec![r])
      } else {
        None
      }
    }
    _ => None,
  }
}

#[cfg(test)]
fn first_method(src: &str) -> crate::ir::MethodBody {
  let tree = crate::lower::parse_java(src).unwrap();
  crate::lower::lower_methods(&tree, src).into_iter().next().unwrap()
}

#[test]
fn two_arg_join_matches_and_constant_segment_does_not() {
  let src = r#"
    class T {
      void m(java.io.File dir, java.util.zip.ZipEntry entry) {
        java.io.File a = new File(dir, entry.getName());
        java.io.File b = new File(dir, "fixed" + ".txt");
      }
    }"#;
  let m = first_method(src);
  let inits: Vec<&Expr> = m
    .body
    .stmts
    .iter()
    .filter_map(|s| match &s.kind {
      crate::ir::StmtKind::Local { init: Some(e), .. } => Some(e),
      _ => None,
    })
    .collect();
  let tainted = |e: &Expr| crate::matchers::sources::contains_entry_name_call(e);
  let c = match_construction(inits[0], &tainted).expect("join should match");
  assert_eq!(c.form, ConstructionForm::TwoArgJoin);
  assert_eq!(c.value_ty, JavaType::File);
  assert!(match_construction(inits[1], &tainted).is_none());
}

#[test]
fn separator_concat_splits_off_base() {
  let src = r#"
    class T {
      void m(String destDir, java.util.zip.ZipEntry entry) {
        java.io.File f = new File(destDir + File.separator + entry.getName());
      }
    }"#;
  let m = first_method(src);
  let crate::ir::StmtKind::Local { init: Some(init), .. } = &m.body.stmts[0].kind else {
    panic!()
  };
  let tainted = |e: &Expr| crate::matchers::sources::contains_entry_name_call(e);
  let c = match_construction(init, &tainted).expect("concat ctor should match");
  assert_eq!(c.form, ConstructionForm::ConcatFileCtor);
  assert_eq!(c.base.ident_name(), Some("destDir"));
}

#[test]
fn stream_ctor_is_a_consumer() {
  let src = r#"
    class T {
      void m(java.io.File file) throws Exception {
        java.io.FileOutputStream os = new FileOutputStream(file);
      }
    }"#;
  let m = first_method(src);
  let crate::ir::StmtKind::Local { init: Some(init), .. } = &m.body.stmts[0].kind else {
    panic!()
  };
  let args = consumer_path_args(init).expect("FileOutputStream opens a path");
  assert_eq!(args.len(), 1);
  assert_eq!(args[0].ident_name(), Some("file"));
}

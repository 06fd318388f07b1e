use crate::ir::{Expr, ExprKind, JavaType};

/// The untrusted-input shape: a no-argument `getName()` on a zip/jar/tar
/// archive entry.
pub fn is_entry_name_call(e: &Expr) -> bool {
  match &e.kind {
    ExprKind::Call { receiver: Some(recv), name, args } => {
      name == "getName" && args.is_empty() && recv.ty == JavaType::Entry
    }
    _ => false,
  }
}

/// Does any sub-expression read an archive entry name directly?
pub fn contains_entry_name_call(e: &Expr) -> bool {
  let mut found = false;
  e.walk(&mut |x| {
    if is_entry_name_call(x) {
      found = true;
    }
  });
  found
}

/// Safe bulk-extraction idioms that a sibling rewrite promotes; when the
/// caller opts in, a file using one of these is skipped entirely rather
/// than given a second, competing guard (see DESIGN.md).
pub fn is_safe_extractor_call(e: &Expr) -> bool {
  match &e.kind {
    ExprKind::Call { receiver, name, args } => {
      (name == "extractAll" && args.len() == 1)
        || (name == "expand"
          && matches!(
            receiver.as_deref(),
            Some(Expr { kind: ExprKind::New { class, .. }, .. }) if class == "Expander"
          ))
    }
    _ => false,
  }
}

#[test]
fn entry_name_call_requires_entry_receiver() {
  use crate::lower::{lower_methods, parse_java};
  let src = r#"
    class T {
      void m(java.util.zip.ZipEntry entry, String other) {
        String a = entry.getName();
        String b = other.getName();
      }
    }"#;
  let tree = parse_java(src).unwrap();
  let m = &lower_methods(&tree, src)[0];
  let inits: Vec<&Expr> = m
    .body
    .stmts
    .iter()
    .filter_map(|s| match &s.kind {
      crate::ir::StmtKind::Local { init: Some(e), .. } => Some(e),
      _ => None,
    })
    .collect();
  assert!(is_entry_name_call(inits[0]));
  assert!(!is_entry_name_call(inits[1]));
}

use crate::ir::{JavaType, MethodBody};
use crate::taint::{Action, InitSource};

/// One span-anchored text edit. Replacements and insertions are always
/// complete statements or expressions, so the rewritten file is
/// well-formed by construction.
#[derive(Debug, Clone)]
pub struct Edit {
    pub start: usize,
    pub end: usize,
    pub text: String,
}

#[derive(Debug, Default)]
pub struct FixPlan {
    pub edits: Vec<Edit>,
    pub imports: Vec<&'static str>,
}

/// Leading whitespace of the line containing `at`.
fn indent_at(src: &str, at: usize) -> String {
    let line_start = src[..at].rfind('\n').map(|i| i + 1).unwrap_or(0);
    src[line_start..]
        .chars()
        .take_while(|c| *c == ' ' || *c == '\t')
        .collect()
}

fn exception_name(io_ok: bool) -> &'static str {
    if io_ok { "IOException" } else { "RuntimeException" }
}

/// Phrase one side of the containment check for its static type. The only
/// synthesized kind is normalize-on-both-sides; a `String` base is
/// referenced verbatim.
fn path_side(text: &str, ty: JavaType) -> String {
    match ty {
        JavaType::Path => format!("{text}.normalize()"),
        JavaType::Str => text.to_owned(),
        _ => format!("{text}.toPath().normalize()"),
    }
}

fn guard_text(cand: &str, cand_ty: JavaType, base: &str, base_ty: JavaType, io_ok: bool, indent: &str) -> String {
    format!(
        "if (!{}.startsWith({})) {{\n{indent}    throw new {}(\"Bad zip entry\");\n{indent}}}",
        path_side(cand, cand_ty),
        path_side(base, base_ty),
        exception_name(io_ok),
    )
}

/// Deterministic hoisted-variable naming: `zipEntryFile` / `zipEntryPath`,
/// numbered when taken.
fn pick_name(m: &MethodBody, value_ty: JavaType) -> String {
    let base = if value_ty == JavaType::Path { "zipEntryPath" } else { "zipEntryFile" };
    let taken = m.taken_names();
    if !taken.contains(base) {
        return base.to_owned();
    }
    let mut n = 1;
    loop {
        let candidate = format!("{base}{n}");
        if !taken.contains(&candidate) {
            return candidate;
        }
        n += 1;
    }
}

/// Turn one planned action into concrete edits against `src`.
pub fn synthesize(action: &Action, m: &MethodBody, src: &str) -> FixPlan {
    let mut plan = FixPlan::default();
    match action {
        Action::GuardAfterBinding {
            decl_span,
            var,
            value_ty,
            base_span,
            base_ty,
            io_ok,
            ctor_rewrite,
        } => {
            let indent = indent_at(src, decl_span.start);
            let base_text = base_span.text(src);
            let guard = guard_text(var, *value_ty, base_text, *base_ty, *io_ok, &indent);
            plan.edits.push(Edit {
                start: decl_span.end,
                end: decl_span.end,
                text: format!("\n{indent}{guard}"),
            });
            if let Some((arg_span, base, seg)) = ctor_rewrite {
                plan.edits.push(Edit {
                    start: arg_span.start,
                    end: arg_span.end,
                    text: format!("{}, {}", base.text(src), seg.text(src)),
                });
            }
            if *io_ok {
                plan.imports.push("java.io.IOException");
            }
        }
        Action::HoistAndGuard {
            anchor_span,
            replace_span,
            init,
            value_ty,
            base_span,
            base_ty,
            io_ok,
        } => {
            let indent = indent_at(src, anchor_span.start);
            let name = pick_name(m, *value_ty);
            let (ty_name, import) = if *value_ty == JavaType::Path {
                ("Path", "java.nio.file.Path")
            } else {
                ("File", "java.io.File")
            };
            let init_text = match init {
                InitSource::Verbatim(span) => span.text(src).to_owned(),
                InitSource::JoinFile(base, seg) => {
                    format!("new File({}, {})", base.text(src), seg.text(src))
                }
            };
            let guard = guard_text(&name, *value_ty, base_span.text(src), *base_ty, *io_ok, &indent);
            plan.edits.push(Edit {
                start: anchor_span.start,
                end: anchor_span.start,
                text: format!("final {ty_name} {name} = {init_text};\n{indent}{guard}\n{indent}"),
            });
            plan.edits.push(Edit {
                start: replace_span.start,
                end: replace_span.end,
                text: name,
            });
            plan.imports.push(import);
            if *io_ok {
                plan.imports.push("java.io.IOException");
            }
        }
        Action::Strengthen { insert_at } => {
            plan.edits.push(Edit {
                start: *insert_at,
                end: *insert_at,
                text: " + File.separator".to_owned(),
            });
            plan.imports.push("java.io.File");
        }
    }
    plan
}

/// Apply non-overlapping edits back-to-front so earlier offsets stay valid.
pub fn apply_edits(src: &str, edits: &[Edit]) -> String {
    let mut sorted: Vec<&Edit> = edits.iter().collect();
    sorted.sort_by(|a, b| b.start.cmp(&a.start));
    let mut out = src.to_owned();
    for e in sorted {
        out.replace_range(e.start..e.end, &e.text);
    }
    out
}

/// Add `import <fqn>;` unless the file already imports it (directly or via
/// a package wildcard). New imports land after the last existing import,
/// else after the package declaration, else at the top.
pub fn ensure_import(src: &str, fqn: &str) -> String {
    let package = fqn.rsplit_once('.').map(|(p, _)| p).unwrap_or("");
    if src.contains(&format!("import {fqn};")) || src.contains(&format!("import {package}.*;")) {
        return src.to_owned();
    }
    let line = format!("import {fqn};\n");

    let mut insert_at = None;
    let mut offset = 0;
    for l in src.split_inclusive('\n') {
        let trimmed = l.trim_start();
        if trimmed.starts_with("import ") {
            insert_at = Some(offset + l.len());
        } else if trimmed.starts_with("package ") && insert_at.is_none() {
            insert_at = Some(offset + l.len());
        }
        offset += l.len();
    }
    let at = insert_at.unwrap_or(0);
    let mut out = src.to_owned();
    out.insert_str(at, &line);
    out
}

#[test]
fn guard_text_matches_each_type_pairing() {
    let file_file = guard_text("file", JavaType::File, "dir", JavaType::File, false, "    ");
    assert_eq!(
        file_file,
        "if (!file.toPath().normalize().startsWith(dir.toPath().normalize())) {\n        throw new RuntimeException(\"Bad zip entry\");\n    }"
    );
    let path_path = guard_text("path", JavaType::Path, "dir", JavaType::Path, true, "");
    assert_eq!(
        path_path,
        "if (!path.normalize().startsWith(dir.normalize())) {\n    throw new IOException(\"Bad zip entry\");\n}"
    );
    let file_str = guard_text("f", JavaType::File, "destDir", JavaType::Str, false, "");
    assert!(file_str.starts_with("if (!f.toPath().normalize().startsWith(destDir))"));
}

#[test]
fn hoisted_name_increments_when_taken() {
    let src = r#"
        class T {
            void m(java.util.zip.ZipEntry entry, java.io.File dir) {
                String zipEntryFile = entry.getName();
            }
        }"#;
    let tree = crate::lower::parse_java(src).unwrap();
    let m = &crate::lower::lower_methods(&tree, src)[0];
    assert_eq!(pick_name(m, JavaType::File), "zipEntryFile1");
    assert_eq!(pick_name(m, JavaType::Path), "zipEntryPath");
}

#[test]
fn edits_apply_back_to_front() {
    let src = "abc XYZ def";
    let edits = vec![
        Edit { start: 0, end: 3, text: "A".into() },
        Edit { start: 8, end: 11, text: "D".into() },
    ];
    assert_eq!(apply_edits(src, &edits), "A XYZ D");
}

#[test]
fn import_inserted_after_existing_imports_once() {
    let src = "import java.io.File;\n\nclass T {}\n";
    let out = ensure_import(src, "java.io.IOException");
    assert_eq!(out, "import java.io.File;\nimport java.io.IOException;\n\nclass T {}\n");
    // wildcard already covers it
    let wild = "import java.io.*;\n\nclass T {}\n";
    assert_eq!(ensure_import(wild, "java.io.IOException"), wild);
    // idempotent
    assert_eq!(ensure_import(&out, "java.io.IOException"), out);
}

use std::cell::RefCell;
use std::collections::HashMap;

use tree_sitter::{Language, Node, Tree};

use crate::errors::{SlipError, SlipResult};
use crate::ir::*;

thread_local! {
    static PARSER: RefCell<tree_sitter::Parser> = RefCell::new(tree_sitter::Parser::new());
}

pub fn parse_java(src: &str) -> SlipResult<Tree> {
    PARSER.with(|cell| {
        let mut parser = cell.borrow_mut();
        parser.set_language(&Language::from(tree_sitter_java::LANGUAGE))?;
        parser
            .parse(src.as_bytes(), None)
            .ok_or_else(|| SlipError::Other("tree-sitter failed".into()))
    })
}

/// Lower every method and constructor body in the file. Nested and inner
/// classes are found by the recursive descent.
pub fn lower_methods(tree: &Tree, src: &str) -> Vec<MethodBody> {
    let mut out = Vec::new();
    collect_methods(tree.root_node(), src, &mut out);
    out
}

fn collect_methods(node: Node, src: &str, out: &mut Vec<MethodBody>) {
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        match child.kind() {
            "method_declaration" | "constructor_declaration" => {
                if let Some(m) = lower_method(child, src) {
                    out.push(m);
                }
            }
            _ => collect_methods(child, src, out),
        }
    }
}

fn span_of(node: Node) -> Span {
    Span { start: node.start_byte(), end: node.end_byte() }
}

fn text<'a>(node: Node, src: &'a str) -> &'a str {
    &src[node.start_byte()..node.end_byte()]
}

/// `java.util.zip.ZipEntry` -> `ZipEntry`, `Enumeration<? extends E>` -> `Enumeration`.
fn simple_type_name(raw: &str) -> String {
    let base = raw.split('<').next().unwrap_or(raw).trim();
    base.rsplit('.').next().unwrap_or(base).trim().to_owned()
}

/// Per-method variable typing scope, filled in source order as we lower.
struct Scope {
    vars: HashMap<String, JavaType>,
}

impl Scope {
    fn declare(&mut self, name: &str, ty: JavaType) {
        self.vars.insert(name.to_owned(), ty);
    }
    fn lookup(&self, name: &str) -> JavaType {
        self.vars.get(name).copied().unwrap_or(JavaType::Unknown)
    }
}

fn lower_method(node: Node, src: &str) -> Option<MethodBody> {
    let name = node.child_by_field_name("name").map(|n| text(n, src).to_owned())?;
    let body_node = node.child_by_field_name("body")?;

    let mut scope = Scope { vars: HashMap::new() };
    let mut params = Vec::new();
    if let Some(ps) = node.child_by_field_name("parameters") {
        let mut cursor = ps.walk();
        for p in ps.children(&mut cursor) {
            if p.kind() != "formal_parameter" {
                continue;
            }
            let (Some(ty_node), Some(name_node)) =
                (p.child_by_field_name("type"), p.child_by_field_name("name"))
            else {
                continue;
            };
            let type_name = simple_type_name(text(ty_node, src));
            let ty = type_of_name(&type_name);
            let pname = text(name_node, src).to_owned();
            scope.declare(&pname, ty);
            params.push(Param { type_name, ty, name: pname });
        }
    }

    let mut throws = Vec::new();
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if child.kind() == "throws" {
            let mut tc = child.walk();
            for t in child.named_children(&mut tc) {
                throws.push(simple_type_name(text(t, src)));
            }
        }
    }

    let body = lower_block(body_node, src, &mut scope);
    Some(MethodBody { name, params, throws, body })
}

fn lower_block(node: Node, src: &str, scope: &mut Scope) -> Block {
    let mut stmts = Vec::new();
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        if child.kind() == "line_comment" || child.kind() == "block_comment" {
            continue;
        }
        stmts.push(lower_stmt(child, src, scope));
    }
    Block { stmts, span: span_of(node) }
}

/// A statement position that is not a `{...}` block (brace-less `if` arm)
/// still lowers to a one-statement Block.
fn lower_stmt_as_block(node: Node, src: &str, scope: &mut Scope) -> Block {
    if node.kind() == "block" {
        lower_block(node, src, scope)
    } else {
        let span = span_of(node);
        Block { stmts: vec![lower_stmt(node, src, scope)], span }
    }
}

fn lower_stmt(node: Node, src: &str, scope: &mut Scope) -> Stmt {
    let span = span_of(node);
    let kind = match node.kind() {
        "local_variable_declaration" => return lower_local(node, src, scope),
        "expression_statement" => match node.named_child(0) {
            Some(e) => StmtKind::Expr(lower_expr(e, src, scope)),
            None => StmtKind::Other,
        },
        "if_statement" => {
            let cond = node
                .child_by_field_name("condition")
                .map(|c| lower_expr(c, src, scope))
                .unwrap_or_else(|| unknown_expr(span));
            let then_block = node
                .child_by_field_name("consequence")
                .map(|b| lower_stmt_as_block(b, src, scope))
                .unwrap_or(Block { stmts: vec![], span });
            let else_block = node
                .child_by_field_name("alternative")
                .map(|b| lower_stmt_as_block(b, src, scope));
            StmtKind::If { cond, then_block, else_block }
        }
        "while_statement" | "do_statement" => {
            let cond = node
                .child_by_field_name("condition")
                .map(|c| lower_expr(c, src, scope))
                .unwrap_or_else(|| unknown_expr(span));
            let body = node
                .child_by_field_name("body")
                .map(|b| lower_stmt_as_block(b, src, scope))
                .unwrap_or(Block { stmts: vec![], span });
            StmtKind::While { cond, body }
        }
        "for_statement" => {
            // The init declaration only feeds the typing scope.
            if let Some(init) = node.child_by_field_name("init") {
                if init.kind() == "local_variable_declaration" {
                    lower_local(init, src, scope);
                }
            }
            let body = node
                .child_by_field_name("body")
                .map(|b| lower_stmt_as_block(b, src, scope))
                .unwrap_or(Block { stmts: vec![], span });
            StmtKind::For { body }
        }
        "enhanced_for_statement" => {
            if let (Some(ty), Some(name)) =
                (node.child_by_field_name("type"), node.child_by_field_name("name"))
            {
                let tn = simple_type_name(text(ty, src));
                scope.declare(text(name, src), type_of_name(&tn));
            }
            let body = node
                .child_by_field_name("body")
                .map(|b| lower_stmt_as_block(b, src, scope))
                .unwrap_or(Block { stmts: vec![], span });
            StmtKind::For { body }
        }
        "try_statement" | "try_with_resources_statement" => {
            let mut resources = Vec::new();
            if let Some(spec) = node.child_by_field_name("resources") {
                let mut rc = spec.walk();
                for r in spec.named_children(&mut rc) {
                    if r.kind() != "resource" {
                        continue;
                    }
                    if let (Some(ty), Some(name)) =
                        (r.child_by_field_name("type"), r.child_by_field_name("name"))
                    {
                        let tn = simple_type_name(text(ty, src));
                        let ty = type_of_name(&tn);
                        let rname = text(name, src).to_owned();
                        scope.declare(&rname, ty);
                        let init = r
                            .child_by_field_name("value")
                            .map(|v| lower_expr(v, src, scope));
                        resources.push(Stmt {
                            kind: StmtKind::Local {
                                type_name: tn,
                                ty,
                                name: rname,
                                init,
                                is_final: true,
                            },
                            span: span_of(r),
                        });
                    }
                }
            }
            let body = node
                .child_by_field_name("body")
                .map(|b| lower_block(b, src, scope))
                .unwrap_or(Block { stmts: vec![], span });
            let mut catches = Vec::new();
            let mut finally_block = None;
            let mut cc = node.walk();
            for child in node.children(&mut cc) {
                match child.kind() {
                    "catch_clause" => {
                        let mut type_names = Vec::new();
                        let mut pc = child.walk();
                        for p in child.children(&mut pc) {
                            if p.kind() == "catch_formal_parameter" {
                                let mut tc = p.walk();
                                for t in p.children(&mut tc) {
                                    if t.kind() == "catch_type" {
                                        for part in text(t, src).split('|') {
                                            type_names.push(simple_type_name(part));
                                        }
                                    }
                                }
                            }
                        }
                        let cbody = child
                            .child_by_field_name("body")
                            .map(|b| lower_block(b, src, scope))
                            .unwrap_or(Block { stmts: vec![], span });
                        catches.push(Catch { type_names, body: cbody });
                    }
                    "finally_clause" => {
                        if let Some(b) = child.named_child(child.named_child_count().wrapping_sub(1))
                        {
                            if b.kind() == "block" {
                                finally_block = Some(lower_block(b, src, scope));
                            }
                        }
                    }
                    _ => {}
                }
            }
            StmtKind::Try { resources, body, catches, finally_block }
        }
        "throw_statement" => StmtKind::Throw,
        "return_statement" => StmtKind::Return,
        "break_statement" => StmtKind::Break,
        "continue_statement" => StmtKind::Continue,
        "block" => StmtKind::Block(lower_block(node, src, scope)),
        _ => StmtKind::Other,
    };
    Stmt { kind, span }
}

fn lower_local(node: Node, src: &str, scope: &mut Scope) -> Stmt {
    let span = span_of(node);
    let type_name = node
        .child_by_field_name("type")
        .map(|t| simple_type_name(text(t, src)))
        .unwrap_or_default();
    let ty = type_of_name(&type_name);
    let is_final = {
        let mut c = node.walk();
        node
            .children(&mut c)
            .any(|ch| ch.kind() == "modifiers" && text(ch, src).contains("final"))
    };

    // `int a, b = 0;` registers every declarator; the statement carries the first.
    let mut first: Option<(String, Option<Expr>)> = None;
    let mut cursor = node.walk();
    for d in node.children_by_field_name("declarator", &mut cursor) {
        let Some(name_node) = d.child_by_field_name("name") else { continue };
        let name = text(name_node, src).to_owned();
        scope.declare(&name, ty);
        let init = d.child_by_field_name("value").map(|v| lower_expr(v, src, scope));
        if first.is_none() {
            first = Some((name, init));
        }
    }
    match first {
        Some((name, init)) => Stmt {
            kind: StmtKind::Local { type_name, ty, name, init, is_final },
            span,
        },
        None => Stmt { kind: StmtKind::Other, span },
    }
}

fn unknown_expr(span: Span) -> Expr {
    Expr { kind: ExprKind::Other, ty: JavaType::Unknown, span }
}

fn lower_expr(node: Node, src: &str, scope: &mut Scope) -> Expr {
    let span = span_of(node);
    match node.kind() {
        "parenthesized_expression" | "condition" => match node.named_child(0) {
            Some(inner) => lower_expr(inner, src, scope),
            None => unknown_expr(span),
        },
        "identifier" => {
            let name = text(node, src).to_owned();
            let ty = scope.lookup(&name);
            Expr { kind: ExprKind::Ident(name), ty, span }
        }
        "string_literal" => {
            let raw = text(node, src);
            let inner = raw.trim_matches('"').to_owned();
            Expr { kind: ExprKind::Literal(Lit::Str(inner)), ty: JavaType::Str, span }
        }
        "character_literal" => {
            let raw = text(node, src).trim_matches('\'').to_owned();
            let c = if raw == "\\\\" { '\\' } else { raw.chars().next().unwrap_or('?') };
            Expr { kind: ExprKind::Literal(Lit::Chr(c)), ty: JavaType::Chr, span }
        }
        "decimal_integer_literal" | "hex_integer_literal" | "true" | "false" | "null_literal" => {
            Expr { kind: ExprKind::Literal(Lit::Other), ty: JavaType::Other, span }
        }
        "field_access" => {
            let object = node
                .child_by_field_name("object")
                .map(|o| lower_expr(o, src, scope))
                .unwrap_or_else(|| unknown_expr(span));
            let field = node
                .child_by_field_name("field")
                .map(|f| text(f, src).to_owned())
                .unwrap_or_default();
            let ty = field_type(&object, &field);
            Expr { kind: ExprKind::FieldAccess { object: Box::new(object), field }, ty, span }
        }
        "method_invocation" => {
            let receiver = node
                .child_by_field_name("object")
                .map(|o| Box::new(lower_expr(o, src, scope)));
            let name = node
                .child_by_field_name("name")
                .map(|n| text(n, src).to_owned())
                .unwrap_or_default();
            let mut args = Vec::new();
            if let Some(list) = node.child_by_field_name("arguments") {
                let mut ac = list.walk();
                for a in list.named_children(&mut ac) {
                    args.push(lower_expr(a, src, scope));
                }
            }
            let ty = call_type(receiver.as_deref(), &name);
            Expr { kind: ExprKind::Call { receiver, name, args }, ty, span }
        }
        "object_creation_expression" => {
            let class = node
                .child_by_field_name("type")
                .map(|t| simple_type_name(text(t, src)))
                .unwrap_or_default();
            let mut args = Vec::new();
            if let Some(list) = node.child_by_field_name("arguments") {
                let mut ac = list.walk();
                for a in list.named_children(&mut ac) {
                    args.push(lower_expr(a, src, scope));
                }
            }
            let ty = type_of_name(&class);
            Expr { kind: ExprKind::New { class, args }, ty, span }
        }
        "binary_expression" => {
            let lhs = node
                .child_by_field_name("left")
                .map(|l| lower_expr(l, src, scope))
                .unwrap_or_else(|| unknown_expr(span));
            let rhs = node
                .child_by_field_name("right")
                .map(|r| lower_expr(r, src, scope))
                .unwrap_or_else(|| unknown_expr(span));
            let op = node
                .child_by_field_name("operator")
                .map(|o| text(o, src).to_owned())
                .unwrap_or_default();
            let ty = if op == "+" && (lhs.ty == JavaType::Str || rhs.ty == JavaType::Str) {
                JavaType::Str
            } else if matches!(op.as_str(), "==" | "!=" | "<" | ">" | "<=" | ">=" | "&&" | "||") {
                JavaType::Bool
            } else {
                JavaType::Unknown
            };
            Expr {
                kind: ExprKind::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs) },
                ty,
                span,
            }
        }
        "unary_expression" => {
            let operand = node
                .child_by_field_name("operand")
                .map(|o| lower_expr(o, src, scope))
                .unwrap_or_else(|| unknown_expr(span));
            let op = node
                .child_by_field_name("operator")
                .map(|o| text(o, src).to_owned())
                .unwrap_or_default();
            if op == "!" {
                Expr { kind: ExprKind::Not(Box::new(operand)), ty: JavaType::Bool, span }
            } else {
                Expr { kind: ExprKind::Other, ty: JavaType::Unknown, span }
            }
        }
        "assignment_expression" => {
            let target = node
                .child_by_field_name("left")
                .map(|l| lower_expr(l, src, scope))
                .unwrap_or_else(|| unknown_expr(span));
            let value = node
                .child_by_field_name("right")
                .map(|r| lower_expr(r, src, scope))
                .unwrap_or_else(|| unknown_expr(span));
            let ty = value.ty;
            Expr {
                kind: ExprKind::Assign { target: Box::new(target), value: Box::new(value) },
                ty,
                span,
            }
        }
        "cast_expression" => {
            let value = node
                .child_by_field_name("value")
                .map(|v| lower_expr(v, src, scope))
                .unwrap_or_else(|| unknown_expr(span));
            let ty = node
                .child_by_field_name("type")
                .map(|t| type_of_name(&simple_type_name(text(t, src))))
                .unwrap_or(JavaType::Unknown);
            Expr { kind: ExprKind::Cast { value: Box::new(value) }, ty, span }
        }
        _ => unknown_expr(span),
    }
}

fn field_type(object: &Expr, field: &str) -> JavaType {
    match (object.ident_name(), field) {
        (Some("File"), "separator") => JavaType::Str,
        (Some("File"), "separatorChar") => JavaType::Chr,
        _ => JavaType::Unknown,
    }
}

/// Result types of the JDK calls the analysis needs to see through.
fn call_type(receiver: Option<&Expr>, name: &str) -> JavaType {
    match name {
        "toPath" | "normalize" | "toAbsolutePath" | "toRealPath" | "resolve" => JavaType::Path,
        "getCanonicalFile" | "getAbsoluteFile" | "getParentFile" => JavaType::File,
        "toFile" => JavaType::File,
        "getCanonicalPath" | "getAbsolutePath" | "getParent" | "toString" | "trim"
        | "substring" | "getName" | "getProperty" => JavaType::Str,
        "startsWith" | "endsWith" | "exists" | "isDirectory" | "isFile" | "contains"
        | "equals" | "hasMoreElements" | "hasNext" => JavaType::Bool,
        "getNextEntry" | "getNextJarEntry" | "getNextZipEntry" => JavaType::Entry,
        "get" if receiver.and_then(|r| r.ident_name()) == Some("Paths") => JavaType::Path,
        _ => JavaType::Unknown,
    }
}

#[test]
fn lowers_method_with_types() {
    let src = r#"
        import java.io.File;
        import java.util.zip.ZipEntry;

        class T {
            void m(ZipEntry entry, File dir) throws Exception {
                String name = entry.getName();
                File file = new File(dir, name);
            }
        }"#;
    let tree = parse_java(src).unwrap();
    let methods = lower_methods(&tree, src);
    assert_eq!(methods.len(), 1);
    let m = &methods[0];
    assert_eq!(m.name, "m");
    assert_eq!(m.params.len(), 2);
    assert_eq!(m.params[0].ty, JavaType::Entry);
    assert_eq!(m.params[1].ty, JavaType::File);
    assert_eq!(m.throws, vec!["Exception".to_string()]);
    assert_eq!(m.body.stmts.len(), 2);

    let StmtKind::Local { ty, name, init, .. } = &m.body.stmts[0].kind else {
        panic!("expected local decl");
    };
    assert_eq!(*ty, JavaType::Str);
    assert_eq!(name, "name");
    let Some(Expr { kind: ExprKind::Call { receiver, name: call, .. }, .. }) = init.as_ref() else {
        panic!("expected call initializer");
    };
    assert_eq!(call, "getName");
    assert_eq!(receiver.as_ref().unwrap().ty, JavaType::Entry);

    let StmtKind::Local { ty, init, .. } = &m.body.stmts[1].kind else {
        panic!("expected local decl");
    };
    assert_eq!(*ty, JavaType::File);
    assert!(matches!(
        init.as_ref().unwrap().kind,
        ExprKind::New { ref class, .. } if class == "File"
    ));
}

#[test]
fn lowers_while_loop_with_condition_assignment() {
    let src = r#"
        class T {
            void m(java.util.zip.ZipInputStream zis) throws java.io.IOException {
                java.util.zip.ZipEntry entry;
                while ((entry = zis.getNextEntry()) != null) {
                    String name = entry.getName();
                }
            }
        }"#;
    let tree = parse_java(src).unwrap();
    let methods = lower_methods(&tree, src);
    let m = &methods[0];
    let StmtKind::While { body, .. } = &m.body.stmts[1].kind else {
        panic!("expected while");
    };
    let StmtKind::Local { init, .. } = &body.stmts[0].kind else {
        panic!("expected local in loop body");
    };
    // `entry` was declared without an initializer; the call receiver still types as Entry.
    let Some(Expr { kind: ExprKind::Call { receiver, .. }, .. }) = init.as_ref() else {
        panic!("expected getName call");
    };
    assert_eq!(receiver.as_ref().unwrap().ty, JavaType::Entry);
}

use tracing::debug;

use crate::errors::{SlipError, SlipResult};
use crate::fix;
use crate::ir::BaseDirEquality;
use crate::lower;
use crate::matchers::sources;
use crate::taint::{self, Action};

#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Fixed-point budget: changing cycles beyond this are an anomaly.
    pub max_cycles: usize,
    /// Skip files that already use a safe bulk-extraction API.
    pub respect_safe_extraction_api: bool,
    /// Separator-qualify weak canonical-string guards in place.
    pub fix_weak_guards: bool,
    pub base_dir_equality: BaseDirEquality,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            max_cycles: 10,
            respect_safe_extraction_api: true,
            fix_weak_guards: true,
            base_dir_equality: BaseDirEquality::Syntactic,
        }
    }
}

#[derive(Debug)]
pub struct Finding {
    pub line: usize,
    pub col: usize,
    pub message: String,
    pub fixable: bool,
}

#[derive(Debug)]
pub struct Rewritten {
    pub text: String,
    /// Number of cycles that changed the text.
    pub cycles: usize,
}

fn line_col(src: &str, at: usize) -> (usize, usize) {
    let before = &src[..at.min(src.len())];
    let line = before.matches('\n').count() + 1;
    let col = at - before.rfind('\n').map(|i| i + 1).unwrap_or(0) + 1;
    (line, col)
}

fn uses_safe_extractor(methods: &[crate::ir::MethodBody]) -> bool {
    methods.iter().any(|m| {
        let mut found = false;
        m.body.walk_exprs(&mut |e| {
            if sources::is_safe_extractor_call(e) {
                found = true;
            }
        });
        found
    })
}

/// Report every uncovered sink without touching the source.
pub fn scan_source(src: &str, opts: &EngineOptions) -> SlipResult<Vec<Finding>> {
    let tree = lower::parse_java(src)?;
    let methods = lower::lower_methods(&tree, src);
    if opts.respect_safe_extraction_api && uses_safe_extractor(&methods) {
        debug!("file uses a safe extraction API, skipping");
        return Ok(Vec::new());
    }
    let mut findings = Vec::new();
    for m in &methods {
        for sink in taint::analyze_method(m, opts.base_dir_equality).sinks {
            if sink.covered {
                continue;
            }
            let (line, col) = line_col(src, sink.span.start);
            let (message, fixable) = match (&sink.action, sink.skipped) {
                (_, Some(note)) => (format!("zip slip left unfixed: {note}"), false),
                (Some(Action::Strengthen { .. }), _) => (
                    "zip slip: containment check missing trailing separator".to_owned(),
                    true,
                ),
                (Some(_), _) => (
                    "zip slip: path built from archive entry name reaches a file open".to_owned(),
                    true,
                ),
                (None, None) => continue,
            };
            findings.push(Finding { line, col, message, fixable });
        }
    }
    Ok(findings)
}

/// One complete pass: detect, plan, apply at most one fix. Returns the new
/// text, or `None` when nothing (more) needs doing. Pure text-to-text; the
/// caller owns the fixed-point loop.
pub fn rewrite_once(src: &str, opts: &EngineOptions) -> SlipResult<Option<String>> {
    let tree = lower::parse_java(src)?;
    let methods = lower::lower_methods(&tree, src);
    if opts.respect_safe_extraction_api && uses_safe_extractor(&methods) {
        return Ok(None);
    }
    for m in &methods {
        for sink in taint::analyze_method(m, opts.base_dir_equality).sinks {
            let Some(action) = sink.action else { continue };
            if matches!(action, Action::Strengthen { .. }) && !opts.fix_weak_guards {
                continue;
            }
            debug!(method = %m.name, ?action, "applying fix plan");
            let plan = fix::synthesize(&action, m, src);
            let mut text = fix::apply_edits(src, &plan.edits);
            for imp in &plan.imports {
                text = fix::ensure_import(&text, imp);
            }
            return Ok(Some(text));
        }
    }
    Ok(None)
}

/// Re-run the pass until it stops changing the tree or the budget runs out.
pub fn rewrite_to_fixed_point(
    label: &str,
    src: &str,
    opts: &EngineOptions,
) -> SlipResult<Rewritten> {
    let mut text = src.to_owned();
    let mut cycles = 0usize;
    loop {
        if cycles > opts.max_cycles {
            return Err(SlipError::CycleBudgetExceeded {
                path: label.to_owned(),
                cycles,
            });
        }
        match rewrite_once(&text, opts)? {
            Some(next) if next != text => {
                text = next;
                cycles += 1;
            }
            _ => break,
        }
    }
    Ok(Rewritten { text, cycles })
}

// --------------------------------------------------------------------------
// End-to-end fixtures
// --------------------------------------------------------------------------

#[cfg(test)]
fn fixed(src: &str) -> Rewritten {
    rewrite_to_fixed_point("test.java", src, &EngineOptions::default()).unwrap()
}

#[cfg(test)]
fn assert_unchanged(src: &str) {
    let out = fixed(src);
    assert_eq!(out.cycles, 0);
    assert_eq!(out.text, src);
}

#[test]
fn guards_a_bound_two_arg_join_in_one_cycle() {
    let src = r#"import java.io.File;
import java.io.FileOutputStream;
import java.util.zip.ZipEntry;

public class ZipTest {
    public void m1(ZipEntry entry, File dir) throws Exception {
        String name = entry.getName();
        File file = new File(dir, name);
        FileOutputStream os = new FileOutputStream(file);
    }
}
"#;
    let expected = r#"import java.io.File;
import java.io.FileOutputStream;
import java.util.zip.ZipEntry;

public class ZipTest {
    public void m1(ZipEntry entry, File dir) throws Exception {
        String name = entry.getName();
        File file = new File(dir, name);
        if (!file.toPath().normalize().startsWith(dir.toPath().normalize())) {
            throw new RuntimeException("Bad zip entry");
        }
        FileOutputStream os = new FileOutputStream(file);
    }
}
"#;
    let out = fixed(src);
    assert_eq!(out.text, expected);
    assert_eq!(out.cycles, 1);
    // idempotence: the guarded result is a fixed point
    assert_unchanged(expected);
}

#[test]
fn one_guard_covers_every_later_use_of_the_variable() {
    let src = r#"import java.io.File;
import java.io.FileOutputStream;
import java.io.FileWriter;
import java.util.zip.ZipEntry;

public class ZipTest {
    public void m1(ZipEntry entry, File dir) throws Exception {
        String name = entry.getName();
        File file = new File(dir, name);
        FileOutputStream os = new FileOutputStream(file);
        FileWriter fw = new FileWriter(file);
    }
}
"#;
    let out = fixed(src);
    assert_eq!(out.cycles, 1, "a single guard covers both stream opens");
    assert_eq!(out.text.matches("Bad zip entry").count(), 1);
}

#[test]
fn hoists_an_inline_resolve_then_guards_it() {
    let src = r#"import java.io.OutputStream;
import java.nio.file.Files;
import java.nio.file.Path;
import java.util.zip.ZipEntry;

public class ZipTest {
    public void m1(ZipEntry entry, Path dir) throws Exception {
        String name = entry.getName();
        OutputStream os = Files.newOutputStream(dir.resolve(name));
    }
}
"#;
    let expected = r#"import java.io.OutputStream;
import java.nio.file.Files;
import java.nio.file.Path;
import java.util.zip.ZipEntry;

public class ZipTest {
    public void m1(ZipEntry entry, Path dir) throws Exception {
        String name = entry.getName();
        final Path zipEntryPath = dir.resolve(name);
        if (!zipEntryPath.normalize().startsWith(dir.normalize())) {
            throw new RuntimeException("Bad zip entry");
        }
        OutputStream os = Files.newOutputStream(zipEntryPath);
    }
}
"#;
    let out = fixed(src);
    assert_eq!(out.text, expected);
    assert!(out.cycles <= 2);
    assert_unchanged(expected);
}

#[test]
fn hoists_an_inline_resolve_of_the_raw_entry_name() {
    let src = r#"import java.io.OutputStream;
import java.nio.file.Files;
import java.nio.file.Path;
import java.util.zip.ZipEntry;

public class ZipTest {
    public void m1(ZipEntry entry, Path dir) throws Exception {
        OutputStream os = Files.newOutputStream(dir.resolve(entry.getName()));
    }
}
"#;
    let out = fixed(src);
    assert!(out.text.contains("final Path zipEntryPath = dir.resolve(entry.getName());"));
    assert!(out.text.contains("if (!zipEntryPath.normalize().startsWith(dir.normalize()))"));
    assert!(out.text.contains("Files.newOutputStream(zipEntryPath)"));
    assert!(out.cycles <= 2);
    assert_unchanged(&out.text);
}

#[test]
fn rewrites_a_separator_concat_through_a_hoisted_file() {
    let src = r#"import java.io.File;
import java.io.FileOutputStream;
import java.util.zip.ZipEntry;

public class ZipTest {
    public void m1(ZipEntry entry, File dir) throws Exception {
        String name = entry.getName();
        FileOutputStream os = new FileOutputStream(dir + File.separator + name);
    }
}
"#;
    let expected = r#"import java.io.File;
import java.io.FileOutputStream;
import java.util.zip.ZipEntry;

public class ZipTest {
    public void m1(ZipEntry entry, File dir) throws Exception {
        String name = entry.getName();
        final File zipEntryFile = new File(dir, name);
        if (!zipEntryFile.toPath().normalize().startsWith(dir.toPath().normalize())) {
            throw new RuntimeException("Bad zip entry");
        }
        FileOutputStream os = new FileOutputStream(zipEntryFile);
    }
}
"#;
    let out = fixed(src);
    assert_eq!(out.text, expected);
    assert_unchanged(expected);
}

#[test]
fn splits_a_bound_concat_constructor_and_uses_io_exception() {
    // The method throws IOException, so the guard can too; the one-argument
    // File constructor is normalized to the two-argument form in the same
    // cycle the guard lands.
    let src = r#"import java.io.File;
import java.io.FileOutputStream;
import java.io.IOException;
import java.util.zip.ZipEntry;

public class ZipTest {
    public void m1(ZipEntry entry, File dir) throws IOException {
        String name = entry.getName();
        File file = new File(dir.getCanonicalPath() + File.separator + name);
        FileOutputStream os = new FileOutputStream(file);
    }
}
"#;
    let expected = r#"import java.io.File;
import java.io.FileOutputStream;
import java.io.IOException;
import java.util.zip.ZipEntry;

public class ZipTest {
    public void m1(ZipEntry entry, File dir) throws IOException {
        String name = entry.getName();
        File file = new File(dir.getCanonicalPath(), name);
        if (!file.toPath().normalize().startsWith(dir.getCanonicalPath())) {
            throw new IOException("Bad zip entry");
        }
        FileOutputStream os = new FileOutputStream(file);
    }
}
"#;
    let out = fixed(src);
    assert_eq!(out.text, expected);
    assert_unchanged(expected);
}

#[test]
fn strengthens_a_weak_canonical_string_guard_in_place() {
    let src = r#"import java.io.File;
import java.io.FileOutputStream;
import java.io.IOException;
import java.util.zip.ZipEntry;

public class ZipTest {
    public void m1(ZipEntry entry, File dir) throws IOException {
        File file = new File(dir, entry.getName());
        if (!file.getCanonicalPath().startsWith(dir.getCanonicalPath())) {
            throw new IOException("Bad entry");
        }
        FileOutputStream os = new FileOutputStream(file);
    }
}
"#;
    let out = fixed(src);
    assert!(out
        .text
        .contains("startsWith(dir.getCanonicalPath() + File.separator)"));
    assert_eq!(out.text.matches("startsWith").count(), 1, "no second guard inserted");
    assert_unchanged(&out.text);
}

#[test]
fn accepted_guard_kinds_are_left_alone() {
    // kind 1: canonicalized on both sides, compared as paths
    assert_unchanged(
        r#"import java.io.File;
import java.io.FileOutputStream;
import java.util.zip.ZipEntry;

public class ZipTest {
    public void m2(ZipEntry entry, File dir) throws Exception {
        String name = entry.getName();
        File file = new File(dir, name);
        File canFile = file.getCanonicalFile();
        String canDir = dir.getCanonicalPath();
        if (!canFile.toPath().startsWith(canDir)) {
            throw new Exception();
        }
        FileOutputStream os = new FileOutputStream(file);
    }
}
"#,
    );
    // kind 2: normalize on both sides, brace-less reject branch
    assert_unchanged(
        r#"import java.io.File;
import java.io.FileOutputStream;
import java.util.zip.ZipEntry;

public class ZipTest {
    public void m3(ZipEntry entry, File dir) throws Exception {
        String name = entry.getName();
        File file = new File(dir, name);
        if (!file.toPath().normalize().startsWith(dir.toPath().normalize()))
            throw new Exception();
        FileOutputStream os = new FileOutputStream(file);
    }
}
"#,
    );
    // kind 3: absolute path resolution plus normalize
    assert_unchanged(
        r#"import java.io.File;
import java.io.FileOutputStream;
import java.io.OutputStream;
import java.nio.file.Path;
import java.util.zip.ZipEntry;

public class ZipTest {
    public void m5(ZipEntry entry, File dir) throws Exception {
        String name = entry.getName();
        File file = new File(dir, name);
        Path absfile = file.toPath().toAbsolutePath().normalize();
        Path absdir = dir.toPath().toAbsolutePath().normalize();
        if (!absfile.startsWith(absdir))
            throw new Exception();
        OutputStream os = new FileOutputStream(file);
    }
}
"#,
    );
    // kind 4: canonical strings with the separator-qualified prefix
    assert_unchanged(
        r#"import java.io.File;
import java.io.OutputStream;
import java.nio.file.Files;
import java.nio.file.Path;
import java.util.zip.ZipEntry;

public class ZipTest {
    public void m6(ZipEntry entry, Path dir) throws Exception {
        String canonicalDest = dir.toFile().getCanonicalPath();
        Path target = dir.resolve(entry.getName());
        String canonicalTarget = target.toFile().getCanonicalPath();
        if (!canonicalTarget.startsWith(canonicalDest + File.separator))
            throw new Exception();
        OutputStream os = Files.newOutputStream(target);
    }
}
"#,
    );
}

#[test]
fn fixes_a_real_extraction_loop_inside_try_and_while() {
    let src = r#"import java.io.BufferedOutputStream;
import java.io.File;
import java.io.FileOutputStream;
import java.io.OutputStream;
import java.util.zip.ZipEntry;
import java.util.zip.ZipInputStream;

public class FileHandleUtil {
    public static void unZip(ZipInputStream is, String destDir) throws Exception {
        ZipEntry entry = null;
        while ((entry = is.getNextEntry()) != null) {
            if (entry.isDirectory()) {
                File directory = new File(destDir, entry.getName());
                directory.mkdirs();
            } else {
                OutputStream os = null;
                try {
                    os = new BufferedOutputStream(new FileOutputStream(new File(destDir, entry.getName())), 1024);
                } finally {
                    if (os != null) {
                        os.close();
                    }
                }
            }
        }
    }
}
"#;
    let expected = r#"import java.io.BufferedOutputStream;
import java.io.File;
import java.io.FileOutputStream;
import java.io.OutputStream;
import java.util.zip.ZipEntry;
import java.util.zip.ZipInputStream;

public class FileHandleUtil {
    public static void unZip(ZipInputStream is, String destDir) throws Exception {
        ZipEntry entry = null;
        while ((entry = is.getNextEntry()) != null) {
            if (entry.isDirectory()) {
                File directory = new File(destDir, entry.getName());
                directory.mkdirs();
            } else {
                OutputStream os = null;
                try {
                    final File zipEntryFile = new File(destDir, entry.getName());
                    if (!zipEntryFile.toPath().normalize().startsWith(destDir)) {
                        throw new RuntimeException("Bad zip entry");
                    }
                    os = new BufferedOutputStream(new FileOutputStream(zipEntryFile), 1024);
                } finally {
                    if (os != null) {
                        os.close();
                    }
                }
            }
        }
    }
}
"#;
    let out = fixed(src);
    assert_eq!(out.text, expected);
    // the bare directory join in the if-branch stays unguarded: mkdirs is
    // not a file-open consumer
    assert_eq!(out.text.matches("Bad zip entry").count(), 1);
    assert_unchanged(expected);
}

#[test]
fn validation_in_a_helper_method_is_left_untouched() {
    assert_unchanged(
        r#"import java.io.File;
import java.io.FileOutputStream;
import java.util.zip.ZipEntry;

public class ZipTest {

    private void validate(File tgtdir, File file) throws Exception {
        File canFile = file.getCanonicalFile();
        if (!canFile.toPath().startsWith(tgtdir.toPath()))
            throw new Exception();
    }

    public void m4(ZipEntry entry, File dir) throws Exception {
        String name = entry.getName();
        File file = new File(dir, name);
        validate(dir, file);
        FileOutputStream os = new FileOutputStream(file);
    }
}
"#,
    );
}

#[test]
fn constant_segments_are_not_flagged() {
    assert_unchanged(
        r#"import java.io.File;
import java.io.FileOutputStream;

public class ZipTest {
    public void m1(File dir) throws Exception {
        File file = new File(dir, "static" + ".bin");
        FileOutputStream os = new FileOutputStream(file);
    }
}
"#,
    );
}

#[test]
fn safe_extraction_api_suppresses_the_whole_file() {
    let src = r#"import java.io.File;
import java.io.FileOutputStream;
import java.util.zip.ZipEntry;

public class ZipTest {
    public void m1(ZipFile zip, ZipEntry entry, File dir) throws Exception {
        zip.extractAll(dir.getPath());
        File file = new File(dir, entry.getName());
        FileOutputStream os = new FileOutputStream(file);
    }
}
"#;
    let out = fixed(src);
    assert_eq!(out.cycles, 0);

    let opts = EngineOptions { respect_safe_extraction_api: false, ..Default::default() };
    let forced = rewrite_to_fixed_point("test.java", src, &opts).unwrap();
    assert!(forced.cycles > 0, "without deference the sink is fixed");
}

#[test]
fn exhausted_cycle_budget_is_an_error_not_a_loop() {
    let src = r#"import java.io.File;
import java.io.FileOutputStream;
import java.util.zip.ZipEntry;

public class ZipTest {
    public void m1(ZipEntry entry, File dir) throws Exception {
        File file = new File(dir, entry.getName());
        FileOutputStream os = new FileOutputStream(file);
    }
}
"#;
    let opts = EngineOptions { max_cycles: 0, ..Default::default() };
    let err = rewrite_to_fixed_point("test.java", src, &opts).unwrap_err();
    assert!(matches!(err, SlipError::CycleBudgetExceeded { .. }));
}

#[test]
fn scan_reports_without_rewriting() {
    let src = r#"import java.io.File;
import java.io.FileOutputStream;
import java.util.zip.ZipEntry;

public class ZipTest {
    public void m1(ZipEntry entry, File dir) throws Exception {
        String name = entry.getName();
        File file = new File(dir, name);
        FileOutputStream os = new FileOutputStream(file);
    }
}
"#;
    let findings = scan_source(src, &EngineOptions::default()).unwrap();
    assert_eq!(findings.len(), 1);
    assert!(findings[0].fixable);
    assert_eq!(findings[0].line, 9);
}

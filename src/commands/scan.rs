use console::style;
use rayon::prelude::*;
use std::path::Path;
use std::sync::Mutex;

use crate::engine;
use crate::errors::SlipResult;
use crate::utils::Config;
use crate::walk::spawn_senders;

#[derive(Debug)]
pub struct Diag {
    pub(crate) path: String,
    pub(crate) line: usize,
    pub(crate) col: usize,
    pub(crate) message: String,
    pub(crate) fixable: bool,
}

/// Entry point called by the CLI.
pub fn handle(path: &str, fixable_only: bool, config: &Config) -> SlipResult<()> {
    let scan_path = Path::new(path).canonicalize()?;
    let diags = scan_tree(&scan_path, config)?;

    let mut shown = 0usize;
    if !config.output.quiet {
        for d in &diags {
            if fixable_only && !d.fixable {
                continue;
            }
            shown += 1;
            let tag = if d.fixable {
                style("FIXABLE").red().bold()
            } else {
                style("SKIPPED").yellow().bold()
            };
            println!(
                "{}:{}:{}  [{}]  {}",
                style(d.path.clone()).blue().underlined(),
                d.line,
                d.col,
                tag,
                d.message,
            );
        }
        if shown == 0 {
            println!("{}: no zip-slip findings.", style("ok").green().bold());
        }
    }
    Ok(())
}

pub(crate) fn scan_tree(root: &Path, cfg: &Config) -> SlipResult<Vec<Diag>> {
    let opts = super::engine_options(cfg);
    let rx = spawn_senders(root, cfg);
    let acc = Mutex::new(Vec::new());

    rx.into_iter().flatten().par_bridge().for_each(|path| {
        match scan_one(&path, &opts) {
            Ok(mut local) => acc.lock().unwrap().append(&mut local),
            Err(e) => tracing::warn!("{}: {e}", path.display()),
        }
    });

    let mut diags = acc.into_inner().unwrap();
    diags.sort_by(|a, b| (&a.path, a.line, a.col).cmp(&(&b.path, b.line, b.col)));
    Ok(diags)
}

fn scan_one(path: &Path, opts: &engine::EngineOptions) -> SlipResult<Vec<Diag>> {
    tracing::debug!("scanning {}", path.display());
    let src = std::fs::read_to_string(path)?;
    let findings = engine::scan_source(&src, opts)?;
    Ok(findings
        .into_iter()
        .map(|f| Diag {
            path: path.to_string_lossy().into_owned(),
            line: f.line,
            col: f.col,
            message: f.message,
            fixable: f.fixable,
        })
        .collect())
}

#[test]
fn scan_tree_finds_a_vulnerable_file() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("Unzip.java"),
        r#"import java.io.File;
import java.io.FileOutputStream;
import java.util.zip.ZipEntry;

public class Unzip {
    public void m(ZipEntry entry, File dir) throws Exception {
        File file = new File(dir, entry.getName());
        FileOutputStream os = new FileOutputStream(file);
    }
}
"#,
    )
    .unwrap();
    std::fs::write(dir.path().join("Safe.java"), "public class Safe {}\n").unwrap();

    let diags = scan_tree(dir.path(), &Config::default()).unwrap();
    assert_eq!(diags.len(), 1);
    assert!(diags[0].fixable);
    assert!(diags[0].path.ends_with("Unzip.java"));
}

use console::style;
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::engine;
use crate::errors::{SlipError, SlipResult};
use crate::utils::Config;
use crate::walk::spawn_senders;

#[derive(Debug, Default)]
struct Totals {
    fixed: Vec<(PathBuf, usize)>,
    failed: Vec<(PathBuf, SlipError)>,
}

/// Entry point called by the CLI.
pub fn handle(path: &str, dry_run: bool, config: &Config) -> SlipResult<()> {
    let fix_path = Path::new(path).canonicalize()?;
    let opts = super::engine_options(config);
    let rx = spawn_senders(&fix_path, config);
    let totals = Mutex::new(Totals::default());

    rx.into_iter().flatten().par_bridge().for_each(|path| {
        match fix_one(&path, dry_run, &opts) {
            Ok(Some(cycles)) => totals.lock().unwrap().fixed.push((path, cycles)),
            Ok(None) => {}
            Err(e) => totals.lock().unwrap().failed.push((path, e)),
        }
    });

    let totals = totals.into_inner().unwrap();
    if !config.output.quiet {
        for (p, cycles) in &totals.fixed {
            let verb = if dry_run { "would fix" } else { "fixed" };
            println!(
                "{} {} ({} cycle{})",
                style(verb).green().bold(),
                style(p.display()).blue().underlined(),
                cycles,
                if *cycles == 1 { "" } else { "s" },
            );
        }
        for (p, e) in &totals.failed {
            println!("{} {}: {e}", style("error").red().bold(), p.display());
        }
        if totals.fixed.is_empty() && totals.failed.is_empty() {
            println!("{}: nothing to fix.", style("ok").green().bold());
        }
    }
    if let Some((_, e)) = totals.failed.into_iter().next() {
        return Err(e);
    }
    Ok(())
}

/// Rewrite a single file to its fixed point. `Ok(Some(n))` means the file
/// changed after `n` cycles (and was written back unless dry-running).
fn fix_one(path: &Path, dry_run: bool, opts: &engine::EngineOptions) -> SlipResult<Option<usize>> {
    tracing::debug!("fixing {}", path.display());
    let src = std::fs::read_to_string(path)?;
    let out = engine::rewrite_to_fixed_point(&path.to_string_lossy(), &src, opts)?;
    if out.cycles == 0 {
        return Ok(None);
    }
    if !dry_run {
        std::fs::write(path, &out.text)?;
    }
    Ok(Some(out.cycles))
}

#[test]
fn fix_rewrites_in_place_and_is_stable() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("Unzip.java");
    std::fs::write(
        &file,
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

    let opts = engine::EngineOptions::default();
    let first = fix_one(&file, false, &opts).unwrap();
    assert_eq!(first, Some(1));

    let rewritten = std::fs::read_to_string(&file).unwrap();
    assert!(rewritten.contains("Bad zip entry"));

    // second run is a no-op
    let second = fix_one(&file, false, &opts).unwrap();
    assert_eq!(second, None);
    assert_eq!(std::fs::read_to_string(&file).unwrap(), rewritten);
}

#[test]
fn dry_run_leaves_the_file_alone() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("Unzip.java");
    let src = r#"import java.io.File;
import java.io.FileOutputStream;
import java.util.zip.ZipEntry;

public class Unzip {
    public void m(ZipEntry entry, File dir) throws Exception {
        File file = new File(dir, entry.getName());
        FileOutputStream os = new FileOutputStream(file);
    }
}
"#;
    std::fs::write(&file, src).unwrap();

    let changed = fix_one(&file, true, &engine::EngineOptions::default()).unwrap();
    assert_eq!(changed, Some(1));
    assert_eq!(std::fs::read_to_string(&file).unwrap(), src);
}

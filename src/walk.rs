use crossbeam_channel::{Receiver, Sender, bounded};
use ignore::{WalkBuilder, WalkState, overrides::OverrideBuilder};
use std::{
    mem,
    path::{Path, PathBuf},
    thread,
};

use crate::utils::Config;

// ---------------------------------------------------------------------------
// Internal constants / helpers
// ---------------------------------------------------------------------------
const CHANNEL_MULTIPLIER: usize = 4; // capacity = threads × this

type Batch = Vec<PathBuf>;

struct Batcher {
    tx: Sender<Batch>,
    batch: Batch,
    cap: usize,
}
impl Batcher {
    fn push(&mut self, p: PathBuf) {
        self.batch.push(p);
        if self.batch.len() == self.cap {
            self.flush();
        }
    }
    fn flush(&mut self) {
        if !self.batch.is_empty() {
            let _ = self.tx.send(mem::take(&mut self.batch));
        }
    }
}
impl Drop for Batcher {
    fn drop(&mut self) {
        self.flush();
    }
}

// ---------------------------------------------------------------------------
/// Walk `root` and send *batches* of `.java` paths through the returned channel.
pub fn spawn_senders(root: &Path, cfg: &Config) -> Receiver<Batch> {
    // ----- 1  build ignore/override rules ----------------------------------
    let mut ob = OverrideBuilder::new(root);
    if let Err(e) = ob.add("*.java") {
        tracing::warn!("cannot add java pattern: {e}");
    }
    for dir in &cfg.scanner.excluded_directories {
        if let Err(e) = ob.add(&format!("!**/{dir}/**")) {
            tracing::warn!("cannot add ignore pattern ‘{dir}’: {e}");
        }
    }
    for file in &cfg.scanner.excluded_files {
        if let Err(e) = ob.add(&format!("!{file}")) {
            tracing::warn!("cannot add ignore pattern ‘{file}’: {e}");
        }
    }
    let overrides = ob.build().unwrap();

    // ----- 2  channel & thread pool parameters -----------------------------
    let workers = cfg.performance.worker_threads.unwrap_or(num_cpus::get());
    let multiplier = cfg.performance.channel_multiplier.max(CHANNEL_MULTIPLIER);
    let (tx, rx) = bounded::<Batch>(workers * multiplier);

    let root = root.to_path_buf();
    let scan_hidden = cfg.scanner.scan_hidden_files;
    let follow = cfg.scanner.follow_symlinks;
    let vcs = cfg.scanner.read_vcsignore;
    let batch_cap = cfg.performance.batch_size.max(1);
    let max_bytes = cfg.scanner.max_file_size_mb.unwrap_or(0) * 1_048_576;

    // ----- 3  the background walker thread ---------------------------------
    thread::spawn(move || {
        WalkBuilder::new(root)
            .hidden(!scan_hidden)
            .follow_links(follow)
            .git_ignore(vcs)
            .threads(workers)
            .overrides(overrides)
            .build_parallel()
            .run(move || {
                let mut b = Batcher {
                    tx: tx.clone(),
                    batch: Vec::with_capacity(batch_cap),
                    cap: batch_cap,
                };

                Box::new(move |entry| {
                    let entry = match entry {
                        Ok(e) if e.file_type().map(|ft| ft.is_file()).unwrap_or(false) => e,
                        _ => return WalkState::Continue,
                    };

                    if entry.path().extension().and_then(|s| s.to_str()) != Some("java") {
                        return WalkState::Continue;
                    }

                    if max_bytes != 0 {
                        match entry.metadata() {
                            Ok(m) if m.len() > max_bytes => return WalkState::Continue,
                            Err(e) => {
                                tracing::debug!("metadata failed for {:?}: {e}", entry.path());
                                return WalkState::Continue;
                            }
                            _ => {}
                        }
                    }

                    tracing::debug!("sending {:?}", entry);
                    b.push(entry.into_path());
                    WalkState::Continue
                })
            });
    });

    rx
}

#[test]
fn walker_only_yields_java_files() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("A.java"), "class A {}").unwrap();
    std::fs::write(dir.path().join("b.rs"), "fn main() {}").unwrap();
    std::fs::write(dir.path().join("notes.txt"), "hi").unwrap();

    let rx = spawn_senders(dir.path(), &Config::default());
    let files: Vec<_> = rx.into_iter().flatten().collect();
    assert_eq!(files.len(), 1);
    assert!(files[0].ends_with("A.java"));
}

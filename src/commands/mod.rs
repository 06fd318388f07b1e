pub mod fix;
pub mod scan;

use crate::cli::Commands;
use crate::engine::EngineOptions;
use crate::errors::SlipResult;
use crate::utils::Config;

pub fn handle_command(command: Commands, config: &mut Config) -> SlipResult<()> {
    match command {
        Commands::Scan { path, fixable_only } => scan::handle(&path, fixable_only, config),
        Commands::Fix { path, dry_run, max_cycles } => {
            if let Some(n) = max_cycles {
                config.engine.max_cycles = n;
            }
            fix::handle(&path, dry_run, config)
        }
    }
}

pub(crate) fn engine_options(config: &Config) -> EngineOptions {
    EngineOptions {
        max_cycles: config.engine.max_cycles,
        respect_safe_extraction_api: config.engine.respect_safe_extraction_api,
        fix_weak_guards: config.engine.fix_weak_guards,
        base_dir_equality: config.engine.base_dir_equality,
    }
}

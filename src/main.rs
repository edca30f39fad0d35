//! App Manager - install, update and desktop-integrate Linux application
//! bundles.

use app_manager::cli::{self, OutputManager};
use std::process;

fn main() {
    env_logger::init();

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create Tokio runtime: {}", e);
            process::exit(1);
        }
    };

    let exit_code = runtime.block_on(async_main());
    process::exit(exit_code);
}

/// Async main logic - runs inside the Tokio runtime
async fn async_main() -> i32 {
    match cli::run().await {
        Ok(exit_code) => exit_code,
        Err(e) => {
            let output = OutputManager::new(false, false);
            output.error(&format!("Fatal error: {e}"));
            1
        }
    }
}

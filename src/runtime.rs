//! CLI args to configure tokio.
use anyhow::Result;
use clap::Parser;
use tokio::runtime::{Builder, Runtime};

#[derive(Debug, Parser)]
pub struct RuntimeCLIConfig {
    /// Number of worker threads.
    ///
    /// Without this flag everything runs on the main thread.
    #[clap(short = 'j', long)]
    threads: Option<usize>,
}

pub fn setup_runtime(config: RuntimeCLIConfig) -> Result<Runtime> {
    let mut builder = match config.threads {
        Some(threads) => {
            let mut builder = Builder::new_multi_thread();
            builder.worker_threads(threads.max(1));
            builder
        }
        None => Builder::new_current_thread(),
    };
    builder.enable_all();
    let rt = builder.build()?;
    Ok(rt)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_current_thread_runtime() {
        let rt = setup_runtime(RuntimeCLIConfig { threads: None }).unwrap();
        assert_eq!(rt.block_on(async { 1 + 1 }), 2);
    }

    #[test]
    fn test_multi_thread_runtime() {
        let rt = setup_runtime(RuntimeCLIConfig { threads: Some(2) }).unwrap();
        let handle = rt.spawn(async { "done" });
        assert_eq!(rt.block_on(handle).unwrap(), "done");
    }
}

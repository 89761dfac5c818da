use std::sync::Arc;

use caretrack_core::Runner;

use crate::common::open_engine;

/// Run every job loop until Ctrl-C.
pub fn run() -> Result<(), Box<dyn std::error::Error>> {
    let engine = Arc::new(open_engine()?);
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async {
        let handle = Runner::new(Arc::clone(&engine)).spawn();
        tracing::info!("serving, press Ctrl-C to stop");
        let signal = tokio::signal::ctrl_c().await;
        handle.shutdown().await;
        signal
    })?;

    // engine owns a blocking HTTP client; release it outside the runtime
    drop(runtime);
    drop(engine);
    tracing::info!("stopped");
    Ok(())
}

// src/system/signals.rs

use crate::CancellationToken;
use std::sync::atomic::Ordering;
use std::thread;

/// Starts a background listener that raises `token` on every Ctrl+C.
///
/// Once installed, SIGINT no longer terminates the shell; the pipeline
/// executor sees the token and stops the running children instead. Only the
/// interactive shell installs it.
pub fn install_interrupt_listener(token: CancellationToken) -> std::io::Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    thread::Builder::new()
        .name("jsh-signals".to_string())
        .spawn(move || {
            runtime.block_on(async move {
                loop {
                    if let Err(e) = tokio::signal::ctrl_c().await {
                        log::warn!("Interrupt listener stopped: {}", e);
                        break;
                    }
                    log::debug!("Interrupt received.");
                    token.store(true, Ordering::SeqCst);
                }
            });
        })?;

    log::debug!("Interrupt listener installed.");
    Ok(())
}

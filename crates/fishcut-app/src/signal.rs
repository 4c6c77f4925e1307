//! Ctrl-C handling.

use fishcut_core::CancelToken;
use tracing::warn;

/// Exit status after an interrupted run, as shells report SIGINT.
pub const EXIT_INTERRUPTED: u8 = 130;

/// Cancel `cancel` on the first Ctrl-C. A second Ctrl-C exits at once.
///
/// The signal is awaited on a small tokio runtime owned by a background
/// thread; the detection work itself stays on plain threads.
pub fn cancel_on_interrupt(cancel: CancelToken) -> std::io::Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    std::thread::Builder::new()
        .name("fishcut-signal".into())
        .spawn(move || {
            runtime.block_on(async move {
                if tokio::signal::ctrl_c().await.is_err() {
                    return;
                }
                warn!("Interrupted, stopping after the current batch (Ctrl-C again to quit)");
                cancel.cancel();
                if tokio::signal::ctrl_c().await.is_ok() {
                    std::process::exit(i32::from(EXIT_INTERRUPTED));
                }
            });
        })?;
    Ok(())
}

//! CLI commands.

pub mod chat;
pub mod diagnostics;
pub mod models;
pub mod runtimes;
pub mod service;

use aftp::CancellationToken;

/// Token cancelled by the first Ctrl-C.
pub(crate) fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            token.cancel();
        }
    });
    cancel
}

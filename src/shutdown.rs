//! Stop signal shared by the listener and its connection tasks.

use tokio::sync::watch;

/// Resolves once `true` has been published. A dropped sender never cancels.
pub async fn cancelled(shutdown: &mut watch::Receiver<bool>) {
    loop {
        let stop = *shutdown.borrow_and_update();
        if stop {
            return;
        }
        if shutdown.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

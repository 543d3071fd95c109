use tokio::select;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[cfg(unix)]
async fn terminate() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut stream) => {
            stream.recv().await;
        }
        Err(_) => std::future::pending().await,
    }
}

#[cfg(not(unix))]
async fn terminate() {
    std::future::pending::<()>().await
}

/// Cancels `cancelation` on SIGINT or SIGTERM, returns early when it's cancelled elsewhere.
///
/// `dayrecap stop` sends SIGTERM. On Windows only ctrl-c is observed.
pub async fn detect_shutdown(cancelation: CancellationToken) {
    select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received interrupt, shutting down");
            cancelation.cancel();
        },
        _ = terminate() => {
            info!("Received termination request, shutting down");
            cancelation.cancel();
        },
        _ = cancelation.cancelled() => (),
    };
}

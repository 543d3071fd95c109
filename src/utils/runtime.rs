use anyhow::Result;

/// The daemon does little work per tick, one thread is plenty. Blocking scans go to tokio's
/// blocking pool.
pub fn single_thread_runtime() -> Result<tokio::runtime::Runtime> {
    Ok(tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?)
}

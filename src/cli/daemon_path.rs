use std::path::PathBuf;

/// The daemon binary is installed next to the cli.
pub fn to_daemon_path(mut path: PathBuf) -> PathBuf {
    path.set_file_name("dayrecap-daemon");
    #[cfg(windows)]
    {
        path.set_extension("exe");
    }
    path
}

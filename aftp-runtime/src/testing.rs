//! Fake interpreters for subprocess tests.

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

/// Serializes writing and executing scripts across tests. Executing a
/// file while another thread's fork still holds it open for writing
/// fails with ETXTBSY.
pub static SPAWN_LOCK: tokio::sync::Mutex<()> = tokio::sync::Mutex::const_new(());

/// Write an executable shell script
pub fn write_script(path: &Path, body: &str) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).unwrap();
}

/// Create `<root>/<name>/bin/python3` running `body`
pub fn fake_runtime(root: &Path, name: &str, body: &str) -> PathBuf {
    let interpreter = root.join(name).join("bin").join("python3");
    write_script(&interpreter, body);
    interpreter
}

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

/**
 * @brief Append a single line to the audit log, creating the file if missing.
 * @param path Path to the log file.
 * @param line Text line to append.
 *
 * Failures are logged and otherwise ignored; the audit trail never fails an operation.
 */
pub fn write_line(path: &Path, line: &str) {
    let res = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .and_then(|mut file| writeln!(file, "{}", line));
    if let Err(e) = res {
        log::warn!("audit log {}: {}", path.display(), e);
    }
}

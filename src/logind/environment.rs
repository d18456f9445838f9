//! Recovers a variable from the environment of a session's processes.
//!
//! The session manager does not publish a session's environment. A system daemon that wants,
//! for instance, the user's session bus address has to find a process owned by the session's
//! user and belonging to the session, then read `/proc/<pid>/environ`.

use std::fs::{self, File};
use std::io::{ErrorKind, Read};
use std::os::unix::fs::MetadataExt;
use std::path::Path;

use super::SessionManager;
use crate::common::{Result, SessionError};

const BUFFER_SIZE: usize = 8192;

/// The `environ` file of one process.
struct Environ {
    pid: u32,
    file: File,
    uid: Option<u32>,
}

impl Environ {
    /// Opens `<proc_root>/<pid>/environ`. The owner is taken from the file metadata and is `None`
    /// when the metadata cannot be read.
    fn open(proc_root: &Path, pid: u32) -> Option<Environ> {
        let file = File::open(proc_root.join(pid.to_string()).join("environ")).ok()?;
        let uid = file.metadata().ok().map(|metadata| metadata.uid());
        Some(Environ { pid, file, uid })
    }

    /// Reads the whole environment block.
    fn load(&mut self) -> Result<Vec<u8>> {
        let mut text = Vec::new();
        let mut buffer = [0u8; BUFFER_SIZE];

        loop {
            match self.file.read(&mut buffer) {
                Ok(0) => return Ok(text),
                Ok(loaded) => text.extend_from_slice(&buffer[..loaded]),
                Err(error) if error.kind() == ErrorKind::Interrupted => continue,
                Err(error) => {
                    let code = error.raw_os_error().unwrap_or(libc::EIO);
                    return Err(SessionError::system(code, format!("Cant read environment of process {}: {}", self.pid, error)));
                }
            }
        }
    }
}

/// Returns the value of `name` in a NUL-separated `KEY=VALUE` block.
///
/// The block ends at the first empty entry. Values are decoded lossily: byte sequences that
/// are not valid UTF-8 are replaced with U+FFFD, the name must match exactly.
pub fn lookup(block: &[u8], name: &str) -> Option<String> {
    if name.is_empty() || name.contains('=') {
        return None;
    }

    block
        .split(|byte| *byte == 0)
        .take_while(|entry| !entry.is_empty())
        .find_map(|entry| entry.strip_prefix(name.as_bytes())?.strip_prefix(b"="))
        .map(|value| String::from_utf8_lossy(value).into_owned())
}

/// Scans the processes under `proc_root` for one owned by `uid` and part of session `sid`
/// whose environment defines `name`.
///
/// Processes are visited in directory order and the first definition found is returned.
/// An empty string is returned when no process defines the variable. Processes that cannot
/// be inspected are skipped; failing to open `proc_root` or to read an opened environment
/// file is an error.
pub fn scan(proc_root: &Path, uid: u32, sid: &str, manager: &dyn SessionManager, name: &str) -> Result<String> {
    let entries = fs::read_dir(proc_root).map_err(|error| {
        SessionError::system(error.raw_os_error().unwrap_or(libc::EIO), format!("Cant open {}: {}", proc_root.display(), error))
    })?;

    for entry in entries {
        let Ok(entry) = entry else {
            continue;
        };

        let Some(pid) = entry.file_name().to_str().and_then(|name| name.parse::<u32>().ok()) else {
            continue;
        };

        let Some(mut environ) = Environ::open(proc_root, pid) else {
            continue;
        };

        if environ.uid != Some(uid) {
            continue;
        }

        match manager.pid_session(pid) {
            Ok(Some(process_sid)) if process_sid == sid => {}
            Ok(_) => continue,
            Err(error) => {
                trace!("Ignoring process {}: {}", pid, error);
                continue;
            }
        }

        if let Some(value) = lookup(&environ.load()?, name) {
            debug!("Found {} for session {} in the environment of process {}", name, sid, pid);
            return Ok(value);
        }
    }

    debug!("No process of session {} defines {}", sid, name);
    Ok(String::new())
}

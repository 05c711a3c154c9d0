use std::fs::OpenOptions;
use std::os::unix::fs::FileTypeExt;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::stream::SerialStream;

/// A serial device node on a Unix filesystem (`/dev/ttyUSB0`, a pty, a FIFO).
///
/// Opening only validates the node type and opens it read/write. Baud rate and
/// line settings are expected to be configured out of band.
#[derive(Debug, Clone)]
pub struct DeviceNode {
    path: PathBuf,
}

impl DeviceNode {
    /// Validate that `path` names a character device or FIFO.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let metadata = std::fs::metadata(&path).map_err(|e| TransportError::Open {
            path: path.clone(),
            source: e,
        })?;

        let file_type = metadata.file_type();
        if !(file_type.is_char_device() || file_type.is_fifo()) {
            return Err(TransportError::NotADevice { path });
        }

        Ok(Self { path })
    }

    /// Open a device node for reading and writing.
    pub fn open(path: impl AsRef<Path>) -> Result<SerialStream> {
        Self::new(path)?.connect()
    }

    /// Open the validated node.
    pub fn connect(&self) -> Result<SerialStream> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&self.path)
            .map_err(|e| TransportError::Open {
                path: self.path.clone(),
                source: e,
            })?;
        info!(path = ?self.path, "opened serial device");
        Ok(SerialStream::from_file(file))
    }

    /// Whether the node is still present. A vanished node means the device was removed.
    pub fn is_present(&self) -> bool {
        let present = self.path.exists();
        if !present {
            debug!(path = ?self.path, "device node disappeared");
        }
        present
    }

    /// The device path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::Transport;

    #[test]
    fn opens_character_device() {
        let mut stream = DeviceNode::open("/dev/null").unwrap();
        stream.send_bytes(b"discarded").unwrap();
        assert_eq!(stream.transport_name(), "device");
    }

    #[test]
    fn rejects_regular_file() {
        let dir = std::env::temp_dir().join(format!("serialpkt-dev-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("plain.txt");
        std::fs::write(&path, b"not a tty").unwrap();

        let result = DeviceNode::new(&path);
        assert!(matches!(result, Err(TransportError::NotADevice { .. })));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn missing_path_is_open_error() {
        let result = DeviceNode::open("/dev/serialpkt-definitely-missing");
        assert!(matches!(result, Err(TransportError::Open { .. })));
    }

    #[test]
    fn presence_tracks_path() {
        let node = DeviceNode::new("/dev/null").unwrap();
        assert!(node.is_present());
        assert_eq!(node.path(), Path::new("/dev/null"));
    }
}

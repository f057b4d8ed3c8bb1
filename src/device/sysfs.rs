use log::debug;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::PathBuf;

use super::ControlSurface;
use crate::error::{HwDecError, Result};

/// Control surface backed by sysfs attribute files under a root directory.
#[derive(Debug, Clone)]
pub struct SysfsControl {
    root: PathBuf,
}

impl SysfsControl {
    /// Surfaces under `root`, normally `/sys/class`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl ControlSurface for SysfsControl {
    fn read(&self, key: &str) -> Result<String> {
        Ok(fs::read_to_string(self.root.join(key))?)
    }

    fn write(&self, key: &str, value: &str) -> Result<()> {
        let path = self.root.join(key);
        // attributes exist or the driver is absent; never create them
        let mut file = OpenOptions::new().write(true).truncate(true).open(&path)?;
        file.write_all(value.as_bytes())?;
        debug!("{} <- {}", path.display(), value);
        Ok(())
    }
}

/// In-memory control surface that records every write.
#[derive(Debug, Default)]
pub struct MemoryControl {
    values: Mutex<HashMap<String, String>>,
    writes: Mutex<Vec<(String, String)>>,
}

impl MemoryControl {
    /// An empty surface.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds `key` without recording a write.
    pub fn with_value(self, key: &str, value: &str) -> Self {
        self.set_value(key, value);
        self
    }

    /// Changes `key` without recording a write, as the driver would.
    pub fn set_value(&self, key: &str, value: &str) {
        self.values.lock().insert(key.to_string(), value.to_string());
    }

    /// Current value of `key`.
    pub fn value(&self, key: &str) -> Option<String> {
        self.values.lock().get(key).cloned()
    }

    /// Every write so far, in order.
    pub fn writes(&self) -> Vec<(String, String)> {
        self.writes.lock().clone()
    }

    /// Values written to `key`, in order.
    pub fn writes_to(&self, key: &str) -> Vec<String> {
        self.writes
            .lock()
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
            .collect()
    }
}

impl ControlSurface for MemoryControl {
    fn read(&self, key: &str) -> Result<String> {
        self.value(key).ok_or_else(|| {
            HwDecError::Io(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no control surface {}", key),
            ))
        })
    }

    fn write(&self, key: &str, value: &str) -> Result<()> {
        self.set_value(key, value);
        self.writes.lock().push((key.to_string(), value.to_string()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::paths;

    #[test]
    fn sysfs_reads_and_writes_existing_attributes() {
        let root = std::env::temp_dir().join(format!("hwvdec-sysfs-{}", std::process::id()));
        fs::create_dir_all(root.join("video")).unwrap();
        fs::write(root.join(paths::BLACKOUT_POLICY), "1\n").unwrap();

        let control = SysfsControl::new(&root);
        assert_eq!(control.get_int(paths::BLACKOUT_POLICY).unwrap(), 1);
        control.set_int(paths::BLACKOUT_POLICY, 0).unwrap();
        assert_eq!(fs::read_to_string(root.join(paths::BLACKOUT_POLICY)).unwrap(), "0");

        // missing attributes are errors, not new files
        assert!(control.set_int(paths::ZOOM, 100).is_err());
        assert!(!root.join(paths::ZOOM).exists());

        fs::remove_dir_all(&root).unwrap();
    }

    #[test]
    fn memory_control_records_writes() {
        let control = MemoryControl::new().with_value(paths::PTS_VIDEO, "0x0");
        assert!(control.writes().is_empty());
        control.set_int(paths::ZOOM, 150).unwrap();
        control.set_str(paths::AXIS, "0 0 1919 1079").unwrap();
        assert_eq!(control.writes_to(paths::ZOOM), vec!["150".to_string()]);
        assert_eq!(control.read(paths::AXIS).unwrap(), "0 0 1919 1079");
        assert!(control.get_int(paths::CONTRAST).is_err());
    }
}

//! Flags and tags kept in non-volatile memory across resets

use log::debug;

use super::NonVolatileMemory;

/// Written at offset 0 to request a calibration run after the next reset
const CALIBRATION_DUE: &[u8] = b"CALIBRATE_ME";

/// Bytes overwritten by [`PersistentMarkers::clear`]
const MARKER_AREA: usize = 32;

/// Hardware revision assumed when the version bytes were never programmed
pub const DEFAULT_HARDWARE_VERSION: (u8, u8, u8) = (6, 1, 0);

pub struct PersistentMarkers<N> {
    nvm: N,
}

impl<N: NonVolatileMemory> PersistentMarkers<N> {
    pub fn new(nvm: N) -> Self {
        Self { nvm }
    }

    pub fn set_calibration_due(&self) {
        debug!("Marking calibration due");
        self.nvm.write(0, CALIBRATION_DUE);
    }

    pub fn calibration_due(&self) -> bool {
        let mut buf = [0u8; CALIBRATION_DUE.len()];
        self.nvm.read(0, &mut buf);
        buf == CALIBRATION_DUE
    }

    /// Erase the marker area back to the flash idle state
    pub fn clear(&self) {
        let len = MARKER_AREA.min(self.nvm.len());
        self.nvm.write(0, &vec![0xff; len]);
    }

    /// Revision tag stored in the last three bytes
    pub fn hardware_version(&self) -> (u8, u8, u8) {
        let mut buf = [0u8; 3];
        let Some(offset) = self.nvm.len().checked_sub(3) else {
            return DEFAULT_HARDWARE_VERSION;
        };
        self.nvm.read(offset, &mut buf);
        match buf {
            [0xff, 0xff, 0xff] => DEFAULT_HARDWARE_VERSION,
            [major, minor, patch] => (major, minor, patch),
        }
    }

    pub fn set_hardware_version(&self, version: (u8, u8, u8)) {
        if let Some(offset) = self.nvm.len().checked_sub(3) {
            self.nvm.write(offset, &[version.0, version.1, version.2]);
        }
    }

    pub fn nvm(&self) -> &N {
        &self.nvm
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::mock::MockNvm;

    #[test]
    fn test_calibration_due_survives_until_cleared() {
        let markers = PersistentMarkers::new(MockNvm::new(256));
        assert!(!markers.calibration_due());

        markers.set_calibration_due();
        assert!(markers.calibration_due());

        markers.clear();
        assert!(!markers.calibration_due());
    }

    #[test]
    fn test_unprogrammed_hardware_version_uses_default() {
        let markers = PersistentMarkers::new(MockNvm::new(256));
        assert_eq!(markers.hardware_version(), DEFAULT_HARDWARE_VERSION);

        markers.set_hardware_version((7, 0, 2));
        assert_eq!(markers.hardware_version(), (7, 0, 2));
    }

    #[test]
    fn test_clear_leaves_version_tag_alone() {
        let markers = PersistentMarkers::new(MockNvm::new(256));
        markers.set_hardware_version((6, 2, 0));
        markers.set_calibration_due();
        markers.clear();
        assert_eq!(markers.hardware_version(), (6, 2, 0));
    }
}

use fxhash::FxHashMap;
use ndarray::{Array1, ArrayView1};
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::error::CalibrationError;

/// Conversion from raw ADC codes to volts for a unit under test.
///
/// Channel numbers are 1-based.
pub trait Calibration: Send + Sync {
    fn code_to_volts(
        &self,
        ch: usize,
        codes: ArrayView1<f64>,
    ) -> Result<Array1<f64>, CalibrationError>;
}

/// Linear gain and offset for one channel: `volts = code * eslo + eoff`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LinearGain {
    pub eslo: f64,
    pub eoff: f64,
}

/// A per-channel linear calibration table.
///
/// Stored as YAML, keyed by 1-based channel number:
///
/// ```yml
/// channels:
///   1: { eslo: 3.0517578125e-4, eoff: 0.0 }
///   2: { eslo: 3.0517578125e-4, eoff: -0.0012 }
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChannelCalibration {
    channels: FxHashMap<usize, LinearGain>,
}

impl ChannelCalibration {
    /// Give every channel in `1..=nchan` the same gain. Used for bipolar ADCs of a known range
    pub fn uniform(nchan: usize, gain: LinearGain) -> Self {
        let mut cal = Self::default();
        for ch in 1..=nchan {
            cal.channels.insert(ch, gain);
        }
        cal
    }

    pub fn read_calibration_file(path: &Path) -> Result<Self, CalibrationError> {
        if !path.exists() {
            return Err(CalibrationError::BadFilePath(path.to_path_buf()));
        }
        let yaml_str = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str::<Self>(&yaml_str)?)
    }

    pub fn set_gain(&mut self, ch: usize, gain: LinearGain) {
        self.channels.insert(ch, gain);
    }

    pub fn get_gain(&self, ch: usize) -> Option<&LinearGain> {
        self.channels.get(&ch)
    }
}

impl Calibration for ChannelCalibration {
    fn code_to_volts(
        &self,
        ch: usize,
        codes: ArrayView1<f64>,
    ) -> Result<Array1<f64>, CalibrationError> {
        let gain = self
            .channels
            .get(&ch)
            .ok_or(CalibrationError::MissingChannel(ch))?;
        Ok(codes.mapv(|code| code * gain.eslo + gain.eoff))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_linear_conversion() {
        let mut cal = ChannelCalibration::default();
        cal.set_gain(
            3,
            LinearGain {
                eslo: 0.5,
                eoff: 1.0,
            },
        );
        let codes = array![0.0, 2.0, -4.0];
        let volts = cal.code_to_volts(3, codes.view()).unwrap();
        assert_eq!(volts, array![1.0, 2.0, -1.0]);
    }

    #[test]
    fn test_missing_channel() {
        let cal = ChannelCalibration::uniform(
            2,
            LinearGain {
                eslo: 1.0,
                eoff: 0.0,
            },
        );
        let codes = array![1.0];
        match cal.code_to_volts(5, codes.view()) {
            Err(CalibrationError::MissingChannel(5)) => (),
            _ => panic!(),
        }
    }

    #[test]
    fn test_read_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cal.yml");
        std::fs::write(
            &path,
            "channels:\n  1: { eslo: 2.0, eoff: 0.0 }\n  2: { eslo: 1.0, eoff: -1.0 }\n",
        )
        .unwrap();
        let cal = ChannelCalibration::read_calibration_file(&path).unwrap();
        assert_eq!(
            cal.get_gain(2),
            Some(&LinearGain {
                eslo: 1.0,
                eoff: -1.0
            })
        );
    }
}

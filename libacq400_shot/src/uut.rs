use ndarray::Array2;

use super::calibration::Calibration;
use super::error::UutError;
use super::status_monitor::StatusMonitor;

/// Handle to one unit under test.
///
/// Implementations wrap whatever remote control the hardware offers. Setting writes
/// (`set_arm`, `soft_trigger`, `reset_shot`) are fire-and-forget from the controller's
/// point of view; state changes are observed through the status monitor.
pub trait Uut: Send + Sync {
    /// The UUT name, typically its hostname
    fn name(&self) -> &str;

    /// Request the UUT to arm for the next shot
    fn set_arm(&self) -> Result<(), UutError>;

    /// Issue a software trigger
    fn soft_trigger(&self) -> Result<(), UutError>;

    /// Read back the shot sequence counter
    fn shot(&self) -> Result<u64, UutError>;

    /// Reset the shot sequence counter to 0
    fn reset_shot(&self) -> Result<(), UutError>;

    fn statmon(&self) -> &StatusMonitor;

    /// Captured data from the last shot, indexed `[channel][sample]`
    fn read_channels(&self) -> Result<Array2<i32>, UutError>;

    /// Code to volts conversion for this UUT, if one is known
    fn calibration(&self) -> Option<&dyn Calibration> {
        None
    }
}

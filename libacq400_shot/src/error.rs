use std::path::PathBuf;
use thiserror::Error;

use super::shot_status::ShotStatus;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectorError {
    #[error("Channel selector is empty")]
    Empty,
    #[error("Channel selector has an invalid channel number: {0}")]
    BadNumber(String),
    #[error("Channel {0} is outside the valid range 1..={1}")]
    OutOfRange(usize, usize),
    #[error("Channel range {0}:{1} is reversed")]
    ReversedRange(usize, usize),
}

#[derive(Debug, Error)]
pub enum HandlerConfigError {
    #[error("Handler directive {0:?} is missing the '=' separating selector and tag")]
    MissingSeparator(String),
    #[error("Handler directive {0:?} has an empty tag")]
    EmptyTag(String),
    #[error("Handler directive has a bad channel selector: {0}")]
    BadSelector(#[from] SelectorError),
    #[error("Handler {tag} was given an invalid argument {arg:?}")]
    BadArgument { tag: String, arg: String },
    #[error("Handler {0} requires at least one argument")]
    MissingArgument(String),
    #[error("Could not load handler config as file {0:?} does not exist")]
    BadFilePath(PathBuf),
    #[error("Handler config failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum CalibrationError {
    #[error("No calibration available for channel {0}")]
    MissingChannel(usize),
    #[error("Could not load calibration as file {0:?} does not exist")]
    BadFilePath(PathBuf),
    #[error("Calibration failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Calibration failed to parse YAML: {0}")]
    ParsingError(#[from] serde_yaml::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("Handler for channel {0} has no data; buffer only holds {1} channels")]
    MissingChannel(usize, usize),
}

#[derive(Debug, Error)]
pub enum RawDataError {
    #[error("Could not load raw data as file {0:?} does not exist")]
    BadFilePath(PathBuf),
    #[error("Raw data failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Raw data of {0} bytes is not a whole number of {1} byte frames")]
    PartialFrame(usize, usize),
    #[error("Raw data requires at least one channel")]
    NoChannels,
}

#[derive(Debug, Error)]
pub enum OutputError {
    #[error("Output failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Output failed to write CSV: {0}")]
    CsvError(#[from] csv::Error),
}

#[derive(Debug, Clone, Error)]
pub enum UutError {
    #[error("UUT {uut} rejected command {command}: {reason}")]
    CommandFailed {
        uut: String,
        command: String,
        reason: String,
    },
    #[error("UUT {0} has no data available")]
    NoData(String),
}

#[derive(Debug, Error)]
pub enum DataHandlerError {
    #[error("Data handler failed due to UUT error: {0}")]
    UutError(#[from] UutError),
    #[error("Data handler failed due to decode error: {0}")]
    DecodeError(#[from] DecodeError),
    #[error("Data handler failed due to output error: {0}")]
    OutputError(#[from] OutputError),
}

#[derive(Debug, Error)]
pub enum ShotError {
    #[error("Timed out waiting for UUTs to arm; still pending: {pending:?}")]
    ArmTimeout { pending: Vec<String> },
    #[error("Timed out waiting for UUTs to stop; still pending: {pending:?}")]
    StopTimeout { pending: Vec<String> },
    #[error("No {0} waiters outstanding; call prep_shot first")]
    NotPrepared(String),
    #[error("Shot was cancelled before UUT {0} reported")]
    Cancelled(String),
    #[error("A shot worker for UUT {0} panicked")]
    WorkerPanicked(String),
    #[error("Shot failed due to UUT error: {0}")]
    UutError(#[from] UutError),
    #[error("Shot failed due to data handler error: {0}")]
    DataHandlerError(#[from] DataHandlerError),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration as file {0:?} does not exist")]
    BadFilePath(PathBuf),
    #[error("Config failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Config failed to parse YAML: {0}")]
    ParsingError(#[from] serde_yaml::Error),
    #[error("Config has an invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
    #[error("Config has no {0} set")]
    MissingPath(String),
}

#[derive(Debug, Error)]
pub enum ProcessorError {
    #[error("Processor failed due to Config error: {0}")]
    ConfigError(#[from] ConfigError),
    #[error("Processor failed due to handler config error: {0}")]
    HandlerConfigError(#[from] HandlerConfigError),
    #[error("Processor failed due to calibration error: {0}")]
    CalibrationError(#[from] CalibrationError),
    #[error("Processor failed due to raw data error: {0}")]
    RawDataError(#[from] RawDataError),
    #[error("Processor failed due to decode error: {0}")]
    DecodeError(#[from] DecodeError),
    #[error("Processor failed due to output error: {0}")]
    OutputError(#[from] OutputError),
    #[error("Processor failed due to shot error: {0}")]
    ShotError(#[from] ShotError),
    #[error("Processor failed due to Send error: {0}")]
    SendError(#[from] std::sync::mpsc::SendError<ShotStatus>),
    #[error("Processor failed due to IO error: {0}")]
    IoError(#[from] std::io::Error),
}

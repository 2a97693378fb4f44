use std::path::{Path, PathBuf};

use super::error::DataHandlerError;
use super::handler::{DecodedChannel, HandlerContext, Window, WordSize};
use super::output::write_csv_file;
use super::registry::HandlerRegistry;
use super::uut::Uut;

/// Called once per UUT after every completed shot
pub trait ShotDataHandler {
    fn handle_data(&mut self, uut: &dyn Uut, shot: u64) -> Result<(), DataHandlerError>;
}

/// Reads the captured channels of each UUT, runs them through a handler registry and
/// writes the result as `<output>/<uut>/shot_<shot>.csv`
#[derive(Debug)]
pub struct ChannelDataWriter {
    registry: HandlerRegistry,
    window: Window,
    word_size: WordSize,
    output_path: PathBuf,
}

impl ChannelDataWriter {
    pub fn new(
        registry: HandlerRegistry,
        window: Window,
        word_size: WordSize,
        output_path: &Path,
    ) -> Self {
        Self {
            registry,
            window,
            word_size,
            output_path: output_path.to_path_buf(),
        }
    }

    pub fn shot_file_path(&self, uut: &str, shot: u64) -> PathBuf {
        self.output_path
            .join(uut)
            .join(format!("shot_{shot:0>4}.csv"))
    }

    /// Decode one UUT's data without writing it anywhere
    pub fn decode(&self, uut: &dyn Uut) -> Result<Vec<DecodedChannel>, DataHandlerError> {
        let raw = uut.read_channels()?;
        let ctx = HandlerContext::new(self.word_size, uut.calibration());
        Ok(self.registry.apply(raw.view(), &self.window, &ctx)?)
    }
}

impl ShotDataHandler for ChannelDataWriter {
    fn handle_data(&mut self, uut: &dyn Uut, shot: u64) -> Result<(), DataHandlerError> {
        let decoded = self.decode(uut)?;
        write_csv_file(&self.shot_file_path(uut.name(), shot), &decoded)?;
        Ok(())
    }
}

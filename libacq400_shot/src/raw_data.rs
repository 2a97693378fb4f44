use byteorder::{ByteOrder, LittleEndian};
use ndarray::Array2;
use std::path::Path;

use super::error::RawDataError;
use super::handler::WordSize;

/// Unpack a flat little-endian capture into a `[channel][sample]` array.
///
/// ACQ400 raw data is sample-major: every sample carries one word for each channel, so the
/// byte stream is a sequence of `nchan * word_size` byte frames.
pub fn unpack_raw(
    bytes: &[u8],
    nchan: usize,
    word_size: WordSize,
) -> Result<Array2<i32>, RawDataError> {
    if nchan == 0 {
        return Err(RawDataError::NoChannels);
    }
    let frame_size = nchan * word_size.bytes();
    if bytes.len() % frame_size != 0 {
        return Err(RawDataError::PartialFrame(bytes.len(), frame_size));
    }
    let nsam = bytes.len() / frame_size;

    let words: Vec<i32> = match word_size {
        WordSize::Two => {
            let mut words = vec![0i16; bytes.len() / 2];
            LittleEndian::read_i16_into(bytes, &mut words);
            words.into_iter().map(i32::from).collect()
        }
        WordSize::Four => {
            let mut words = vec![0i32; bytes.len() / 4];
            LittleEndian::read_i32_into(bytes, &mut words);
            words
        }
    };

    Ok(Array2::from_shape_fn((nchan, nsam), |(ic, isam)| {
        words[isam * nchan + ic]
    }))
}

/// Read a raw capture file from disk
pub fn read_raw_file(
    path: &Path,
    nchan: usize,
    word_size: WordSize,
) -> Result<Array2<i32>, RawDataError> {
    if !path.exists() {
        return Err(RawDataError::BadFilePath(path.to_path_buf()));
    }
    let bytes = std::fs::read(path)?;
    log::info!(
        "Read {} of raw data from {}",
        human_bytes::human_bytes(bytes.len() as f64),
        path.to_string_lossy()
    );
    unpack_raw(&bytes, nchan, word_size)
}

use ndarray::{s, Array1, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};

use super::calibration::Calibration;
use super::constants::*;
use super::error::DecodeError;

/// Width in bytes of one raw sample
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "usize", into = "usize")]
pub enum WordSize {
    #[default]
    Two,
    Four,
}

impl WordSize {
    pub fn bytes(&self) -> usize {
        match self {
            Self::Two => 2,
            Self::Four => 4,
        }
    }
}

impl TryFrom<usize> for WordSize {
    type Error = String;
    fn try_from(value: usize) -> Result<Self, Self::Error> {
        match value {
            2 => Ok(Self::Two),
            4 => Ok(Self::Four),
            _ => Err(format!("word size must be 2 or 4 bytes, found {value}")),
        }
    }
}

impl From<WordSize> for usize {
    fn from(value: WordSize) -> Self {
        value.bytes()
    }
}

/// Sample range of interest, equivalent to `start:stop:stride`.
///
/// A `stop` of None runs to the end of the buffer. Out of range bounds are clamped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Window {
    pub start: usize,
    pub stop: Option<usize>,
    pub stride: usize,
}

impl Default for Window {
    fn default() -> Self {
        Self {
            start: 0,
            stop: None,
            stride: 1,
        }
    }
}

impl Window {
    pub fn new(start: usize, stop: Option<usize>, stride: usize) -> Self {
        Self {
            start,
            stop,
            stride: stride.max(1),
        }
    }

    /// Apply the window to one channel of samples
    pub fn apply<'a>(&self, samples: ArrayView1<'a, i32>) -> ArrayView1<'a, i32> {
        let len = samples.len();
        let stop = self.stop.unwrap_or(len).min(len);
        let start = self.start.min(stop);
        let stride = self.stride.max(1) as isize;
        samples.slice_move(s![start..stop;stride])
    }
}

/// Everything a handler needs from the capture besides the samples themselves
#[derive(Clone, Copy, Default)]
pub struct HandlerContext<'a> {
    pub word_size: WordSize,
    pub calibration: Option<&'a dyn Calibration>,
}

impl<'a> HandlerContext<'a> {
    pub fn new(word_size: WordSize, calibration: Option<&'a dyn Calibration>) -> Self {
        Self {
            word_size,
            calibration,
        }
    }
}

/// The output of one handler: a labelled series of values
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedChannel {
    pub ch: usize,
    pub label: String,
    pub values: Array1<f64>,
}

/// How a channel's raw samples become output values
#[derive(Debug, Clone, PartialEq)]
pub enum HandlerKind {
    /// Raw codes, unmodified
    Raw,
    /// Engineering units through the UUT calibration, falling back to raw codes
    Egu,
    /// Composite TAI vernier timestamp decoded to seconds
    TaiVernier {
        tick_period: f64,
        rollover_period: f64,
    },
    /// A single bit of a digital word, as 0 or 1
    Bits { bit: u32 },
}

/// Extracts and formats one output series from one channel of a capture.
///
/// Holds the 0-based channel index `ic`; the 1-based channel number is always `ic + 1`.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelHandler {
    ic: usize,
    kind: HandlerKind,
}

impl ChannelHandler {
    /// Create a handler for the 1-based channel `ch`
    pub fn new(ch: usize, kind: HandlerKind) -> Self {
        Self {
            ic: ch.saturating_sub(1),
            kind,
        }
    }

    pub fn raw(ch: usize) -> Self {
        Self::new(ch, HandlerKind::Raw)
    }

    pub fn egu(ch: usize) -> Self {
        Self::new(ch, HandlerKind::Egu)
    }

    pub fn tai_vernier(ch: usize, tick_period: f64, rollover_period: f64) -> Self {
        Self::new(
            ch,
            HandlerKind::TaiVernier {
                tick_period,
                rollover_period,
            },
        )
    }

    pub fn bits(ch: usize, bit: u32) -> Self {
        Self::new(ch, HandlerKind::Bits { bit })
    }

    pub fn ic(&self) -> usize {
        self.ic
    }

    pub fn ch(&self) -> usize {
        self.ic + 1
    }

    pub fn kind(&self) -> &HandlerKind {
        &self.kind
    }

    /// The display label of this handler when it produces its native output
    pub fn label(&self) -> String {
        match &self.kind {
            HandlerKind::Raw => format_label(RAW_LABEL, self.ch()),
            HandlerKind::Egu => format_label(EGU_LABEL, self.ch()),
            HandlerKind::TaiVernier { .. } => format_label(TAI_LABEL, self.ch()),
            HandlerKind::Bits { bit } => {
                format_label(BITS_LABEL, self.ch()).replacen("{}", &bit.to_string(), 1)
            }
        }
    }

    /// Decode this handler's channel from `raw_channels`, indexed `[channel][sample]`
    pub fn decode(
        &self,
        raw_channels: ArrayView2<i32>,
        window: &Window,
        ctx: &HandlerContext,
    ) -> Result<DecodedChannel, DecodeError> {
        let nchan = raw_channels.nrows();
        if self.ic >= nchan {
            return Err(DecodeError::MissingChannel(self.ch(), nchan));
        }
        let samples = window.apply(raw_channels.row(self.ic));

        let (values, label) = match &self.kind {
            HandlerKind::Raw => self.decode_raw(samples),
            HandlerKind::Egu => self.decode_egu(samples, ctx),
            HandlerKind::TaiVernier {
                tick_period,
                rollover_period,
            } => (
                decode_tai_vernier(samples, *tick_period, *rollover_period),
                self.label(),
            ),
            HandlerKind::Bits { bit } => (
                samples.mapv(|v| (((v as u32) >> bit) & 1) as f64),
                self.label(),
            ),
        };

        Ok(DecodedChannel {
            ch: self.ch(),
            label,
            values,
        })
    }

    fn decode_raw(&self, samples: ArrayView1<i32>) -> (Array1<f64>, String) {
        (
            samples.mapv(|v| v as f64),
            format_label(RAW_LABEL, self.ch()),
        )
    }

    fn decode_egu(&self, samples: ArrayView1<i32>, ctx: &HandlerContext) -> (Array1<f64>, String) {
        let (raw, raw_label) = self.decode_raw(samples);
        let Some(calibration) = ctx.calibration else {
            log::debug!(
                "No calibration available for CH{}; falling back to raw codes",
                self.ch()
            );
            return (raw, raw_label);
        };

        let codes = match ctx.word_size {
            WordSize::Four => raw.mapv(|v| v / WORD4_CODE_SCALE),
            WordSize::Two => raw.clone(),
        };
        match calibration.code_to_volts(self.ch(), codes.view()) {
            Ok(volts) => (volts, format_label(EGU_LABEL, self.ch())),
            Err(e) => {
                log::debug!(
                    "EGU conversion failed for CH{}: {e}; falling back to raw codes",
                    self.ch()
                );
                (raw, raw_label)
            }
        }
    }
}

fn format_label(template: &str, ch: usize) -> String {
    template.replacen("{}", &ch.to_string(), 1)
}

/// Decode a TAI vernier timestamp channel to elapsed seconds.
///
/// Bits 28..=30 carry a rollover counter and bits 0..=27 a tick count. Single sample
/// glitches in either field are suppressed before the two are combined, and the rollover
/// counter is unwrapped so the result is monotonic across counter wrap.
pub fn decode_tai_vernier(
    samples: ArrayView1<i32>,
    tick_period: f64,
    rollover_period: f64,
) -> Array1<f64> {
    let fields: Vec<u32> = samples.iter().map(|v| *v as u32).collect();
    let mut rollover: Vec<u32> = fields
        .iter()
        .map(|f| (f & TAI_ROLLOVER_MASK) >> TAI_ROLLOVER_SHIFT)
        .collect();
    let mut ticks: Vec<f64> = fields
        .iter()
        .map(|f| (f & TAI_TICK_MASK) as f64 * tick_period)
        .collect();

    suppress_rollover_spikes(&mut rollover);
    suppress_tick_spikes(&mut ticks);
    let rollover = unwrap_rollover(&rollover);

    rollover
        .iter()
        .zip(ticks.iter())
        .map(|(r, t)| *r as f64 * rollover_period + t)
        .collect()
}

/// Replace any interior value whose two neighbours agree with each other but not with it
pub fn suppress_rollover_spikes(rollover: &mut [u32]) {
    if rollover.len() < 3 {
        return;
    }
    for idx in 1..rollover.len() - 1 {
        let (left, right) = (rollover[idx - 1], rollover[idx + 1]);
        if left == right && rollover[idx] != left {
            rollover[idx] = left;
        }
    }
}

/// Replace single sample dips and overshoots in a rising tick sequence with the mean of
/// the neighbours.
///
/// A dip is a value below its left neighbour where the right neighbour is above the left.
/// An overshoot is a value above its right neighbour where the right neighbour is above
/// the left.
pub fn suppress_tick_spikes(ticks: &mut [f64]) {
    if ticks.len() < 3 {
        return;
    }
    for idx in 1..ticks.len() - 1 {
        let (left, value, right) = (ticks[idx - 1], ticks[idx], ticks[idx + 1]);
        let dip = value < left && right > left;
        let overshoot = value > right && right > left;
        if dip || overshoot {
            ticks[idx] = (left + right) / 2.0;
        }
    }
}

/// Count a wrap only when the counter drops by more than half its range, as in 7 -> 0.
/// Smaller drops are glitches and leave no lasting offset.
fn unwrap_rollover(rollover: &[u32]) -> Vec<u64> {
    let mut wraps: u64 = 0;
    let mut unwrapped = Vec::with_capacity(rollover.len());
    for (idx, value) in rollover.iter().enumerate() {
        if idx > 0 && rollover[idx - 1].saturating_sub(*value) > TAI_ROLLOVER_MODULUS / 2 {
            wraps += 1;
        }
        unwrapped.push(wraps * TAI_ROLLOVER_MODULUS as u64 + *value as u64);
    }
    unwrapped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::{ChannelCalibration, LinearGain};
    use ndarray::{array, Array2};

    fn buffer() -> Array2<i32> {
        Array2::from_shape_fn((4, 10), |(c, s)| (c * 100 + s) as i32)
    }

    #[test]
    fn test_channel_numbering() {
        let handler = ChannelHandler::raw(3);
        assert_eq!(handler.ic(), 2);
        assert_eq!(handler.ch(), 3);
    }

    #[test]
    fn test_raw_returns_slice() {
        let raw = buffer();
        let handler = ChannelHandler::raw(2);
        let window = Window::new(2, Some(8), 2);
        let out = handler
            .decode(raw.view(), &window, &HandlerContext::default())
            .unwrap();
        assert_eq!(out.values, array![102.0, 104.0, 106.0]);
        assert_eq!(out.label, "CH2 bits");
        assert_eq!(out.ch, 2);
    }

    #[test]
    fn test_window_clamps() {
        let raw = buffer();
        let handler = ChannelHandler::raw(1);
        let window = Window::new(8, Some(100), 1);
        let out = handler
            .decode(raw.view(), &window, &HandlerContext::default())
            .unwrap();
        assert_eq!(out.values, array![8.0, 9.0]);

        let window = Window::new(20, None, 1);
        let out = handler
            .decode(raw.view(), &window, &HandlerContext::default())
            .unwrap();
        assert!(out.values.is_empty());
    }

    #[test]
    fn test_missing_channel() {
        let raw = buffer();
        let handler = ChannelHandler::raw(5);
        let result = handler.decode(raw.view(), &Window::default(), &HandlerContext::default());
        assert_eq!(result, Err(DecodeError::MissingChannel(5, 4)));
    }

    #[test]
    fn test_egu_converts() {
        let raw = array![[512, 1024], [256, -256]];
        let cal = ChannelCalibration::uniform(
            2,
            LinearGain {
                eslo: 0.5,
                eoff: 0.0,
            },
        );
        let handler = ChannelHandler::egu(2);

        let ctx = HandlerContext::new(WordSize::Two, Some(&cal));
        let out = handler.decode(raw.view(), &Window::default(), &ctx).unwrap();
        assert_eq!(out.values, array![128.0, -128.0]);
        assert_eq!(out.label, "CH2 V");

        let ctx = HandlerContext::new(WordSize::Four, Some(&cal));
        let out = handler.decode(raw.view(), &Window::default(), &ctx).unwrap();
        assert_eq!(out.values, array![0.5, -0.5]);
    }

    #[test]
    fn test_egu_falls_back_to_raw() {
        let raw = array![[10, 20]];
        let handler = ChannelHandler::egu(1);

        let out = handler
            .decode(raw.view(), &Window::default(), &HandlerContext::default())
            .unwrap();
        assert_eq!(out.values, array![10.0, 20.0]);
        assert_eq!(out.label, "CH1 bits");

        // Calibration exists but has nothing for this channel
        let cal = ChannelCalibration::default();
        let ctx = HandlerContext::new(WordSize::Two, Some(&cal));
        let out = handler.decode(raw.view(), &Window::default(), &ctx).unwrap();
        assert_eq!(out.values, array![10.0, 20.0]);
        assert_eq!(out.label, "CH1 bits");
    }

    #[test]
    fn test_bits() {
        let raw = array![[0b101, 0b010, -1]];
        let handler = ChannelHandler::bits(1, 1);
        let out = handler
            .decode(raw.view(), &Window::default(), &HandlerContext::default())
            .unwrap();
        assert_eq!(out.values, array![0.0, 1.0, 1.0]);
        assert_eq!(out.label, "CH1.1");
    }

    #[test]
    fn test_rollover_spike_suppressed() {
        let mut rollover = vec![0, 0, 1, 0, 0];
        suppress_rollover_spikes(&mut rollover);
        assert_eq!(rollover, vec![0, 0, 0, 0, 0]);

        // A genuine step is left alone
        let mut rollover = vec![0, 0, 1, 1, 1];
        suppress_rollover_spikes(&mut rollover);
        assert_eq!(rollover, vec![0, 0, 1, 1, 1]);
    }

    #[test]
    fn test_tick_spikes_suppressed() {
        let mut ticks = vec![1.0, 2.0, 0.5, 4.0, 5.0];
        suppress_tick_spikes(&mut ticks);
        assert_eq!(ticks, vec![1.0, 2.0, 3.0, 4.0, 5.0]);

        let mut ticks = vec![1.0, 9.0, 3.0, 4.0];
        suppress_tick_spikes(&mut ticks);
        assert_eq!(ticks, vec![1.0, 2.0, 3.0, 4.0]);

        let mut ticks = vec![1.0, 2.0, 3.0, 4.0];
        suppress_tick_spikes(&mut ticks);
        assert_eq!(ticks, vec![1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_tai_vernier_decode() {
        let field = |roll: u32, tick: u32| ((roll << 28) | tick) as i32;
        let raw = array![[
            field(0, 100),
            field(0, 200),
            field(1, 300),
            field(0, 400),
            field(0, 500)
        ]];
        let handler = ChannelHandler::tai_vernier(1, 1.0, 1000.0);
        let out = handler
            .decode(raw.view(), &Window::default(), &HandlerContext::default())
            .unwrap();
        assert_eq!(out.values, array![100.0, 200.0, 300.0, 400.0, 500.0]);
        assert_eq!(out.label, "CH1 TAI");
    }

    #[test]
    fn test_tai_vernier_is_monotonic_over_wrap() {
        let field = |roll: u32, tick: u32| ((roll << 28) | tick) as i32;
        let raw = array![[field(6, 10), field(7, 10), field(0, 10), field(1, 10)]];
        let out = decode_tai_vernier(raw.row(0), 1.0, 100.0);
        assert_eq!(out, array![610.0, 710.0, 810.0, 910.0]);
    }

    #[test]
    fn test_rollover_glitch_leaves_no_offset() {
        let field = |roll: u32, tick: u32| ((roll << 28) | tick) as i32;
        let raw = array![[
            field(2, 10),
            field(2, 20),
            field(0, 30),
            field(0, 40),
            field(2, 50),
            field(2, 60)
        ]];
        let out = decode_tai_vernier(raw.row(0), 1.0, 100.0);
        assert_eq!(out[0], 210.0);
        assert_eq!(out[5], 260.0);
    }
}

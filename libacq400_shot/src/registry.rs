//! The channel handler registry.
//!
//! A handler config is plain text with one directive per line:
//!
//! ```text
//! # comment
//! 1:16=egu
//! 17,18=ch_raw
//! 32=tai,25
//! 31=bits,0,1,2
//! ```
//!
//! Lines shorter than two characters or starting with `#` are skipped. Each remaining line
//! is offered to the registered builders in order; the first to claim it appends one
//! handler per selected channel. Lines nobody claims are reported and skipped.
use ndarray::ArrayView2;
use std::path::Path;

use super::builder::{BitsBuilder, EguBuilder, HandlerBuilder, RawBuilder, TaiVernierBuilder};
use super::constants::{COMMENT_PREFIX, MIN_DIRECTIVE_LEN};
use super::error::{DecodeError, HandlerConfigError};
use super::handler::{ChannelHandler, DecodedChannel, HandlerContext, Window};

/// An ordered set of builders and the handlers they have built.
///
/// The registry is owned by the caller; independent configurations live in independent
/// registries.
pub struct HandlerRegistry {
    builders: Vec<Box<dyn HandlerBuilder>>,
    handlers: Vec<ChannelHandler>,
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(Box::new(RawBuilder));
        registry.register(Box::new(EguBuilder));
        registry.register(Box::new(TaiVernierBuilder));
        registry.register(Box::new(BitsBuilder));
        registry
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("n_builders", &self.builders.len())
            .field("handlers", &self.handlers)
            .finish()
    }
}

impl HandlerRegistry {
    /// A registry with no builders at all
    pub fn empty() -> Self {
        Self {
            builders: Vec::new(),
            handlers: Vec::new(),
        }
    }

    /// Add a builder. It is tried after every builder registered before it
    pub fn register(&mut self, builder: Box<dyn HandlerBuilder>) {
        self.builders.push(builder);
    }

    /// Build a registry with the default builders from a handler config file
    pub fn from_config_file(path: &Path, nchan: usize) -> Result<Self, HandlerConfigError> {
        if !path.exists() {
            return Err(HandlerConfigError::BadFilePath(path.to_path_buf()));
        }
        let contents = std::fs::read_to_string(path)?;
        let mut registry = Self::default();
        let n_claimed = registry.load_config(nchan, &contents);
        log::info!(
            "Loaded {} handlers from {} directives in {}",
            registry.handlers.len(),
            n_claimed,
            path.to_string_lossy()
        );
        Ok(registry)
    }

    /// Decode every line of a handler config. Returns the number of directives claimed
    pub fn load_config(&mut self, nchan: usize, contents: &str) -> usize {
        let mut n_claimed = 0;
        for (idx, line) in contents.lines().enumerate() {
            if self.decode_config(nchan, idx + 1, line.trim_end()) {
                n_claimed += 1;
            }
        }
        n_claimed
    }

    /// Offer one config line to the builders.
    ///
    /// Returns true if a builder claimed the line. Blank lines and comments are ignored
    /// and return false without a diagnostic.
    pub fn decode_config(&mut self, nchan: usize, line_number: usize, line: &str) -> bool {
        if line.len() < MIN_DIRECTIVE_LEN || line.starts_with(COMMENT_PREFIX) {
            return false;
        }

        for builder in self.builders.iter() {
            match builder.build(nchan, line, &mut self.handlers) {
                Ok(true) => return true,
                Ok(false) => continue,
                Err(e) => {
                    log::warn!("Handler config line {line_number} \"{line}\" rejected: {e}");
                    return false;
                }
            }
        }

        log::warn!("Handler config line {line_number} \"{line}\" not recognised, skipping");
        false
    }

    pub fn handlers(&self) -> &[ChannelHandler] {
        &self.handlers
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Run every handler, in order, over a `[channel][sample]` buffer.
    ///
    /// Handlers that could not produce their native output (EGU without a usable
    /// calibration) are reported in a single warning per call.
    pub fn apply(
        &self,
        raw_channels: ArrayView2<i32>,
        window: &Window,
        ctx: &HandlerContext,
    ) -> Result<Vec<DecodedChannel>, DecodeError> {
        let decoded = self
            .handlers
            .iter()
            .map(|handler| handler.decode(raw_channels, window, ctx))
            .collect::<Result<Vec<_>, _>>()?;
        let fallbacks = self.fallback_channels(&decoded);
        if !fallbacks.is_empty() {
            log::warn!(
                "No usable calibration for EGU channels {fallbacks:?}; written as raw codes"
            );
        }
        Ok(decoded)
    }

    /// Channels whose decoded label differs from the handler's native label
    fn fallback_channels(&self, decoded: &[DecodedChannel]) -> Vec<usize> {
        self.handlers
            .iter()
            .zip(decoded.iter())
            .filter(|(handler, out)| handler.label() != out.label)
            .map(|(handler, _)| handler.ch())
            .collect()
    }
}

use super::constants::{DEFAULT_ROLLOVER_PERIOD, DEFAULT_TICK_PERIOD};
use super::error::HandlerConfigError;
use super::handler::ChannelHandler;
use super::selector::defsplit;

const DIRECTIVE_SEPARATOR: char = '=';
const ARGUMENT_SEPARATOR: char = ',';
const NS_PER_S: f64 = 1e9;
const MAX_BIT: u32 = 31;

/// A handler directive split into its parts: `SELECTOR=TAG[,ARG...]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directive<'a> {
    pub selector: &'a str,
    pub tag: &'a str,
    pub args: Vec<&'a str>,
}

impl<'a> Directive<'a> {
    pub fn parse(defstr: &'a str) -> Result<Self, HandlerConfigError> {
        let (selector, rhs) = defstr
            .split_once(DIRECTIVE_SEPARATOR)
            .ok_or_else(|| HandlerConfigError::MissingSeparator(defstr.to_string()))?;
        let mut parts = rhs.split(ARGUMENT_SEPARATOR).map(|part| part.trim());
        let tag = parts.next().unwrap_or_default();
        if tag.is_empty() {
            return Err(HandlerConfigError::EmptyTag(defstr.to_string()));
        }
        Ok(Self {
            selector: selector.trim(),
            tag,
            args: parts.collect(),
        })
    }
}

/// A factory for channel handlers, tried against each config line in registration order.
///
/// `build` returns `Ok(false)` if the line is not for this builder. On `Ok(true)` the
/// builder has appended its handlers to `handlers`, in the channel order of the selector.
/// An `Err` means the builder recognised the tag but the line is malformed; in that case
/// nothing was appended.
pub trait HandlerBuilder: Send + Sync {
    fn build(
        &self,
        nchan: usize,
        defstr: &str,
        handlers: &mut Vec<ChannelHandler>,
    ) -> Result<bool, HandlerConfigError>;
}

/// Match `defstr` against a set of tag aliases, returning the parsed directive and the
/// selected channels when it matches
fn claim<'a>(
    tags: &[&str],
    nchan: usize,
    defstr: &'a str,
) -> Result<Option<(Directive<'a>, Vec<usize>)>, HandlerConfigError> {
    let directive = match Directive::parse(defstr) {
        Ok(d) => d,
        // Not a directive at all, so not ours either
        Err(_) => return Ok(None),
    };
    if !tags.contains(&directive.tag) {
        return Ok(None);
    }
    let channels = defsplit(directive.selector, nchan)?;
    Ok(Some((directive, channels)))
}

fn parse_arg<T: std::str::FromStr>(tag: &str, arg: &str) -> Result<T, HandlerConfigError> {
    arg.parse::<T>().map_err(|_| HandlerConfigError::BadArgument {
        tag: tag.to_string(),
        arg: arg.to_string(),
    })
}

/// `SEL=raw` or `SEL=ch_raw`
#[derive(Debug, Default)]
pub struct RawBuilder;

impl HandlerBuilder for RawBuilder {
    fn build(
        &self,
        nchan: usize,
        defstr: &str,
        handlers: &mut Vec<ChannelHandler>,
    ) -> Result<bool, HandlerConfigError> {
        let Some((_, channels)) = claim(&["raw", "ch_raw"], nchan, defstr)? else {
            return Ok(false);
        };
        handlers.extend(channels.into_iter().map(ChannelHandler::raw));
        Ok(true)
    }
}

/// `SEL=egu` or `SEL=ch_egu`
#[derive(Debug, Default)]
pub struct EguBuilder;

impl HandlerBuilder for EguBuilder {
    fn build(
        &self,
        nchan: usize,
        defstr: &str,
        handlers: &mut Vec<ChannelHandler>,
    ) -> Result<bool, HandlerConfigError> {
        let Some((_, channels)) = claim(&["egu", "ch_egu"], nchan, defstr)? else {
            return Ok(false);
        };
        handlers.extend(channels.into_iter().map(ChannelHandler::egu));
        Ok(true)
    }
}

/// `SEL=tai[,TICK_NS[,ROLLOVER_S]]`, also spelled `tai_vernier`
#[derive(Debug, Default)]
pub struct TaiVernierBuilder;

impl HandlerBuilder for TaiVernierBuilder {
    fn build(
        &self,
        nchan: usize,
        defstr: &str,
        handlers: &mut Vec<ChannelHandler>,
    ) -> Result<bool, HandlerConfigError> {
        let Some((directive, channels)) = claim(&["tai", "tai_vernier"], nchan, defstr)? else {
            return Ok(false);
        };
        let tick_period = match directive.args.first() {
            Some(arg) => parse_arg::<f64>(directive.tag, arg)? / NS_PER_S,
            None => DEFAULT_TICK_PERIOD,
        };
        let rollover_period = match directive.args.get(1) {
            Some(arg) => parse_arg::<f64>(directive.tag, arg)?,
            None => DEFAULT_ROLLOVER_PERIOD,
        };
        if tick_period <= 0.0 || rollover_period <= 0.0 {
            return Err(HandlerConfigError::BadArgument {
                tag: directive.tag.to_string(),
                arg: directive.args.join(","),
            });
        }
        handlers.extend(
            channels
                .into_iter()
                .map(|ch| ChannelHandler::tai_vernier(ch, tick_period, rollover_period)),
        );
        Ok(true)
    }
}

/// `SEL=bits,B[,B...]`: one handler per channel and bit
#[derive(Debug, Default)]
pub struct BitsBuilder;

impl HandlerBuilder for BitsBuilder {
    fn build(
        &self,
        nchan: usize,
        defstr: &str,
        handlers: &mut Vec<ChannelHandler>,
    ) -> Result<bool, HandlerConfigError> {
        let Some((directive, channels)) = claim(&["bits"], nchan, defstr)? else {
            return Ok(false);
        };
        if directive.args.is_empty() {
            return Err(HandlerConfigError::MissingArgument(directive.tag.to_string()));
        }
        let mut bits: Vec<u32> = Vec::with_capacity(directive.args.len());
        for arg in directive.args.iter() {
            let bit = parse_arg::<u32>(directive.tag, arg)?;
            if bit > MAX_BIT {
                return Err(HandlerConfigError::BadArgument {
                    tag: directive.tag.to_string(),
                    arg: arg.to_string(),
                });
            }
            bits.push(bit);
        }
        for ch in channels {
            handlers.extend(bits.iter().map(|bit| ChannelHandler::bits(ch, *bit)));
        }
        Ok(true)
    }
}

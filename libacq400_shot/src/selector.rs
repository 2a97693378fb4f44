//! Channel selector expressions.
//!
//! Selectors appear on the left hand side of a handler directive and resolve to an
//! ordered list of unique 1-based channel numbers:
//!
//! - `all` or `:` selects every channel `1..=nchan`
//! - `lo:hi` selects an inclusive range; an empty `lo` means 1, an empty `hi` means `nchan`
//! - `a,b,c` selects exactly the listed channels, in the order given
use super::error::SelectorError;

const ALL_KEYWORD: &str = "all";
const RANGE_SEPARATOR: char = ':';
const LIST_SEPARATOR: char = ',';

/// Resolve a selector expression against a buffer of `nchan` channels.
pub fn defsplit(selector: &str, nchan: usize) -> Result<Vec<usize>, SelectorError> {
    let selector = selector.trim();
    if selector.is_empty() {
        return Err(SelectorError::Empty);
    }

    if selector == ALL_KEYWORD {
        return Ok((1..=nchan).collect());
    }

    if let Some((lo, hi)) = selector.split_once(RANGE_SEPARATOR) {
        let lo = parse_bound(lo, 1)?;
        let hi = parse_bound(hi, nchan)?;
        check_range(lo, nchan)?;
        check_range(hi, nchan)?;
        if lo > hi {
            return Err(SelectorError::ReversedRange(lo, hi));
        }
        return Ok((lo..=hi).collect());
    }

    let mut channels: Vec<usize> = Vec::new();
    for entry in selector.split(LIST_SEPARATOR) {
        let ch = parse_channel(entry)?;
        check_range(ch, nchan)?;
        // Listed order wins; repeats are dropped
        if !channels.contains(&ch) {
            channels.push(ch);
        }
    }
    Ok(channels)
}

fn parse_bound(bound: &str, default: usize) -> Result<usize, SelectorError> {
    if bound.trim().is_empty() {
        Ok(default)
    } else {
        parse_channel(bound)
    }
}

fn parse_channel(entry: &str) -> Result<usize, SelectorError> {
    let entry = entry.trim();
    entry
        .parse::<usize>()
        .map_err(|_| SelectorError::BadNumber(entry.to_string()))
}

fn check_range(ch: usize, nchan: usize) -> Result<(), SelectorError> {
    if ch == 0 || ch > nchan {
        Err(SelectorError::OutOfRange(ch, nchan))
    } else {
        Ok(())
    }
}

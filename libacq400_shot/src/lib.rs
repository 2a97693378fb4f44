//! # acq400_shot
//!
//! acq400_shot is a toolkit for running synchronized shots across D-TACQ ACQ400-family
//! data acquisition units and decoding the data they capture, written in Rust. It has two
//! halves:
//!
//! - A shot controller which arms a set of units under test (UUTs), optionally issues a
//! soft trigger, and waits for every unit to report completion, with bounded waits and
//! errors that name the units that failed to respond.
//! - A channel handler registry which reads a small text config describing how each
//! channel of a capture should be decoded (raw codes, engineering units, TAI vernier
//! timestamps, individual bits) and applies it to captured data.
//!
//! ## Installation
//!
//! The only method of install is from source. To build and install the CLI use
//! `cargo install --path ./acq400_shot_cli` from the top level repository.
//!
//! ## Configuration
//!
//! The CLI is driven by a YAML configuration file. A template can be generated with
//! `acq400_shot_cli -p config.yml new`. The format is as follows:
//!
//! ```yml
//! nchan: 32
//! word_size: 2
//! handler_config_path: handlers.txt
//! calibration_path: null
//! raw_data_path: null
//! output_path: output
//! window:
//!   start: 0
//!   stop: null
//!   stride: 1
//! uuts:
//! - acq2106_001
//! soft_trigger: true
//! n_shots: 1
//! arm_timeout_secs: 10.0
//! shot_timeout_secs: 60.0
//! simulation:
//!   arm_delay_ms: 100
//!   run_time_ms: 500
//!   n_samples: 1000
//! ```
//!
//! - `word_size` is the width of one raw sample in bytes, 2 or 4.
//! - `window` selects the samples of interest, like a `start:stop:stride` slice.
//! - `calibration_path` is an optional YAML table of per-channel gains used by the `egu`
//! handler (see [`calibration::ChannelCalibration`]).
//!
//! ### Handler Config Format
//!
//! One directive per line, `SELECTOR=TAG[,ARG...]`. Lines starting with `#` and lines
//! shorter than two characters are ignored.
//!
//! ```text
//! 1:16=egu
//! 17,18=ch_raw
//! 31=bits,0,1
//! 32=tai,25
//! ```
//!
//! Selectors are `all` or `:` for every channel, `lo:hi` for an inclusive range (either
//! bound may be left empty), or a comma separated list. Supported tags are:
//!
//! - `raw` / `ch_raw`: raw codes, labelled `CH{n} bits`
//! - `egu` / `ch_egu`: volts through the UUT calibration, labelled `CH{n} V`; falls back
//! to raw codes with a warning if no calibration is available
//! - `tai` / `tai_vernier`: TAI vernier timestamp in seconds. Optional arguments are the
//! tick period in ns (default 25) and the rollover counter period in s (default 1)
//! - `bits`: one output per listed bit, 0 or 1, labelled `CH{n}.{bit}`
//!
//! Lines no handler recognises are reported in the log with their line number and skipped.
//!
//! ## Output
//!
//! Decoded data is written as CSV with one column per handler, headed by its label.
//! Offline decoding writes `<output_path>/<raw file stem>.csv`; shot runs write
//! `<output_path>/<uut>/shot_<n>.csv` for every UUT and shot.
pub mod builder;
pub mod calibration;
pub mod config;
pub mod constants;
pub mod data_handler;
pub mod error;
pub mod handler;
pub mod output;
pub mod process;
pub mod raw_data;
pub mod registry;
pub mod selector;
pub mod shot_control;
pub mod shot_status;
pub mod sim;
pub mod status_monitor;
pub mod uut;

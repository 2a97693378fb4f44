use clap::{Arg, Command};
use indicatif::{MultiProgress, ProgressBar};
use indicatif_log_bridge::LogWrapper;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::mpsc;

use libacq400_shot::config::Config;
use libacq400_shot::process::{process_decode, process_sim_shots};
use libacq400_shot::shot_status::ShotStatus;

fn make_template_config(path: &Path) -> Result<(), String> {
    let config = Config::default();
    let yaml_str = serde_yaml::to_string(&config).map_err(|e| e.to_string())?;
    let mut file = File::create(path).map_err(|e| e.to_string())?;
    file.write_all(yaml_str.as_bytes())
        .map_err(|e| e.to_string())
}

fn log_config(config: &Config) {
    log::info!("Channels: {} Word size: {}", config.nchan, config.word_size.bytes());
    log::info!(
        "Handler config: {}",
        config.handler_config_path.to_string_lossy()
    );
    match &config.calibration_path {
        Some(p) => log::info!("Calibration: {}", p.to_string_lossy()),
        None => log::info!("Calibration: None"),
    }
    log::info!("Output Path: {}", config.output_path.to_string_lossy());
    log::info!(
        "Window: start {} stop {:?} stride {}",
        config.window.start,
        config.window.stop,
        config.window.stride
    );
}

fn run_shots(config: Config, pb: &ProgressBar) {
    log::info!("UUTs: {}", config.uuts.join(", "));
    log::info!(
        "Shots: {} Soft trigger: {}",
        config.n_shots,
        config.soft_trigger
    );

    let (tx, rx) = mpsc::channel::<ShotStatus>();
    // Spawn the task!
    let handle = std::thread::spawn(move || process_sim_shots(config, tx));

    // The sender hangs up when the task ends, which ends this loop
    for status in rx.iter() {
        pb.set_position((status.progress * 100.0) as u64);
        pb.set_message(format!("shot {} {:?}", status.shot_index + 1, status.phase));
    }

    match handle.join() {
        Ok(result) => match result {
            Ok(reports) => {
                for report in reports.iter() {
                    log::info!("{} completed shot {}", report.uut, report.shot)
                }
                log::info!("Successfully ran shots!")
            }
            Err(e) => log::error!("Shot run failed with error: {e}"),
        },
        Err(_) => log::error!("Failed to join shot task!"),
    }
}

fn main() {
    // Create a cli
    let matches = Command::new("acq400_shot_cli")
        .arg_required_else_help(true)
        .subcommand(Command::new("new").about("Make a template configuration yaml file"))
        .subcommand(Command::new("decode").about("Decode the raw data file named in the config"))
        .subcommand(Command::new("shot").about("Run shots against simulated UUTs"))
        .arg(
            Arg::new("path")
                .short('p')
                .long("path")
                .required(true)
                .help("Path to the configuration file"),
        )
        .get_matches();

    // Initialize feedback
    let logger = simplelog::TermLogger::new(
        simplelog::LevelFilter::Info,
        simplelog::Config::default(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    );

    let pb_manager = MultiProgress::new();

    if let Err(e) = LogWrapper::new(pb_manager.clone(), logger).try_init() {
        eprintln!("Could not create logging/progress: {e}");
        return;
    }

    // Parse the cli
    let config_path = match matches.get_one::<String>("path") {
        Some(p) => PathBuf::from(p),
        None => {
            log::error!("A configuration path is required");
            return;
        }
    };

    if let Some(("new", _)) = matches.subcommand() {
        log::info!(
            "Making a template config at {}...",
            config_path.to_string_lossy()
        );
        match make_template_config(&config_path) {
            Ok(()) => log::info!("Done."),
            Err(e) => log::error!("Failed to write template config: {e}"),
        }
        return;
    }

    // Load our config
    log::info!("Loading config from {}...", config_path.to_string_lossy());
    let config = match Config::read_config_file(&config_path) {
        Ok(c) => c,
        Err(e) => {
            log::error!("{e}");
            return;
        }
    };
    log::info!("Config successfully loaded.");
    log_config(&config);

    match matches.subcommand() {
        Some(("decode", _)) => match process_decode(&config) {
            Ok(output) => log::info!("Decoded data written to {}", output.to_string_lossy()),
            Err(e) => log::error!("Decoding failed with error: {e}"),
        },
        Some(("shot", _)) => {
            // Setup the progress bar
            let pb = pb_manager.add(ProgressBar::new(100));
            run_shots(config, &pb);
            pb.finish();
        }
        _ => log::error!("No command given; use one of new, decode or shot"),
    }

    log::info!("Done.");
}

use std::path::PathBuf;
use std::sync::mpsc::Sender;
use std::sync::Arc;

use super::calibration::{Calibration, ChannelCalibration};
use super::config::Config;
use super::data_handler::ChannelDataWriter;
use super::error::ProcessorError;
use super::handler::HandlerContext;
use super::output::write_csv_file;
use super::raw_data::read_raw_file;
use super::registry::HandlerRegistry;
use super::shot_control::{ShotController, ShotReport};
use super::shot_status::{ShotPhase, ShotStatus};
use super::sim::{SimulatedUut, TriggerBus};
use super::uut::Uut;

/// Build the handler registry named by the config
pub fn load_registry(config: &Config) -> Result<HandlerRegistry, ProcessorError> {
    let registry = HandlerRegistry::from_config_file(&config.handler_config_path, config.nchan)?;
    if registry.is_empty() {
        log::warn!(
            "Handler config {} produced no handlers; output will be empty",
            config.handler_config_path.to_string_lossy()
        );
    }
    Ok(registry)
}

/// Load the calibration named by the config, if there is one
pub fn load_calibration(config: &Config) -> Result<Option<ChannelCalibration>, ProcessorError> {
    match &config.calibration_path {
        Some(path) => Ok(Some(ChannelCalibration::read_calibration_file(path)?)),
        None => Ok(None),
    }
}

/// Decode a raw capture file offline.
///
/// Returns the path of the CSV written.
pub fn process_decode(config: &Config) -> Result<PathBuf, ProcessorError> {
    config.validate()?;
    let registry = load_registry(config)?;
    let calibration = load_calibration(config)?;
    let raw = read_raw_file(config.get_raw_data_path()?, config.nchan, config.word_size)?;
    log::info!(
        "Decoding {} channels x {} samples with {} handlers",
        raw.nrows(),
        raw.ncols(),
        registry.len()
    );

    let ctx = HandlerContext::new(
        config.word_size,
        calibration.as_ref().map(|c| c as &dyn Calibration),
    );
    let decoded = registry.apply(raw.view(), &config.window, &ctx)?;

    let output = config.get_decode_file_name()?;
    write_csv_file(&output, &decoded)?;
    Ok(output)
}

/// Create one simulated UUT per configured name, all sharing one trigger line
pub fn create_sim_uuts(config: &Config) -> Result<Vec<Arc<dyn Uut>>, ProcessorError> {
    let bus = TriggerBus::new();
    let timing = config.sim_timing()?;
    let calibration = load_calibration(config)?;
    let mut uuts: Vec<Arc<dyn Uut>> = Vec::with_capacity(config.uuts.len());
    for name in config.uuts.iter() {
        let mut uut = SimulatedUut::new(name, config.nchan)
            .with_timing(timing)
            .with_samples(config.simulation.n_samples)
            .with_word_size(config.word_size);
        if config.soft_trigger {
            uut = uut.with_trigger_bus(bus.clone());
        }
        if let Some(cal) = &calibration {
            uut = uut.with_calibration(cal.clone());
        }
        uuts.push(Arc::new(uut));
    }
    Ok(uuts)
}

/// Run the configured number of shots against a set of UUTs.
///
/// If the output directory exists every shot's data is decoded and written there.
/// Progress is reported through `tx`.
pub fn process_shots(
    config: &Config,
    uuts: Vec<Arc<dyn Uut>>,
    tx: &Sender<ShotStatus>,
) -> Result<Vec<ShotReport>, ProcessorError> {
    config.validate_shots()?;

    let mut writer = if config.output_path.exists() {
        Some(ChannelDataWriter::new(
            load_registry(config)?,
            config.window,
            config.word_size,
            &config.output_path,
        ))
    } else {
        log::warn!(
            "Output directory {} does not exist; shot data will not be saved",
            config.output_path.to_string_lossy()
        );
        None
    };

    let mut controller = ShotController::new(uuts, config.shot_timeouts()?)?;
    let mut all_reports: Vec<ShotReport> = Vec::new();
    for shot_index in 0..config.n_shots {
        let progress = shot_index as f32 / config.n_shots as f32;
        tx.send(ShotStatus::new(progress, shot_index, ShotPhase::InProgress))?;
        log::info!("Starting shot {} of {}...", shot_index + 1, config.n_shots);

        let reports = match writer.as_mut() {
            Some(w) => controller.run_shot_with_handler(config.soft_trigger, w)?,
            None => controller.run_shot(config.soft_trigger)?,
        };
        all_reports.extend(reports);

        let progress = (shot_index + 1) as f32 / config.n_shots as f32;
        tx.send(ShotStatus::new(progress, shot_index, ShotPhase::Complete))?;
    }
    log::info!("Completed {} shots.", config.n_shots);
    Ok(all_reports)
}

/// Run the configured shots against simulated UUTs
pub fn process_sim_shots(
    config: Config,
    tx: Sender<ShotStatus>,
) -> Result<Vec<ShotReport>, ProcessorError> {
    config.validate_shots()?;
    let uuts = create_sim_uuts(&config)?;
    process_shots(&config, uuts, &tx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use byteorder::{ByteOrder, LittleEndian};
    use std::sync::mpsc;

    fn write_inputs(dir: &std::path::Path) -> Config {
        let handler_path = dir.join("handlers.txt");
        std::fs::write(&handler_path, "# test\n1=raw\n2=egu\n").unwrap();
        let cal_path = dir.join("cal.yml");
        std::fs::write(&cal_path, "channels:\n  2: { eslo: 0.5, eoff: 0.0 }\n").unwrap();
        let raw_path = dir.join("capture.dat");
        let words: [i16; 6] = [1, 10, 2, 20, 3, 30];
        let mut bytes = vec![0u8; 12];
        LittleEndian::write_i16_into(&words, &mut bytes);
        std::fs::write(&raw_path, bytes).unwrap();

        let mut config = Config::default();
        config.nchan = 2;
        config.handler_config_path = handler_path;
        config.calibration_path = Some(cal_path);
        config.raw_data_path = Some(raw_path);
        config.output_path = dir.to_path_buf();
        config
    }

    #[test]
    fn test_process_decode() {
        let dir = tempfile::tempdir().unwrap();
        let config = write_inputs(dir.path());
        let output = process_decode(&config).unwrap();
        assert_eq!(output, dir.path().join("capture.csv"));
        let text = std::fs::read_to_string(output).unwrap();
        assert_eq!(text, "CH1 bits,CH2 V\n1,5\n2,10\n3,15\n");
    }

    #[test]
    fn test_process_sim_shots() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = write_inputs(dir.path());
        config.uuts = vec![String::from("uut_a"), String::from("uut_b")];
        config.n_shots = 2;
        config.simulation.arm_delay_ms = 5;
        config.simulation.run_time_ms = 10;
        config.simulation.n_samples = 8;

        let (tx, rx) = mpsc::channel::<ShotStatus>();
        let reports = process_sim_shots(config, tx).unwrap();
        assert_eq!(reports.len(), 4);
        assert_eq!(reports[3].shot, 2);
        assert!(dir.path().join("uut_b").join("shot_0002.csv").exists());

        let statuses: Vec<ShotStatus> = rx.try_iter().collect();
        assert_eq!(statuses.len(), 4);
        assert_eq!(statuses[3].phase, ShotPhase::Complete);
        assert_eq!(statuses[3].progress, 1.0);
    }

    #[test]
    fn test_sim_shots_reject_bad_timeouts() {
        let dir = tempfile::tempdir().unwrap();
        for secs in [-1.0, f64::NAN, 1e30] {
            let mut config = write_inputs(dir.path());
            config.shot_timeout_secs = secs;
            let (tx, rx) = mpsc::channel::<ShotStatus>();
            assert!(matches!(
                process_sim_shots(config, tx),
                Err(ProcessorError::ConfigError(_))
            ));
            assert_eq!(rx.try_iter().count(), 0);
        }
    }
}

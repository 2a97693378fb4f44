/// Phase of the shot cycle a status message refers to
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ShotPhase {
    #[default]
    InProgress,
    Complete,
}

/// Progress message sent from a processing thread back to the UI
#[derive(Debug, Clone, Default)]
pub struct ShotStatus {
    pub progress: f32,
    pub shot_index: u64,
    pub phase: ShotPhase,
}

impl ShotStatus {
    pub fn new(progress: f32, shot_index: u64, phase: ShotPhase) -> Self {
        Self {
            progress,
            shot_index,
            phase,
        }
    }
}

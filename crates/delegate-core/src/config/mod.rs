mod settings;

pub use settings::{AutoPlanSettings, DaemonSettings, Settings, WatchSettings};

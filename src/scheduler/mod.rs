pub mod autodj;
pub mod clock;
pub mod queue;
pub mod scoring;

pub use autodj::{AutoDj, AutoDjEvent, AutoDjSettings, AutoDjSettingsPatch};
pub use clock::{Scheduler, SchedulerConfig};
pub use queue::{DedupPolicy, PlayQueue, QueueConfig, QueueEntry, QueueReason};
pub use scoring::PresetMode;

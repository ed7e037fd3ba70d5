pub mod job;
pub mod record;
pub mod section;
pub mod work_item;

pub use job::{ArtifactKind, ArtifactRef, FailureKind, JobState, ProcessingJob};
pub use record::{DutyRecord, RecordArtifact};
pub use section::{Section, SectionData, SectionOutcome};
pub use work_item::WorkItem;

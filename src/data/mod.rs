//! Data model shared by the coordinator, storage and the wire protocol

pub mod meeting;
mod record;
mod settings;

pub use meeting::{clean_title, detect_meeting, platform_for_url, MeetingInfo, Platform, TabContext};
pub use record::{RecordingMetadata, RecordingRecord};
pub use settings::{ApiCredentials, Settings};

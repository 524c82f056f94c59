pub mod download;
pub mod image;
pub mod scan;

pub use download::{DownloadOutcome, DownloadStatus};
pub use image::{CandidateSet, ImageCandidate, ResolutionResult};
pub use scan::{ScanEvent, ScanMode, ScanState};

pub mod cache;
pub mod config;
pub mod download;
pub mod resolve;
pub mod scan;

pub use cache::{PreviewCache, PreviewCacheConfig, PreviewService};
pub use config::{ConfigError, HarvestConfig};
pub use download::{DownloadConfig, ImageDownloader};
pub use resolve::UrlResolver;
pub use scan::{ChromeLauncher, ImageExtractor, ScanConfig, ScanOrchestrator, ScanReport};

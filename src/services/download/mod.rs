// 下载模块

pub mod error;
pub mod image_downloader;

pub use error::DownloadError;
pub use image_downloader::{DownloadConfig, ImageDownloader};

// 页面扫描模块
//
// - browser: 渲染页面能力（trait + headless_chrome 实现）
// - extractor: HTML → 图片地址
// - orchestrator: 滚动 + 收敛判断
// - error: 错误类型

pub mod browser;
pub mod error;
pub mod extractor;
pub mod orchestrator;

pub use browser::{BrowserLauncher, ChromeLauncher, ElementSnapshot, PageSession};
pub use error::{BrowserError, ScanError};
pub use extractor::ImageExtractor;
pub use orchestrator::{ScanConfig, ScanOrchestrator, ScanReport, ScanSession};

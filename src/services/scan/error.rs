// 扫描错误类型定义

use thiserror::Error;

/// 渲染页面能力（浏览器）层面的错误
#[derive(Debug, Error)]
pub enum BrowserError {
    /// 浏览器启动失败
    #[error("Failed to launch browser: {0}")]
    Launch(String),

    /// 页面导航超时
    #[error("Navigation timed out: {0}")]
    NavigationTimeout(String),

    /// 页面导航失败（非超时）
    #[error("Navigation failed: {0}")]
    Navigation(String),

    /// 脚本执行失败
    #[error("Script execution failed: {0}")]
    Script(String),

    /// 其他会话操作失败
    #[error("Browser session error: {0}")]
    Session(String),
}

impl BrowserError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, BrowserError::NavigationTimeout(_))
    }
}

/// 扫描错误
#[derive(Debug, Error)]
pub enum ScanError {
    /// 浏览器启动失败，扫描直接结束
    #[error("Browser launch failed: {0}")]
    BrowserLaunch(String),

    /// 导航失败（非超时，不重试）
    #[error("Navigation failed: {0}")]
    Navigation(String),

    /// 导航重试耗尽
    #[error("Navigation timed out after {attempts} attempts")]
    NavigationTimeout { attempts: u32 },

    /// 扫描过程中的浏览器错误
    #[error("Browser error: {0}")]
    Browser(#[from] BrowserError),

    /// 无效的目标地址
    #[error("Invalid target URL: {0}")]
    InvalidUrl(String),

    /// 扫描被取消
    #[error("Scan cancelled")]
    Cancelled,
}

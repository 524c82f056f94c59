// 渲染页面能力 - 浏览器会话抽象与 headless_chrome 实现
//
// 本模块提供：
// - BrowserLauncher / PageSession trait（编排器只依赖这两个 trait）
// - ElementSnapshot：DOM 元素属性快照
// - ChromeLauncher / ChromeSession：基于 headless_chrome 的实现
//
// 会话操作都是阻塞调用，调用方应在阻塞线程中使用（spawn_blocking）

use crate::services::scan::error::BrowserError;
use headless_chrome::{Browser, LaunchOptions, Tab};
use serde::Deserialize;
use std::collections::HashMap;
use std::ffi::OsStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// DOM 元素的属性快照
///
/// 除了 HTML 属性外，`img` 元素额外带有 `currentSrc`（浏览器实际选中的地址）
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct ElementSnapshot {
    attributes: HashMap<String, String>,
}

impl ElementSnapshot {
    pub fn new<I, K, V>(attributes: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            attributes: attributes
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// 读取属性值
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }
}

/// 启动浏览器会话
pub trait BrowserLauncher: Send + Sync {
    fn launch(&self) -> Result<Box<dyn PageSession>, BrowserError>;
}

/// 一个已打开的页面会话
///
/// 会话被 drop 时释放底层浏览器进程
pub trait PageSession: Send {
    /// 设置页面加载超时和隐式等待
    fn set_timeouts(&mut self, page_load: Duration, implicit_wait: Duration) -> Result<(), BrowserError>;

    /// 导航到指定地址；超时返回 `BrowserError::NavigationTimeout`
    fn navigate(&mut self, url: &str, timeout: Duration) -> Result<(), BrowserError>;

    /// 当前渲染后的 HTML
    fn page_source(&mut self) -> Result<String, BrowserError>;

    /// 执行脚本，返回 JSON 结果（无返回值时为 None）
    fn execute_script(&mut self, script: &str) -> Result<Option<serde_json::Value>, BrowserError>;

    /// 枚举指定标签的元素
    fn find_elements(&mut self, tag: &str) -> Result<Vec<ElementSnapshot>, BrowserError>;

    /// 关闭页面
    fn quit(&mut self) -> Result<(), BrowserError>;
}

/// headless_chrome 启动参数
#[derive(Debug, Clone)]
pub struct ChromeLauncher {
    pub headless: bool,
    pub window_size: (u32, u32),
    pub user_agent: Option<String>,
}

impl Default for ChromeLauncher {
    fn default() -> Self {
        Self {
            headless: true,
            window_size: (1920, 1080),
            user_agent: None,
        }
    }
}

impl ChromeLauncher {
    pub fn new(user_agent: impl Into<String>) -> Self {
        Self {
            user_agent: Some(user_agent.into()),
            ..Self::default()
        }
    }
}

impl BrowserLauncher for ChromeLauncher {
    fn launch(&self) -> Result<Box<dyn PageSession>, BrowserError> {
        let launch_options = LaunchOptions::default_builder()
            .headless(self.headless)
            .window_size(Some(self.window_size))
            .args(vec![OsStr::new("--disable-blink-features=AutomationControlled")])
            .build()
            .map_err(|e| BrowserError::Launch(e.to_string()))?;

        let browser = Browser::new(launch_options).map_err(|e| BrowserError::Launch(e.to_string()))?;
        let tab = browser.new_tab().map_err(|e| BrowserError::Launch(e.to_string()))?;

        if let Some(user_agent) = &self.user_agent {
            if let Err(e) = tab.set_user_agent(user_agent, None, None) {
                warn!("设置 User-Agent 失败: {}", e);
            }
        }

        info!("✓ 浏览器已启动 (headless={})", self.headless);

        Ok(Box::new(ChromeSession {
            _browser: browser,
            tab,
            implicit_wait: Duration::from_secs(10),
        }))
    }
}

/// headless_chrome 页面会话
pub struct ChromeSession {
    // 持有 Browser，drop 时结束浏览器进程
    _browser: Browser,
    tab: Arc<Tab>,
    implicit_wait: Duration,
}

/// 枚举元素属性的脚本，`{tag}` 为 JSON 字符串字面量
const ENUMERATE_SCRIPT: &str = r#"
(() => {
    const elements = Array.from(document.getElementsByTagName({tag}));
    return JSON.stringify(elements.map(el => {
        const attrs = {};
        for (const attr of Array.from(el.attributes)) {
            attrs[attr.name] = attr.value;
        }
        if (el.currentSrc) {
            attrs['currentSrc'] = el.currentSrc;
        }
        return attrs;
    }));
})()
"#;

/// headless_chrome 的等待超时错误文本："The event waited for never came"
fn is_timeout(error: &anyhow::Error) -> bool {
    let message = error.to_string().to_ascii_lowercase();
    message.contains("never came") || message.contains("timeout") || message.contains("timed out")
}

impl PageSession for ChromeSession {
    fn set_timeouts(&mut self, page_load: Duration, implicit_wait: Duration) -> Result<(), BrowserError> {
        debug!("页面超时: load={:?}, implicit={:?}", page_load, implicit_wait);
        self.implicit_wait = implicit_wait;
        self.tab.set_default_timeout(implicit_wait);
        Ok(())
    }

    fn navigate(&mut self, url: &str, timeout: Duration) -> Result<(), BrowserError> {
        self.tab.set_default_timeout(timeout);

        let result = self
            .tab
            .navigate_to(url)
            .and_then(|tab| tab.wait_until_navigated())
            .map(|_| ());

        self.tab.set_default_timeout(self.implicit_wait);

        result.map_err(|e| {
            if is_timeout(&e) {
                BrowserError::NavigationTimeout(format!("{}: {}", url, e))
            } else {
                BrowserError::Navigation(format!("{}: {}", url, e))
            }
        })
    }

    fn page_source(&mut self) -> Result<String, BrowserError> {
        self.tab
            .get_content()
            .map_err(|e| BrowserError::Session(e.to_string()))
    }

    fn execute_script(&mut self, script: &str) -> Result<Option<serde_json::Value>, BrowserError> {
        let result = self
            .tab
            .evaluate(script, false)
            .map_err(|e| BrowserError::Script(e.to_string()))?;
        Ok(result.value)
    }

    fn find_elements(&mut self, tag: &str) -> Result<Vec<ElementSnapshot>, BrowserError> {
        let tag_literal =
            serde_json::to_string(tag).map_err(|e| BrowserError::Script(e.to_string()))?;
        let script = ENUMERATE_SCRIPT.replace("{tag}", &tag_literal);

        let value = self.execute_script(&script)?;
        let json = match value {
            Some(serde_json::Value::String(json)) => json,
            Some(other) => {
                return Err(BrowserError::Script(format!("unexpected enumeration result: {}", other)))
            }
            None => return Ok(Vec::new()),
        };

        serde_json::from_str(&json).map_err(|e| BrowserError::Script(e.to_string()))
    }

    fn quit(&mut self) -> Result<(), BrowserError> {
        self.tab
            .close(false)
            .map(|_| ())
            .map_err(|e| BrowserError::Session(e.to_string()))
    }
}

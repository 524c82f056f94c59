// 扫描编排器 - 驱动页面滚动并判断动态页面何时停止产生新图片
//
// 状态流转：
// Initializing → (FastWait | ThoroughLoop) → Extracting → Done
// 任意非终止状态观察到取消 → Cancelled；Initializing / Extracting 出错 → Failed
//
// 整个扫描是阻塞的，只在迭代/步骤边界检查取消信号。
// 无论哪条路径退出，都会先 quit 再释放浏览器会话。

use crate::models::{CandidateSet, ScanEvent, ScanMode, ScanState};
use crate::services::scan::browser::{BrowserLauncher, PageSession};
use crate::services::scan::error::ScanError;
use crate::services::scan::extractor::ImageExtractor;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use url::Url;

const SCROLL_TO_BOTTOM: &str = "window.scrollTo(0, document.body.scrollHeight);";
const SCROLL_TO_MIDDLE: &str = "window.scrollTo(0, document.body.scrollHeight / 2);";
const SCROLL_TO_TOP: &str = "window.scrollTo(0, 0);";

/// 扫描配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScanConfig {
    pub mode: ScanMode,
    /// 每次稳定性检查前的等待
    pub stability_check_interval: Duration,
    /// 连续多少次读数不变视为收敛
    pub stability_threshold: usize,
    /// 快速模式中滚动步骤之间的等待
    pub scroll_delay: Duration,
    /// 快速模式导航后的固定等待
    pub fast_settle_delay: Duration,
    /// 导航总尝试次数（仅超时重试）
    pub navigation_retries: u32,
    pub navigation_retry_delay: Duration,
    pub page_load_timeout: Duration,
    pub implicit_wait: Duration,
    /// 彻底模式的迭代上限
    pub max_scan_iterations: usize,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            mode: ScanMode::Thorough,
            stability_check_interval: Duration::from_millis(1500),
            stability_threshold: 3,
            scroll_delay: Duration::from_millis(800),
            fast_settle_delay: Duration::from_secs(3),
            navigation_retries: 3,
            navigation_retry_delay: Duration::from_secs(2),
            page_load_timeout: Duration::from_secs(30),
            implicit_wait: Duration::from_secs(10),
            max_scan_iterations: 500,
        }
    }
}

/// 一次扫描的瞬时状态，只由编排器修改
#[derive(Debug)]
pub struct ScanSession {
    pub target: Url,
    pub mode: ScanMode,
    pub cancel: CancellationToken,
    pub images: CandidateSet,
    pub previous_count: usize,
    pub stable_iterations: usize,
    pub iterations: usize,
    pub state: ScanState,
}

impl ScanSession {
    pub fn new(target: Url, mode: ScanMode, cancel: CancellationToken) -> Self {
        Self {
            target,
            mode,
            cancel,
            images: CandidateSet::new(),
            previous_count: 0,
            stable_iterations: 0,
            iterations: 0,
            state: ScanState::Initializing,
        }
    }

    /// 记录一次读数，返回是否已收敛
    ///
    /// 数量增长开启新的平台期（本次读数算作平台期的第一次观察），
    /// 数量不变则平台期加一；平台期达到阈值即收敛
    pub fn observe(&mut self, threshold: usize) -> bool {
        let count = self.images.len();
        if count > self.previous_count {
            self.stable_iterations = 1;
        } else {
            self.stable_iterations += 1;
        }
        self.previous_count = count;
        self.stable_iterations >= threshold
    }

    fn ensure_active(&self) -> Result<(), ScanError> {
        if self.cancel.is_cancelled() {
            Err(ScanError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// 扫描结果
#[derive(Debug, Clone, Serialize)]
pub struct ScanReport {
    pub images: Vec<String>,
    /// 稳定性检查次数（快速模式为 0）
    pub iterations: usize,
    pub mode: ScanMode,
    pub elapsed: Duration,
}

/// 进度事件发送器（接收端关闭后静默丢弃）
struct EventSink(Option<UnboundedSender<ScanEvent>>);

impl EventSink {
    fn send(&self, event: ScanEvent) {
        if let Some(sender) = &self.0 {
            let _ = sender.send(event);
        }
    }

    fn state(&self, session: &mut ScanSession, state: ScanState) {
        debug!("扫描状态: {:?} -> {:?}", session.state, state);
        session.state = state;
        self.send(ScanEvent::State { state });
    }

    fn status(&self, message: impl Into<String>) {
        let message = message.into();
        info!("{}", message);
        self.send(ScanEvent::Status { message });
    }
}

/// 扫描编排器
#[derive(Clone)]
pub struct ScanOrchestrator {
    launcher: Arc<dyn BrowserLauncher>,
    config: ScanConfig,
}

impl ScanOrchestrator {
    pub fn new(launcher: Arc<dyn BrowserLauncher>, config: ScanConfig) -> Self {
        Self { launcher, config }
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// 同一个浏览器启动器，换一种扫描模式
    pub fn with_mode(&self, mode: ScanMode) -> Self {
        Self {
            launcher: self.launcher.clone(),
            config: ScanConfig {
                mode,
                ..self.config.clone()
            },
        }
    }

    /// 执行一次扫描（阻塞）
    ///
    /// # 参数
    /// - `url`: 目标页面
    /// - `cancel`: 取消信号，在迭代/步骤边界检查
    /// - `events`: 可选的进度事件通道
    pub fn run(
        &self,
        url: &str,
        cancel: &CancellationToken,
        events: Option<UnboundedSender<ScanEvent>>,
    ) -> Result<ScanReport, ScanError> {
        let started = Instant::now();
        let sink = EventSink(events);

        let target = Url::parse(url).map_err(|e| ScanError::InvalidUrl(format!("{}: {}", url, e)))?;
        let mut session = ScanSession::new(target, self.config.mode, cancel.clone());

        sink.state(&mut session, ScanState::Initializing);
        sink.status(format!("启动浏览器，准备扫描 {}", url));

        let mut page = match self.launcher.launch() {
            Ok(page) => page,
            Err(e) => {
                error!("浏览器启动失败: {}", e);
                sink.state(&mut session, ScanState::Failed);
                return Err(ScanError::BrowserLaunch(e.to_string()));
            }
        };

        let result = self.drive(page.as_mut(), &mut session, &sink);
        Self::teardown(page);

        match result {
            Ok(()) => {
                sink.state(&mut session, ScanState::Done);
                let image_count = session.images.len();
                sink.send(ScanEvent::Finished { image_count });
                info!(
                    "✓ 扫描完成: {} 张图片, {} 次检查, 耗时 {:?}",
                    image_count,
                    session.iterations,
                    started.elapsed()
                );

                Ok(ScanReport {
                    images: session
                        .images
                        .into_vec()
                        .into_iter()
                        .map(|c| c.into_string())
                        .collect(),
                    iterations: session.iterations,
                    mode: session.mode,
                    elapsed: started.elapsed(),
                })
            }
            Err(ScanError::Cancelled) => {
                sink.state(&mut session, ScanState::Cancelled);
                sink.status("扫描已取消");
                Err(ScanError::Cancelled)
            }
            Err(e) => {
                error!("扫描失败: {}", e);
                sink.state(&mut session, ScanState::Failed);
                Err(e)
            }
        }
    }

    fn drive(
        &self,
        page: &mut dyn PageSession,
        session: &mut ScanSession,
        sink: &EventSink,
    ) -> Result<(), ScanError> {
        page.set_timeouts(self.config.page_load_timeout, self.config.implicit_wait)?;
        self.navigate_with_retry(page, session, sink)?;
        session.ensure_active()?;

        match session.mode {
            ScanMode::Fast => {
                sink.state(session, ScanState::FastWait);
                self.fast_pass(page, session)?;
            }
            ScanMode::Thorough => {
                sink.state(session, ScanState::ThoroughLoop);
                self.thorough_loop(page, session, sink)?;
            }
        }

        session.ensure_active()?;
        sink.state(session, ScanState::Extracting);

        let html = page.page_source()?;
        let added = session
            .images
            .merge(ImageExtractor::extract(&html, &session.target));
        debug!("页面源码提取新增 {} 张图片", added);

        Ok(())
    }

    fn navigate_with_retry(
        &self,
        page: &mut dyn PageSession,
        session: &ScanSession,
        sink: &EventSink,
    ) -> Result<(), ScanError> {
        let attempts = self.config.navigation_retries.max(1);

        for attempt in 1..=attempts {
            session.ensure_active()?;

            match page.navigate(session.target.as_str(), self.config.page_load_timeout) {
                Ok(()) => {
                    sink.status(format!("页面已加载: {}", session.target));
                    return Ok(());
                }
                Err(e) if e.is_timeout() => {
                    warn!("导航超时 (第 {}/{} 次): {}", attempt, attempts, e);
                    if attempt < attempts {
                        sink.status(format!("页面加载超时，{} 秒后重试", self.config.navigation_retry_delay.as_secs()));
                        thread::sleep(self.config.navigation_retry_delay);
                    }
                }
                Err(e) => return Err(ScanError::Navigation(e.to_string())),
            }
        }

        Err(ScanError::NavigationTimeout { attempts })
    }

    fn fast_pass(&self, page: &mut dyn PageSession, session: &ScanSession) -> Result<(), ScanError> {
        thread::sleep(self.config.fast_settle_delay);

        let steps = [SCROLL_TO_BOTTOM, SCROLL_TO_MIDDLE, SCROLL_TO_TOP];
        for (index, script) in steps.iter().enumerate() {
            session.ensure_active()?;
            if index > 0 {
                thread::sleep(self.config.scroll_delay);
            }
            if let Err(e) = page.execute_script(script) {
                warn!("滚动失败: {}", e);
            }
        }

        Ok(())
    }

    fn thorough_loop(
        &self,
        page: &mut dyn PageSession,
        session: &mut ScanSession,
        sink: &EventSink,
    ) -> Result<(), ScanError> {
        loop {
            session.ensure_active()?;

            if session.iterations >= self.config.max_scan_iterations {
                warn!(
                    "达到最大迭代次数 {}，停止滚动 (当前 {} 张图片)",
                    self.config.max_scan_iterations,
                    session.images.len()
                );
                return Ok(());
            }

            if let Err(e) = page.execute_script(SCROLL_TO_BOTTOM) {
                warn!("滚动失败: {}", e);
            }
            thread::sleep(self.config.stability_check_interval);
            session.ensure_active()?;

            match page.find_elements("img") {
                Ok(elements) => {
                    for element in &elements {
                        session
                            .images
                            .extend(ImageExtractor::live_candidates(element, &session.target));
                    }
                }
                Err(e) => warn!("枚举图片元素失败: {}", e),
            }

            session.iterations += 1;
            let converged = session.observe(self.config.stability_threshold);

            debug!(
                "第 {} 次检查: {} 张图片, 稳定 {}/{}",
                session.iterations,
                session.images.len(),
                session.stable_iterations,
                self.config.stability_threshold
            );
            sink.send(ScanEvent::Check {
                iteration: session.iterations,
                image_count: session.images.len(),
                stable_iterations: session.stable_iterations,
            });

            if converged {
                sink.status(format!("图片数量已稳定: {} 张", session.images.len()));
                return Ok(());
            }
        }
    }

    /// quit 与释放互不影响：quit 失败只记录日志
    fn teardown(mut page: Box<dyn PageSession>) {
        if let Err(e) = page.quit() {
            warn!("关闭页面失败: {}", e);
        }
        drop(page);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::scan::browser::ElementSnapshot;
    use crate::services::scan::error::BrowserError;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// 可编排行为的假浏览器
    #[derive(Default)]
    struct Script {
        launch_fails: bool,
        navigations: VecDeque<Result<(), BrowserError>>,
        readings: VecDeque<Vec<ElementSnapshot>>,
        page_source: String,
        quit_fails: bool,
        cancel_after_checks: Option<(usize, CancellationToken)>,
        // 记录
        executed: Vec<String>,
        navigate_calls: usize,
        checks: usize,
        quit_called: bool,
        dropped: bool,
    }

    #[derive(Clone, Default)]
    struct FakeLauncher(Arc<Mutex<Script>>);

    impl FakeLauncher {
        fn with(script: Script) -> Self {
            Self(Arc::new(Mutex::new(script)))
        }

        fn script(&self) -> std::sync::MutexGuard<'_, Script> {
            self.0.lock().unwrap()
        }
    }

    impl BrowserLauncher for FakeLauncher {
        fn launch(&self) -> Result<Box<dyn PageSession>, BrowserError> {
            if self.script().launch_fails {
                return Err(BrowserError::Launch("chrome not found".to_string()));
            }
            Ok(Box::new(FakeSession(self.0.clone())))
        }
    }

    struct FakeSession(Arc<Mutex<Script>>);

    impl PageSession for FakeSession {
        fn set_timeouts(&mut self, _: Duration, _: Duration) -> Result<(), BrowserError> {
            Ok(())
        }

        fn navigate(&mut self, _url: &str, _timeout: Duration) -> Result<(), BrowserError> {
            let mut script = self.0.lock().unwrap();
            script.navigate_calls += 1;
            script.navigations.pop_front().unwrap_or(Ok(()))
        }

        fn page_source(&mut self) -> Result<String, BrowserError> {
            Ok(self.0.lock().unwrap().page_source.clone())
        }

        fn execute_script(&mut self, script: &str) -> Result<Option<serde_json::Value>, BrowserError> {
            self.0.lock().unwrap().executed.push(script.to_string());
            Ok(None)
        }

        fn find_elements(&mut self, _tag: &str) -> Result<Vec<ElementSnapshot>, BrowserError> {
            let mut script = self.0.lock().unwrap();
            script.checks += 1;
            if let Some((after, token)) = &script.cancel_after_checks {
                if script.checks >= *after {
                    token.cancel();
                }
            }
            let reading = script.readings.pop_front();
            Ok(reading.unwrap_or_else(|| script.readings.back().cloned().unwrap_or_default()))
        }

        fn quit(&mut self) -> Result<(), BrowserError> {
            let mut script = self.0.lock().unwrap();
            script.quit_called = true;
            if script.quit_fails {
                Err(BrowserError::Session("already closed".to_string()))
            } else {
                Ok(())
            }
        }
    }

    impl Drop for FakeSession {
        fn drop(&mut self) {
            if let Ok(mut script) = self.0.lock() {
                script.dropped = true;
            }
        }
    }

    fn images(names: &[&str]) -> Vec<ElementSnapshot> {
        names
            .iter()
            .map(|name| ElementSnapshot::new([("src", format!("/img/{}.jpg", name))]))
            .collect()
    }

    fn quick_config(mode: ScanMode) -> ScanConfig {
        ScanConfig {
            mode,
            stability_check_interval: Duration::ZERO,
            scroll_delay: Duration::ZERO,
            fast_settle_delay: Duration::ZERO,
            navigation_retry_delay: Duration::ZERO,
            ..ScanConfig::default()
        }
    }

    fn timeout() -> Result<(), BrowserError> {
        Err(BrowserError::NavigationTimeout("slow".to_string()))
    }

    #[test]
    fn test_convergence_after_plateau() {
        let launcher = FakeLauncher::with(Script {
            readings: VecDeque::from(vec![
                images(&["a", "b", "c"]),
                images(&["a", "b", "c"]),
                images(&["a", "b", "c", "d", "e"]),
                images(&["a", "b", "c", "d", "e"]),
                images(&["a", "b", "c", "d", "e"]),
                images(&["a", "b", "c", "d", "e", "f"]),
            ]),
            ..Script::default()
        });
        let orchestrator = ScanOrchestrator::new(Arc::new(launcher.clone()), quick_config(ScanMode::Thorough));

        let report = orchestrator
            .run("https://gallery.example.com/", &CancellationToken::new(), None)
            .unwrap();

        assert_eq!(report.iterations, 5);
        assert_eq!(report.images.len(), 5);
        assert_eq!(report.mode, ScanMode::Thorough);
        assert_eq!(launcher.script().checks, 5);
    }

    #[test]
    fn test_convergence_counting() {
        let target = Url::parse("https://a.com/").unwrap();
        let mut session = ScanSession::new(target.clone(), ScanMode::Thorough, CancellationToken::new());

        session.images.insert(crate::models::ImageCandidate::parse("https://a.com/1.jpg").unwrap());
        assert!(!session.observe(2));
        assert_eq!(session.stable_iterations, 1);
        assert!(session.observe(2));
    }

    #[test]
    fn test_fast_mode_scroll_sequence() {
        let launcher = FakeLauncher::with(Script {
            page_source: r#"<img src="/one.png"><img data-src="/two.png">"#.to_string(),
            ..Script::default()
        });
        let orchestrator = ScanOrchestrator::new(Arc::new(launcher.clone()), quick_config(ScanMode::Fast));

        let report = orchestrator
            .run("https://a.com/page", &CancellationToken::new(), None)
            .unwrap();

        assert_eq!(report.iterations, 0);
        assert_eq!(report.images, vec!["https://a.com/one.png", "https://a.com/two.png"]);

        let script = launcher.script();
        assert_eq!(script.executed, vec![SCROLL_TO_BOTTOM, SCROLL_TO_MIDDLE, SCROLL_TO_TOP]);
        assert_eq!(script.checks, 0);
        assert!(script.quit_called && script.dropped);
    }

    #[test]
    fn test_cancellation_stops_loop_and_tears_down() {
        let cancel = CancellationToken::new();
        let launcher = FakeLauncher::with(Script {
            readings: VecDeque::from(vec![images(&["a"]), images(&["a", "b"]), images(&["a", "b", "c"])]),
            cancel_after_checks: Some((2, cancel.clone())),
            ..Script::default()
        });
        let orchestrator = ScanOrchestrator::new(Arc::new(launcher.clone()), quick_config(ScanMode::Thorough));

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let result = orchestrator.run("https://a.com/", &cancel, Some(tx));

        assert!(matches!(result, Err(ScanError::Cancelled)));
        let script = launcher.script();
        assert_eq!(script.checks, 2);
        assert!(script.quit_called && script.dropped);
        drop(script);

        let mut last_state = None;
        while let Ok(event) = rx.try_recv() {
            if let ScanEvent::State { state } = event {
                last_state = Some(state);
            }
        }
        assert_eq!(last_state, Some(ScanState::Cancelled));
    }

    #[test]
    fn test_navigation_retry_then_success() {
        let launcher = FakeLauncher::with(Script {
            navigations: VecDeque::from(vec![timeout(), timeout(), Ok(())]),
            ..Script::default()
        });
        let orchestrator = ScanOrchestrator::new(Arc::new(launcher.clone()), quick_config(ScanMode::Fast));

        assert!(orchestrator.run("https://a.com/", &CancellationToken::new(), None).is_ok());
        assert_eq!(launcher.script().navigate_calls, 3);
    }

    #[test]
    fn test_navigation_retries_exhausted() {
        let launcher = FakeLauncher::with(Script {
            navigations: VecDeque::from(vec![timeout(), timeout(), timeout()]),
            quit_fails: true,
            ..Script::default()
        });
        let orchestrator = ScanOrchestrator::new(Arc::new(launcher.clone()), quick_config(ScanMode::Thorough));

        let result = orchestrator.run("https://a.com/", &CancellationToken::new(), None);

        assert!(matches!(result, Err(ScanError::NavigationTimeout { attempts: 3 })));
        let script = launcher.script();
        assert_eq!(script.navigate_calls, 3);
        // quit 失败也要释放会话
        assert!(script.quit_called && script.dropped);
    }

    #[test]
    fn test_non_timeout_navigation_error_not_retried() {
        let launcher = FakeLauncher::with(Script {
            navigations: VecDeque::from(vec![Err(BrowserError::Navigation("dns".to_string()))]),
            ..Script::default()
        });
        let orchestrator = ScanOrchestrator::new(Arc::new(launcher.clone()), quick_config(ScanMode::Fast));

        let result = orchestrator.run("https://a.com/", &CancellationToken::new(), None);

        assert!(matches!(result, Err(ScanError::Navigation(_))));
        assert_eq!(launcher.script().navigate_calls, 1);
    }

    #[test]
    fn test_launch_failure() {
        let launcher = FakeLauncher::with(Script {
            launch_fails: true,
            ..Script::default()
        });
        let orchestrator = ScanOrchestrator::new(Arc::new(launcher), quick_config(ScanMode::Fast));

        let result = orchestrator.run("https://a.com/", &CancellationToken::new(), None);
        assert!(matches!(result, Err(ScanError::BrowserLaunch(_))));
    }

    #[test]
    fn test_max_iterations_guard() {
        let launcher = FakeLauncher::with(Script::default());
        let config = ScanConfig {
            stability_threshold: 1000,
            max_scan_iterations: 4,
            ..quick_config(ScanMode::Thorough)
        };
        let orchestrator = ScanOrchestrator::new(Arc::new(launcher.clone()), config);

        let report = orchestrator
            .run("https://a.com/", &CancellationToken::new(), None)
            .unwrap();

        assert_eq!(report.iterations, 4);
        assert_eq!(launcher.script().checks, 4);
    }

    #[test]
    fn test_invalid_target_url() {
        let orchestrator = ScanOrchestrator::new(Arc::new(FakeLauncher::default()), ScanConfig::default());
        let result = orchestrator.run("not a url", &CancellationToken::new(), None);
        assert!(matches!(result, Err(ScanError::InvalidUrl(_))));
    }
}

// 扫描模式、状态机状态与进度事件

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 扫描模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ScanMode {
    /// 固定等待 + 一轮滚动
    Fast,
    /// 循环滚动，直到图片数量连续稳定
    #[default]
    Thorough,
}

impl ScanMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanMode::Fast => "fast",
            ScanMode::Thorough => "thorough",
        }
    }
}

impl FromStr for ScanMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fast" => Ok(ScanMode::Fast),
            "thorough" => Ok(ScanMode::Thorough),
            other => Err(format!("unknown scan mode: {}", other)),
        }
    }
}

impl fmt::Display for ScanMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 扫描状态机
///
/// Initializing → (FastWait | ThoroughLoop) → Extracting → Done，
/// 任意非终止状态都可能进入 Cancelled，Initializing/Extracting 出错进入 Failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanState {
    Initializing,
    FastWait,
    ThoroughLoop,
    Extracting,
    Done,
    Cancelled,
    Failed,
}

impl ScanState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ScanState::Done | ScanState::Cancelled | ScanState::Failed)
    }
}

/// 扫描线程发出的进度事件（通过 channel 传给展示层）
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScanEvent {
    /// 状态切换
    State { state: ScanState },
    /// 可读的状态文本
    Status { message: String },
    /// 稳定性检查结果
    Check {
        iteration: usize,
        image_count: usize,
        stable_iterations: usize,
    },
    /// 扫描结束
    Finished { image_count: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_mode_parse() {
        assert_eq!("fast".parse::<ScanMode>(), Ok(ScanMode::Fast));
        assert_eq!(" Thorough ".parse::<ScanMode>(), Ok(ScanMode::Thorough));
        assert!("slow".parse::<ScanMode>().is_err());
        assert_eq!(ScanMode::default(), ScanMode::Thorough);
    }

    #[test]
    fn test_terminal_states() {
        assert!(ScanState::Done.is_terminal());
        assert!(ScanState::Cancelled.is_terminal());
        assert!(ScanState::Failed.is_terminal());
        assert!(!ScanState::ThoroughLoop.is_terminal());
    }

    #[test]
    fn test_event_serialization() {
        let json = serde_json::to_value(ScanEvent::Check {
            iteration: 2,
            image_count: 7,
            stable_iterations: 1,
        })
        .unwrap();
        assert_eq!(json["type"], "check");
        assert_eq!(json["image_count"], 7);
    }
}

// 图片候选项与解析结果
//
// 扫描得到的图片 URL 统一以规范化后的绝对地址作为身份标识

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use url::Url;

/// 扫描发现的图片候选项
///
/// 身份 = 规范化的绝对 URL（去掉 fragment，仅允许 http/https）
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageCandidate(String);

impl ImageCandidate {
    /// 解析绝对 URL
    pub fn parse(raw: &str) -> Option<Self> {
        let url = Url::parse(raw.trim()).ok()?;
        Self::from_url(url)
    }

    /// 相对于页面地址解析（相对路径、协议相对地址都可以）
    pub fn resolve(base: &Url, raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() || is_inline_data(raw) {
            return None;
        }
        let url = base.join(raw).ok()?;
        Self::from_url(url)
    }

    fn from_url(mut url: Url) -> Option<Self> {
        if !matches!(url.scheme(), "http" | "https") {
            return None;
        }
        url.set_fragment(None);
        Some(Self(url.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for ImageCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// `data:` 内联图片不是可下载资源
pub fn is_inline_data(value: &str) -> bool {
    value
        .get(..5)
        .map(|prefix| prefix.eq_ignore_ascii_case("data:"))
        .unwrap_or(false)
}

/// 保持插入顺序的候选集合
#[derive(Debug, Clone, Default)]
pub struct CandidateSet {
    items: Vec<ImageCandidate>,
    seen: HashSet<ImageCandidate>,
}

impl CandidateSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// 插入候选项，已存在时返回 false
    pub fn insert(&mut self, candidate: ImageCandidate) -> bool {
        if self.seen.contains(&candidate) {
            return false;
        }
        self.seen.insert(candidate.clone());
        self.items.push(candidate);
        true
    }

    /// 合并另一个集合，返回新增数量
    pub fn merge(&mut self, other: CandidateSet) -> usize {
        other
            .items
            .into_iter()
            .filter(|candidate| self.insert(candidate.clone()))
            .count()
    }

    pub fn contains(&self, url: &str) -> bool {
        self.items.iter().any(|c| c.as_str() == url)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ImageCandidate> {
        self.items.iter()
    }

    pub fn into_vec(self) -> Vec<ImageCandidate> {
        self.items
    }
}

impl Extend<ImageCandidate> for CandidateSet {
    fn extend<I: IntoIterator<Item = ImageCandidate>>(&mut self, iter: I) {
        for candidate in iter {
            self.insert(candidate);
        }
    }
}

/// URL 解析结果
///
/// 每次下载尝试生成一次，不缓存（网络状况可能变化）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionResult {
    /// 最终用于下载的 URL
    pub resolved_url: String,

    /// 是否退回到原始缩略图 URL
    /// - true: 存在候选变换但都没通过验证
    /// - false: 已升级为原图，或没有任何规则匹配（原 URL 视为最终地址）
    pub used_fallback: bool,
}

impl ResolutionResult {
    /// 已验证（或规则可信）的原图地址
    pub fn upgraded(url: impl Into<String>) -> Self {
        Self {
            resolved_url: url.into(),
            used_fallback: false,
        }
    }

    /// 没有规则匹配，原 URL 即最终地址
    pub fn unchanged(url: impl Into<String>) -> Self {
        Self {
            resolved_url: url.into(),
            used_fallback: false,
        }
    }

    /// 候选变换均未通过验证，退回缩略图
    pub fn fallback(url: impl Into<String>) -> Self {
        Self {
            resolved_url: url.into(),
            used_fallback: true,
        }
    }
}

// URL 解析器 - 推断并验证缩略图对应的原图地址
//
// 解析顺序（先成功者胜出）：
// 1. 站点规则：可信约定，直接改写，不探测
// 2. 去掉 `/thumbnail/` 路径段，探测验证
// 3. 按优先级剥离尺寸后缀（`_thumb`、`-150x150` 等），探测验证
// 4. 都不成立时退回原 URL
//
// 解析永远不会失败：最坏情况下载缩略图作为"备份"

use crate::external::ExistenceProbe;
use crate::models::ResolutionResult;
use crate::services::resolve::site_rules;
use lazy_static::lazy_static;
use regex::Regex;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// 缩略图路径段
const THUMBNAIL_SEGMENT: &str = "/thumbnail/";

/// 尺寸后缀（按优先级排列），只匹配紧挨扩展名之前的部分
const THUMBNAIL_SUFFIXES: &[&str] = &[
    "_thumbnail",
    "-thumbnail",
    "_thumb",
    "-thumb",
    "_small",
    "-small",
    "_medium",
    "-medium",
    "_preview",
    "-preview",
    "_sm",
    "_t",
    "_s",
];

lazy_static! {
    /// WordPress 风格的尺寸后缀：`photo-150x150.jpg`
    static ref DIMENSION_SUFFIX: Regex =
        Regex::new(r"^(.+)-\d{2,5}x\d{2,5}$").expect("尺寸后缀正则表达式编译失败");
}

/// URL 解析器
#[derive(Clone)]
pub struct UrlResolver {
    probe: Arc<dyn ExistenceProbe>,
}

impl UrlResolver {
    pub fn new(probe: Arc<dyn ExistenceProbe>) -> Self {
        Self { probe }
    }

    /// 解析缩略图 URL
    ///
    /// # 返回
    /// - 站点规则命中或候选验证通过：原图 URL，`used_fallback = false`
    /// - 有候选但都未通过验证：原 URL，`used_fallback = true`
    /// - 没有任何规则匹配：原 URL，`used_fallback = false`
    pub async fn resolve(&self, preview_url: &str, cancel: &CancellationToken) -> ResolutionResult {
        if let Some((rule, rewritten)) = site_rules::apply(preview_url) {
            info!("站点规则 {} 命中: {} -> {}", rule, preview_url, rewritten);
            return ResolutionResult::upgraded(rewritten);
        }

        let candidates = Self::candidates(preview_url);
        if candidates.is_empty() {
            debug!("没有匹配的缩略图规则，原 URL 即最终地址: {}", preview_url);
            return ResolutionResult::unchanged(preview_url);
        }

        for candidate in &candidates {
            if cancel.is_cancelled() {
                debug!("解析被取消: {}", preview_url);
                break;
            }
            if self.probe.exists(candidate, cancel).await {
                info!("原图验证通过: {} -> {}", preview_url, candidate);
                return ResolutionResult::upgraded(candidate.clone());
            }
        }

        debug!(
            "{} 个候选均未验证通过，退回缩略图: {}",
            candidates.len(),
            preview_url
        );
        ResolutionResult::fallback(preview_url)
    }

    /// 生成需要验证的候选 URL（按尝试顺序，已去重）
    pub fn candidates(preview_url: &str) -> Vec<String> {
        let mut candidates: Vec<String> = Vec::new();
        let mut push = |candidate: String| {
            if candidate != preview_url && !candidates.contains(&candidate) {
                candidates.push(candidate);
            }
        };

        if preview_url.contains(THUMBNAIL_SEGMENT) {
            push(preview_url.replacen(THUMBNAIL_SEGMENT, "/", 1));
        }

        if let Some(parts) = FileNameParts::split(preview_url) {
            let stem_lower = parts.stem.to_ascii_lowercase();
            for suffix in THUMBNAIL_SUFFIXES {
                if stem_lower.len() > suffix.len() && stem_lower.ends_with(suffix) {
                    let stripped = &parts.stem[..parts.stem.len() - suffix.len()];
                    push(parts.with_stem(stripped));
                }
            }

            if let Some(captures) = DIMENSION_SUFFIX.captures(parts.stem) {
                push(parts.with_stem(&captures[1]));
            }
        }

        candidates
    }
}

/// URL 最后一个路径段的拆分结果：`{prefix}{stem}.{ext}{tail}`
struct FileNameParts<'a> {
    prefix: &'a str,
    stem: &'a str,
    extension: &'a str,
    tail: &'a str,
}

impl<'a> FileNameParts<'a> {
    fn split(url: &'a str) -> Option<Self> {
        let path_end = url.find(|c| c == '?' || c == '#').unwrap_or(url.len());
        let (path, tail) = url.split_at(path_end);

        let name_start = path.rfind('/')? + 1;
        let (prefix, file_name) = path.split_at(name_start);

        let dot = file_name.rfind('.')?;
        let (stem, extension) = file_name.split_at(dot);
        if stem.is_empty() || extension.len() < 2 {
            return None;
        }

        Some(Self {
            prefix,
            stem,
            extension,
            tail,
        })
    }

    fn with_stem(&self, stem: &str) -> String {
        format!("{}{}{}{}", self.prefix, stem, self.extension, self.tail)
    }
}

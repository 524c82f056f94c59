// 图片提取器 - 从渲染后的 HTML 中提取图片地址
//
// 两轮提取，结果取并集：
// - 属性扫描：每个 img 元素取最合适的地址（父级超链接优先，其次是懒加载属性）
// - 正则扫描：原始标记中的绝对图片地址和 CSS url(...) 引用
//
// 提取器无状态，可以在任意线程调用

use crate::models::image::is_inline_data;
use crate::models::{CandidateSet, ImageCandidate};
use crate::services::scan::browser::ElementSnapshot;
use lazy_static::lazy_static;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use url::Url;

/// 可识别的图片扩展名
pub const IMAGE_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "webp", "bmp", "avif", "svg", "tif", "tiff",
];

/// img 元素上可能携带地址的属性（按优先级）
pub const IMAGE_ATTRIBUTES: &[&str] = &[
    "src",
    "data-src",
    "data-lazy-src",
    "data-original",
    "data-lazy",
    "data-url",
    "srcset",
    "data-srcset",
    "data-lazy-srcset",
    "data-bg",
    "data-background",
    "data-background-image",
];

lazy_static! {
    static ref IMG_SELECTOR: Selector = Selector::parse("img").expect("img 选择器解析失败");

    /// 绝对地址：http(s)://...<扩展名>[?query]，其后必须是分隔符或结尾
    static ref ABSOLUTE_IMAGE_URL: Regex = Regex::new(
        r#"(?i)(https?://[^\s"'<>()\\]+\.(?:jpe?g|png|gif|webp|bmp|avif|svg|tiff?)(?:\?[^\s"'<>()\\]*)?)(?:[\s"'<>()\\,;#]|$)"#
    )
    .expect("图片地址正则表达式编译失败");

    /// CSS 引用：url(...)，可带引号
    static ref CSS_URL: Regex = Regex::new(
        r#"(?i)url\(\s*['"]?([^'"()\s]+\.(?:jpe?g|png|gif|webp|bmp|avif|svg|tiff?)(?:\?[^'"()\s]*)?)\s*['"]?\s*\)"#
    )
    .expect("CSS url 正则表达式编译失败");
}

/// 图片提取器
pub struct ImageExtractor;

impl ImageExtractor {
    /// 从渲染后的 HTML 中提取图片地址
    ///
    /// # 参数
    /// - `rendered_html`: 页面源码
    /// - `base_url`: 页面地址，用于解析相对路径
    ///
    /// # 返回
    /// 去重后的绝对地址集合（属性扫描结果在前）
    pub fn extract(rendered_html: &str, base_url: &Url) -> CandidateSet {
        let mut images = Self::attribute_pass(rendered_html, base_url);
        images.merge(Self::regex_pass(rendered_html, base_url));
        images
    }

    /// 属性扫描
    pub fn attribute_pass(rendered_html: &str, base_url: &Url) -> CandidateSet {
        let document = Html::parse_document(rendered_html);
        let mut images = CandidateSet::new();

        for img in document.select(&IMG_SELECTOR) {
            if let Some(candidate) = Self::linked_image(&img, base_url) {
                images.insert(candidate);
                continue;
            }

            let element = img.value();
            let chosen = IMAGE_ATTRIBUTES.iter().find_map(|name| {
                element
                    .attr(name)
                    .and_then(|value| Self::attribute_candidate(name, value, base_url))
            });

            if let Some(candidate) = chosen {
                images.insert(candidate);
            }
        }

        images
    }

    /// 正则扫描
    pub fn regex_pass(rendered_html: &str, base_url: &Url) -> CandidateSet {
        let markup = decode_entities(rendered_html);
        let mut images = CandidateSet::new();

        for captures in ABSOLUTE_IMAGE_URL.captures_iter(&markup) {
            if let Some(candidate) = ImageCandidate::parse(&captures[1]) {
                images.insert(candidate);
            }
        }

        for captures in CSS_URL.captures_iter(&markup) {
            if let Some(candidate) = ImageCandidate::resolve(base_url, &captures[1]) {
                images.insert(candidate);
            }
        }

        images
    }

    /// 实时 DOM 中一个 img 元素携带的所有地址
    ///
    /// 与属性扫描不同，这里不做取舍：`currentSrc`、`src` 和懒加载属性全部收集
    pub fn live_candidates(element: &ElementSnapshot, base_url: &Url) -> Vec<ImageCandidate> {
        std::iter::once("currentSrc")
            .chain(IMAGE_ATTRIBUTES.iter().copied())
            .filter_map(|name| {
                element
                    .attribute(name)
                    .and_then(|value| Self::attribute_candidate(name, value, base_url))
            })
            .collect()
    }

    /// 父级是指向图片文件的超链接时，取超链接地址（通常是原图）
    fn linked_image(img: &ElementRef<'_>, base_url: &Url) -> Option<ImageCandidate> {
        let parent = ElementRef::wrap(img.parent()?)?;
        if !parent.value().name().eq_ignore_ascii_case("a") {
            return None;
        }

        let href = parent.value().attr("href")?;
        if !has_image_extension(href) {
            return None;
        }
        ImageCandidate::resolve(base_url, href)
    }

    fn attribute_candidate(name: &str, value: &str, base_url: &Url) -> Option<ImageCandidate> {
        let value = value.trim();
        if value.is_empty() || is_inline_data(value) {
            return None;
        }

        if name.ends_with("srcset") {
            return largest_srcset_entry(value)
                .and_then(|entry| ImageCandidate::resolve(base_url, entry));
        }

        ImageCandidate::resolve(base_url, strip_css_url(value))
    }
}

/// 地址路径部分是否以图片扩展名结尾（忽略大小写）
pub fn has_image_extension(url: &str) -> bool {
    let path_end = url.find(|c| c == '?' || c == '#').unwrap_or(url.len());
    let path = url[..path_end].to_ascii_lowercase();

    match path.rsplit_once('.') {
        Some((_, ext)) => IMAGE_EXTENSIONS.contains(&ext),
        None => false,
    }
}

/// 从 srcset 中选出描述符最大的地址（`640w` / `2x`，缺省为 1x）
fn largest_srcset_entry(srcset: &str) -> Option<&str> {
    srcset
        .split(',')
        .filter_map(|entry| {
            let mut parts = entry.split_whitespace();
            let url = parts.next()?;
            if is_inline_data(url) {
                return None;
            }
            let descriptor = parts
                .next()
                .and_then(|d| d.get(..d.len().saturating_sub(1))?.parse::<f64>().ok())
                .unwrap_or(1.0);
            Some((url, descriptor))
        })
        .fold(None, |best: Option<(&str, f64)>, (url, descriptor)| match best {
            Some((best_url, best_descriptor)) if best_descriptor >= descriptor => {
                Some((best_url, best_descriptor))
            }
            _ => Some((url, descriptor)),
        })
        .map(|(url, _)| url)
}

/// 背景属性可能写成 `url('...')`
fn strip_css_url(value: &str) -> &str {
    let lower = value.get(..4).map(|p| p.eq_ignore_ascii_case("url(")).unwrap_or(false);
    if lower && value.ends_with(')') {
        value[4..value.len() - 1].trim().trim_matches(|c| c == '\'' || c == '"')
    } else {
        value
    }
}

/// 原始标记中常见的实体转义
fn decode_entities(markup: &str) -> String {
    markup
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        .replace("&amp;", "&")
}

// 站点规则 - 已知图床的缩略图路径约定
//
// 这些约定是可信的，命中后直接改写，不需要探测

use lazy_static::lazy_static;
use regex::Regex;

/// 单条站点规则
pub struct SiteRule {
    /// 规则名称（日志用）
    pub name: &'static str,
    pattern: Regex,
    replacement: &'static str,
}

impl SiteRule {
    fn new(name: &'static str, pattern: &str, replacement: &'static str) -> Self {
        Self {
            name,
            pattern: Regex::new(pattern).expect("站点规则正则表达式编译失败"),
            replacement,
        }
    }

    /// 命中时返回改写后的 URL
    pub fn rewrite(&self, url: &str) -> Option<String> {
        if !self.pattern.is_match(url) {
            return None;
        }
        let rewritten = self.pattern.replace(url, self.replacement).into_owned();
        (rewritten != url).then_some(rewritten)
    }
}

lazy_static! {
    static ref SITE_RULES: Vec<SiteRule> = vec![
        // upload.wikimedia.org/wikipedia/commons/thumb/a/ab/File.jpg/220px-File.jpg
        SiteRule::new(
            "wikimedia",
            r"^(?i)(https?://upload\.wikimedia\.org/wikipedia/[^/]+)/thumb/([0-9a-f]/[0-9a-f]{2}/[^/]+)/[^/]+$",
            "$1/$2",
        ),
        // i.pinimg.com/236x/aa/bb/cc/file.jpg -> i.pinimg.com/originals/aa/bb/cc/file.jpg
        SiteRule::new(
            "pinterest",
            r"^(?i)(https?://i\.pinimg\.com)/\d+x\d*(?:_[a-z0-9]+)?/(.+)$",
            "$1/originals/$2",
        ),
        // preview.redd.it/abc.jpg?width=640&... -> i.redd.it/abc.jpg
        SiteRule::new(
            "reddit",
            r"^(?i)https?://preview\.redd\.it/([^?#/]+\.(?:jpe?g|png|gif|webp))(?:[?#].*)?$",
            "https://i.redd.it/$1",
        ),
        // i.imgur.com/AbCdEfGm.jpg（7 位 ID + 尺寸字母）-> i.imgur.com/AbCdEfG.jpg
        SiteRule::new(
            "imgur",
            r"^(?i)(https?://i\.imgur\.com/)([a-z0-9]{7})[sbtmlh](\.[a-z]+)(\?.*)?$",
            "$1$2$3",
        ),
    ];
}

/// 依次尝试所有站点规则，返回 (规则名, 改写结果)
pub fn apply(url: &str) -> Option<(&'static str, String)> {
    SITE_RULES
        .iter()
        .find_map(|rule| rule.rewrite(url).map(|rewritten| (rule.name, rewritten)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wikimedia_thumb() {
        let url = "https://upload.wikimedia.org/wikipedia/commons/thumb/a/ab/Cat.jpg/220px-Cat.jpg";
        assert_eq!(
            apply(url),
            Some(("wikimedia", "https://upload.wikimedia.org/wikipedia/commons/a/ab/Cat.jpg".to_string()))
        );
    }

    #[test]
    fn test_pinterest_sizes() {
        let url = "https://i.pinimg.com/236x/12/34/56/abcdef.jpg";
        assert_eq!(
            apply(url).map(|(_, u)| u),
            Some("https://i.pinimg.com/originals/12/34/56/abcdef.jpg".to_string())
        );

        let url = "https://i.pinimg.com/474x/12/34/56/abcdef.jpg";
        assert!(apply(url).unwrap().1.contains("/originals/"));

        // 已经是原图
        assert!(apply("https://i.pinimg.com/originals/12/34/56/abcdef.jpg").is_none());
    }

    #[test]
    fn test_reddit_preview() {
        let url = "https://preview.redd.it/xyz123.jpg?width=640&crop=smart&auto=webp&s=abc";
        assert_eq!(apply(url).map(|(_, u)| u), Some("https://i.redd.it/xyz123.jpg".to_string()));
    }

    #[test]
    fn test_imgur_size_letter() {
        assert_eq!(
            apply("https://i.imgur.com/AbCdEfGm.jpg").map(|(_, u)| u),
            Some("https://i.imgur.com/AbCdEfG.jpg".to_string())
        );
        // 7 位 ID 没有尺寸字母
        assert!(apply("https://i.imgur.com/AbCdEfG.jpg").is_none());
    }

    #[test]
    fn test_unknown_host() {
        assert!(apply("https://example.com/thumb/a.jpg").is_none());
    }
}

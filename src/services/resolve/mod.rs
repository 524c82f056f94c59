// 原图解析模块
//
// 把缩略图 URL 推断为原图 URL：
// - 站点规则（可信，直接改写）
// - 路径段 / 尺寸后缀剥离（需 HEAD 探测验证）
// - 验证不通过时退回原 URL

pub mod site_rules;
pub mod url_resolver;

pub use site_rules::SiteRule;
pub use url_resolver::UrlResolver;

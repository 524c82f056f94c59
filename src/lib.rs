// 图片采集后端库
//
// 本库提供网页图片采集的核心功能，包括：
// - 页面扫描（滚动 + 收敛判断 + 图片提取）
// - 缩略图 → 原图地址解析
// - 批量下载
// - 两级预览缓存
// - API 路由

pub mod api;
pub mod external;
pub mod models;
pub mod services;

#[cfg(test)]
pub(crate) mod test_support;

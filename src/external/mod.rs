// 外部能力 - 进程级 HTTP 客户端
//
// HTTP 客户端在启动时创建一次（连接池、超时配置），显式传给各组件

pub mod http;

pub use http::{ExistenceProbe, HttpClient, HttpClientConfig, DEFAULT_USER_AGENT};

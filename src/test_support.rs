// 测试辅助：本地 HTTP 服务器

use axum::Router;

/// 在 127.0.0.1 的随机端口启动测试服务器，返回 `http://127.0.0.1:{port}`
pub async fn spawn_test_server(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

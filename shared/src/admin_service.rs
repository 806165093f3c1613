use crate::http::make_boxed_error_response;
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use hyper::service::Service;
use hyper::{Method, Request, Response, StatusCode};
use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;

/// Liveness and readiness endpoints, served on a listener separate from the
/// main traffic.
///
/// `/health` always answers `ok`. `/ready` answers `ok` only while `is_ready`
/// returns true.
pub struct AdminService<F> {
    is_ready: F,
}

impl<F> AdminService<F>
where
    F: Fn() -> bool,
{
    pub fn new(is_ready: F) -> Self {
        Self { is_ready }
    }
}

impl<F> Service<Request<Incoming>> for AdminService<F>
where
    F: Fn() -> bool,
{
    type Response = Response<BoxBody<Bytes, Infallible>>;
    type Error = Infallible;
    type Future =
        Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send + 'static>>;

    fn call(&self, req: Request<Incoming>) -> Self::Future {
        let res = route(req.method(), req.uri().path(), (self.is_ready)());
        Box::pin(async move { Ok(res) })
    }
}

fn route(method: &Method, path: &str, is_ready: bool) -> Response<BoxBody<Bytes, Infallible>> {
    let ok_body = || Full::new(Bytes::from("ok\n")).boxed();

    if method != Method::GET && method != Method::HEAD {
        return make_boxed_error_response(StatusCode::METHOD_NOT_ALLOWED);
    }

    match path {
        "/health" => Response::new(ok_body()),
        "/ready" => match is_ready {
            true => Response::new(ok_body()),
            false => make_boxed_error_response(StatusCode::SERVICE_UNAVAILABLE),
        },
        _ => make_boxed_error_response(StatusCode::NOT_FOUND),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::serve_http_service;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::net::TcpListener;

    #[test]
    fn test_routes() {
        assert_eq!(route(&Method::GET, "/health", false).status(), StatusCode::OK);
        assert_eq!(route(&Method::GET, "/ready", true).status(), StatusCode::OK);
        assert_eq!(
            route(&Method::GET, "/ready", false).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            route(&Method::GET, "/metrics", true).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            route(&Method::POST, "/health", true).status(),
            StatusCode::METHOD_NOT_ALLOWED
        );
    }

    #[tokio::test]
    async fn test_admin_service_over_tcp() {
        let ready = Arc::new(AtomicBool::new(false));
        let ready_clone = ready.clone();
        let service = AdminService::new(move || ready_clone.load(Ordering::Relaxed));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        tokio::spawn(serve_http_service::<_, _, std::io::Error>(listener, service));

        let client = reqwest::Client::new();
        let health = client.get(format!("{base}/health")).send().await.unwrap();
        assert_eq!(health.status(), 200);
        assert_eq!(health.text().await.unwrap(), "ok\n");

        let not_ready = client.get(format!("{base}/ready")).send().await.unwrap();
        assert_eq!(not_ready.status(), 503);

        ready.store(true, Ordering::Relaxed);
        let now_ready = client.get(format!("{base}/ready")).send().await.unwrap();
        assert_eq!(now_ready.status(), 200);
    }
}

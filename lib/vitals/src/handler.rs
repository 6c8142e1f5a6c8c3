use std::{panic::AssertUnwindSafe, sync::Arc};

use bytes::Bytes;
use futures::FutureExt as _;
use http::{header::CONTENT_TYPE, HeaderValue, Request, Response, StatusCode};
use tracing::error;

use crate::{
    checker::{Checker, CheckerResult},
    error::GenericError,
    middleware::{self, Middleware, MiddlewareFn},
    runner::panic_message,
};

/// Renders a health result into an HTTP response.
pub trait ResultWriter: Send + Sync {
    /// Writes `result` as a response with the given status code.
    ///
    /// # Errors
    ///
    /// If the result cannot be rendered, an error is returned, and the handler responds with `500 Internal Server
    /// Error` instead.
    fn write(
        &self, result: &CheckerResult, status_code: StatusCode, request: &Request<()>,
    ) -> Result<Response<Bytes>, GenericError>;
}

/// A result writer that renders results as JSON.
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonResultWriter;

impl ResultWriter for JsonResultWriter {
    fn write(
        &self, result: &CheckerResult, status_code: StatusCode, _: &Request<()>,
    ) -> Result<Response<Bytes>, GenericError> {
        let body = serde_json::to_vec(result)?;
        let response = Response::builder()
            .status(status_code)
            .header(CONTENT_TYPE, HeaderValue::from_static("application/json; charset=utf-8"))
            .body(Bytes::from(body))?;
        Ok(response)
    }
}

/// Builder for a [`Handler`].
pub struct HandlerBuilder {
    checker: Checker,
    middlewares: Vec<Middleware>,
    writer: Arc<dyn ResultWriter>,
    up_status_code: StatusCode,
    down_status_code: StatusCode,
}

impl HandlerBuilder {
    /// Creates a new `HandlerBuilder` serving results from the given checker.
    pub fn new(checker: Checker) -> Self {
        Self {
            checker,
            middlewares: Vec::new(),
            writer: Arc::new(JsonResultWriter),
            up_status_code: StatusCode::OK,
            down_status_code: StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Adds a middleware around every query.
    ///
    /// The first middleware added is the outermost one.
    pub fn with_middleware(mut self, middleware: Middleware) -> Self {
        self.middlewares.push(middleware);
        self
    }

    /// Sets the writer used to render results.
    ///
    /// Defaults to [`JsonResultWriter`].
    pub fn with_result_writer<W>(mut self, writer: W) -> Self
    where
        W: ResultWriter + 'static,
    {
        self.writer = Arc::new(writer);
        self
    }

    /// Sets the status codes used when the aggregate status is up, and when it is anything else.
    ///
    /// Defaults to `200 OK` and `503 Service Unavailable`.
    pub fn with_status_codes(mut self, up: StatusCode, down: StatusCode) -> Self {
        self.up_status_code = up;
        self.down_status_code = down;
        self
    }

    /// Builds the handler.
    pub fn build(self) -> Handler {
        let checker = self.checker;
        let base: MiddlewareFn = Arc::new(move |_: Request<()>| {
            let checker = checker.clone();
            async move { checker.check().await }.boxed()
        });

        Handler {
            pipeline: middleware::compose(base, &self.middlewares),
            writer: self.writer,
            up_status_code: self.up_status_code,
            down_status_code: self.down_status_code,
        }
    }
}

/// Serves health queries over HTTP.
///
/// `Handler` is transport-agnostic: it takes a request and produces a response, and can be mounted in any HTTP server
/// by converting to and from its request and response types.
#[derive(Clone)]
pub struct Handler {
    pipeline: MiddlewareFn,
    writer: Arc<dyn ResultWriter>,
    up_status_code: StatusCode,
    down_status_code: StatusCode,
}

impl Handler {
    /// Serves a single health query.
    pub async fn handle(&self, request: Request<()>) -> Response<Bytes> {
        let pipeline = Arc::clone(&self.pipeline);
        let forwarded = request.clone();
        let result = match AssertUnwindSafe(async move { pipeline(forwarded).await })
            .catch_unwind()
            .await
        {
            Ok(result) => result,
            Err(panic) => {
                error!(panic = panic_message(&*panic), "Health query middleware panicked.");
                CheckerResult::unavailable()
            }
        };

        let status_code = if result.status.is_up() {
            self.up_status_code
        } else {
            self.down_status_code
        };

        match self.writer.write(&result, status_code, &request) {
            Ok(response) => response,
            Err(e) => {
                error!(error = %e, "Failed to write health query response.");
                let mut response = Response::new(Bytes::new());
                *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
                response
            }
        }
    }
}

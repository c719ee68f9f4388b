// Request worker
// Decodes envelopes and dispatches them through a static type→handler table

use crate::bulk_writer::BulkWriterHandle;
use crate::listener::RawRequest;
use crate::queue::RequestQueue;
use crate::service::Service;
use crate::wire::{ErrorCode, Request, Response, WIRE_VERSION};
use plid_core::{decode_from_slice, encode_to_vec, CodecError};
use std::collections::HashMap;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

const QUEUE_POLL: Duration = Duration::from_millis(200);

/// A handler failure, already mapped to its wire error code. The message
/// travels back to the client in the response payload.
#[derive(Debug)]
pub struct HandlerError {
    pub code: ErrorCode,
    pub message: String,
}

impl HandlerError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        HandlerError {
            code: ErrorCode::BadRequest,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        HandlerError {
            code: ErrorCode::NotFound,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        HandlerError {
            code: ErrorCode::Internal,
            message: message.into(),
        }
    }
}

impl From<CodecError> for HandlerError {
    fn from(err: CodecError) -> Self {
        HandlerError::bad_request(err.to_string())
    }
}

/// Handlers are pure functions of `(payload, role-state)`.
pub type Handler<S> = Box<dyn Fn(&[u8], &S) -> Result<Vec<u8>, HandlerError> + Send + Sync>;

/// Static `type → handler` table. Unknown types and version mismatches are
/// answered without ever reaching a handler.
pub struct Dispatcher<S> {
    handlers: HashMap<u16, Handler<S>>,
}

impl<S> Default for Dispatcher<S> {
    fn default() -> Self {
        Dispatcher::new()
    }
}

impl<S> Dispatcher<S> {
    pub fn new() -> Self {
        Dispatcher {
            handlers: HashMap::new(),
        }
    }

    pub fn with<F>(mut self, req_type: u16, handler: F) -> Self
    where
        F: Fn(&[u8], &S) -> Result<Vec<u8>, HandlerError> + Send + Sync + 'static,
    {
        self.handlers.insert(req_type, Box::new(handler));
        self
    }

    pub fn handles(&self, req_type: u16) -> bool {
        self.handlers.contains_key(&req_type)
    }

    pub fn dispatch(&self, request: &Request, state: &S) -> Response {
        if request.version != WIRE_VERSION {
            return Response::failure(
                ErrorCode::VersionMismatch,
                &format!(
                    "envelope version {} (expected {})",
                    request.version, WIRE_VERSION
                ),
            );
        }
        let Some(handler) = self.handlers.get(&request.req_type) else {
            return Response::failure(
                ErrorCode::BadRequest,
                &format!("unknown request type {}", request.req_type),
            );
        };
        match handler(&request.payload, state) {
            Ok(payload) => Response::ok(payload),
            Err(err) => {
                debug!(req_type = request.req_type, code = ?err.code, message = %err.message,
                       "handler rejected request");
                Response::failure(err.code, &err.message)
            }
        }
    }
}

/// The single worker thread: pops requests in enqueue order, dispatches,
/// and hands `(connection, encoded response)` to the bulk writer. Handler
/// failures become error responses; they never tear the worker down.
pub fn spawn_worker<S>(
    queue: Arc<RequestQueue<RawRequest>>,
    dispatcher: Dispatcher<S>,
    state: Arc<S>,
    writer: BulkWriterHandle,
) -> io::Result<Service>
where
    S: Send + Sync + 'static,
{
    Service::spawn("request-worker", move |stop| {
        while !stop.is_set() {
            let Some(raw) = queue.poll(QUEUE_POLL) else {
                continue;
            };

            let response = match decode_from_slice::<Request>(&raw.payload) {
                Ok(request) => {
                    debug!(peer = %raw.peer, req_type = request.req_type, "dispatching request");
                    dispatcher.dispatch(&request, &state)
                }
                Err(err) => {
                    warn!(peer = %raw.peer, %err, "malformed request envelope");
                    Response::failure(ErrorCode::BadRequest, &format!("bad envelope: {err}"))
                }
            };

            match encode_to_vec(&response) {
                Ok(bytes) => {
                    if let Err(err) = writer.add(raw.stream, bytes) {
                        warn!(peer = %raw.peer, %err, "response dropped");
                    }
                }
                Err(err) => error!(%err, "failed to encode response"),
            }
        }
    })
}

//! Scripted transport for driving the client without a network.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use interlex_client::{Transport, TransportFailure, WireRequest, WireResponse};

/// Routes requests by URL substring to queued responses. The last response
/// on a route is sticky: once the queue is down to one entry it replays for
/// every further match, so single-response routes (like `user/info`) serve
/// repeat lookups without re-scripting.
pub struct ScriptedTransport {
    routes: Mutex<Vec<(String, VecDeque<WireResponse>)>>,
    requests: Mutex<Vec<WireRequest>>,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            routes: Mutex::new(Vec::new()),
            requests: Mutex::new(Vec::new()),
        })
    }

    /// Queue a response for every URL containing `needle`. First matching
    /// route wins, so script more specific needles first.
    pub fn route(&self, needle: &str, status: u16, body: &str) {
        let mut routes = self.routes.lock().unwrap();
        let response = WireResponse {
            status,
            body: body.to_string(),
        };
        if let Some((_, queue)) = routes.iter_mut().find(|(n, _)| n == needle) {
            queue.push_back(response);
        } else {
            routes.push((needle.to_string(), VecDeque::from([response])));
        }
    }

    /// All requests whose URL contains `needle`, in arrival order.
    pub fn requests_to(&self, needle: &str) -> Vec<WireRequest> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|request| request.url.contains(needle))
            .cloned()
            .collect()
    }

    pub fn request_count(&self, needle: &str) -> usize {
        self.requests_to(needle).len()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: WireRequest) -> Result<WireResponse, TransportFailure> {
        let url = request.url.clone();
        self.requests.lock().unwrap().push(request);
        let mut routes = self.routes.lock().unwrap();
        for (needle, queue) in routes.iter_mut() {
            if !url.contains(needle.as_str()) {
                continue;
            }
            match queue.len() {
                0 => continue,
                1 => return Ok(queue.front().cloned().unwrap()),
                _ => return Ok(queue.pop_front().unwrap()),
            }
        }
        Err(TransportFailure {
            message: format!("no scripted response for {url}"),
        })
    }
}

/// Response scripting for the key-validation call every client makes at
/// construction.
pub fn route_user_info(transport: &ScriptedTransport, user_id: &str) {
    transport.route(
        "user/info",
        200,
        &format!(r#"{{"data": {{"id": "{user_id}"}}}}"#),
    );
}

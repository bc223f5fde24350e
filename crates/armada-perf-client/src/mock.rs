//! Scripted in-process transport for tests and dry runs.

use armada_perf_core::ActionType;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::{ClientError, ClientResult};
use crate::route::ApiCall;
use crate::transport::{RawResponse, Transport};

/// One scripted answer.
#[derive(Debug, Clone)]
pub enum MockReply {
    Respond(RawResponse),
    /// Fail as if the connection dropped
    NetworkError,
}

type Handler = Box<dyn Fn(&ApiCall) -> Option<RawResponse> + Send + Sync>;

/// Answers calls from per-action scripts first, then from an optional
/// handler, and otherwise with a JSON 404.
#[derive(Default)]
pub struct MockTransport {
    scripted: Mutex<HashMap<ActionType, VecDeque<MockReply>>>,
    handler: Option<Handler>,
    calls: Mutex<Vec<ApiCall>>,
    authentications: AtomicUsize,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&ApiCall) -> Option<RawResponse> + Send + Sync + 'static,
    {
        self.handler = Some(Box::new(handler));
        self
    }

    /// Queue a reply for the next call of `action`.
    pub fn push(&self, action: ActionType, reply: MockReply) {
        self.scripted.lock().entry(action).or_default().push_back(reply);
    }

    pub fn respond(&self, action: ActionType, response: RawResponse) {
        self.push(action, MockReply::Respond(response));
    }

    pub fn calls(&self) -> Vec<ApiCall> {
        self.calls.lock().clone()
    }

    pub fn count(&self, action: ActionType) -> usize {
        self.calls.lock().iter().filter(|c| c.action() == action).count()
    }

    pub fn authentications(&self) -> usize {
        self.authentications.load(Ordering::SeqCst)
    }

    fn not_found() -> RawResponse {
        RawResponse::json(
            404,
            serde_json::json!({"code": "E0006", "description": "The specified cluster could not be found."}),
        )
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, call: &ApiCall) -> ClientResult<RawResponse> {
        self.calls.lock().push(call.clone());

        let scripted = self
            .scripted
            .lock()
            .get_mut(&call.action())
            .and_then(|replies| replies.pop_front());
        match scripted {
            Some(MockReply::Respond(response)) => return Ok(response),
            Some(MockReply::NetworkError) => {
                return Err(ClientError::Connection(format!("scripted failure for {}", call.path())))
            }
            None => {}
        }

        Ok(self
            .handler
            .as_ref()
            .and_then(|handler| handler(call))
            .unwrap_or_else(Self::not_found))
    }

    async fn authenticate(&self) -> ClientResult<()> {
        self.authentications.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_script_then_handler_then_not_found() {
        let mock = MockTransport::new().with_handler(|call| match call {
            ApiCall::GetClusters => Some(RawResponse::json(200, serde_json::json!([]))),
            _ => None,
        });
        mock.push(ActionType::GetClusters, MockReply::NetworkError);

        assert!(mock.send(&ApiCall::GetClusters).await.is_err());
        assert_eq!(mock.send(&ApiCall::GetClusters).await.unwrap().status, 200);
        let missing = mock
            .send(&ApiCall::GetClusterWorkers { name: "c1".into() })
            .await
            .unwrap();
        assert_eq!(missing.status, 404);
        assert_eq!(mock.count(ActionType::GetClusters), 2);
    }
}

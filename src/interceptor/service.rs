use std::future::Future;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::replay::Replayer;
use super::upload::{MediaUploader, UploadConfig, UploadJob, UploadProgress};
use crate::bridge::message::{
    ActionRequest, DetailRequest, FollowingListRequest, FriendshipRequest, PollVoteRequest,
    UploadRequest, ACTION_ERROR, ACTION_REQUEST, ACTION_RESPONSE, DETAIL_ERROR, DETAIL_REQUEST,
    DETAIL_RESPONSE, FOLLOWING_LIST_ERROR, FOLLOWING_LIST_REQUEST, FOLLOWING_LIST_RESPONSE,
    FRIENDSHIP_ERROR, FRIENDSHIP_REQUEST, FRIENDSHIP_RESPONSE, POLL_VOTE_ERROR, POLL_VOTE_REQUEST,
    POLL_VOTE_RESPONSE, UPLOAD_ERROR, UPLOAD_PROGRESS, UPLOAD_REQUEST, UPLOAD_RESPONSE,
};
use crate::bridge::BridgeEndpoint;

/// Reply envelope `data` plus any extra top-level fields it carries.
struct Reply {
    data: Value,
    extra: Vec<(&'static str, Value)>,
}

impl From<Value> for Reply {
    fn from(data: Value) -> Self {
        Self {
            data,
            extra: Vec::new(),
        }
    }
}

/// Page-realm side of the bridge: turns `*:request` envelopes into replayed
/// calls and answers each with exactly one response or error envelope.
pub struct InterceptorService {
    endpoint: Arc<BridgeEndpoint>,
    replayer: Replayer,
    uploader: MediaUploader,
}

impl InterceptorService {
    pub fn new(endpoint: Arc<BridgeEndpoint>, replayer: Replayer, upload: UploadConfig) -> Arc<Self> {
        let uploader = MediaUploader::new(replayer.clone(), upload);
        Arc::new(Self {
            endpoint,
            replayer,
            uploader,
        })
    }

    pub fn endpoint(&self) -> &Arc<BridgeEndpoint> {
        &self.endpoint
    }

    pub fn register(self: &Arc<Self>) {
        self.serve(DETAIL_REQUEST, DETAIL_RESPONSE, DETAIL_ERROR, |svc, req: DetailRequest| async move {
            svc.replayer
                .perform_detail(&req.tweet_id, req.controller_data.as_deref())
                .await
                .map(Reply::from)
                .map_err(|err| err.to_string())
        });

        self.serve(ACTION_REQUEST, ACTION_RESPONSE, ACTION_ERROR, |svc, req: ActionRequest| async move {
            svc.replayer
                .perform_action(&req)
                .await
                .map(Reply::from)
                .map_err(|err| err.to_string())
        });

        self.serve(
            POLL_VOTE_REQUEST,
            POLL_VOTE_RESPONSE,
            POLL_VOTE_ERROR,
            |svc, req: PollVoteRequest| async move {
                svc.replayer
                    .perform_poll_vote(&req)
                    .await
                    .map(Reply::from)
                    .map_err(|err| err.to_string())
            },
        );

        self.serve(
            FRIENDSHIP_REQUEST,
            FRIENDSHIP_RESPONSE,
            FRIENDSHIP_ERROR,
            |svc, req: FriendshipRequest| async move {
                svc.replayer
                    .perform_friendship(&req)
                    .await
                    .map(|data| Reply {
                        data,
                        extra: vec![
                            ("action", json!(req.action.as_str())),
                            ("userId", json!(req.user_id)),
                        ],
                    })
                    .map_err(|err| err.to_string())
            },
        );

        self.serve(
            FOLLOWING_LIST_REQUEST,
            FOLLOWING_LIST_RESPONSE,
            FOLLOWING_LIST_ERROR,
            |svc, req: FollowingListRequest| async move {
                svc.replayer
                    .perform_following_list(&req)
                    .await
                    .map(|data| {
                        let mut extra = vec![("userId", json!(req.user_id))];
                        if let Some(count) = req.count {
                            extra.push(("count", json!(count)));
                        }
                        if let Some(cursor) = &req.cursor {
                            extra.push(("cursor", json!(cursor)));
                        }
                        Reply { data, extra }
                    })
                    .map_err(|err| err.to_string())
            },
        );

        self.serve(UPLOAD_REQUEST, UPLOAD_RESPONSE, UPLOAD_ERROR, |svc, req: UploadRequest| async move {
            let job = UploadJob::from_request(&req).map_err(|err| err.to_string())?;
            let endpoint = Arc::clone(&svc.endpoint);
            let request_id = req.request_id.clone();
            let on_progress = move |progress: UploadProgress| {
                endpoint.send(
                    UPLOAD_PROGRESS,
                    json!({"requestId": request_id, "data": progress}),
                );
            };
            let result = svc
                .uploader
                .upload(&job, &on_progress)
                .await
                .map_err(|err| err.to_string())?;
            serde_json::to_value(result)
                .map(Reply::from)
                .map_err(|err| err.to_string())
        });
    }

    /// Register one request type. Every accepted request runs on its own task
    /// and its outcome is caught here, once.
    fn serve<R, F, Fut>(
        self: &Arc<Self>,
        request_type: &'static str,
        response_type: &'static str,
        error_type: &'static str,
        run: F,
    ) where
        R: DeserializeOwned + Send + 'static,
        F: Fn(Arc<Self>, R) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Reply, String>> + Send + 'static,
    {
        let service = Arc::downgrade(self);
        let run = Arc::new(run);
        self.endpoint.register_handler(request_type, move |payload: Value| {
            let Some(service) = service.upgrade() else {
                return;
            };
            let request_id = payload
                .get("requestId")
                .and_then(Value::as_str)
                .map(str::to_string);
            let Some(request_id) = request_id.filter(|id| !id.is_empty()) else {
                debug!("ignoring {} without requestId", request_type);
                return;
            };
            let request: R = match serde_json::from_value(payload) {
                Ok(request) => request,
                Err(err) => {
                    warn!("malformed {} payload: {}", request_type, err);
                    service.endpoint.send(
                        error_type,
                        json!({"requestId": request_id, "error": format!("invalid request: {}", err)}),
                    );
                    return;
                }
            };
            let run = Arc::clone(&run);
            tokio::spawn(async move {
                let endpoint = Arc::clone(&service.endpoint);
                match run(service, request).await {
                    Ok(reply) => {
                        let mut body = json!({"requestId": request_id, "data": reply.data});
                        for (key, value) in reply.extra {
                            body[key] = value;
                        }
                        endpoint.send(response_type, body);
                    }
                    Err(message) => {
                        debug!("{} {} failed: {}", request_type, request_id, message);
                        endpoint.send(error_type, json!({"requestId": request_id, "error": message}));
                    }
                }
            });
        });
    }
}

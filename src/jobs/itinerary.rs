/// Itinerary generation: submit a request, poll it until the assistant is done
use std::sync::Arc;

use async_trait::async_trait;

use crate::api::{ApiClient, Reply};
use crate::auth::SessionManager;
use crate::error::ClientError;
use crate::poller::{JobSource, PollStatus};
use crate::types::{ItineraryRequest, ItineraryRequestRecord, JobCreated, JobHandle};

const REQUEST_PATH: &str = "/itinerary/request";
const EVENT_REQUEST_PATH: &str = "/itinerary/event-itinerary-request";

/// Where a generation request is filed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission {
    Direct,
    /// Generation attached to an organization's event
    Event(String),
}

pub struct ItineraryJobs {
    api: ApiClient,
    session: Arc<SessionManager>,
    submission: Submission,
}

impl ItineraryJobs {
    pub fn new(api: ApiClient, session: Arc<SessionManager>) -> Self {
        Self {
            api,
            session,
            submission: Submission::Direct,
        }
    }

    pub fn for_event(api: ApiClient, session: Arc<SessionManager>, event_id: impl Into<String>) -> Self {
        Self {
            api,
            session,
            submission: Submission::Event(event_id.into()),
        }
    }

    fn submit_path(&self) -> String {
        match &self.submission {
            Submission::Direct => REQUEST_PATH.to_string(),
            Submission::Event(event_id) => format!("{}/{}", EVENT_REQUEST_PATH, event_id),
        }
    }
}

#[async_trait]
impl JobSource for ItineraryJobs {
    type Request = ItineraryRequest;
    type Payload = ItineraryRequestRecord;

    fn kind(&self) -> &'static str {
        "itinerary"
    }

    async fn submit(&self, request: &ItineraryRequest) -> Result<JobHandle, ClientError> {
        let path = self.submit_path();
        let api = &self.api;
        let endpoint = path.as_str();
        let created: JobCreated = self
            .session
            .authorized(|token| async move {
                api.post(endpoint, Some(&token), request)
                    .await
                    .and_then(|reply| reply.into_data(endpoint))
            })
            .await?;

        if created.request_id.trim().is_empty() {
            return Err(ClientError::malformed(endpoint, "empty request id"));
        }
        Ok(JobHandle::new(created.request_id))
    }

    async fn fetch(
        &self,
        handle: &JobHandle,
    ) -> Result<PollStatus<ItineraryRequestRecord>, ClientError> {
        let path = format!("{}/{}", REQUEST_PATH, handle);
        let api = &self.api;
        let reply: Reply<ItineraryRequestRecord> = self
            .session
            .authorized(|token| async move { api.get(&path, Some(&token)).await })
            .await?;

        Ok(match reply {
            Reply::NoContent => PollStatus::NotReadyYet,
            Reply::Data(record) if record.status.is_pending() => PollStatus::Pending,
            Reply::Data(record) => PollStatus::Ready(record),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::MockAuthApi;
    use crate::auth::MemoryStore;
    use crate::config::SessionConfig;
    use crate::navigation::RecordingNavigator;

    fn jobs(submission: Submission) -> ItineraryJobs {
        let session = SessionManager::new(
            Arc::new(MockAuthApi::new()),
            Arc::new(MemoryStore::new()),
            Arc::new(RecordingNavigator::new()),
            &SessionConfig::default(),
        );
        let api = ApiClient::new("http://localhost:5000", "/v1").unwrap();
        match submission {
            Submission::Direct => ItineraryJobs::new(api, session),
            Submission::Event(id) => ItineraryJobs::for_event(api, session, id),
        }
    }

    #[tokio::test]
    async fn test_submit_paths() {
        assert_eq!(jobs(Submission::Direct).submit_path(), "/itinerary/request");
        assert_eq!(
            jobs(Submission::Event("evt-7".into())).submit_path(),
            "/itinerary/event-itinerary-request/evt-7"
        );
    }

    #[tokio::test]
    async fn test_fetch_without_session_is_absent() {
        let jobs = jobs(Submission::Direct);
        let result = jobs.fetch(&JobHandle::new("job-1")).await;
        assert!(matches!(result, Err(ClientError::SessionAbsent)));
    }
}

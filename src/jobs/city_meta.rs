/// City metadata lookup: the backend answers 204 until it has enriched the city
use async_trait::async_trait;

use crate::api::{ApiClient, Reply};
use crate::error::ClientError;
use crate::poller::{JobSource, PollStatus};
use crate::types::{CityMeta, CityMetaRequest, JobHandle};

const CITY_META_PATH: &str = "/itinerary/city-meta";

/// The handle is the city name itself; the lookup endpoint is public.
pub struct CityMetaJobs {
    api: ApiClient,
}

impl CityMetaJobs {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }
}

#[async_trait]
impl JobSource for CityMetaJobs {
    type Request = str;
    type Payload = CityMeta;

    fn kind(&self) -> &'static str {
        "city-meta"
    }

    async fn submit(&self, city: &str) -> Result<JobHandle, ClientError> {
        let city = city.trim();
        if city.is_empty() {
            return Err(ClientError::EmptyCityName);
        }
        Ok(JobHandle::new(city))
    }

    async fn fetch(&self, handle: &JobHandle) -> Result<PollStatus<CityMeta>, ClientError> {
        let reply = self
            .api
            .post(
                CITY_META_PATH,
                None,
                &CityMetaRequest {
                    name: handle.as_str(),
                },
            )
            .await?;

        Ok(match reply {
            Reply::NoContent => PollStatus::NotReadyYet,
            Reply::Data(meta) => PollStatus::Ready(meta),
        })
    }
}

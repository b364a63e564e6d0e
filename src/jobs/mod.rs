// Concrete long-running jobs driven by the generic poller

pub mod city_meta;
pub mod itinerary;

pub use city_meta::CityMetaJobs;
pub use itinerary::{ItineraryJobs, Submission};

pub mod account;
pub mod pose;
pub mod session;

pub use account::{Account, AccountResponse, ExternalProfile, LoginRequest, LoginResponse};
pub use pose::{
    AggregateStats, BaselineLandmarkSet, DeviationResult, Landmark, LandmarkPayload,
    RebuildRequest, SampleResponse, StatsQuery, StatsResponse, ThresholdRequest, ViolationEvent,
};
pub use session::SessionRecord;

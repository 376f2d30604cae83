//! Remote sensor store access and the pure logic around it: normalizing
//! keyed records into readings, the irrigation recommendation rule, and a
//! simulator that feeds synthetic readings into the store.

pub mod client;
pub mod normalize;
pub mod recommend;
pub mod record;
pub mod sim;

pub use client::{
    Ack, Credential, CredentialTransport, Endpoint, FetchError, StoreClient, WriteError,
};
pub use normalize::{normalize, order_by, Direction};
pub use recommend::{latest_with_moisture, recommend, Recommendation};
pub use record::{RawRecord, SensorReading, SensorRecord};
pub use sim::{simulate, SimOutcome, SimPlan, SimSummary, Simulation};

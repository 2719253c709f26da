//! Domain model (ids, records, specs, states, errors).

pub mod errors;
pub mod ids;
pub mod request;
pub mod spec;
pub mod state;
pub mod timestamp;

pub use self::errors::{
    AggregateError, BoxError, DispatchError, ExecuteError, PassError, StoreError, StoreOp,
    ValidationError,
};
pub use self::ids::RequestId;
pub use self::request::{Response, ScheduledRequest};
pub use self::spec::{RequestSpec, Schedule, parse_header_list};
pub use self::state::RecordState;

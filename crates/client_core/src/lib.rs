pub mod gateway;
pub mod logger;
pub mod transport;

pub use gateway::{ApiGateway, GatewayError, RetryPolicy};
pub use logger::{EventLogger, TelemetryIdentity, PRE_IDENTITY_EVENTS};
pub use transport::{
    preferred_end_transport, AwaitedEndTransport, DetachedEndTransport, SessionEndTransport,
};

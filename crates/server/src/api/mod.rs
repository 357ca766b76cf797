pub mod audit;
pub mod dispatcher;
pub mod error;
pub mod handlers;
pub mod jobs;
pub mod middleware;
pub mod routes;
pub mod search;
pub mod tickets;

pub use error::{ApiError, ErrorResponse};
pub use routes::create_router;

//! Support tickets as received from the ingestion boundary.

mod samples;
mod sqlite_store;
mod store;
mod types;

pub use samples::sample_submissions;
pub use sqlite_store::SqliteTicketStore;
pub use store::{TicketError, TicketFilter, TicketStore};
pub use types::{Ticket, TicketSubmission};

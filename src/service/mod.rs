mod boj;
mod error;
mod request;
mod scrape;
mod session;
mod solver;
mod watch;

pub use boj::BojActor;
pub use error::ServiceError;
pub use request::SubmitForm;
pub use session::HttpExec;
pub use watch::PusherSubscriber;

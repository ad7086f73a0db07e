pub mod caller;
pub mod request_id;

pub use caller::Caller;

pub mod cancel;
pub mod logging;
pub mod retry;

pub use cancel::CancelFlag;
pub use retry::RetryPolicy;

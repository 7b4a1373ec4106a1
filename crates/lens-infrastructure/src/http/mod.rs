pub mod clock;
pub mod fetcher;
pub mod pacing;
pub mod retry;
pub mod transport;

pub use clock::{Clock, SystemClock};
pub use fetcher::{BodyClassifier, RateLimitedFetcher};
pub use pacing::HostPacer;
pub use retry::{RetryPolicy, RetryState, RetryStep, RetryTracker};
pub use transport::{HttpResponse, HttpTransport, ReqwestTransport};

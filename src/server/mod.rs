mod client;
mod errors;
mod progress;
mod stream;
mod traits;

pub use client::{ClientIdentity, OriginClient, header_map, standard_headers};
pub use errors::ApiError;
pub use progress::PlaybackState;
pub use traits::ProgressReporter;

//! Generative transform provider integration
//!
//! The service treats the external model as an opaque image-to-image
//! function behind the `ImageTransformer` trait:
//!
//! ```text
//!        ┌───────────────────────┐
//!        │  ImageTransformer     │
//!        └──────────┬────────────┘
//!                   │
//!          ┌────────┴────────┐
//!          │ ReplicateClient │
//!          └─────────────────┘
//! ```
//!
//! Retry policy lives alongside so both the transform call and the result
//! download share one bounded, testable mechanism.

pub mod retry;
pub mod traits;
pub mod replicate;

pub use retry::{RetryPolicy, Sleeper, TokioSleeper};
pub use traits::{
    ImageTransformer, ProviderError, ProviderResult, TransformOutput, TransformRequest,
};
pub use replicate::ReplicateClient;

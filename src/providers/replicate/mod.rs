//! Replicate provider integration

mod client;
mod models;

pub use client::ReplicateClient;
pub use models::extract_output_url;

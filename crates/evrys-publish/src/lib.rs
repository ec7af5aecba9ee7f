//! Client-side publishing of events to an evrys ingestion service.
//!
//! A run dials the service ([`EvrysClient::dial`]), opens a [`Source`],
//! wraps it in the decoder for the chosen [`Format`] and hands both to a
//! [`Pipeline`], which appends every decoded event with bounded concurrency
//! under one cancellation token.

pub mod client;
pub mod decode;
pub mod error;
pub mod pipeline;
pub mod source;

pub use client::{Endpoint, EvrysClient, DEFAULT_DIAL_TIMEOUT};
pub use decode::{Decoder, Format, JsonLinesDecoder};
pub use error::PublishError;
pub use pipeline::{EventSink, Pipeline, PipelineReport, DEFAULT_CONCURRENCY};
pub use source::{Input, Source};

#[cfg(test)]
mod tests;

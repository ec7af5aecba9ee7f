//! `evrys publish events`.

use std::sync::Arc;

use evrys_publish::{
    Endpoint, EvrysClient, Format, Pipeline, Source, DEFAULT_DIAL_TIMEOUT,
};
use tokio_util::sync::CancellationToken;

use super::CommandError;
use crate::signal::cancel_on_shutdown;

pub struct Args {
    pub input: String,
    pub endpoint: Option<String>,
    pub format: String,
    pub concurrency: usize,
    pub events: Vec<String>,
}

pub async fn run(args: Args) -> Result<(), CommandError> {
    let endpoint = Endpoint::parse(args.endpoint.as_deref().unwrap_or_default())?;
    let format: Format = args.format.parse()?;
    let source = if args.events.is_empty() {
        Source::from_arg(&args.input)
    } else {
        Source::Literal(args.events)
    };

    let span = tracing::info_span!("publish", %endpoint, input = %source);
    let decoder = format.decoder(source.open().await?)?;
    let client = EvrysClient::dial(endpoint, DEFAULT_DIAL_TIMEOUT, span.clone()).await?;

    let shutdown = CancellationToken::new();
    tokio::spawn(cancel_on_shutdown(shutdown.clone()));

    let report = Pipeline::new(span)
        .with_concurrency(args.concurrency)
        .run(decoder, Arc::new(client), shutdown)
        .await?;

    println!(
        "decoded {} published {}{}",
        report.decoded,
        report.published,
        if report.cancelled { " (cancelled)" } else { "" }
    );
    Ok(())
}

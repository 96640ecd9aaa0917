//! Open Graph and JSON-LD extraction.
//!
//! The body is tokenized on a blocking worker while the async side keeps
//! pulling chunks off the network, so the document is never held in memory
//! as a whole (debug mode aside, where the raw text is part of the output).

pub mod handlers;
pub mod scanner;

use bytes::Bytes;
use futures_util::StreamExt;
use tokio::sync::mpsc;

use ogproxy_core::{Diagnostics, Error, OpenGraphData};

use crate::cacher::Resolved;
use crate::fetch::{Body, BodyStream};

pub use self::handlers::{HtmlHandler, MetaHandler, ScriptHandler};
pub use self::scanner::{Element, ElementHandler, TagScanner};

/// Chunks buffered between the network and the tokenizer.
const SCAN_QUEUE_DEPTH: usize = 16;

/// A scanner wired with the `html`, `meta` and `script` handlers.
pub fn open_graph_scanner(data: OpenGraphData) -> TagScanner {
    TagScanner::new(data)
        .on("html", HtmlHandler)
        .on("meta", MetaHandler)
        .on("script", ScriptHandler::default())
}

/// Scan a body stream into a fresh record.
///
/// Malformed HTML never fails the scan; whatever was recognized before the
/// stream ended is returned. A transport error while reading the body is
/// returned as-is.
pub async fn extract(
    mut body: BodyStream, request_url: &str, resolved_url: &str, diagnostics: Diagnostics,
) -> Result<OpenGraphData, Error> {
    let data = OpenGraphData::new(request_url, resolved_url, diagnostics);
    let (tx, mut rx) = mpsc::channel::<Bytes>(SCAN_QUEUE_DEPTH);

    let worker = tokio::task::spawn_blocking(move || {
        let mut scanner = open_graph_scanner(data);
        while let Some(chunk) = rx.blocking_recv() {
            scanner.write(&chunk);
        }
        scanner.end()
    });

    let mut failure = None;
    while let Some(chunk) = body.next().await {
        match chunk {
            Ok(chunk) => {
                if tx.send(chunk).await.is_err() {
                    break;
                }
            }
            Err(e) => {
                failure = Some(e);
                break;
            }
        }
    }
    drop(tx);

    let data = worker
        .await
        .map_err(|e| Error::ExtractFailed(format!("scanner task failed: {}", e)))?;

    match failure {
        Some(e) => Err(e),
        None => Ok(data),
    }
}

/// Build the record for a resolved origin response.
///
/// With `debug` set the body is buffered first so the raw text can be
/// attached as `diagnostics.responseText`.
pub async fn assemble(
    resolved: Resolved, request_url: &str, colo: Option<String>, debug: bool,
) -> Result<OpenGraphData, Error> {
    let diagnostics =
        Diagnostics { cf_colo: colo, cf_cache_status: resolved.cache_status.label(), response_text: None };
    let response = resolved.response;
    let resolved_url = response.url.to_string();

    if !debug {
        return extract(response.body.into_stream(), request_url, &resolved_url, diagnostics).await;
    }

    let raw = response.body.collect().await?;
    let mut data = extract(Body::Full(raw.clone()).into_stream(), request_url, &resolved_url, diagnostics).await?;
    data.diagnostics.response_text = Some(String::from_utf8_lossy(&raw).into_owned());
    Ok(data)
}

//! JSON-lines host over stdio.
//!
//! Each input line is one event object tagged by `event`:
//!
//! ```text
//! {"event":"install"}
//! {"event":"activate"}
//! {"event":"fetch","method":"GET","url":"/images/logo.png","destination":"image"}
//! {"event":"sync","tag":"sync-newsletter"}
//! {"event":"push","data":"New arrivals"}
//! ```
//!
//! Every event produces exactly one report line. Host calls made by the
//! worker (skip-waiting, client claims, notifications) are reported as
//! separate lines when they happen.

use async_trait::async_trait;
use http::Method;
use serde::{Deserialize, Serialize};
use sitecache_client::canonicalize;
use sitecache_core::{Destination, Error, Request};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use url::Url;

use crate::error::HostError;
use crate::host::{Dispatcher, FetchOutcome, HostControl, NotificationOptions, Notifier, SyncOutcome, WorkerState};

/// An event delivered by the host.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum HostEvent {
    Install,
    Activate,
    Fetch {
        #[serde(default = "default_method")]
        method: String,
        /// Absolute URL, or a site-relative path resolved against the origin.
        url: String,
        #[serde(default)]
        destination: Destination,
    },
    Sync {
        tag: String,
    },
    Push {
        #[serde(default)]
        data: Option<String>,
    },
}

fn default_method() -> String {
    "GET".into()
}

/// One output line.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "report", rename_all = "snake_case")]
pub enum EventReport {
    Lifecycle {
        state: WorkerState,
    },
    Response {
        url: String,
        status: u16,
        content_type: Option<String>,
        /// Body decoded as UTF-8, lossily.
        body: String,
        bytes: usize,
    },
    Passthrough {
        url: String,
    },
    Unavailable {
        url: String,
    },
    Sync {
        tag: String,
        outcome: SyncOutcome,
    },
    Push {
        delivered: bool,
    },
    SkipWaiting,
    ClaimClients,
    Notification {
        title: String,
        #[serde(flatten)]
        options: NotificationOptions,
    },
    Error {
        message: String,
    },
}

impl EventReport {
    fn error(err: impl std::fmt::Display) -> Self {
        EventReport::Error { message: err.to_string() }
    }
}

/// Host capabilities that report to the output channel.
pub struct StdioHost {
    reports: UnboundedSender<EventReport>,
}

impl StdioHost {
    pub fn new(reports: UnboundedSender<EventReport>) -> Self {
        Self { reports }
    }

    fn report(&self, report: EventReport) -> Result<(), Error> {
        self.reports.send(report).map_err(|_| Error::Host("report channel closed".into()))
    }
}

#[async_trait]
impl HostControl for StdioHost {
    async fn skip_waiting(&self) -> Result<(), Error> {
        self.report(EventReport::SkipWaiting)
    }

    async fn claim_clients(&self) -> Result<(), Error> {
        self.report(EventReport::ClaimClients)
    }
}

#[async_trait]
impl Notifier for StdioHost {
    async fn show_notification(&self, title: &str, options: NotificationOptions) -> Result<(), Error> {
        self.report(EventReport::Notification { title: title.to_string(), options })
    }
}

/// Parse one input line.
pub fn parse_event(line: &str) -> Result<HostEvent, HostError> {
    Ok(serde_json::from_str(line)?)
}

fn build_request(method: &str, url: &str, destination: Destination, origin: &Url) -> Result<Request, Error> {
    let method = Method::from_bytes(method.to_ascii_uppercase().as_bytes())
        .map_err(|e| Error::InvalidInput(format!("invalid method {method:?}: {e}")))?;
    let url = canonicalize(url, origin).map_err(|e| Error::InvalidUrl(format!("{url}: {e}")))?;
    Ok(Request::new(method, url, destination))
}

/// Deliver one event and describe the result.
pub async fn handle_event(dispatcher: &Dispatcher, origin: &Url, event: HostEvent) -> EventReport {
    match event {
        HostEvent::Install => match dispatcher.install().await {
            Ok(()) => EventReport::Lifecycle { state: dispatcher.state() },
            Err(e) => EventReport::error(e),
        },
        HostEvent::Activate => match dispatcher.activate().await {
            Ok(()) => EventReport::Lifecycle { state: dispatcher.state() },
            Err(e) => EventReport::error(e),
        },
        HostEvent::Fetch { method, url, destination } => {
            let request = match build_request(&method, &url, destination, origin) {
                Ok(request) => request,
                Err(e) => return EventReport::error(e),
            };
            let url = request.url().to_string();
            match dispatcher.fetch(&request).await {
                Ok(FetchOutcome::Respond(mut response)) => match response.bytes() {
                    Ok(body) => EventReport::Response {
                        url,
                        status: response.status().as_u16(),
                        content_type: response.content_type().map(str::to_string),
                        body: String::from_utf8_lossy(&body).into_owned(),
                        bytes: body.len(),
                    },
                    Err(e) => EventReport::error(e),
                },
                Ok(FetchOutcome::Passthrough) => EventReport::Passthrough { url },
                Ok(FetchOutcome::Unavailable) => EventReport::Unavailable { url },
                Err(e) => EventReport::error(e),
            }
        }
        HostEvent::Sync { tag } => match dispatcher.sync(&tag).await {
            Ok(outcome) => EventReport::Sync { tag, outcome },
            Err(e) => EventReport::error(e),
        },
        HostEvent::Push { data } => match dispatcher.push(data.as_deref()).await {
            Ok(()) => EventReport::Push { delivered: true },
            Err(e) => EventReport::error(e),
        },
    }
}

/// Run install then activate, reporting both.
///
/// Activation is skipped when install fails; the worker stays redundant and
/// requests pass through.
pub async fn boot(
    dispatcher: &Dispatcher, origin: &Url, reports: &UnboundedSender<EventReport>,
) -> Result<(), HostError> {
    let installed = handle_event(dispatcher, origin, HostEvent::Install).await;
    let failed = matches!(installed, EventReport::Error { .. });
    reports.send(installed).map_err(|_| HostError::OutputClosed)?;
    if failed {
        tracing::error!("install failed; serving without the worker");
        return Ok(());
    }

    let activated = handle_event(dispatcher, origin, HostEvent::Activate).await;
    reports.send(activated).map_err(|_| HostError::OutputClosed)?;
    Ok(())
}

/// Read events until end of input, then wait for background work.
pub async fn serve<R>(
    dispatcher: &Dispatcher, origin: &Url, input: R, reports: UnboundedSender<EventReport>,
) -> Result<(), HostError>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = input.lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let report = match parse_event(line) {
            Ok(event) => handle_event(dispatcher, origin, event).await,
            Err(e) => {
                tracing::warn!(error = %e, "rejected input line");
                EventReport::error(e)
            }
        };
        reports.send(report).map_err(|_| HostError::OutputClosed)?;
    }

    tracing::debug!("input closed; waiting for background work");
    dispatcher.settle().await;
    Ok(())
}

/// Write reports as JSON lines until every sender is dropped.
pub async fn write_lines<W>(mut output: W, mut reports: UnboundedReceiver<EventReport>) -> Result<(), HostError>
where
    W: AsyncWrite + Unpin,
{
    while let Some(report) = reports.recv().await {
        let mut line = serde_json::to_vec(&report).map_err(|e| HostError::InvalidEvent(e.to_string()))?;
        line.push(b'\n');
        output.write_all(&line).await?;
        output.flush().await?;
    }
    Ok(())
}

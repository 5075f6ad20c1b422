//! Background pipeline task.
//!
//! Requests are consumed in arrival order. Decoding and depth sorting run on
//! the blocking pool; view updates that arrive while a sort is in flight are
//! coalesced by an [`UpdateScheduler`].

use crate::decoder::decode;
use crate::error::FormatError;
use crate::pipeline::{Pipeline, Request, Response, SortState};
use crate::scheduler::UpdateScheduler;
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};

type SortOutput = (SortState, Vec<Response>);

/// Handle to a running pipeline task.
///
/// Dropping `requests` asks the task to stop once the sort in flight has been
/// delivered.
#[derive(Debug)]
pub struct PipelineWorker {
    pub requests: mpsc::Sender<Request>,
    pub responses: mpsc::Receiver<Response>,
}

/// Spawns the pipeline on the current tokio runtime. `capacity` bounds both
/// channels.
pub fn spawn_worker(capacity: usize) -> (PipelineWorker, JoinHandle<()>) {
    let capacity = capacity.max(1);
    let (request_tx, request_rx) = mpsc::channel(capacity);
    let (response_tx, response_rx) = mpsc::channel(capacity);
    let handle = tokio::spawn(run(request_rx, response_tx));
    (
        PipelineWorker {
            requests: request_tx,
            responses: response_rx,
        },
        handle,
    )
}

async fn join_in_flight(
    in_flight: &mut Option<JoinHandle<SortOutput>>,
) -> Result<SortOutput, JoinError> {
    match in_flight {
        Some(handle) => handle.await,
        None => std::future::pending().await,
    }
}

fn start_sort(
    pipeline: &mut Pipeline,
    scheduler: &mut UpdateScheduler<Vec<f32>>,
    mut view: Vec<f32>,
) -> Option<JoinHandle<SortOutput>> {
    loop {
        if let Some(job) = pipeline.take_sort_job(view) {
            return Some(tokio::task::spawn_blocking(move || job.run()));
        }
        view = scheduler.complete()?;
    }
}

async fn deliver(responses: &mpsc::Sender<Response>, out: Vec<Response>) -> bool {
    for response in out {
        if responses.send(response).await.is_err() {
            log::debug!("Response receiver dropped, stopping pipeline");
            return false;
        }
    }
    true
}

async fn run(mut requests: mpsc::Receiver<Request>, responses: mpsc::Sender<Response>) {
    let mut pipeline = Pipeline::new();
    let mut scheduler = UpdateScheduler::default();
    let mut in_flight: Option<JoinHandle<SortOutput>> = None;
    let mut open = true;

    while open || in_flight.is_some() {
        tokio::select! {
            request = requests.recv(), if open => {
                let out = match request {
                    Some(Request::ViewUpdate { view_projection }) => {
                        if let Some(view) = scheduler.request(view_projection) {
                            in_flight = start_sort(&mut pipeline, &mut scheduler, view);
                        }
                        continue;
                    }
                    Some(Request::DecodeFile { bytes, persist_after_decode }) => {
                        match tokio::task::spawn_blocking(move || decode(&bytes)).await {
                            Ok(decoded) => {
                                vec![pipeline.finish_decode(decoded, persist_after_decode)]
                            }
                            Err(e) => {
                                log::error!("Decode task failed: {}", e);
                                vec![Response::DecodeFailed {
                                    error: FormatError::DecodeAborted(e.to_string()),
                                }]
                            }
                        }
                    }
                    Some(request @ Request::LoadCanonical { .. }) => pipeline.handle(request),
                    None => {
                        log::debug!("Request channel closed");
                        open = false;
                        continue;
                    }
                };
                if !deliver(&responses, out).await {
                    return;
                }
            }
            joined = join_in_flight(&mut in_flight) => {
                in_flight = None;
                match joined {
                    Ok((state, out)) => {
                        pipeline.restore_sorter(state);
                        if !deliver(&responses, out).await {
                            return;
                        }
                    }
                    Err(e) => log::error!("Depth sort task failed: {}", e),
                }
                if let Some(view) = scheduler.complete() {
                    in_flight = start_sort(&mut pipeline, &mut scheduler, view);
                }
            }
        }
    }
}

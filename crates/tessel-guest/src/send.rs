use std::future::Future;

use tessel_world::{
  FutureIncomingResponse, OptionExt, OutgoingHandler, PreconditionError, RequestOptions, poll,
};

use crate::error::GuestError;
use crate::request::{Request, Response};

/// Submit `request` and block until the response arrives.
pub fn send<H: OutgoingHandler + ?Sized>(
  host: &H,
  request: &Request,
) -> Result<Response, GuestError> {
  send_with_options(host, request, None)
}

pub fn send_with_options<H: OutgoingHandler + ?Sized>(
  host: &H,
  request: &Request,
  options: Option<RequestOptions>,
) -> Result<Response, GuestError> {
  let future = host.handle(request.to_outgoing()?, options)?;
  let response = future.block()??;
  Ok(response.into())
}

/// Submit `request` and wait for the response without blocking the thread.
pub async fn send_async<H: OutgoingHandler + ?Sized>(
  host: &H,
  request: &Request,
) -> Result<Response, GuestError> {
  let future = host.handle(request.to_outgoing()?, None)?;
  let response = future.wait().await??;
  Ok(response.into())
}

/// Submit every request up front, then wait on all of them together.
///
/// Results are in the order of `requests`. A request rejected at submission
/// does not stop the others.
pub fn send_all<H: OutgoingHandler + ?Sized>(
  host: &H,
  requests: &[Request],
) -> Vec<Result<Response, GuestError>> {
  let mut results: Vec<Option<Result<Response, GuestError>>> =
    Vec::with_capacity(requests.len());
  let mut in_flight: Vec<(usize, FutureIncomingResponse)> = Vec::new();

  for (index, request) in requests.iter().enumerate() {
    let submitted = request
      .to_outgoing()
      .and_then(|outgoing| host.handle(outgoing, None).map_err(GuestError::from));
    match submitted {
      Ok(future) => {
        results.push(None);
        in_flight.push((index, future));
      }
      Err(e) => results.push(Some(Err(e))),
    }
  }

  while !in_flight.is_empty() {
    let pollables: Vec<_> = in_flight.iter().map(|(_, f)| f.subscribe()).collect();
    let refs: Vec<_> = pollables.iter().collect();
    let ready = poll(&refs);

    // Highest first so earlier indices stay valid while removing.
    for position in ready.into_iter().rev() {
      let (index, mut future) = in_flight.swap_remove(position);
      results[index] = Some(take(&mut future));
    }
  }

  results
    .into_iter()
    .map(|result| result.unwrap_or_else(|| Err(PreconditionError::Reclaimed.into())))
    .collect()
}

fn take(future: &mut FutureIncomingResponse) -> Result<Response, GuestError> {
  let response = future.get()?.extract_some()??;
  Ok(response.into())
}

/// Drive a future to completion on the current thread.
///
/// The guest has one thread of control; this runs `send_async` style code
/// cooperatively on it.
pub fn block_on<F: Future>(future: F) -> F::Output {
  futures::executor::block_on(future)
}

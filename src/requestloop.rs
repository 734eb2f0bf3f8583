//! Request loop (T3). Strictly serial: one request fully completes —
//! including awaiting its tag future — before the next is accepted
//! (spec.md §4.T1/T2/T3, §5 "Suspension points"). This is the one
//! place allowed to block on I/O between requests; everything the
//! diff engine does happens on the thread pool underneath it.

use tokio::io::{AsyncBufRead, AsyncWrite};
use tracing::{debug, warn};

use crate::application::service::Application;
use crate::wire::request::read_request;
use crate::wire::response::write_response;

/// Drives requests from `input` to responses on `output` until EOF.
/// spec.md §7: a `parse-error` is logged and the request is dropped
/// silently — no response is emitted for it, and the loop moves on to
/// the next record.
pub async fn run<R, W>(app: &mut Application, input: &mut R, output: &mut W)
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    loop {
        let parsed = match read_request(input).await {
            Ok(Some(parsed)) => parsed,
            Ok(None) => {
                debug!("request stream closed, exiting loop");
                break;
            }
            Err(err) => {
                warn!(error = %err, "failed to read from request stream, exiting loop");
                break;
            }
        };

        let request = match parsed {
            Ok(request) => request,
            Err(err) => {
                warn!(error = %err, "dropping malformed request");
                continue;
            }
        };

        let response = app.handle_request(request).await;
        if let Err(err) = write_response(output, &response).await {
            warn!(error = %err, "failed to write response, exiting loop");
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::config::Options;
    use std::io::Cursor;

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn emits_one_response_per_well_formed_request() {
        let tmp = tempfile::tempdir().unwrap();
        gix::init(tmp.path()).unwrap();
        let dir = tmp.path().to_string_lossy().into_owned();

        let mut app = Application::new(Options::default());
        let mut input = Cursor::new(format!("a\t{dir}\0b\t{dir}\0").into_bytes());
        let mut output = Vec::new();

        run(&mut app, &mut input, &mut output).await;

        let records: Vec<&[u8]> = output.split(|&b| b == 0).filter(|r| !r.is_empty()).collect();
        assert_eq!(records.len(), 2);
        assert!(records[0].starts_with(b"a\t1\t"));
        assert!(records[1].starts_with(b"b\t1\t"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn malformed_request_is_dropped_without_a_response() {
        let mut app = Application::new(Options::default());
        // Empty id field is malformed (spec.md: "id" must be a
        // non-empty opaque byte string); the well-formed record that
        // follows it must still get a response.
        let mut input = Cursor::new(b"\t/tmp\0ok\t/does/not/exist\0".to_vec());
        let mut output = Vec::new();

        run(&mut app, &mut input, &mut output).await;

        let records: Vec<&[u8]> = output.split(|&b| b == 0).filter(|r| !r.is_empty()).collect();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0], b"ok\t0");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn responses_are_emitted_in_request_order() {
        let tmp_a = tempfile::tempdir().unwrap();
        let tmp_b = tempfile::tempdir().unwrap();
        gix::init(tmp_a.path()).unwrap();
        gix::init(tmp_b.path()).unwrap();

        let mut app = Application::new(Options::default());
        let mut input = Cursor::new(
            format!(
                "first\t{}\0second\t{}\0",
                tmp_a.path().display(),
                tmp_b.path().display()
            )
            .into_bytes(),
        );
        let mut output = Vec::new();

        run(&mut app, &mut input, &mut output).await;

        let records: Vec<&[u8]> = output.split(|&b| b == 0).filter(|r| !r.is_empty()).collect();
        assert!(records[0].starts_with(b"first\t"));
        assert!(records[1].starts_with(b"second\t"));
    }
}

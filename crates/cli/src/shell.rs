//! Line-oriented input loop

use std::future::Future;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use crate::app::{App, Flow};
use crate::command::parse;

/// Run commands read from `input` until it closes, `quit` is entered or
/// `shutdown` resolves.
///
/// Bad input and failed commands are reported and reading continues; a
/// broken input stream ends the loop. The caller saves the session
/// afterwards in every case.
pub async fn run_shell<R, F>(app: &App, mut input: R, shutdown: F)
where
    R: AsyncBufRead + Unpin,
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        let read = tokio::select! {
            read = input.read_until(b'\n', &mut buf) => read,
            _ = &mut shutdown => break,
        };

        match read {
            Ok(0) => {
                tracing::debug!("Input closed");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(error = %e, "Input stream failed");
                break;
            }
        }

        let line = match std::str::from_utf8(&buf) {
            Ok(line) => line,
            Err(e) => {
                tracing::warn!(error = %e, "Ignoring line that is not valid UTF-8");
                println!("Ignored a line that is not valid UTF-8");
                continue;
            }
        };

        let command = match parse(line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(e) => {
                println!("{}", e);
                continue;
            }
        };

        match app.handle(command).await {
            Ok(Flow::Continue(message)) => println!("{}", message),
            Ok(Flow::Quit) => break,
            Err(e) => {
                tracing::warn!(error = %e, "Command failed");
                println!("Error: {:#}", e);
            }
        }
    }
}

//! External middleware invocation.
//!
//! Middleware is a user-supplied executable treated as a pure function over
//! a payload: one JSON payload in on stdin, one JSON payload out on stdout,
//! exit code zero. Anything else is a failure and the caller keeps its
//! original payload.

use std::process::Stdio;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::error::MiddlewareError;
use crate::model::Payload;

/// Runs the middleware command over a payload and returns the transformed
/// payload.
///
/// The command is spawned with no arguments. Stdin is closed after the
/// payload is written so line-oriented tools terminate naturally; stderr is
/// captured and carried in the error on non-zero exit.
pub async fn execute(command: &str, payload: &Payload) -> Result<Payload, MiddlewareError> {
    let input = serde_json::to_vec(payload)?;

    let mut child = Command::new(command)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;

    if let Some(mut stdin) = child.stdin.take() {
        stdin.write_all(&input).await?;
        stdin.shutdown().await?;
    }

    let output = child.wait_with_output().await?;
    if !output.status.success() {
        return Err(MiddlewareError::Failed {
            code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        });
    }

    tracing::debug!(
        command,
        bytes = output.stdout.len(),
        "middleware completed"
    );

    Ok(serde_json::from_slice(&output.stdout)?)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::model::{RecordedResponse, RequestDetails};
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    fn script(dir: &TempDir, name: &str, contents: &str) -> String {
        let path = dir.path().join(name);
        std::fs::write(&path, contents).unwrap();
        let mut perms = std::fs::metadata(&path).unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&path, perms).unwrap();
        path.to_string_lossy().into_owned()
    }

    fn payload() -> Payload {
        Payload::new(
            RequestDetails {
                path: "/echo".into(),
                method: "POST".into(),
                destination: "api.test".into(),
                body: r#"{"v":1}"#.into(),
                ..Default::default()
            },
            RecordedResponse {
                status: 200,
                body: "original".into(),
                ..Default::default()
            },
        )
    }

    #[tokio::test]
    async fn identity_middleware_returns_payload_unchanged() {
        let dir = TempDir::new().unwrap();
        let cmd = script(&dir, "identity.sh", "#!/bin/sh\ncat\n");

        let input = payload();
        let output = execute(&cmd, &input).await.unwrap();
        assert_eq!(output, input);
    }

    #[tokio::test]
    async fn middleware_can_replace_the_response() {
        let dir = TempDir::new().unwrap();
        let cmd = script(
            &dir,
            "teapot.sh",
            "#!/bin/sh\ncat > /dev/null\nprintf '%s' '{\"response\":{\"status\":418,\"body\":\"teapot\",\"headers\":{}}}'\n",
        );

        let output = execute(&cmd, &payload()).await.unwrap();
        assert_eq!(output.response.status, 418);
        assert_eq!(output.response.body, "teapot");
    }

    #[tokio::test]
    async fn non_zero_exit_carries_status_and_stderr() {
        let dir = TempDir::new().unwrap();
        let cmd = script(&dir, "fail.sh", "#!/bin/sh\necho boom >&2\nexit 3\n");

        let err = execute(&cmd, &payload()).await.unwrap_err();
        match err {
            MiddlewareError::Failed { code, stderr } => {
                assert_eq!(code, Some(3));
                assert!(stderr.contains("boom"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn garbage_stdout_is_a_json_error() {
        let dir = TempDir::new().unwrap();
        let cmd = script(&dir, "garbage.sh", "#!/bin/sh\ncat > /dev/null\necho not-json\n");

        let err = execute(&cmd, &payload()).await.unwrap_err();
        assert!(matches!(err, MiddlewareError::Json(_)));
    }

    #[tokio::test]
    async fn missing_executable_is_a_spawn_error() {
        let err = execute("/nonexistent/middleware", &payload())
            .await
            .unwrap_err();
        assert!(matches!(err, MiddlewareError::Spawn(_)));
    }
}

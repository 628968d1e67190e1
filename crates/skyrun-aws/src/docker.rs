//! Docker CLI-backed [`ImageBuilder`].
//!
//! Shells out to the local `docker` binary: log in to the registry
//! with a fresh authorization token, build the executor image from a
//! generated context, push it. Requires a running Docker daemon.

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use skyrun_core::provider::ImageBuilder;
use skyrun_types::{Error, Result};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::error::map_sdk_err;

const DEFAULT_BASE_IMAGE: &str = "python:3.12-slim";

/// Executor entrypoint baked into the image. Downloads the bundle,
/// unpacks it, and runs the script (or a named function inside it)
/// with the positional arguments the dispatcher passes. When the
/// dispatcher sets `SKYRUN_LOG_GROUP`, every output line is also
/// written to that group, on top of the task definition's own log
/// routing.
const ENTRYPOINT_SOURCE: &str = r#"import importlib.util
import json
import os
import pathlib
import sys
import time
import uuid
import zipfile

import boto3


class LogMirror:
    """Copies output lines into an alternate log group."""

    def __init__(self, group):
        self.client = boto3.client("logs")
        self.group = group
        self.stream = os.environ.get("HOSTNAME") or f"skyrun-{uuid.uuid4().hex[:12]}"
        for call, kwargs in (
            (self.client.create_log_group, {"logGroupName": group}),
            (
                self.client.create_log_stream,
                {"logGroupName": group, "logStreamName": self.stream},
            ),
        ):
            try:
                call(**kwargs)
            except self.client.exceptions.ResourceAlreadyExistsException:
                pass

    def emit(self, line):
        self.client.put_log_events(
            logGroupName=self.group,
            logStreamName=self.stream,
            logEvents=[{"timestamp": int(time.time() * 1000), "message": line}],
        )


class Tee:
    def __init__(self, inner, mirror):
        self.inner = inner
        self.mirror = mirror

    def write(self, text):
        self.inner.write(text)
        for line in text.splitlines():
            if line:
                self.mirror.emit(line)

    def flush(self):
        self.inner.flush()


def run():
    bucket, key, script = sys.argv[1], sys.argv[2], sys.argv[3]
    method = sys.argv[4] if len(sys.argv) > 4 else None
    params = json.loads(sys.argv[5]) if len(sys.argv) > 5 else None

    group = os.environ.get("SKYRUN_LOG_GROUP")
    if group:
        mirror = LogMirror(group)
        sys.stdout = Tee(sys.stdout, mirror)
        sys.stderr = Tee(sys.stderr, mirror)

    workdir = pathlib.Path("/workspace")
    workdir.mkdir(exist_ok=True)
    bundle = workdir / "bundle.zip"
    boto3.client("s3").download_file(bucket, key, str(bundle))
    with zipfile.ZipFile(bundle) as archive:
        archive.extractall(workdir)

    target = workdir / script
    if method is None:
        code = compile(target.read_text(), str(target), "exec")
        exec(code, {"__name__": "__main__"})
        return
    spec = importlib.util.spec_from_file_location("job", target)
    module = importlib.util.module_from_spec(spec)
    spec.loader.exec_module(module)
    entry = getattr(module, method)
    if params is None:
        entry()
    else:
        entry(**params)


if __name__ == "__main__":
    run()
"#;

pub struct DockerImageBuilder {
    ecr: aws_sdk_ecr::Client,
    base_image: String,
}

impl DockerImageBuilder {
    pub fn new(ecr: aws_sdk_ecr::Client) -> Self {
        Self { ecr, base_image: DEFAULT_BASE_IMAGE.to_string() }
    }

    pub fn with_base_image(mut self, base_image: impl Into<String>) -> Self {
        self.base_image = base_image.into();
        self
    }

    async fn registry_login(&self) -> Result<()> {
        let response = self
            .ecr
            .get_authorization_token()
            .send()
            .await
            .map_err(|err| map_sdk_err(err, "fetching registry token"))?;
        let auth = response
            .authorization_data()
            .first()
            .ok_or_else(|| Error::provider("registry returned no authorization data"))?;
        let token = auth
            .authorization_token()
            .ok_or_else(|| Error::provider("registry token missing"))?;
        let endpoint = auth
            .proxy_endpoint()
            .ok_or_else(|| Error::provider("registry endpoint missing"))?;

        let decoded = BASE64
            .decode(token)
            .map_err(|e| Error::provider(format!("malformed registry token: {e}")))?;
        let decoded = String::from_utf8(decoded)
            .map_err(|e| Error::provider(format!("malformed registry token: {e}")))?;
        let password = decoded
            .split_once(':')
            .map(|(_, password)| password.to_string())
            .ok_or_else(|| Error::provider("registry token has no password part"))?;

        let mut child = Command::new("docker")
            .args(["login", "--username", "AWS", "--password-stdin", endpoint])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Error::provider(format!("starting docker login: {e}")))?;
        if let Some(stdin) = child.stdin.as_mut() {
            stdin
                .write_all(password.as_bytes())
                .await
                .map_err(|e| Error::provider(format!("writing registry password: {e}")))?;
        }
        let output = child
            .wait_with_output()
            .await
            .map_err(|e| Error::provider(format!("docker login: {e}")))?;
        if !output.status.success() {
            return Err(Error::provider(format!(
                "docker login failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(())
    }

    fn write_build_context(&self, dir: &Path, extra_commands: &[String]) -> Result<()> {
        let mut dockerfile = format!(
            "FROM {}\nRUN pip install --no-cache-dir boto3\n",
            self.base_image
        );
        for command in extra_commands {
            dockerfile.push_str("RUN ");
            dockerfile.push_str(command);
            dockerfile.push('\n');
        }
        dockerfile.push_str("COPY entrypoint.py /entrypoint.py\n");
        dockerfile.push_str("ENTRYPOINT [\"python\", \"/entrypoint.py\"]\n");

        std::fs::write(dir.join("Dockerfile"), dockerfile)?;
        std::fs::write(dir.join("entrypoint.py"), ENTRYPOINT_SOURCE)?;
        Ok(())
    }
}

async fn run_docker(description: &str, args: &[&str]) -> Result<()> {
    let output = Command::new("docker")
        .args(args)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| Error::provider(format!("{description}: {e}")))?;
    if !output.status.success() {
        return Err(Error::provider(format!(
            "{description} failed: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    Ok(())
}

#[async_trait]
impl ImageBuilder for DockerImageBuilder {
    async fn build_and_push(
        &self,
        repository_uri: &str,
        region: &str,
        extra_commands: &[String],
    ) -> Result<()> {
        tracing::info!(repository = repository_uri, region, "building executor image");
        self.registry_login().await?;

        let context = tempfile::tempdir()?;
        self.write_build_context(context.path(), extra_commands)?;

        let tag = format!("{repository_uri}:latest");
        let context_path = context.path().to_string_lossy().into_owned();
        run_docker("docker build", &["build", "-t", &tag, &context_path]).await?;
        run_docker("docker push", &["push", &tag]).await?;
        tracing::info!(repository = repository_uri, "executor image pushed");
        Ok(())
    }
}

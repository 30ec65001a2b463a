//! Shared test harness for integration tests.
//!
//! Provides fake `ffmpeg`/`ffprobe` shell scripts that speak just enough of
//! the real tools' protocol (`-version`, `-progress pipe:1` telemetry, output
//! as the last argument) to drive the conversion pipeline, plus
//! [`TestServer`] which starts Axum on a random port.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::TempDir;

use cg_av::ToolRegistry;
use cg_core::config::Config;
use cg_server::context::AppContext;
use cg_server::router::build_router;

/// How the fake engine behaves on the encode pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Engine {
    /// Emits three telemetry blocks (1s, 2s, 4s) and writes the output.
    Ok,
    /// Emits one block, prints a diagnostic and exits 1.
    FailEncode,
    /// Like `Ok` but sleeps before the final block.
    Slow,
}

/// Fake tool installation inside a temporary directory.
pub struct FakeTools {
    pub dir: TempDir,
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
    /// Every ffmpeg invocation appends its argument list here, one per line.
    pub log: PathBuf,
}

impl FakeTools {
    pub fn new(engine: Engine) -> Self {
        let dir = tempfile::tempdir().expect("failed to create tool dir");
        let log = dir.path().join("ffmpeg.log");

        let encode_tail = match engine {
            Engine::Ok => concat!(
                "  printf 'frame=1\\nout_time_us=1000000\\nprogress=continue\\n'\n",
                "  printf 'out_time_ms=2000\\nprogress=continue\\n'\n",
                "  printf 'out_time_us=4000000\\nprogress=end\\n'\n",
            ),
            Engine::FailEncode => concat!(
                "  printf 'out_time_us=1000000\\nprogress=continue\\n'\n",
                "  echo 'Invalid data found when processing input' >&2\n",
                "  exit 1\n",
            ),
            Engine::Slow => concat!(
                "  printf 'out_time_us=1000000\\nprogress=continue\\n'\n",
                "  sleep 3\n",
                "  printf 'out_time_us=4000000\\nprogress=end\\n'\n",
            ),
        };

        let ffmpeg_script = format!(
            concat!(
                "#!/bin/sh\n",
                "if [ \"$1\" = \"-version\" ]; then\n",
                "  echo 'ffmpeg version 6.1-fake'\n",
                "  exit 0\n",
                "fi\n",
                "echo \"$*\" >> '{log}'\n",
                "encode=0\n",
                "for arg in \"$@\"; do\n",
                "  if [ \"$arg\" = \"-progress\" ]; then encode=1; fi\n",
                "  last=\"$arg\"\n",
                "done\n",
                "if [ \"$encode\" = \"1\" ]; then\n",
                "{tail}",
                "fi\n",
                "printf 'GIF89a' > \"$last\"\n",
                "exit 0\n",
            ),
            log = log.display(),
            tail = encode_tail,
        );

        let ffmpeg = write_script(dir.path(), "ffmpeg", &ffmpeg_script);
        let ffprobe = write_script(
            dir.path(),
            "ffprobe",
            "#!/bin/sh\nif [ \"$1\" = \"-version\" ]; then echo 'ffprobe version 6.1-fake'; exit 0; fi\necho 4.000000\n",
        );

        Self {
            dir,
            ffmpeg,
            ffprobe,
            log,
        }
    }

    pub fn registry(&self) -> ToolRegistry {
        ToolRegistry::from_paths(&self.ffmpeg, Some(self.ffprobe.clone()))
    }

    /// Recorded ffmpeg invocations, excluding `-version` probes.
    pub fn invocations(&self) -> Vec<String> {
        std::fs::read_to_string(&self.log)
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }

    /// Palette path used by the first (palette) invocation.
    pub fn palette_path(&self) -> PathBuf {
        let calls = self.invocations();
        let first = calls.first().expect("palette pass was not run");
        PathBuf::from(first.split_whitespace().last().expect("empty invocation"))
    }
}

pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    std::fs::write(&path, body).expect("failed to write script");
    let mut perms = std::fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).unwrap();
    path
}

/// Write a stand-in input clip.
pub fn write_input(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, b"not really a video").expect("failed to write input");
    path
}

/// Config pointing at the fake tools and a private scratch directory.
pub fn test_config(tools: &FakeTools, work_dir: &Path) -> Config {
    let mut config = Config::default();
    config.tools.ffmpeg_path = Some(tools.ffmpeg.clone());
    config.tools.ffprobe_path = Some(tools.ffprobe.clone());
    config.jobs.work_dir = Some(work_dir.to_path_buf());
    config
}

/// A running server on a random port.
pub struct TestServer {
    pub ctx: AppContext,
    pub addr: SocketAddr,
    pub tools: FakeTools,
    pub work_dir: TempDir,
}

impl TestServer {
    pub async fn start(engine: Engine) -> Self {
        Self::start_with(engine, |_| {}).await
    }

    /// Start a server after letting `configure` adjust the config.
    pub async fn start_with(engine: Engine, configure: impl FnOnce(&mut Config)) -> Self {
        let tools = FakeTools::new(engine);
        let work_dir = tempfile::tempdir().expect("failed to create work dir");
        let mut config = test_config(&tools, work_dir.path());
        configure(&mut config);

        let ctx = AppContext::new(config, Arc::new(tools.registry()));
        let app = build_router(ctx.clone(), None);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind random port");
        let addr = listener.local_addr().expect("failed to get local addr");

        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });

        Self {
            ctx,
            addr,
            tools,
            work_dir,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

/// Parse an SSE body into `(event, data)` pairs, skipping comments.
pub fn parse_sse(body: &str) -> Vec<(String, serde_json::Value)> {
    let mut events = Vec::new();
    let mut name: Option<String> = None;
    let mut data = String::new();

    for line in body.lines() {
        if line.is_empty() {
            if let Some(event) = name.take() {
                let value = serde_json::from_str(&data).unwrap_or(serde_json::Value::Null);
                events.push((event, value));
            }
            data.clear();
        } else if let Some(rest) = line.strip_prefix("event:") {
            name = Some(rest.trim().to_string());
        } else if let Some(rest) = line.strip_prefix("data:") {
            data.push_str(rest.trim_start());
        }
    }
    if let Some(event) = name {
        let value = serde_json::from_str(&data).unwrap_or(serde_json::Value::Null);
        events.push((event, value));
    }
    events
}

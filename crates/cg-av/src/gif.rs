//! Two-pass GIF conversion using ffmpeg.
//!
//! The first pass samples the (trimmed) clip into a palette with
//! `palettegen`; the second maps every frame onto that palette with
//! `paletteuse` and Floyd-Steinberg dithering. Both passes must see the same
//! trim window, otherwise the palette is built from different frames than
//! the ones being encoded.

use std::fmt;
use std::path::Path;

use cg_core::events::ProgressEvent;
use cg_core::ConversionRequest;

use crate::command::ToolCommand;
use crate::palette::PaletteFile;
use crate::timerange::{effective_duration_ms, probe_duration_ms, TrimWindow};
use crate::tools::ToolRegistry;

/// Percent reported once the palette pass finishes.
pub const PALETTE_DONE_PERCENT: u8 = 10;

/// Pipeline state, logged on every transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Idle,
    ValidatingInputs,
    GeneratingPalette,
    Encoding,
    Done,
    Failed,
}

impl Stage {
    pub fn is_terminal(self) -> bool {
        matches!(self, Stage::Done | Stage::Failed)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Idle => "idle",
            Stage::ValidatingInputs => "validating_inputs",
            Stage::GeneratingPalette => "generating_palette",
            Stage::Encoding => "encoding",
            Stage::Done => "done",
            Stage::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// `fps` + non-upscaling, aspect-preserving Lanczos scale.
pub fn base_filter(fps: u32, width: u32) -> String {
    format!("fps={fps},scale='min({width},iw)':-1:flags=lanczos")
}

pub fn palette_filter(fps: u32, width: u32) -> String {
    format!("{},palettegen=stats_mode=diff", base_filter(fps, width))
}

pub fn encode_filter(fps: u32, width: u32) -> String {
    format!(
        "{}[x];[x][1:v]paletteuse=dither=floyd_steinberg",
        base_filter(fps, width)
    )
}

/// Arguments for the palette pass.
pub fn palette_args(request: &ConversionRequest, trim: &TrimWindow, palette: &Path) -> Vec<String> {
    let mut args = vec!["-hide_banner".to_string(), "-loglevel".into(), "error".into()];
    args.extend(trim.input_args());
    args.extend([
        "-i".to_string(),
        request.input().to_string_lossy().into_owned(),
        "-vf".into(),
        palette_filter(request.fps(), request.width()),
        "-y".into(),
        palette.to_string_lossy().into_owned(),
    ]);
    args
}

/// Arguments for the paletted encode pass.
pub fn encode_args(request: &ConversionRequest, trim: &TrimWindow, palette: &Path) -> Vec<String> {
    let mut args = vec!["-hide_banner".to_string(), "-loglevel".into(), "error".into()];
    args.extend(trim.input_args());
    args.extend([
        "-i".to_string(),
        request.input().to_string_lossy().into_owned(),
        "-i".into(),
        palette.to_string_lossy().into_owned(),
        "-lavfi".into(),
        encode_filter(request.fps(), request.width()),
        "-loop".into(),
        request.loop_mode().as_flag().to_string(),
        if request.overwrite() { "-y" } else { "-n" }.into(),
        request.output().to_string_lossy().into_owned(),
    ]);
    args
}

/// Maps encode telemetry onto the `[10, 100]` percent range.
#[derive(Debug, Clone)]
pub struct EncodeProgress {
    duration_ms: Option<u64>,
    last_percent: u8,
}

impl EncodeProgress {
    pub fn new(duration_ms: Option<u64>) -> Self {
        Self {
            duration_ms,
            last_percent: PALETTE_DONE_PERCENT,
        }
    }

    /// Percent for an elapsed output time. Never decreases; stays at 10
    /// while the duration or the elapsed time is unknown.
    pub fn percent(&mut self, out_time_ms: Option<u64>) -> u8 {
        let percent = match (out_time_ms, self.duration_ms) {
            (Some(out), Some(total)) if total > 0 => {
                let fraction = (out as f64 / total as f64).clamp(0.0, 1.0);
                PALETTE_DONE_PERCENT + (fraction * 90.0).floor() as u8
            }
            _ => PALETTE_DONE_PERCENT,
        };
        self.last_percent = self.last_percent.max(percent);
        self.last_percent
    }
}

/// Convert `request.input()` into an animated GIF at `request.output()`.
///
/// `on_progress` receives `palette 0`, `palette 10`, a series of `encode`
/// events and finally `done 100`. On failure the originating error is
/// returned unchanged and no `done` event is emitted. The temporary palette
/// is removed on every path.
pub async fn convert_to_gif(
    tools: &ToolRegistry,
    request: &ConversionRequest,
    mut on_progress: impl FnMut(ProgressEvent),
) -> cg_core::Result<()> {
    let mut run = Run {
        stage: Stage::Idle,
        input: request.input(),
    };

    let result = run.execute(tools, request, &mut on_progress).await;
    if let Err(ref e) = result {
        tracing::warn!(
            input = %request.input().display(),
            stage = %run.stage,
            "GIF conversion failed: {e}"
        );
        run.advance(Stage::Failed);
    }
    result
}

struct Run<'a> {
    stage: Stage,
    input: &'a Path,
}

impl Run<'_> {
    fn advance(&mut self, next: Stage) {
        tracing::debug!(
            input = %self.input.display(),
            "GIF stage {} -> {}",
            self.stage,
            next
        );
        self.stage = next;
    }

    async fn execute(
        &mut self,
        tools: &ToolRegistry,
        request: &ConversionRequest,
        on_progress: &mut impl FnMut(ProgressEvent),
    ) -> cg_core::Result<()> {
        self.advance(Stage::ValidatingInputs);
        tools.ensure_engine().await?;
        let trim = validate_inputs(request).await?;
        let ffmpeg = tools.ffmpeg()?.to_path_buf();

        let full_ms = if trim.duration_ms().is_some() {
            None
        } else {
            probe_duration_ms(tools, request.input()).await
        };
        let duration_ms = effective_duration_ms(full_ms, trim.start_ms(), trim.duration_ms());

        self.advance(Stage::GeneratingPalette);
        let palette = PaletteFile::create()?;
        on_progress(ProgressEvent::palette(0));

        tracing::info!(
            "GIF palette pass: {:?} (width={}, fps={}, duration_ms={:?})",
            request.input(),
            request.width(),
            request.fps(),
            duration_ms,
        );
        ToolCommand::new(ffmpeg.clone())
            .args(palette_args(request, &trim, palette.path()))
            .execute_checked()
            .await?;
        on_progress(ProgressEvent::palette(PALETTE_DONE_PERCENT));

        self.advance(Stage::Encoding);
        let mut mapper = EncodeProgress::new(duration_ms);
        ToolCommand::new(ffmpeg)
            .args(encode_args(request, &trim, palette.path()))
            .execute_with_progress(|block| {
                let out_time_ms = block.out_time_ms();
                let percent = mapper.percent(out_time_ms);
                on_progress(ProgressEvent::encode(percent, out_time_ms, duration_ms));
            })
            .await?;

        drop(palette);
        self.advance(Stage::Done);
        tracing::info!("GIF written: {:?}", request.output());
        on_progress(ProgressEvent::done(duration_ms));
        Ok(())
    }
}

async fn validate_inputs(request: &ConversionRequest) -> cg_core::Result<TrimWindow> {
    let input_is_file = tokio::fs::metadata(request.input())
        .await
        .map(|m| m.is_file())
        .unwrap_or(false);
    if !input_is_file {
        return Err(cg_core::Error::InputNotFound(request.input().to_path_buf()));
    }

    if let Some(parent) = request.output().parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }

    if !request.overwrite() && tokio::fs::try_exists(request.output()).await.unwrap_or(false) {
        return Err(cg_core::Error::OutputExists(request.output().to_path_buf()));
    }

    TrimWindow::resolve(request.start(), request.duration())
}

#[cfg(test)]
mod tests {
    use super::*;
    use cg_core::events::Phase;
    use cg_core::LoopMode;
    use std::path::PathBuf;

    fn request() -> ConversionRequest {
        ConversionRequest::new("in clip.mp4", "out/anim.gif", 320, 12).unwrap()
    }

    #[test]
    fn filters_match_engine_syntax() {
        assert_eq!(
            palette_filter(10, 480),
            "fps=10,scale='min(480,iw)':-1:flags=lanczos,palettegen=stats_mode=diff"
        );
        assert_eq!(
            encode_filter(10, 480),
            "fps=10,scale='min(480,iw)':-1:flags=lanczos[x];[x][1:v]paletteuse=dither=floyd_steinberg"
        );
    }

    #[test]
    fn trim_is_identical_in_both_passes() {
        let trim = TrimWindow::resolve(Some("1.5"), Some("2")).unwrap();
        let palette = PathBuf::from("/tmp/p.png");
        let a = palette_args(&request(), &trim, &palette);
        let b = encode_args(&request(), &trim, &palette);

        let trim_slice = |args: &[String]| {
            let i = args.iter().position(|a| a == "-i").unwrap();
            args[..i].to_vec()
        };
        assert_eq!(trim_slice(&a), trim_slice(&b));
        assert!(trim_slice(&a).ends_with(&[
            "-ss".to_string(),
            "1.500".into(),
            "-t".into(),
            "2.000".into()
        ]));
    }

    #[test]
    fn encode_args_carry_loop_and_overwrite_flags() {
        let trim = TrimWindow::default();
        let palette = PathBuf::from("/tmp/p.png");

        let args = encode_args(&request(), &trim, &palette);
        let loop_pos = args.iter().position(|a| a == "-loop").unwrap();
        assert_eq!(args[loop_pos + 1], "0");
        assert!(args.contains(&"-n".to_string()));
        assert_eq!(args.last().unwrap(), "out/anim.gif");

        let req = request().with_overwrite(true).with_loop_mode(LoopMode::Once);
        let args = encode_args(&req, &trim, &palette);
        let loop_pos = args.iter().position(|a| a == "-loop").unwrap();
        assert_eq!(args[loop_pos + 1], "1");
        assert!(args.contains(&"-y".to_string()));
        assert!(!args.contains(&"-n".to_string()));
    }

    #[test]
    fn palette_pass_always_overwrites_its_own_file() {
        let args = palette_args(&request(), &TrimWindow::default(), Path::new("/tmp/p.png"));
        let n = args.len();
        assert_eq!(args[n - 2], "-y");
        assert_eq!(args[n - 1], "/tmp/p.png");
    }

    #[test]
    fn encode_progress_scales_into_10_to_100() {
        let mut p = EncodeProgress::new(Some(4000));
        assert_eq!(p.percent(Some(0)), 10);
        assert_eq!(p.percent(Some(1000)), 32);
        assert_eq!(p.percent(Some(2000)), 55);
        assert_eq!(p.percent(Some(4000)), 100);
        assert_eq!(p.percent(Some(9000)), 100);
    }

    #[test]
    fn encode_progress_never_decreases() {
        let mut p = EncodeProgress::new(Some(4000));
        assert_eq!(p.percent(Some(2000)), 55);
        assert_eq!(p.percent(Some(1000)), 55);
        assert_eq!(p.percent(None), 55);
    }

    #[test]
    fn encode_progress_frozen_without_duration() {
        let mut p = EncodeProgress::new(None);
        assert_eq!(p.percent(Some(1000)), 10);
        assert_eq!(p.percent(Some(99_000)), 10);

        let mut p = EncodeProgress::new(Some(0));
        assert_eq!(p.percent(Some(1000)), 10);
    }

    #[test]
    fn stage_display() {
        assert_eq!(Stage::GeneratingPalette.to_string(), "generating_palette");
        assert!(Stage::Failed.is_terminal());
        assert!(!Stage::Encoding.is_terminal());
    }

    #[tokio::test]
    async fn missing_engine_fails_before_input_checks() {
        let tools = ToolRegistry::from_paths("/nonexistent/ffmpeg-xyz", None);
        let mut events = Vec::new();
        let err = convert_to_gif(&tools, &request(), |e| events.push(e))
            .await
            .unwrap_err();
        assert!(matches!(err, cg_core::Error::EngineUnavailable(_)));
        assert!(events.is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn missing_input_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let tools = ToolRegistry::from_paths("true", None);
        let req = ConversionRequest::new(dir.path().join("nope.mp4"), dir.path().join("o.gif"), 320, 10)
            .unwrap();
        let err = convert_to_gif(&tools, &req, |_| {}).await.unwrap_err();
        assert!(matches!(err, cg_core::Error::InputNotFound(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn existing_output_is_rejected_without_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.mp4");
        let output = dir.path().join("out.gif");
        std::fs::write(&input, b"video").unwrap();
        std::fs::write(&output, b"old").unwrap();

        let tools = ToolRegistry::from_paths("true", None);
        let req = ConversionRequest::new(&input, &output, 320, 10).unwrap();
        for _ in 0..2 {
            let mut events = Vec::new();
            let err = convert_to_gif(&tools, &req, |e| events.push(e)).await.unwrap_err();
            assert!(matches!(err, cg_core::Error::OutputExists(_)));
            assert!(events.iter().all(|e| e.phase != Phase::Done));
        }
        assert_eq!(std::fs::read(&output).unwrap(), b"old");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn creates_missing_output_parent() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.mp4");
        std::fs::write(&input, b"video").unwrap();
        let output = dir.path().join("nested/deeper/out.gif");

        // `true` exits 0 without writing anything, which is enough to walk
        // the whole state machine.
        let tools = ToolRegistry::from_paths("true", None);
        let req = ConversionRequest::new(&input, &output, 320, 10).unwrap();
        let mut events = Vec::new();
        convert_to_gif(&tools, &req, |e| events.push(e)).await.unwrap();

        assert!(output.parent().unwrap().is_dir());
        let percents: Vec<u8> = events.iter().map(|e| e.percent).collect();
        assert_eq!(percents, vec![0, 10, 100]);
        assert_eq!(events.last().unwrap().phase, Phase::Done);
    }
}

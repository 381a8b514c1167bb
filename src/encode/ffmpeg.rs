use std::ffi::OsString;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};

use crate::export::schedule::Capture;
use crate::foundation::error::{VedError, VedResult};

/// Encoder settings for one export.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct MuxOptions {
    /// Encoder executable, looked up on `PATH`.
    pub program: String,
    /// Container passed as `-f`. Path outputs default to the file extension; writer outputs
    /// use the format given with the target.
    pub format: Option<String>,
    pub video_codec: String,
    pub audio_codec: String,
    pub pixel_format: Option<String>,
    pub crf: Option<u8>,
    /// Passed through verbatim, after the codec flags and before the output.
    pub extra_args: Vec<String>,
    pub overwrite: bool,
    /// Kill the encoder if it has not exited after this long.
    pub timeout: Option<Duration>,
    /// Directory the per-export staging directory is created in. Defaults to the system
    /// temp dir.
    pub temp_root: Option<PathBuf>,
}

impl Default for MuxOptions {
    fn default() -> Self {
        Self {
            program: "ffmpeg".to_owned(),
            format: None,
            video_codec: "libx264".to_owned(),
            audio_codec: "aac".to_owned(),
            pixel_format: Some("yuv420p".to_owned()),
            crf: Some(23),
            extra_args: Vec::new(),
            overwrite: true,
            timeout: None,
            temp_root: None,
        }
    }
}

impl MuxOptions {
    /// Stream-copy both video (PNG) and audio (raw PCM). Useful for lossless checks.
    pub fn copy() -> Self {
        Self {
            video_codec: "copy".to_owned(),
            audio_codec: "copy".to_owned(),
            pixel_format: None,
            crf: None,
            ..Self::default()
        }
    }
}

/// Where the muxed container goes.
pub enum OutputTarget<'a> {
    /// Written by the encoder itself.
    Path(&'a Path),
    /// Read from the encoder's stdout and copied into `writer` once it exits.
    Writer {
        writer: &'a mut dyn Write,
        format: &'a str,
    },
}

impl std::fmt::Debug for OutputTarget<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Path(p) => f.debug_tuple("Path").field(p).finish(),
            Self::Writer { format, .. } => f
                .debug_struct("Writer")
                .field("format", format)
                .finish_non_exhaustive(),
        }
    }
}

/// Output half of the argument list.
#[derive(Clone, Copy, Debug)]
enum Output<'a> {
    File(&'a Path),
    Pipe(&'a str),
}

pub fn is_ffmpeg_on_path() -> bool {
    program_on_path("ffmpeg")
}

fn program_on_path(program: &str) -> bool {
    Command::new(program)
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

pub fn ensure_parent_dir(path: &Path) -> VedResult<()> {
    if let Some(parent) = path.parent() {
        use anyhow::Context as _;
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create output directory '{}'", parent.display()))?;
    }
    Ok(())
}

/// Runs one encoder process over a finished [`Capture`].
#[derive(Clone, Debug, Default)]
pub struct Muxer {
    opts: MuxOptions,
}

impl Muxer {
    pub fn new(opts: MuxOptions) -> Self {
        Self { opts }
    }

    pub fn options(&self) -> &MuxOptions {
        &self.opts
    }

    /// Encode `capture` into `target`.
    ///
    /// Audio streams are staged as raw PCM files in a fresh temporary directory which is
    /// removed before this returns, whether or not the encoder succeeded.
    #[tracing::instrument(skip(self, capture, target), fields(frames = capture.frames.frame_count(), audio = capture.audio.len()))]
    pub fn run(&self, capture: &Capture, target: OutputTarget<'_>) -> VedResult<()> {
        if capture.frames.is_empty() {
            return Err(VedError::config("nothing to encode: capture has no frames"));
        }
        if let OutputTarget::Path(path) = &target {
            ensure_parent_dir(path)?;
            if !self.opts.overwrite && path.exists() {
                return Err(VedError::config(format!(
                    "output file '{}' already exists",
                    path.display()
                )));
            }
        }
        if !program_on_path(&self.opts.program) {
            return Err(VedError::EncoderUnavailable(format!(
                "'{}' was not found on PATH",
                self.opts.program
            )));
        }

        let mut builder = tempfile::Builder::new();
        builder.prefix("ved-");
        let dir = match &self.opts.temp_root {
            Some(root) => builder.tempdir_in(root)?,
            None => builder.tempdir()?,
        };
        let result = self.run_in(dir.path(), capture, target);
        let dir_path = dir.path().to_path_buf();
        if let Err(e) = dir.close() {
            tracing::warn!(dir = %dir_path.display(), error = %e, "failed to remove temp dir");
        }
        result
    }

    fn run_in(&self, tmp: &Path, capture: &Capture, target: OutputTarget<'_>) -> VedResult<()> {
        let mut audio_paths = Vec::with_capacity(capture.audio.len());
        for (i, stream) in capture.audio.iter().enumerate() {
            let path = tmp.join(format!("audio_{i}.{}", stream.format.pcm_format()));
            std::fs::write(&path, &stream.data)?;
            audio_paths.push(path);
        }

        let (output, writer) = match target {
            OutputTarget::Path(path) => (Output::File(path), None),
            OutputTarget::Writer { writer, format } => (Output::Pipe(format), Some(writer)),
        };
        let args = build_args(&self.opts, capture, &audio_paths, output);
        tracing::debug!(program = %self.opts.program, ?args, "spawning encoder");

        let mut child = Command::new(&self.opts.program)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(if writer.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                VedError::EncoderUnavailable(format!(
                    "failed to spawn '{}': {e}",
                    self.opts.program
                ))
            })?;

        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let frames = capture.frames.bytes();

        let (status, fed, out, err) = std::thread::scope(|s| {
            let feeder = s.spawn(move || -> std::io::Result<()> {
                if let Some(mut stdin) = stdin {
                    stdin.write_all(frames)?;
                }
                Ok(())
            });
            let out_reader = s.spawn(move || drain(stdout));
            let err_reader = s.spawn(move || drain(stderr));

            let status = wait(&mut child, self.opts.timeout);
            let fed = feeder
                .join()
                .unwrap_or_else(|_| Err(std::io::Error::other("stdin writer panicked")));
            let out = out_reader.join().unwrap_or_default();
            let err = err_reader.join().unwrap_or_default();
            (status, fed, out, err)
        });

        let status = status?;
        let stderr = String::from_utf8_lossy(&err);
        if !stderr.trim().is_empty() {
            return Err(VedError::encoder_failed(stderr.trim()));
        }
        if !status.success() {
            return Err(VedError::encoder_failed(format!(
                "{} exited with status {status}",
                self.opts.program
            )));
        }
        fed.map_err(|e| VedError::encoder_failed(format!("failed to write frames: {e}")))?;

        if let Some(writer) = writer {
            writer.write_all(&out)?;
            writer.flush()?;
        }
        Ok(())
    }
}

fn drain(pipe: Option<impl Read>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        // a read error leaves whatever arrived so far
        let _ = pipe.read_to_end(&mut buf);
    }
    buf
}

fn wait(child: &mut std::process::Child, timeout: Option<Duration>) -> VedResult<ExitStatus> {
    let Some(timeout) = timeout else {
        return Ok(child.wait()?);
    };
    let started = Instant::now();
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(status);
        }
        if started.elapsed() >= timeout {
            tracing::warn!(?timeout, "encoder timed out, killing it");
            child.kill()?;
            child.wait()?;
            return Err(VedError::EncoderTimeout(timeout));
        }
        std::thread::sleep(Duration::from_millis(10));
    }
}

/// Full encoder argument list, without the program name.
fn build_args(
    opts: &MuxOptions,
    capture: &Capture,
    audio_paths: &[PathBuf],
    output: Output<'_>,
) -> Vec<OsString> {
    let mut args: Vec<OsString> = Vec::new();
    let fps = capture.fps.to_string();

    push(&mut args, &[if opts.overwrite { "-y" } else { "-n" }]);
    push(&mut args, &["-loglevel", "error"]);
    push(
        &mut args,
        &["-f", "image2pipe", "-c:v", "png", "-framerate", fps.as_str(), "-i", "pipe:0"],
    );

    for (stream, path) in capture.audio.iter().zip(audio_paths) {
        let delay = format!("{:.6}", stream.delay(capture.start));
        let rate = stream.sample_rate.to_string();
        let channels = stream.format.channels.to_string();
        push(
            &mut args,
            &[
                "-itsoffset",
                delay.as_str(),
                "-f",
                stream.format.pcm_format(),
                "-ar",
                rate.as_str(),
                "-ac",
                channels.as_str(),
                "-i",
            ],
        );
        args.push(path.as_os_str().to_owned());
    }

    push(&mut args, &["-map", "0:v:0"]);
    for i in 0..audio_paths.len() {
        let map = format!("{}:a:0", i + 1);
        push(&mut args, &["-map", map.as_str()]);
    }

    push(&mut args, &["-c:v", opts.video_codec.as_str()]);
    if let Some(pix) = &opts.pixel_format {
        push(&mut args, &["-pix_fmt", pix.as_str()]);
    }
    if let Some(crf) = opts.crf {
        let crf = crf.to_string();
        push(&mut args, &["-crf", crf.as_str()]);
    }
    if !audio_paths.is_empty() {
        push(&mut args, &["-c:a", opts.audio_codec.as_str()]);
    }
    if opts.video_codec != "copy" {
        push(&mut args, &["-r", fps.as_str()]);
    }
    args.extend(opts.extra_args.iter().map(OsString::from));

    match output {
        Output::File(path) => {
            if let Some(format) = &opts.format {
                push(&mut args, &["-f", format.as_str()]);
            }
            args.push(path.as_os_str().to_owned());
        }
        Output::Pipe(format) => {
            let format = opts.format.as_deref().unwrap_or(format);
            push(&mut args, &["-f", format]);
            if matches!(format, "mp4" | "mov" | "ismv") {
                push(&mut args, &["-movflags", "frag_keyframe+empty_moov"]);
            }
            push(&mut args, &["-max_interleave_delta", "0", "pipe:1"]);
        }
    }
    args
}

fn push(args: &mut Vec<OsString>, items: &[&str]) {
    args.extend(items.iter().map(OsString::from));
}

use std::path::PathBuf;

use ved::project::{ContentSpec, LayerEntry};
use ved::{ProjectFile, Rect, Rgba8};

fn exe() -> PathBuf {
    std::env::var_os("CARGO_BIN_EXE_ved")
        .map(PathBuf::from)
        .unwrap_or_else(|| {
            let mut p = PathBuf::from("target").join("debug");
            p.push(if cfg!(windows) { "ved.exe" } else { "ved" });
            p
        })
}

fn write_project(dir: &std::path::Path) -> PathBuf {
    let project = ProjectFile {
        width: 4,
        height: 4,
        background: Rgba8::new(255, 0, 255, 255),
        layers: vec![LayerEntry {
            offset: 0.5,
            duration: Some(1.0),
            output_audio: true,
            content: ContentSpec::Solid {
                color: Rgba8::new(0, 0, 255, 255),
                rect: Some(Rect::new(0.0, 0.0, 2.0, 4.0)),
            },
        }],
    };
    let path = dir.join("project.json");
    let f = std::fs::File::create(&path).unwrap();
    serde_json::to_writer_pretty(f, &project).unwrap();
    path
}

#[test]
fn cli_frame_writes_png() {
    let dir = tempfile::tempdir().unwrap();
    let project = write_project(dir.path());
    let out = dir.path().join("nested").join("frame.png");

    let status = std::process::Command::new(exe())
        .args(["frame", "--time", "1.0", "--in"])
        .arg(&project)
        .arg("--out")
        .arg(&out)
        .status()
        .unwrap();
    assert!(status.success());

    let img = image::open(&out).unwrap().to_rgba8();
    assert_eq!(img.dimensions(), (4, 4));
    assert_eq!(img.get_pixel(0, 0).0, [0, 0, 255, 255]);
    assert_eq!(img.get_pixel(3, 0).0, [255, 0, 255, 255]);
}

#[test]
fn cli_reports_bad_project() {
    let dir = tempfile::tempdir().unwrap();
    let project = dir.path().join("broken.json");
    std::fs::write(&project, r#"{"width": 0, "height": 4}"#).unwrap();

    let output = std::process::Command::new(exe())
        .args(["frame", "--in"])
        .arg(&project)
        .args(["--out", "unused.png"])
        .output()
        .unwrap();
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("width/height"));
}

#[test]
fn cli_render_writes_media() {
    if !ved::is_ffmpeg_on_path() {
        eprintln!("ffmpeg not found, skipping");
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let project = write_project(dir.path());
    let out = dir.path().join("out.mp4");

    let status = std::process::Command::new(exe())
        .args(["render", "--fps", "10", "--in"])
        .arg(&project)
        .arg("--out")
        .arg(&out)
        .status()
        .unwrap();
    assert!(status.success());
    assert!(std::fs::metadata(&out).unwrap().len() > 0);
}

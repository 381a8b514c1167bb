use std::process::Command;

use ved::{
    AudioFormat, Constant, Fps, Layer, LayerRef, Media, MuxOptions, OutputTarget, PcmSource,
    RecordOpts, Rgba8, Silence, Solid, Timeline, VedError,
};

/// Split concatenated PNG files at their `IEND` chunks.
fn split_pngs(bytes: &[u8]) -> Vec<&[u8]> {
    const IEND: &[u8] = b"IEND\xae\x42\x60\x82";
    let mut out = Vec::new();
    let mut start = 0;
    let mut i = 0;
    while i + IEND.len() <= bytes.len() {
        if &bytes[i..i + IEND.len()] == IEND {
            out.push(&bytes[start..i + IEND.len()]);
            start = i + IEND.len();
            i = start;
        } else {
            i += 1;
        }
    }
    out
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn mono16(rate: u32) -> AudioFormat {
    AudioFormat::new(1, 16, rate).unwrap()
}

#[test]
fn frame_count_is_boundary_inclusive() {
    let bg = Rgba8::new(0, 0, 0, 255);
    let mut tl = Timeline::new(4, 4, bg).unwrap();
    tl.add_layer(0.0, Layer::new(2.0, Solid::full(bg)).unwrap())
        .unwrap();
    tl.add_layer(0.0, Layer::new(2.0, Silence::new(mono16(8_000))).unwrap())
        .unwrap();

    let opts = RecordOpts::default().with_rates(Fps::integer(30).unwrap(), 8_000);
    let capture = tl.capture(&opts).unwrap();

    // floor(2 * 30) + 1
    assert_eq!(capture.frames.frame_count(), 61);
    let pngs = split_pngs(capture.frames.bytes());
    assert_eq!(pngs.len(), 61);
    for png in pngs {
        let img = image::load_from_memory(png).unwrap().to_rgba8();
        assert_eq!(img.dimensions(), (4, 4));
        assert!(img.pixels().all(|p| p.0 == [0, 0, 0, 255]));
    }
}

#[test]
fn fractional_frame_rate_capture() {
    let mut tl = Timeline::new(2, 2, Rgba8::BLACK).unwrap();
    tl.add_layer(0.0, Layer::new(1.0, Solid::full(Rgba8::BLACK)).unwrap())
        .unwrap();
    let opts = RecordOpts::default().with_rates(Fps::new(30_000, 1001).unwrap(), 48_000);
    let capture = tl.capture(&opts).unwrap();
    // floor(1 * 29.97) + 1
    assert_eq!(capture.frames.frame_count(), 30);
}

#[test]
fn two_audio_layers_make_two_offset_streams() {
    let mut tl = Timeline::new(2, 2, Rgba8::BLACK).unwrap();
    let a: LayerRef = Layer::new(1.0, Constant::new(0.5, mono16(8_000)))
        .unwrap()
        .into();
    let b: LayerRef = Layer::new(0.5, Constant::new(-0.25, AudioFormat::new(2, 8, 8_000).unwrap()))
        .unwrap()
        .into();
    tl.add_layer(0.25, a.clone()).unwrap();
    tl.add_layer(1.0, b.clone()).unwrap();
    tl.add_layer(
        0.0,
        Layer::new(1.5, Constant::new(1.0, mono16(8_000)))
            .unwrap()
            .with_output_audio(false),
    )
    .unwrap();

    let opts = RecordOpts::default().with_rates(Fps::integer(10).unwrap(), 8_000);
    let capture = tl.capture(&opts).unwrap();

    assert_eq!(capture.audio.len(), 2);
    let sa = capture.stream(a.id()).unwrap();
    let sb = capture.stream(b.id()).unwrap();
    assert_eq!(sa.start_time, 0.25);
    assert_eq!(sb.start_time, 1.0);
    assert_eq!(sa.delay(capture.start), 0.25);

    // [0.25, 1.25) and [1.0, 1.5) at 8 kHz
    assert_eq!(sa.sample_count(), 8_000);
    assert_eq!(sb.sample_count(), 4_000);
    assert_eq!(sb.data.len(), 4_000 * 2);

    assert_eq!(&sa.data[..2], &16_384i16.to_le_bytes());
    assert_eq!(sb.data[0] as i8, -32);

    // capture leaves every layer inactive
    assert!(!a.borrow().unwrap().is_active());
    assert!(!b.borrow().unwrap().is_active());
}

#[test]
fn media_audio_keeps_its_length_at_any_export_rate() {
    // one second of 100 Hz PCM, frame i holding the raw value i
    let data: Vec<u8> = (0..100i16).flat_map(i16::to_le_bytes).collect();
    let media = Media::new(PcmSource::new(mono16(100), data));

    let mut tl = Timeline::new(2, 2, Rgba8::BLACK).unwrap();
    let layer: LayerRef = media.into_layer().unwrap().into();
    tl.add_layer(0.0, layer.clone()).unwrap();

    for (rate, every) in [(200u32, 1usize), (50, 2)] {
        let opts = RecordOpts::default().with_rates(Fps::integer(10).unwrap(), rate);
        let capture = tl.capture(&opts).unwrap();
        let stream = capture.stream(layer.id()).unwrap();
        assert_eq!(stream.sample_rate, rate);
        assert_eq!(stream.sample_count(), rate as usize, "one second at {rate} Hz");

        let values: Vec<i16> = stream
            .data
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]))
            .collect();
        let expected: Vec<i16> = (0..rate as usize)
            .map(|k| (k * 100 / rate as usize) as i16)
            .collect();
        assert_eq!(values, expected, "every {every} source frame(s)");
    }
}

#[test]
fn partial_range_offsets_against_export_start() {
    let mut tl = Timeline::new(2, 2, Rgba8::BLACK).unwrap();
    let early: LayerRef = Layer::new(2.0, Constant::new(0.1, mono16(100)))
        .unwrap()
        .into();
    let late: LayerRef = Layer::new(1.0, Constant::new(0.1, mono16(100)))
        .unwrap()
        .into();
    tl.add_layer(0.0, early.clone()).unwrap();
    tl.add_layer(1.5, late.clone()).unwrap();

    let opts = RecordOpts::default()
        .with_rates(Fps::integer(10).unwrap(), 100)
        .with_range(1.0, Some(2.0));
    let capture = tl.capture(&opts).unwrap();

    assert_eq!(capture.frames.frame_count(), 11);
    assert_eq!(capture.stream(early.id()).unwrap().delay(capture.start), 0.0);
    assert_eq!(capture.stream(late.id()).unwrap().delay(capture.start), 0.5);
}

#[test]
fn invalid_ranges_are_config_errors() {
    let mut tl = Timeline::new(2, 2, Rgba8::BLACK).unwrap();
    let err = tl
        .capture(&RecordOpts::default().with_range(2.0, Some(1.0)))
        .unwrap_err();
    assert!(matches!(err, VedError::Config(_)), "{err}");
}

#[test]
fn constant_audio_round_trips_through_ffmpeg() {
    init_tracing();
    if !ved::is_ffmpeg_on_path() {
        eprintln!("ffmpeg not found, skipping");
        return;
    }

    let mut tl = Timeline::new(2, 2, Rgba8::BLACK).unwrap();
    tl.add_layer(0.0, Layer::new(0.01, Constant::new(0.5, mono16(11_025))).unwrap())
        .unwrap();

    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("roundtrip.mkv");
    let opts = RecordOpts::default()
        .with_rates(Fps::integer(30).unwrap(), 11_025)
        .with_mux(MuxOptions::copy());
    let stats = tl.record(&opts, OutputTarget::Path(&out)).unwrap();
    assert_eq!(stats.frames, 1);
    assert_eq!(stats.audio_streams, 1);

    let decoded = Command::new("ffmpeg")
        .args(["-v", "error", "-i"])
        .arg(&out)
        .args(["-map", "0:a:0", "-f", "s16le", "-acodec", "pcm_s16le", "pipe:1"])
        .output()
        .unwrap();
    assert!(decoded.status.success(), "{}", String::from_utf8_lossy(&decoded.stderr));

    let samples: Vec<i16> = decoded
        .stdout
        .chunks_exact(2)
        .map(|b| i16::from_le_bytes([b[0], b[1]]))
        .collect();
    // floor(0.01 * 11025) + 1
    assert_eq!(samples.len(), 111);
    assert!(samples.iter().all(|s| (i32::from(*s) - 16_384).abs() <= 1));
}

#[test]
fn streams_container_into_a_writer() {
    if !ved::is_ffmpeg_on_path() {
        eprintln!("ffmpeg not found, skipping");
        return;
    }

    let mut tl = Timeline::new(2, 2, Rgba8::new(255, 0, 255, 255)).unwrap();
    tl.add_layer(0.0, Layer::new(0.1, Constant::new(0.0, mono16(8_000))).unwrap())
        .unwrap();
    let opts = RecordOpts::default()
        .with_rates(Fps::integer(10).unwrap(), 8_000)
        .with_mux(MuxOptions::copy());

    let mut buf = Vec::new();
    tl.record(
        &opts,
        OutputTarget::Writer {
            writer: &mut buf,
            format: "matroska",
        },
    )
    .unwrap();
    assert!(buf.starts_with(&[0x1a, 0x45, 0xdf, 0xa3]));
}

#[test]
fn encoder_errors_carry_stderr() {
    init_tracing();
    if !ved::is_ffmpeg_on_path() {
        eprintln!("ffmpeg not found, skipping");
        return;
    }

    let mut tl = Timeline::new(2, 2, Rgba8::BLACK).unwrap();
    tl.add_layer(0.0, Layer::new(0.1, Solid::full(Rgba8::BLACK)).unwrap())
        .unwrap();
    let dir = tempfile::tempdir().unwrap();
    let opts = RecordOpts::default().with_mux(MuxOptions {
        extra_args: vec!["-definitely_not_an_option".to_owned()],
        temp_root: Some(dir.path().to_path_buf()),
        ..MuxOptions::copy()
    });

    let err = tl
        .record(&opts, OutputTarget::Path(&dir.path().join("x.mkv")))
        .unwrap_err();
    match err {
        VedError::EncoderFailed { stderr } => assert!(!stderr.is_empty()),
        other => panic!("unexpected error: {other}"),
    }

    let leftovers: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|n| n.starts_with("ved-"))
        .collect();
    assert!(leftovers.is_empty(), "{leftovers:?}");
}

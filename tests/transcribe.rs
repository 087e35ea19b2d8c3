use approx::assert_abs_diff_eq;
use intonation::transcribe::{
    spawn_transcription, AudioBuffer, CancelToken, MelodyTranscriber, TranscribeOptions, Transcription,
};
use intonation::Error;

const SAMPLE_RATE: u32 = 44100;

/// Phase-continuous tone sequence. A frequency of zero is silence.
fn tones(parts: &[(f32, f32)]) -> Vec<f32> {
    let mut signal = Vec::new();
    let mut phase = 0.0f32;
    for &(frequency, seconds) in parts {
        let len = (seconds * SAMPLE_RATE as f32).round() as usize;
        for _ in 0..len {
            if frequency > 0.0 {
                signal.push(0.5 * phase.sin());
                phase += 2.0 * std::f32::consts::PI * frequency / SAMPLE_RATE as f32;
                if phase > 2.0 * std::f32::consts::PI {
                    phase -= 2.0 * std::f32::consts::PI;
                }
            } else {
                signal.push(0.0);
                phase = 0.0;
            }
        }
    }
    signal
}

fn transcribe(samples: Vec<f32>, options: TranscribeOptions) -> (Transcription, Vec<f32>) {
    let audio = AudioBuffer::mono(SAMPLE_RATE, samples).unwrap();
    let mut progress = Vec::new();
    let transcription = MelodyTranscriber::new(options)
        .transcribe(&audio, |p| progress.push(p))
        .unwrap();
    (transcription, progress)
}

fn midis(transcription: &Transcription) -> Vec<u8> {
    transcription.notes.iter().map(|n| n.midi).collect()
}

#[test]
fn silence_transcribes_to_nothing() {
    let (transcription, progress) = transcribe(vec![0.0; 2 * SAMPLE_RATE as usize], TranscribeOptions::default());
    assert!(transcription.notes.is_empty());
    assert!(transcription.pitch_curve.is_empty());
    assert_eq!(progress.last(), Some(&100.0));
    assert!(progress.windows(2).all(|w| w[0] < w[1]));
}

#[test]
fn two_tones_around_silence() {
    let signal = tones(&[(261.63, 1.0), (0.0, 1.0), (329.63, 1.0)]);
    let (transcription, progress) = transcribe(signal, TranscribeOptions::default());

    assert_eq!(midis(&transcription), vec![60, 64], "{:?}", transcription.notes);
    let (c4, e4) = (transcription.notes[0], transcription.notes[1]);
    assert!((c4.duration - 1.0).abs() < 0.2, "{:?}", c4);
    assert!((e4.duration - 1.0).abs() < 0.2, "{:?}", e4);
    assert!(c4.time + c4.duration < 1.1);
    assert!(e4.time > 1.8 && e4.time < 2.1, "{:?}", e4);
    assert_abs_diff_eq!(c4.frequency, 261.63, epsilon = 2.6);

    assert!(!transcription.pitch_curve.is_empty());
    assert!(transcription
        .pitch_curve
        .iter()
        .all(|p| (p.frequency / 261.63 - 1.0).abs() < 0.06 || (p.frequency / 329.63 - 1.0).abs() < 0.06));
    assert!(transcription.pitch_curve.windows(2).all(|w| w[0].time <= w[1].time));

    assert!(progress.contains(&10.0));
    assert!(progress.contains(&20.0));
    assert!(progress.contains(&95.0));
    assert_eq!(progress.last(), Some(&100.0));
}

#[test]
fn short_blip_stays_inside_note() {
    let signal = tones(&[(261.63, 1.0), (329.63, 0.02), (261.63, 1.0)]);
    let (transcription, _) = transcribe(signal, TranscribeOptions::default());
    assert_eq!(midis(&transcription), vec![60], "{:?}", transcription.notes);
    assert!(transcription.notes[0].duration > 1.8);
}

#[test]
fn onset_after_silence_is_on_time() {
    for rate in [28.0, 40.0, 60.0] {
        let options = TranscribeOptions {
            analysis_rate: rate,
            ..TranscribeOptions::default()
        };
        let (transcription, _) = transcribe(tones(&[(0.0, 1.0), (261.63, 1.0)]), options);
        assert_eq!(midis(&transcription), vec![60], "{} fps: {:?}", rate, transcription.notes);
        let onset = transcription.notes[0].time;
        assert!((onset - 1.0).abs() < 0.04, "{} fps: onset {}", rate, onset);
    }
}

#[test]
fn strict_mode_keeps_genuine_leap() {
    let melody = [261.63, 293.66, 329.63, 659.26, 698.46, 659.26];
    let parts: Vec<(f32, f32)> = melody.iter().map(|&f| (f, 0.4)).collect();
    let options = TranscribeOptions {
        strict_octave: true,
        ..TranscribeOptions::default()
    };
    let (transcription, _) = transcribe(tones(&parts), options);
    assert_eq!(midis(&transcription), vec![60, 62, 64, 76, 77, 76], "{:?}", transcription.notes);
}

#[test]
fn stereo_is_mixed_down() {
    let left = tones(&[(440.0, 1.0)]);
    let right = vec![0.0; left.len()];
    let audio = AudioBuffer::new(SAMPLE_RATE, vec![left, right]).unwrap();
    let transcription = MelodyTranscriber::default().transcribe(&audio, |_| {}).unwrap();
    assert_eq!(midis(&transcription), vec![69]);
}

#[test]
fn high_sample_rate_is_downsampled() {
    let rate = 2 * SAMPLE_RATE;
    let samples: Vec<f32> = (0..rate)
        .map(|i| 0.5 * (2.0 * std::f32::consts::PI * 220.0 * i as f32 / rate as f32).sin())
        .collect();
    let audio = AudioBuffer::mono(rate, samples).unwrap();
    let transcription = MelodyTranscriber::default().transcribe(&audio, |_| {}).unwrap();
    assert_eq!(midis(&transcription), vec![57]);
    assert!((transcription.notes[0].duration - 1.0).abs() < 0.2);
}

#[test]
fn reference_pitch_changes_midi_mapping() {
    // 432 Hz is A4 in 432 tuning but sits between G#4 and A4 at 440.
    let options = TranscribeOptions {
        reference_pitch: 432.0,
        ..TranscribeOptions::default()
    };
    let (transcription, _) = transcribe(tones(&[(432.0, 1.0)]), options);
    assert_eq!(midis(&transcription), vec![69]);
}

#[test]
fn wav_input_round_trip() {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut bytes = std::io::Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut bytes, spec).unwrap();
        for s in tones(&[(392.0, 1.0)]) {
            writer.write_sample((s * i16::MAX as f32) as i16).unwrap();
        }
        writer.finalize().unwrap();
    }
    bytes.set_position(0);

    let audio = AudioBuffer::from_wav(bytes).unwrap();
    assert_eq!(audio.sample_rate(), SAMPLE_RATE);
    let transcription = MelodyTranscriber::default().transcribe(&audio, |_| {}).unwrap();
    assert_eq!(midis(&transcription), vec![67]);
}

#[test]
fn cancelled_transcription_discards_output() {
    let audio = AudioBuffer::mono(SAMPLE_RATE, tones(&[(440.0, 2.0)])).unwrap();
    let token = CancelToken::new();
    token.cancel();
    let result = MelodyTranscriber::default().transcribe_with_cancel(&audio, &token, |_| {});
    assert!(matches!(result, Err(Error::Cancelled)));
}

#[test]
fn background_job_streams_progress() {
    let audio = AudioBuffer::mono(SAMPLE_RATE, tones(&[(440.0, 1.0)])).unwrap();
    let job = spawn_transcription(audio, TranscribeOptions::default()).unwrap();
    let progress = job.progress().clone();
    let transcription = job.join().unwrap();
    let reports: Vec<f32> = progress.iter().collect();
    assert_eq!(reports.last(), Some(&100.0));
    assert_eq!(midis(&transcription), vec![69]);
}

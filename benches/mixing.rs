// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use polyclip::audio::{SampleFormat, SinkFormat};
use polyclip::clip::{ClipEvent, SampleBank, SoundClip, LOOP_FOREVER};

const BUFFER_FRAMES: usize = 256;

fn generate_test_audio(duration_seconds: f32, sample_rate: u32) -> Vec<f32> {
    let num_samples = (duration_seconds * sample_rate as f32) as usize;
    (0..num_samples)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            0.3 * (2.0 * std::f32::consts::PI * 440.0 * t).sin()
                + 0.2 * (2.0 * std::f32::consts::PI * 880.0 * t).sin()
        })
        .collect()
}

/// A closed clip with `voices` voices all looping forever at `speed`.
fn playing_clip(voices: usize, speed: f32) -> SoundClip {
    let bank = SampleBank::from_mono(&generate_test_audio(1.0, 44100), 44100).unwrap();
    let clip = SoundClip::new("bench", bank, voices).unwrap();
    for _ in 0..voices {
        clip.play(0.5, 0.5, speed, LOOP_FOREVER).unwrap();
    }
    clip
}

fn benchmark_mixing(c: &mut Criterion) {
    let mut group = c.benchmark_group("mixing");

    for voices in [1, 8, 32] {
        for (name, speed) in [("integral", 1.0), ("fractional", 0.75)] {
            let clip = playing_clip(voices, speed);
            let mut output = vec![0.0f32; BUFFER_FRAMES * 2];
            let mut events: Vec<ClipEvent> = Vec::with_capacity(voices * 4);

            group.bench_with_input(BenchmarkId::new(name, voices), &voices, |b, _| {
                b.iter(|| {
                    events.clear();
                    clip.mixer()
                        .process_into_output(black_box(&mut output), &mut events);
                    black_box(&output);
                })
            });
        }
    }

    group.finish();
}

fn benchmark_encoding(c: &mut Criterion) {
    let mut group = c.benchmark_group("encoding");
    let input = generate_test_audio(BUFFER_FRAMES as f32 * 2.0 / 44100.0, 44100);
    let mut bytes = Vec::with_capacity(input.len() * 4);

    for (name, format) in [
        ("i16", SinkFormat::new(44100, SampleFormat::Int, 16).unwrap()),
        ("f32", SinkFormat::new(44100, SampleFormat::Float, 32).unwrap()),
    ] {
        group.bench_function(name, |b| {
            b.iter(|| {
                format.encode_into(black_box(&input), &mut bytes);
                black_box(&bytes);
            })
        });
    }

    group.finish();
}

criterion_group!(benches, benchmark_mixing, benchmark_encoding);
criterion_main!(benches);

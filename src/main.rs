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
use std::error::Error;
use std::f32::consts::PI;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{crate_version, Args, Parser, Subcommand};
use duration_string::DurationString;
use hound::{SampleFormat, WavSpec, WavWriter};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use polyclip::audio;
use polyclip::clip::{ChannelListener, ClipEvent, PanLaw, SoundClip};
use polyclip::config::EngineConfig;
use polyclip::loader;

/// How often the CLI checks that playback is still alive while waiting.
const WAIT_TICK: Duration = Duration::from_millis(250);

#[derive(Parser)]
#[clap(
    author = "Michael Wilson",
    version = crate_version!(),
    about = "A polyphonic sample player."
)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Lists the available audio output devices.
    Devices {},
    /// Plays a file through an audio device until it finishes.
    Play {
        /// The audio file to play.
        file: PathBuf,
        /// The output device. Overrides the configuration file.
        #[arg(short, long)]
        device: Option<String>,
        #[command(flatten)]
        voice: VoiceArgs,
    },
    /// Renders a file through the mixer into a WAV file.
    Render {
        /// The audio file to play.
        file: PathBuf,
        /// The WAV file to write.
        output: PathBuf,
        #[command(flatten)]
        voice: VoiceArgs,
    },
    /// Writes a sine test tone to a WAV file.
    Tone {
        /// The WAV file to write.
        output: PathBuf,
        /// Tone frequency in Hz.
        #[arg(short, long, default_value_t = 1000.0)]
        frequency: f32,
        /// Length in seconds.
        #[arg(short, long, default_value_t = 1.0)]
        seconds: f32,
        /// Sample rate in Hz.
        #[arg(long, default_value_t = 44100)]
        sample_rate: u32,
    },
}

#[derive(Args)]
struct VoiceArgs {
    /// Engine configuration file (YAML).
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Master volume, 0.0 to 1.0.
    #[arg(long, default_value_t = 1.0)]
    volume: f32,
    /// Pan position, -1.0 (left) to 1.0 (right).
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    pan: f32,
    /// Pan law: linear, center-linear or constant-power.
    #[arg(long, default_value = "center-linear")]
    pan_law: PanLaw,
    /// Playback speed, 0.125 to 8.0. Changes pitch.
    #[arg(long, default_value_t = 1.0)]
    speed: f32,
    /// Extra passes after the first. -1 loops forever.
    #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
    loops: i32,
    /// Where to start in the file, e.g. "1s500ms".
    #[arg(long)]
    start: Option<String>,
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Devices {} => {
            let devices = audio::list_devices()?;

            if devices.is_empty() {
                println!("No devices found.");
                return Ok(());
            }

            println!("Devices:");
            for device in devices {
                println!("- {}", device);
            }
        }
        Commands::Play {
            file,
            device,
            voice,
        } => {
            let mut config = load_config(voice.config.as_deref())?;
            if let Some(device) = device {
                config = config.with_device(&device);
            }
            play(&file, &config, &voice)?;
        }
        Commands::Render {
            file,
            output,
            voice,
        } => {
            let config = load_config(voice.config.as_deref())?
                .with_device(&format!("wav:{}", output.display()));
            play(&file, &config, &voice)?;
            println!("Rendered {}", output.display());
        }
        Commands::Tone {
            output,
            frequency,
            seconds,
            sample_rate,
        } => {
            write_tone(&output, frequency, seconds, sample_rate)?;
            println!("Wrote {}", output.display());
        }
    }

    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<EngineConfig, Box<dyn Error>> {
    let config = match path {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    config.validate()?;
    Ok(config)
}

/// Plays one voice of `file` to the configured device and waits for it to finish.
fn play(file: &Path, config: &EngineConfig, args: &VoiceArgs) -> Result<(), Box<dyn Error>> {
    let bank = loader::load_file(file, config.sample_rate())?;
    let name = file
        .file_stem()
        .map(|stem| stem.to_string_lossy().to_string())
        .unwrap_or_else(|| "clip".to_string());
    let clip = SoundClip::from_config(&name, bank, config)?;
    info!(%clip, device = config.device(), "Playing");

    let (tx, rx) = crossbeam_channel::unbounded();
    clip.add_listener(Arc::new(ChannelListener::new(tx)));

    let Some(id) = clip.obtain_instance() else {
        return Err("no free voice".into());
    };
    clip.set_recycle_on_finish(id, true)?;
    clip.set_pan(id, args.volume, args.pan, args.pan_law)?;
    clip.set_speed(id, args.speed)?;
    clip.set_looping(id, args.loops)?;
    if let Some(start) = &args.start {
        let start: Duration = DurationString::from_string(start.clone())?.into();
        let micros = u64::try_from(start.as_micros()).unwrap_or(u64::MAX);
        clip.seek_microseconds(id, micros)?;
    }

    clip.open(audio::get_sink(config.device())?)?;
    clip.start(id)?;

    loop {
        match rx.recv_timeout(WAIT_TICK) {
            Ok(ClipEvent::ReleaseInstance { id: released, .. }) if released == id => break,
            Ok(_) => {}
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => {
                if !clip.is_open() {
                    clip.close();
                    return Err("playback stopped unexpectedly".into());
                }
            }
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
        }
    }

    clip.close();
    Ok(())
}

/// Writes a mono 16-bit sine tone.
fn write_tone(
    output: &Path,
    frequency: f32,
    seconds: f32,
    sample_rate: u32,
) -> Result<(), Box<dyn Error>> {
    if seconds <= 0.0 {
        warn!(seconds, "Tone length must be positive");
        return Err("tone length must be positive".into());
    }

    let mut writer = WavWriter::create(
        output,
        WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        },
    )?;
    let frames = (seconds * sample_rate as f32) as usize;
    for i in 0..frames {
        let t = i as f32 / sample_rate as f32;
        let sample = 0.8 * (2.0 * PI * frequency * t).sin();
        writer.write_sample((sample * i16::MAX as f32) as i16)?;
    }
    writer.finalize()?;
    Ok(())
}

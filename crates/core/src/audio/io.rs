//! Audio I/O: decode, sample-rate probing, WAV export, resampling.
//!
//! All buffers are mono f64 in [-1, 1]. Multi-channel files contribute
//! only their first channel; channels are never averaged together.

use std::path::Path;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::error::{Error, Result};

/// Read the native sample rate of an audio file without decoding it.
pub fn probe_sample_rate(path: &Path) -> Result<u32> {
    let probed = open_format(path)?;
    let track = probed
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| Error::audio(path, "no audio track"))?;
    track
        .codec_params
        .sample_rate
        .ok_or_else(|| Error::audio(path, "sample rate not declared"))
}

/// Decode an audio file to mono f64 samples plus its native sample rate.
///
/// Supports WAV, FLAC, MP3 and MP4/AAC via symphonia. Takes the first
/// channel of multi-channel files.
pub fn decode(path: &Path) -> Result<(Vec<f64>, u32)> {
    let mut format = open_format(path)?;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| Error::audio(path, "no audio track"))?;
    let track_id = track.id;
    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| Error::audio(path, "sample rate not declared"))?;
    let channels = track.codec_params.channels.map(|c| c.count()).unwrap_or(1);

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| Error::audio(path, format!("unsupported codec: {e}")))?;

    let mut samples: Vec<f64> = Vec::new();
    loop {
        let packet = match format.next_packet() {
            Ok(p) => p,
            Err(SymphError::IoError(ref e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break
            }
            Err(SymphError::ResetRequired) => break,
            Err(e) => return Err(Error::audio(path, e)),
        };
        if packet.track_id() != track_id {
            continue;
        }
        match decoder.decode(&packet) {
            Ok(decoded) => {
                let spec = *decoded.spec();
                let frames = decoded.frames();
                let mut buf = SampleBuffer::<f64>::new(frames as u64, spec);
                buf.copy_interleaved_ref(decoded);
                // First channel only
                samples.extend(buf.samples().iter().step_by(channels));
            }
            Err(SymphError::DecodeError(_)) => continue,
            Err(e) => return Err(Error::audio(path, e)),
        }
    }

    if samples.is_empty() {
        return Err(Error::audio(path, "no audio decoded"));
    }
    Ok((samples, sample_rate))
}

fn open_format(path: &Path) -> Result<Box<dyn symphonia::core::formats::FormatReader>> {
    let file = std::fs::File::open(path).map_err(|e| Error::audio(path, e))?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| Error::audio(path, format!("unsupported format: {e}")))?;
    Ok(probed.format)
}

/// Write f64 samples to a 16-bit PCM WAV file, clipping to [-1, 1].
/// Creates parent directories if needed.
pub fn write_wav(path: &Path, samples: &[f64], sample_rate: u32) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = hound::WavWriter::create(path, spec)?;
    for &sample in samples {
        let clipped = sample.clamp(-1.0, 1.0);
        writer.write_sample((clipped * 32767.0) as i16)?;
    }
    writer.finalize()?;
    Ok(())
}

/// Resample mono audio with rubato's sinc resampler.
///
/// A fresh resampler is built per call, so there is no shared state to
/// guard when requests run on parallel workers.
pub fn resample(samples: &[f64], from_sr: u32, to_sr: u32) -> Result<Vec<f64>> {
    if from_sr == to_sr || samples.is_empty() {
        return Ok(samples.to_vec());
    }

    use rubato::{
        Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType,
        WindowFunction,
    };

    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };

    let ratio = to_sr as f64 / from_sr as f64;
    let mut resampler = SincFixedIn::<f64>::new(ratio, 2.0, params, samples.len(), 1)?;

    let output = resampler.process(&[samples.to_vec()], None)?;
    Ok(output.into_iter().next().unwrap_or_default())
}

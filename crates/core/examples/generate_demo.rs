//! Demo: build a tiny synthetic speaker pool and generate one mixture.
//!
//! Run with: cargo run -p dynmix-core --example generate_demo

use rand::rngs::StdRng;
use rand::SeedableRng;

use dynmix_core::audio::io::write_wav;
use dynmix_core::{DynamicMixer, MixingConfig, SourceFile, SpeakerPool};

fn main() -> anyhow::Result<()> {
    let sr = 16000u32;
    let dir = std::env::temp_dir().join("dynmix_demo");
    std::fs::create_dir_all(&dir)?;

    // Two synthetic "speakers": sine voices at different pitches
    let mut files = Vec::new();
    for (name, hz, secs) in [("low", 180.0, 2.0), ("high", 340.0, 1.4)] {
        let n = (secs * sr as f64) as usize;
        let samples: Vec<f64> = (0..n)
            .map(|i| (std::f64::consts::TAU * hz * i as f64 / sr as f64).sin() * 0.4)
            .collect();
        let path = dir.join(format!("{name}.wav"));
        write_wav(&path, &samples, sr)?;
        files.push((name.to_string(), vec![SourceFile::new(path, None)]));
    }

    let pool = SpeakerPool::from_map(files)?;
    let config = MixingConfig {
        num_spkrs: vec![2],
        overlap_ratio: vec![0.25, 0.5, 1.0],
        min_source_len: 8000,
        max_source_len: 32000,
        ..Default::default()
    };
    let mixer = DynamicMixer::new(pool, config, None, None, &[])?;

    let mut rng = StdRng::seed_from_u64(42);
    let record = mixer.get_item(Some(0), &mut rng)?;

    let out = dir.join("mixture.wav");
    write_wav(&out, &record.mixture, sr)?;
    println!("id:       {}", record.id);
    println!("speakers: {:?}", record.metadata.speakers);
    println!("duration: {:.2}s", record.metadata.duration);
    println!("wrote     {}", out.display());
    Ok(())
}

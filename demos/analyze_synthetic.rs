// demos/analyze_synthetic.rs
//
// Run the GPU motion analyzer over a synthetic clip and print one JSON line
// per frame.
//
// Usage:
//   cargo run --example analyze_synthetic --release
//   cargo run --example analyze_synthetic --release -- config.json
//   RUST_LOG=clip_motion=debug cargo run --example analyze_synthetic
//
// The optional argument is an `AnalyzerConfig` in JSON; missing fields take
// their defaults.
//
// The clip has four segments of 20 frames each:
//   static      nothing moves
//   pan         the whole scene moves 2 px/frame to the right
//   subject     a bright square moves over a static background
//   cut         every frame shows an unrelated texture

use clip_motion::analyzer::MotionAnalyzer;
use clip_motion::config::AnalyzerConfig;
use clip_motion::frame::ColorFrame;
use clip_motion::image::Image;

use std::env;
use std::fs;

use tracing_subscriber::EnvFilter;

const SEGMENT: usize = 20;

fn texture(x: f32, y: f32, seed: f32) -> u8 {
    (128.0 + 50.0 * (0.35 * x + seed).sin() + 50.0 * (0.3 * y + 2.0 * seed).cos()).round() as u8
}

fn make_frame(w: usize, h: usize, index: usize) -> ColorFrame {
    let segment = index / SEGMENT;
    let t = (index % SEGMENT) as f32;
    let img = match segment {
        0 => Image::from_fn(w, h, |x, y| texture(x as f32, y as f32, 0.0)),
        1 => Image::from_fn(w, h, |x, y| texture(x as f32 - 2.0 * t, y as f32, 0.0)),
        2 => {
            let (sx, sy) = (10.0 + 3.0 * t, 30.0);
            Image::from_fn(w, h, |x, y| {
                let (fx, fy) = (x as f32, y as f32);
                if (sx..sx + 24.0).contains(&fx) && (sy..sy + 24.0).contains(&fy) {
                    texture(fx - sx, fy - sy, 5.0).saturating_add(40)
                } else {
                    texture(fx, fy, 0.0) / 2
                }
            })
        }
        _ => Image::from_fn(w, h, |x, y| texture(x as f32, y as f32, 1.7 * (index as f32))),
    };
    ColorFrame::from_luma(&img)
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("clip_motion=info")))
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = env::args().collect();
    let config = match args.get(1) {
        Some(path) => {
            let text = fs::read_to_string(path).unwrap_or_else(|e| {
                eprintln!("Error: cannot read {path}: {e}");
                std::process::exit(1);
            });
            serde_json::from_str::<AnalyzerConfig>(&text).unwrap_or_else(|e| {
                eprintln!("Error: invalid config {path}: {e}");
                std::process::exit(1);
            })
        }
        None => AnalyzerConfig::default(),
    };

    let (w, h) = (config.width as usize, config.height as usize);
    let mut analyzer = MotionAnalyzer::new(config);
    if let Err(e) = analyzer.initialize() {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }

    let segments = ["static", "pan", "subject", "cut"];
    for index in 0..SEGMENT * segments.len() {
        let frame = make_frame(w, h, index);
        match analyzer.analyze_frame_detailed(&frame) {
            Ok(analysis) => {
                let line = serde_json::json!({
                    "frame": index,
                    "segment": segments[index / SEGMENT],
                    "result": analysis.result,
                    "mean_magnitude": analysis.stats.map(|s| s.mean_magnitude()),
                    "elapsed_us": analysis.elapsed.as_micros() as u64,
                });
                println!("{line}");
            }
            Err(e) => eprintln!("frame {index}: {e}"),
        }
    }

    analyzer.destroy();
}

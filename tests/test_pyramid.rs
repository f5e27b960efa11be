// tests/test_pyramid.rs — Level dimensions and binomial downsampling.

use clip_motion::image::Image;
use clip_motion::pyramid::{level_dimensions, Pyramid, BINOMIAL_KERNEL};

#[test]
fn kernel_is_normalised() {
    let sum: f32 = BINOMIAL_KERNEL.iter().sum();
    assert!((sum - 1.0).abs() < 1e-6);
}

#[test]
fn level_dimensions_halve_and_never_reach_zero() {
    for &(w, h) in &[(160, 90), (1, 1), (3, 7), (1920, 1080), (641, 1), (2, 999)] {
        for levels in 1..=8 {
            let dims = level_dimensions(w, h, levels);
            assert_eq!(dims.len(), levels);
            assert_eq!(dims[0], (w, h));
            for pair in dims.windows(2) {
                let ((pw, ph), (cw, ch)) = (pair[0], pair[1]);
                assert_eq!(cw, (pw / 2).max(1), "{w}x{h} L={levels}");
                assert_eq!(ch, (ph / 2).max(1), "{w}x{h} L={levels}");
            }
        }
    }
}

#[test]
fn pyramid_levels_match_level_dimensions() {
    let img = Image::from_fn(37, 23, |x, y| ((x * 7 + y * 3) % 17) as f32 / 16.0);
    let pyr = Pyramid::build(&img, 6);
    let dims = level_dimensions(37, 23, 6);
    assert_eq!(pyr.num_levels(), 6);
    for (level, &(w, h)) in dims.iter().enumerate() {
        assert_eq!(pyr.level(level).width(), w as usize);
        assert_eq!(pyr.level(level).height(), h as usize);
    }
}

#[test]
fn constant_image_stays_constant() {
    let img = Image::from_fn(40, 30, |_, _| 0.42f32);
    let pyr = Pyramid::build(&img, 4);
    for level in &pyr.levels {
        for (x, y, v) in level.pixels() {
            assert!((v - 0.42).abs() < 1e-6, "({x}, {y}) = {v}");
        }
    }
}

#[test]
fn downsampling_preserves_the_mean() {
    let img = Image::from_fn(64, 64, |x, y| 0.5 + 0.3 * ((x as f32) * 0.4).sin() * ((y as f32) * 0.25).cos());
    let pyr = Pyramid::build(&img, 3);
    let mean = |im: &Image<f32>| im.as_slice().iter().sum::<f32>() / im.as_slice().len() as f32;
    let m0 = mean(pyr.level(0));
    for level in 1..3 {
        let m = mean(pyr.level(level));
        assert!((m - m0).abs() < 0.02, "level {level}: {m} vs {m0}");
    }
}

#[test]
fn values_stay_in_unit_range() {
    let img = Image::from_fn(33, 17, |x, y| if (x + y) % 2 == 0 { 1.0 } else { 0.0 });
    let pyr = Pyramid::build(&img, 5);
    for level in &pyr.levels {
        assert!(level.as_slice().iter().all(|&v| (0.0..=1.0).contains(&v)));
    }
}

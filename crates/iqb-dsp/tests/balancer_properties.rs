//! Balancer integration tests
//!
//! Drives complete `IqBalancer` instances over synthetic streams.
//! Verifies:
//! - DC removal
//! - FFT agreement with rustfft
//! - No drift on an ideal signal
//! - Convergence onto an injected imbalance
//! - Step bounds, optimal-point clamping, warm-up restart
//! - Short blocks, determinism, concurrent instances

use iqb_dsp::corrector::correct;
use iqb_dsp::dc::DcCanceller;
use iqb_dsp::fft::Radix2Fft;
use iqb_dsp::{BalancerConfig, IqBalancer, IqSample};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const FFT_BINS: usize = 512;
const BLOCK_SIZE: usize = 4096;
/// Whole number of cycles per block
const TONE_FREQ: f64 = 410.0 / BLOCK_SIZE as f64;

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn test_config() -> BalancerConfig {
    BalancerConfig {
        fft_bins: FFT_BINS,
        buffers_to_skip: 1,
        fft_integration: 8,
        correlation_integration: 4,
        ..Default::default()
    }
}

/// Complex tone stream with an injected imbalance, phase kept in f64
struct ToneSource {
    freq: f64,
    phase_error: f32,
    amplitude_error: f32,
    t: u64,
}

impl ToneSource {
    fn new(freq: f64, phase_error: f32, amplitude_error: f32) -> Self {
        Self {
            freq,
            phase_error,
            amplitude_error,
            t: 0,
        }
    }

    fn block(&mut self, len: usize) -> Vec<IqSample> {
        (0..len)
            .map(|_| {
                let angle = 2.0 * std::f64::consts::PI * (self.freq * self.t as f64).fract();
                self.t += 1;
                let s = IqSample::new(angle.cos() as f32, angle.sin() as f32);
                correct(s, self.phase_error, self.amplitude_error)
            })
            .collect()
    }
}

/// Image-to-tone magnitude ratio of a block holding whole tone cycles
fn image_ratio(block: &[IqSample], freq: f64) -> f64 {
    let (mut tone_re, mut tone_im, mut image_re, mut image_im) = (0.0, 0.0, 0.0, 0.0);
    for (t, s) in block.iter().enumerate() {
        let angle = 2.0 * std::f64::consts::PI * (freq * t as f64).fract();
        let (sin, cos) = angle.sin_cos();
        let (re, im) = (s.re as f64, s.im as f64);
        // s · e^{-jθ}
        tone_re += re * cos + im * sin;
        tone_im += im * cos - re * sin;
        // s · e^{+jθ}
        image_re += re * cos - im * sin;
        image_im += im * cos + re * sin;
    }
    image_re.hypot(image_im) / tone_re.hypot(tone_im)
}

/// Process until the next refresh completes, return the last block
fn run_cycle(balancer: &mut IqBalancer, source: &mut ToneSource) -> Vec<IqSample> {
    loop {
        let mut block = source.block(BLOCK_SIZE);
        balancer.process(&mut block);
        if balancer.state().integrated_blocks == 0 {
            return block;
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// DC + FFT
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_dc_offset_is_removed() {
    init_logger();
    let mut balancer = IqBalancer::with_defaults().unwrap();

    let mut block = vec![IqSample::new(1.0, 0.5); 1024];
    for _ in 0..100 {
        block.fill(IqSample::new(1.0, 0.5));
        balancer.process(&mut block);
    }

    let state = balancer.state();
    assert!((state.iavg - 1.0).abs() < 2e-3, "iavg {}", state.iavg);
    assert!((state.qavg - 0.5).abs() < 2e-3, "qavg {}", state.qavg);

    let mean_re = block.iter().map(|s| s.re).sum::<f32>() / block.len() as f32;
    let mean_im = block.iter().map(|s| s.im).sum::<f32>() / block.len() as f32;
    assert!(mean_re.abs() < 2e-3, "residual re {mean_re}");
    assert!(mean_im.abs() < 2e-3, "residual im {mean_im}");
}

#[test]
fn test_fft_matches_rustfft() {
    let n = 1024;
    let mut rng = StdRng::seed_from_u64(0x1b_a1a);
    let input: Vec<IqSample> = (0..n)
        .map(|_| IqSample::new(rng.random_range(-1.0..1.0), rng.random_range(-1.0..1.0)))
        .collect();

    let mut ours = input.clone();
    Radix2Fft::new(n).unwrap().process(&mut ours);

    let mut reference: Vec<rustfft::num_complex::Complex<f32>> = input
        .iter()
        .map(|s| rustfft::num_complex::Complex::new(s.re, s.im))
        .collect();
    rustfft::FftPlanner::<f32>::new()
        .plan_fft_forward(n)
        .process(&mut reference);

    for (k, x) in ours.iter().enumerate() {
        let r = reference[(k + n / 2) % n];
        let err = (x.re - r.re).hypot(x.im - r.im);
        assert!(err < 1e-3, "bin {k}: {x} vs {r}");
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// ESTIMATION
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_ideal_signal_stays_uncorrected() {
    init_logger();
    let mut balancer = IqBalancer::new(test_config()).unwrap();
    let mut source = ToneSource::new(TONE_FREQ, 0.0, 0.0);

    for _ in 0..30 {
        run_cycle(&mut balancer, &mut source);
        assert!(balancer.phase().abs() < 1e-4, "phase {}", balancer.phase());
        assert!(
            balancer.amplitude().abs() < 1e-4,
            "amplitude {}",
            balancer.amplitude()
        );
    }
}

#[test]
fn test_converges_to_injected_imbalance() {
    init_logger();
    let (phase_error, amplitude_error) = (0.02, 0.03);
    let mut balancer = IqBalancer::new(test_config()).unwrap();
    let mut source = ToneSource::new(TONE_FREQ, phase_error, amplitude_error);

    let before = image_ratio(&source.block(BLOCK_SIZE), TONE_FREQ);
    assert!(before > 1e-2, "input image ratio {before}");

    for _ in 0..40 {
        let last = run_cycle(&mut balancer, &mut source);
        assert!(last.iter().all(|s| s.re.is_finite() && s.im.is_finite()));
    }

    assert!(
        (balancer.phase() + phase_error).abs() < 2e-3,
        "phase {}",
        balancer.phase()
    );
    assert!(
        (balancer.amplitude() + amplitude_error).abs() < 2e-3,
        "amplitude {}",
        balancer.amplitude()
    );

    // Block that ended on a refresh ramps toward the new target; the next
    // one is corrected with the settled values
    let mut settled = source.block(BLOCK_SIZE);
    balancer.process(&mut settled);
    let after = image_ratio(&settled, TONE_FREQ);
    assert!(after < 1e-3, "output image ratio {after}");
}

#[test]
fn test_steps_stay_within_bounds() {
    let config = test_config();
    let (phase_bounds, amplitude_bounds) = (config.phase_step, config.amplitude_step);
    let mut balancer = IqBalancer::new(config).unwrap();
    let mut source = ToneSource::new(TONE_FREQ, -0.06, 0.05);

    for _ in 0..40 {
        run_cycle(&mut balancer, &mut source);
        let state = balancer.state();
        let phase_step = state.phase_step.abs();
        let amplitude_step = state.amplitude_step.abs();
        assert!(phase_step >= phase_bounds.min && phase_step <= phase_bounds.max);
        assert!(amplitude_step >= amplitude_bounds.min && amplitude_step <= amplitude_bounds.max);
    }
}

#[test]
fn test_single_refresh_moves_at_most_max_mu_steps() {
    let config = test_config();
    let max_mu = config.max_mu;
    let limit = max_mu * config.phase_step.initial;
    let mut balancer = IqBalancer::new(config).unwrap();
    // Far outside what one refresh can reach
    let mut source = ToneSource::new(TONE_FREQ, 0.2, 0.0);

    run_cycle(&mut balancer, &mut source);
    let estimate = *balancer.last_estimate().unwrap();
    assert!(estimate.phase_mu.abs() > max_mu, "mu {}", estimate.phase_mu);
    assert!(
        (estimate.raw_phase.abs() - limit).abs() < 1e-6,
        "raw phase {}",
        estimate.raw_phase
    );
}

// ═══════════════════════════════════════════════════════════════════════════════
// OPTIMAL POINT + WARM-UP
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_out_of_range_optimal_point_clamps_to_edge() {
    let mut balancer = IqBalancer::new(test_config()).unwrap();

    balancer.set_optimal_point(0.5);
    let edge = balancer.optimal_bin();
    assert_eq!(edge, FFT_BINS - 1);

    balancer.set_optimal_point(0.9);
    assert_eq!(balancer.optimal_bin(), edge);
    balancer.set_optimal_point(-0.9);
    assert_eq!(balancer.optimal_bin(), edge);
}

#[test]
fn test_optimal_point_restarts_warmup() {
    let config = test_config();
    let (warmup_cycles, min_lookback) = (config.warmup_cycles, config.min_lookback);
    let mut balancer = IqBalancer::new(config).unwrap();
    let mut source = ToneSource::new(TONE_FREQ, 0.01, -0.01);

    for _ in 0..warmup_cycles + 3 {
        run_cycle(&mut balancer, &mut source);
    }
    assert!(balancer.last_estimate().unwrap().lookback_depth > min_lookback);

    balancer.set_optimal_point(0.1);
    assert_eq!(balancer.state().warmup, 0);

    for _ in 0..warmup_cycles {
        run_cycle(&mut balancer, &mut source);
        let estimate = balancer.last_estimate().unwrap();
        assert_eq!(estimate.lookback_depth, 0);
        assert_eq!(estimate.phase, estimate.raw_phase);
        assert_eq!(estimate.amplitude, estimate.raw_amplitude);
    }

    run_cycle(&mut balancer, &mut source);
    assert_eq!(balancer.last_estimate().unwrap().lookback_depth, min_lookback);
}

// ═══════════════════════════════════════════════════════════════════════════════
// STREAM HANDLING
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_short_blocks_are_corrected_without_estimating() {
    let config = BalancerConfig {
        initial_phase: 0.01,
        initial_amplitude: -0.02,
        ..test_config()
    };
    let mut balancer = IqBalancer::new(config.clone()).unwrap();
    let mut dc = DcCanceller::new(config.dc_time_const);
    let mut source = ToneSource::new(0.07, 0.0, 0.0);

    for len in [1, 7, 100, FFT_BINS - 1, 0, 3, 64, 200] {
        let input = source.block(len);
        let mut block = input.clone();
        balancer.process(&mut block);

        let mut expected = input;
        dc.process(&mut expected);
        for (out, exp) in block.iter().zip(&expected) {
            let exp = correct(*exp, 0.01, -0.02);
            assert!((out.re - exp.re).abs() < 1e-6, "{out} vs {exp}");
            assert!((out.im - exp.im).abs() < 1e-6, "{out} vs {exp}");
        }
    }

    // Two full cycles ran, neither had a whole FFT window
    assert!(balancer.last_estimate().is_none());
    assert_eq!(balancer.phase(), 0.01);
    assert_eq!(balancer.amplitude(), -0.02);
}

#[test]
fn test_processing_is_deterministic() {
    let mut rng = StdRng::seed_from_u64(7);
    let mut source = ToneSource::new(TONE_FREQ, 0.015, -0.01);
    let blocks: Vec<Vec<IqSample>> = (0..24)
        .map(|_| {
            let len = rng.random_range(FFT_BINS..3 * BLOCK_SIZE / 2);
            source
                .block(len)
                .into_iter()
                .map(|s| s + IqSample::new(rng.random_range(-0.01..0.01), rng.random_range(-0.01..0.01)))
                .collect()
        })
        .collect();

    let mut a = IqBalancer::new(test_config()).unwrap();
    let mut b = IqBalancer::new(test_config()).unwrap();
    for block in &blocks {
        let mut out_a = block.clone();
        let mut out_b = block.clone();
        a.process(&mut out_a);
        b.process(&mut out_b);
        for (x, y) in out_a.iter().zip(&out_b) {
            assert_eq!(x.re.to_bits(), y.re.to_bits());
            assert_eq!(x.im.to_bits(), y.im.to_bits());
        }
    }
    assert_eq!(a.state(), b.state());
    assert_eq!(a.last_estimate(), b.last_estimate());
}

#[test]
fn test_concurrent_instances_match_single_threaded() {
    let mut source = ToneSource::new(TONE_FREQ, 0.02, 0.01);
    let blocks: Vec<Vec<IqSample>> = (0..16).map(|_| source.block(BLOCK_SIZE)).collect();

    let run = |blocks: &[Vec<IqSample>]| {
        let mut balancer = IqBalancer::new(test_config()).unwrap();
        for block in blocks {
            let mut out = block.clone();
            balancer.process(&mut out);
        }
        balancer.state()
    };

    let reference = run(&blocks);
    std::thread::scope(|scope| {
        let handles: Vec<_> = (0..4).map(|_| scope.spawn(|| run(&blocks))).collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap(), reference);
        }
    });
}

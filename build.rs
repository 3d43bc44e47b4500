use std::env;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::time::Instant;
use wide::{CmpLt, f64x4};

fn main() {
    let out_dir = env::var("OUT_DIR").unwrap();
    let dest_path = Path::new(&out_dir).join("tuned_constants.rs");
    let mut f = File::create(&dest_path).unwrap();

    let mut parallel_threshold = 256;
    let mut initial_maxneighs = 100;

    // Calibration: time a small LJ-like SIMD sweep to decide when fanning
    // out over the thread pool pays off.
    let n_test = 512;
    let mut px = Vec::with_capacity(n_test);
    let mut py = Vec::with_capacity(n_test);
    let mut pz = Vec::with_capacity(n_test);
    for i in 0..n_test {
        let t = i as f64 * 0.37;
        px.push(t.sin() * 4.0);
        py.push(t.cos() * 4.0);
        pz.push((t * 0.5).sin() * 4.0);
    }

    let start = Instant::now();
    let mut acc = 0.0;
    for _ in 0..5 {
        acc += dummy_lj_simd(&px, &py, &pz, 2.5);
    }
    let duration = start.elapsed() / 5;
    let micros = duration.as_micros();

    if micros < 500 {
        parallel_threshold = 512;
    } else if micros > 10000 {
        parallel_threshold = 128;
        initial_maxneighs = 64;
    }

    writeln!(
        f,
        "pub const PARALLEL_THRESHOLD: usize = {};",
        parallel_threshold
    )
    .unwrap();
    writeln!(
        f,
        "pub const INITIAL_MAXNEIGHS: usize = {};",
        initial_maxneighs
    )
    .unwrap();

    println!(
        "cargo:warning=Auto-tuning: PARALLEL_THRESHOLD={}, INITIAL_MAXNEIGHS={} (checksum {:.3e})",
        parallel_threshold, initial_maxneighs, acc
    );
    println!("cargo:rerun-if-changed=build.rs");
}

fn dummy_lj_simd(px: &[f64], py: &[f64], pz: &[f64], cutoff: f64) -> f64 {
    let n = px.len();
    let cutoff_sq_v = f64x4::from(cutoff * cutoff);
    let c48 = f64x4::from(48.0);
    let half = f64x4::from(0.5);
    let mut total = f64x4::ZERO;

    for i in 0..n {
        let pix = f64x4::from(px[i]);
        let piy = f64x4::from(py[i]);
        let piz = f64x4::from(pz[i]);
        let mut j = i + 1;
        while j + 4 <= n {
            let dx = pix - f64x4::from(&px[j..j + 4]);
            let dy = piy - f64x4::from(&py[j..j + 4]);
            let dz = piz - f64x4::from(&pz[j..j + 4]);
            let rsq = dx * dx + dy * dy + dz * dz;
            let mask = rsq.cmp_lt(cutoff_sq_v);
            let sr2 = f64x4::ONE / rsq;
            let sr6 = sr2 * sr2 * sr2;
            let force = c48 * sr6 * (sr6 - half) * sr2;
            total = total + mask.blend(force, f64x4::ZERO);
            j += 4;
        }
    }
    total.to_array().iter().sum()
}

//! # Tag Detection Benchmark

use criterion::{criterion_group, criterion_main, Criterion};

use imageproc::edges::canny;
use nalgebra::{Rotation3, Vector3};
use mav_lib::{
    loc::RigidTransform,
    pattern::{PatternCodec, PatternDictionary},
    tag_det::{corners::EdgeGradients, DetectorParams, TagDetector},
    test_utils::{self, SceneRenderer},
};

fn tag_det_benchmark(c: &mut Criterion) {
    // ---- Render a frame with two tags ----

    let renderer = SceneRenderer::default();
    let l = renderer.geometry.outer_side();

    let tilt = Rotation3::from_euler_angles(0.2, -0.1, 0.4);
    let frame = renderer.render(&[
        (test_utils::SEED, test_utils::tag_below(-(l + 2.5), -l / 2.0, 45.0)),
        (test_utils::PATTERNS[1], RigidTransform::new(tilt, Vector3::new(2.5, -l / 2.0, 50.0))),
    ]);

    let detector = TagDetector::new(
        renderer.geometry,
        renderer.intrinsics,
        DetectorParams::default()
    );
    let dict = PatternDictionary::from_patterns(
        PatternCodec::new(3).unwrap(),
        &test_utils::PATTERNS
    );

    // Whole frame passes, which dominate the frame time
    c.bench_function("canny", |b| {
        b.iter(|| canny(&frame, 50.0, 100.0))
    });

    c.bench_function("EdgeGradients::new", |b| {
        b.iter(|| EdgeGradients::new(&frame))
    });

    c.bench_function("TagDetector::find_candidate_tags", |b| {
        b.iter(|| detector.find_candidate_tags(&frame, &dict))
    });
}

criterion_group!(benches, tag_det_benchmark);
criterion_main!(benches);

//! Benchmarks for lit-square diffing and move inference
//!
//! Inference runs on every board snapshot during the player's turn, so it
//! has to stay well below the serial frame interval.
//!
//! Platform: Cross-platform (CI-safe)

use criterion::{Criterion, criterion_group, criterion_main};
use echess::GameSession;
use echess::inference::{infer_move, lit_squares};
use echess::test_utils::{game_state, occupancy_after, playing_game};
use std::hint::black_box;

const OPENING: [&str; 10] =
    ["e2e4", "e7e5", "g1f3", "b8c6", "f1b5", "a7a6", "b5a4", "g8f6", "e1g1", "f8e7"];

fn session_after(moves: &[&str]) -> GameSession {
    let session = GameSession::new();
    session.bind(&playing_game("bench001", "white"));
    session.update(&game_state(&moves.join(" "), "started")).expect("opening replays");
    session
}

fn bench_lit_squares(c: &mut Criterion) {
    let session = session_after(&OPENING);
    let position = session.position();
    let board = occupancy_after(&[&OPENING[..], &["d2d4"][..]].concat());

    c.bench_function("lit_squares_single_move", |b| {
        b.iter(|| black_box(lit_squares(black_box(&board), black_box(&position))))
    });
}

fn bench_infer_move(c: &mut Criterion) {
    let session = session_after(&OPENING);
    let position = session.position();

    let mut group = c.benchmark_group("infer_move");

    let quiet = occupancy_after(&[&OPENING[..], &["d2d4"][..]].concat());
    let quiet_lit = lit_squares(&quiet, &position);
    group.bench_function("quiet_move", |b| {
        b.iter(|| black_box(infer_move(black_box(&quiet), black_box(&quiet_lit), &session)))
    });

    let capture = occupancy_after(&[&OPENING[..], &["a4c6"][..]].concat());
    let capture_lit = lit_squares(&capture, &position);
    group.bench_function("capture", |b| {
        b.iter(|| black_box(infer_move(black_box(&capture), black_box(&capture_lit), &session)))
    });

    let unchanged = occupancy_after(&OPENING);
    let unchanged_lit = lit_squares(&unchanged, &position);
    group.bench_function("no_change", |b| {
        b.iter(|| black_box(infer_move(black_box(&unchanged), black_box(&unchanged_lit), &session)))
    });

    group.finish();
}

fn bench_session_update(c: &mut Criterion) {
    let session = session_after(&OPENING[..9]);
    let next = game_state(&OPENING.join(" "), "started");
    let replay = game_state(&OPENING.join(" "), "started");

    let mut group = c.benchmark_group("session_update");

    group.bench_function("apply_newest_move", |b| {
        b.iter(|| {
            session.update(&game_state(&OPENING[..9].join(" "), "started")).expect("prefix replays");
            session.update(black_box(&next)).expect("next move applies");
        })
    });

    group.bench_function("full_replay", |b| {
        b.iter(|| {
            let fresh = GameSession::new();
            fresh.bind(&playing_game("bench002", "black"));
            fresh.update(black_box(&replay)).expect("opening replays");
            black_box(fresh)
        })
    });

    group.finish();
}

criterion_group!(benches, bench_lit_squares, bench_infer_move, bench_session_update);
criterion_main!(benches);

//! Row-parallel processing: coverage, error propagation, cancellation.

mod common;

use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::time::Duration;

use common::pattern_image;
use hostimage::{CancellationToken, HostImage, ImageError, ImageFormat, TiledProcessor};

fn tagged_rows(height: u32, threads: usize) {
    let processor = TiledProcessor::with_threads(threads).unwrap().with_min_chunk_rows(1);
    let mut image = HostImage::new(3, height, ImageFormat::RGBA8).unwrap();
    let visits: Vec<AtomicU32> = (0..height).map(|_| AtomicU32::new(0)).collect();

    processor
        .for_each_row_mut(&mut image, |row, y| {
            visits[y as usize].fetch_add(1, Ordering::SeqCst);
            row[..4].copy_from_slice(&y.to_le_bytes());
        })
        .unwrap();

    for (y, v) in visits.iter().enumerate() {
        assert_eq!(v.load(Ordering::SeqCst), 1, "row {y} with {threads} threads");
        assert_eq!(&image.row(y as u32)[..4], &(y as u32).to_le_bytes());
    }
}

#[test_log::test]
fn every_row_is_visited_once_for_any_pool_size() {
    let height = 37;
    for threads in [1, 4, height as usize] {
        tagged_rows(height, threads);
    }
}

#[test]
fn global_processor_visits_every_row() {
    let image = pattern_image(5, 300, ImageFormat::RGB8);
    let seen = AtomicUsize::new(0);
    TiledProcessor::global()
        .for_each_row(&image, |row, _| {
            assert_eq!(row.len(), 15);
            seen.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
    assert_eq!(seen.load(Ordering::SeqCst), 300);
}

#[test_log::test]
fn lowest_failing_row_is_reported_after_join() {
    let processor = TiledProcessor::with_threads(4).unwrap().with_min_chunk_rows(1);
    let mut image = HostImage::new(2, 100, ImageFormat::GREY8).unwrap();
    let visited = AtomicUsize::new(0);

    let result = processor.try_for_each_row_mut(&mut image, |_, y| {
        visited.fetch_add(1, Ordering::SeqCst);
        if y == 70 || y == 20 { Err(format!("bad row {y}")) } else { Ok(()) }
    });

    match result {
        Err(ImageError::Processing { row, message }) => {
            assert_eq!(row, 20);
            assert_eq!(message, "bad row 20");
        }
        other => panic!("expected processing error, got {other:?}"),
    }
    // Chunks without a failure still ran to the end.
    assert!(visited.load(Ordering::SeqCst) >= 50);
}

#[test_log::test]
fn panicking_row_surfaces_as_processing_error() {
    let processor = TiledProcessor::with_threads(2).unwrap().with_min_chunk_rows(1);
    let image = HostImage::new(1, 8, ImageFormat::RGBA8).unwrap();
    let result = processor.for_each_row(&image, |_, y| {
        if y == 5 {
            panic!("row five");
        }
    });
    match result {
        Err(ImageError::Processing { row, message }) => {
            assert_eq!(row, 5);
            assert!(message.contains("row five"), "{message}");
        }
        other => panic!("expected processing error, got {other:?}"),
    }
}

#[test]
fn cancelled_token_stops_before_any_row() {
    let processor = TiledProcessor::with_threads(2).unwrap();
    let mut image = HostImage::new(4, 64, ImageFormat::RGBA8).unwrap();
    let token = CancellationToken::new();
    token.cancel();
    let visited = AtomicUsize::new(0);

    let result = processor.try_for_each_row_mut_with(&mut image, &token, |_, _| {
        visited.fetch_add(1, Ordering::SeqCst);
        Ok::<(), String>(())
    });
    assert!(matches!(result, Err(ImageError::Cancelled)));
    assert_eq!(visited.load(Ordering::SeqCst), 0);
}

#[test]
fn cancelling_mid_run_stops_remaining_rows() {
    let processor = TiledProcessor::with_threads(1).unwrap();
    let image = HostImage::new(1, 50, ImageFormat::GREY8).unwrap();
    let token = CancellationToken::new();
    let visited = AtomicUsize::new(0);

    let result = processor.try_for_each_row_with(&image, &token, |_, y| {
        visited.fetch_add(1, Ordering::SeqCst);
        if y == 9 {
            token.cancel();
        }
        Ok::<(), String>(())
    });
    assert!(matches!(result, Err(ImageError::Cancelled)));
    assert_eq!(visited.load(Ordering::SeqCst), 10);
}

#[test]
fn failure_outranks_cancellation() {
    let processor = TiledProcessor::with_threads(1).unwrap();
    let image = HostImage::new(1, 10, ImageFormat::GREY8).unwrap();
    let token = CancellationToken::new();
    let result = processor.try_for_each_row_with(&image, &token, |_, y| {
        token.cancel();
        if y == 0 { Err("first row") } else { Ok(()) }
    });
    assert!(matches!(result, Err(ImageError::Processing { row: 0, .. })));
}

#[test]
fn deadline_reports_timeout() {
    let processor = TiledProcessor::with_threads(2)
        .unwrap()
        .with_join_timeout(Some(Duration::from_millis(20)));
    let image = HostImage::new(1, 64, ImageFormat::GREY8).unwrap();
    let result = processor.for_each_row(&image, |_, _| std::thread::sleep(Duration::from_millis(10)));
    assert!(matches!(result, Err(ImageError::TimedOut(t)) if t == Duration::from_millis(20)));
}

#[test]
fn generation_moves_only_for_mutating_runs() {
    let processor = TiledProcessor::with_threads(2).unwrap();
    let mut image = pattern_image(4, 40, ImageFormat::RGBA8);

    let g = image.generation();
    processor.for_each_row(&image, |_, _| {}).unwrap();
    assert_eq!(image.generation(), g);

    processor.for_each_row_mut(&mut image, |_, _| {}).unwrap();
    assert!(image.generation() > g);

    let g = image.generation();
    let _ = processor.try_for_each_row_mut(&mut image, |_, _| Err("nope"));
    assert!(image.generation() > g, "a failed mutating run may have written rows");
}

#[test]
fn from_settings_applies_pool_and_chunking() {
    let settings = hostimage::EngineSettings::parse("worker_threads = 3\nmin_chunk_rows = 8\n");
    let processor = TiledProcessor::from_settings(&settings).unwrap();
    assert_eq!(processor.workers(), 3);
    assert_eq!(processor.min_chunk_rows(), 8);
    assert_eq!(processor.plan(30), vec![0..10, 10..20, 20..30]);
}

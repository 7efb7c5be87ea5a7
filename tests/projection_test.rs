mod common;

use std::time::Duration;

use eval_pulse::aggregator::{summarize_totals, BatchSnapshot, ProgressSource};
use eval_pulse::ep_error::EpError;
use eval_pulse::log_buffer::LogBuffer;
use eval_pulse::projection::{
    badge, console_lines, detail_stats, processing_stats, progress_ring, rows, run_header,
    submission_detail, sync_indicator, ErrorBanner, IndicatorMode, SubmissionDetailView,
};
use eval_pulse::synchronizer::SyncState;
use eval_pulse::types::{Severity, Slide, Stage};

use common::{at, make_entry, make_submission};

fn slide(n: u32, text: Option<&str>, complexity: Option<f64>) -> Slide {
    Slide {
        slide_id: format!("slide-{}", n),
        slide_number: n,
        text_content: text.map(str::to_string),
        complexity_score: complexity,
    }
}

// --- Progress ring ---

#[test]
fn ring_shows_active_stage_label() {
    let ring = progress_ring(26, Stage::Visualizing);
    assert_eq!(ring.percent_label, "26%");
    assert_eq!(ring.stage_label, "Visualizing");
}

#[test]
fn ring_finalizes_after_the_working_stages() {
    assert_eq!(progress_ring(100, Stage::Completed).stage_label, "Finalizing...");
    assert_eq!(progress_ring(40, Stage::Failed).stage_label, "Finalizing...");
}

#[test]
fn ring_offset_is_proportional() {
    let ring = progress_ring(50, Stage::Chunking);
    let expected = 2.0 * std::f64::consts::PI * 120.0 / 2.0;
    assert!((ring.dash_offset - expected).abs() < 1e-9);
}

// --- Console ---

#[test]
fn console_lines_keep_order_and_colour_by_severity() {
    let mut log = LogBuffer::with_capacity(4);
    log.append(make_entry(0, Severity::Info, "Ingesting PDF Buffer..."));
    log.append(make_entry(1, Severity::Success, "done"));
    log.append(make_entry(2, Severity::Flag, "flagged"));
    log.append(make_entry(3, Severity::Error, "broke"));

    let lines = console_lines(&log);
    let classes: Vec<&str> = lines.iter().map(|l| l.class).collect();
    assert_eq!(
        classes,
        vec!["text-gray-300", "text-green-400", "text-yellow-400", "text-red-400"]
    );
    assert_eq!(lines[0].time_label, "[12:00:00]");
    assert_eq!(lines[3].time_label, "[12:00:03]");
}

// --- Stat cards ---

#[test]
fn processing_stats_show_dash_without_scores() {
    let snapshot = BatchSnapshot {
        scanned: 4,
        flags: 2,
        avg_score: None,
        progress_percent: 30,
        source: ProgressSource::Simulated(30.0),
    };
    let cards = processing_stats(&snapshot);
    let labels: Vec<&str> = cards.iter().map(|c| c.label).collect();
    assert_eq!(labels, vec!["PPTs Scanned", "AI Flags", "Avg. Score"]);
    assert_eq!(cards[0].value, "4");
    assert_eq!(cards[1].value, "2");
    assert_eq!(cards[2].value, "—");
}

#[test]
fn processing_stats_round_average_to_one_decimal() {
    let snapshot = BatchSnapshot {
        avg_score: Some(8.26),
        ..BatchSnapshot::empty(ProgressSource::Authoritative)
    };
    assert_eq!(processing_stats(&snapshot)[2].value, "8.3");
}

#[test]
fn detail_stats_mention_failures_and_size() {
    let mut a = make_submission("a", Stage::Completed);
    a.size_bytes = 1024 * 1024;
    a.slide_count = 7;
    let mut b = make_submission("b", Stage::Failed);
    b.size_bytes = 512 * 1024;
    let totals = summarize_totals(&[a, b]);

    let cards = detail_stats(&totals);
    assert_eq!(cards[0].value, "2");
    assert_eq!(cards[1].value, "7");
    assert_eq!(cards[2].label, "Completed");
    assert_eq!(cards[2].sub.as_deref(), Some("1 failed"));
    assert_eq!(cards[3].value, "1.5 MB");
}

#[test]
fn detail_stats_omit_failure_note_when_none_failed() {
    let totals = summarize_totals(&[make_submission("a", Stage::Completed)]);
    assert_eq!(detail_stats(&totals)[2].sub, None);
}

// --- Rows and badges ---

#[test]
fn badges_follow_stage_colours() {
    assert!(badge(Stage::Completed).class.contains("text-green-400"));
    assert!(badge(Stage::Failed).class.contains("text-red-400"));
    assert!(badge(Stage::Pending).class.contains("text-yellow-400"));
    let working = badge(Stage::Chunking);
    assert!(working.class.contains("text-blue-400"));
    assert!(working.dot_class.contains("animate-pulse"));
}

#[test]
fn rows_keep_server_order_with_padded_index() {
    let mut sized = make_submission("zeta", Stage::Completed);
    sized.size_bytes = 2 * 1024 * 1024;
    let batch = vec![sized, make_submission("alpha", Stage::Pending)];

    let views = rows(&batch);
    assert_eq!(views[0].index, "01");
    assert_eq!(views[0].submission_id, "zeta");
    assert_eq!(views[0].size_label, "2.0 MB");
    assert_eq!(views[1].index, "02");
    assert_eq!(views[1].size_label, "—");
    assert_eq!(views[1].badge.label, "Pending");
}

// --- Indicator ---

#[test]
fn indicator_is_live_while_polling() {
    let totals = summarize_totals(&[
        make_submission("a", Stage::Ingesting),
        make_submission("b", Stage::Pending),
        make_submission("c", Stage::Completed),
    ]);
    let indicator = sync_indicator(SyncState::Backoff, &totals);
    assert_eq!(indicator.mode, IndicatorMode::Live { in_flight: 2 });
    assert_eq!(
        indicator.caption.as_deref(),
        Some("2 processing — auto-refreshing")
    );
}

#[test]
fn indicator_complete_once_stopped_on_terminal_batch() {
    let totals = summarize_totals(&[make_submission("a", Stage::Failed)]);
    let indicator = sync_indicator(SyncState::Stopped, &totals);
    assert_eq!(indicator.mode, IndicatorMode::Complete);
    assert_eq!(indicator.caption, None);
}

#[test]
fn indicator_paused_when_stopped_early() {
    let totals = summarize_totals(&[make_submission("a", Stage::Chunking)]);
    assert_eq!(
        sync_indicator(SyncState::Stopped, &totals).mode,
        IndicatorMode::Paused
    );
}

#[test]
fn run_header_reflects_pause() {
    assert_eq!(run_header(true), "PAUSED");
    assert_eq!(run_header(false), "LIVE EXECUTING");
}

#[test]
fn error_banner_dismisses_itself() {
    let banner = ErrorBanner::new(
        &EpError::FetchTimeout(Duration::from_secs(10)),
        at(0),
        Duration::from_secs(4),
    );
    assert!(banner.is_visible(at(3)));
    assert!(!banner.is_visible(at(4)));
    assert!(banner.text.contains("retrying"));
}

// --- Expanded submission ---

#[test]
fn detail_waits_while_extracting() {
    for stage in [Stage::Pending, Stage::Ingesting, Stage::Evaluating] {
        assert_eq!(
            submission_detail(stage, &[slide(1, Some("x"), None)]),
            SubmissionDetailView::Extracting {
                message: "Extracting content — check back soon…"
            }
        );
    }
}

#[test]
fn detail_points_failed_rows_at_reevaluation() {
    assert_eq!(
        submission_detail(Stage::Failed, &[]),
        SubmissionDetailView::ExtractionFailed {
            message: "Extraction failed. Use Re-Evaluate All to retry."
        }
    );
}

#[test]
fn detail_without_slides_says_so() {
    assert_eq!(
        submission_detail(Stage::Completed, &[]),
        SubmissionDetailView::Empty {
            message: "No slide data found yet."
        }
    );
}

#[test]
fn detail_lists_slide_cards() {
    let slides = vec![
        slide(1, Some("  Problem statement  "), Some(0.42)),
        slide(2, Some("   "), None),
    ];
    let SubmissionDetailView::Slides { heading, cards } =
        submission_detail(Stage::Completed, &slides)
    else {
        panic!("expected slide cards");
    };
    assert_eq!(heading, "2 slides extracted");
    assert_eq!(cards[0].title, "Slide 1");
    assert_eq!(cards[0].complexity.as_deref(), Some("complexity 42%"));
    assert_eq!(cards[0].text, "Problem statement");
    assert_eq!(cards[1].complexity, None);
    assert_eq!(cards[1].text, "(no text content)");
}

#[test]
fn single_slide_heading_is_singular() {
    let SubmissionDetailView::Slides { heading, .. } =
        submission_detail(Stage::Completed, &[slide(1, None, None)])
    else {
        panic!("expected slide cards");
    };
    assert_eq!(heading, "1 slide extracted");
}

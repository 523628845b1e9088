use proptest::prelude::*;

use keytrace::classifier::{classify, summarize};
use keytrace::ledger::{Key, KeystrokeEvent};
use keytrace::pager::{paginate, CompiledPatterns, PatternSet};
use keytrace::ranges::{merge_ranges, Range};
use keytrace::segmenter::{segment, text_for_sequence, PartKind};

fn ranges_strategy() -> impl Strategy<Value = Vec<Range>> {
    prop::collection::vec((0usize..200, 0usize..15), 0..30).prop_map(|pairs| {
        let mut ranges: Vec<Range> = pairs
            .into_iter()
            .map(|(start, len)| Range::new(start, start + len))
            .collect();
        ranges.sort();
        ranges
    })
}

fn events_strategy() -> impl Strategy<Value = Vec<KeystrokeEvent>> {
    let key = prop_oneof![
        3 => prop::sample::select(vec!['a', 'b', 'c', 'A', 's', ' ']).prop_map(Key::Char),
        1 => Just(Key::Backspace),
    ];
    prop::collection::vec((prop::sample::select(vec!['a', 'b', 'c', ' ']), key, 0u64..400), 0..60).prop_map(
        |presses| {
            presses
                .into_iter()
                .enumerate()
                .map(|(i, (expected, entered, delay_ms))| KeystrokeEvent {
                    sequence_id: 1,
                    sequence_number: i as u32 + 1,
                    expected,
                    entered,
                    delay_ms,
                })
                .collect()
        },
    )
}

fn pattern_set_strategy() -> impl Strategy<Value = PatternSet> {
    prop::sample::select(vec!["[?!.]", "\\n\\n", "\\b", " ", "x*"]).prop_map(|brk| PatternSet {
        break_patterns: vec![brk.to_string()],
        ..PatternSet::default()
    })
}

proptest! {
    #[test]
    fn merging_merged_ranges_is_a_no_op(ranges in ranges_strategy()) {
        let merged = merge_ranges(&ranges);
        prop_assert_eq!(merge_ranges(&merged), merged.clone());
        for pair in merged.windows(2) {
            prop_assert!(pair[0].end < pair[1].start);
        }
    }

    #[test]
    fn merged_ranges_cover_the_same_positions(ranges in ranges_strategy()) {
        let merged = merge_ranges(&ranges);
        for r in &ranges {
            prop_assert!(merged.iter().any(|m| m.start <= r.start && r.end <= m.end));
        }
    }

    #[test]
    fn pages_reassemble_the_text(
        text in "[a-z .?!\\n]{0,300}",
        set in pattern_set_strategy(),
        threshold in 0usize..60,
        offset in 0usize..400,
    ) {
        let patterns = CompiledPatterns::compile(&set).unwrap();
        let expected = patterns.apply_replacements(&text).unwrap();
        let pagination = paginate(&text, &patterns, threshold, offset).unwrap();

        prop_assert!(!pagination.pages.is_empty());
        prop_assert!(pagination.active_page < pagination.page_count());
        prop_assert_eq!(pagination.pages.concat(), expected);
        if pagination.page_count() > 1 {
            prop_assert!(pagination.pages.iter().all(|p| !p.is_empty()));
        }
    }

    #[test]
    fn surviving_parts_rebuild_sequence_text(events in events_strategy()) {
        let surviving: String = segment(&events)
            .iter()
            .filter(|p| p.kind != PartKind::Erased)
            .map(|p| p.expected.as_str())
            .collect();
        prop_assert_eq!(surviving, text_for_sequence(&events));
    }

    #[test]
    fn erased_chars_match_effective_backspaces(events in events_strategy()) {
        // backspaces with nothing left to erase do not count
        let mut available = 0usize;
        let mut effective = 0usize;
        for event in &events {
            if event.is_backspace() {
                if available > 0 {
                    available -= 1;
                    effective += 1;
                }
            } else {
                available += 1;
            }
        }
        let erased: usize = segment(&events)
            .iter()
            .filter(|p| p.kind == PartKind::Erased)
            .map(|p| p.char_len())
            .sum();
        prop_assert_eq!(erased, effective);
    }

    #[test]
    fn typo_counts_add_up(events in events_strategy()) {
        let records = classify(&events);
        let mismatches = events.iter().filter(|e| e.is_mismatch()).count();
        prop_assert!(records.len() <= mismatches);
        prop_assert!(records.iter().all(|r| r.expected != r.offending));

        let summaries = summarize(&records);
        let by_type: u32 = summaries.values().map(|s| s.counts_by_type.values().sum::<u32>()).sum();
        let by_char: u32 = summaries.values().map(|s| s.counts_by_offending_char.values().sum::<u32>()).sum();
        prop_assert_eq!(by_type as usize, records.len());
        prop_assert_eq!(by_char as usize, records.len());
    }
}

#[test]
fn isolated_mismatches_each_yield_one_typo() {
    let events: Vec<KeystrokeEvent> = [('a', 'x'), ('b', 'b'), ('c', 'c'), ('d', 'D'), ('e', 'e')]
        .iter()
        .enumerate()
        .map(|(i, &(expected, entered))| KeystrokeEvent {
            sequence_id: 1,
            sequence_number: i as u32 + 1,
            expected,
            entered: Key::Char(entered),
            delay_ms: 100,
        })
        .collect();
    assert_eq!(classify(&events).len(), 2);
}

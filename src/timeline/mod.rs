//! Canonical timeline reconstruction.
//!
//! [`reconstruct`] turns the flat main flow plus the soundings and reforge
//! side channels into an ordered list of [`PhaseGroup`]s:
//!
//! 1. Split the main flow into contiguous runs by phase.
//! 2. Synthesize empty groups for blocks whose phase never reached the main
//!    flow, placed by the block's first timestamp.
//! 3. Drop block-owned entries from each group's flat message list.
//! 4. Attach each block to the first group of its phase only, and roll up
//!    cost and tokens for the group and whatever it attached.
//!
//! The pass is a pure fold. The set of blocks already attached is threaded
//! through the fold rather than kept anywhere mutable, so two calls on the
//! same inputs always agree.
//!
//! Every entry is rendered exactly once: either in a group's `messages`, or
//! inside the block attached to the first group of its phase.

pub mod cost;

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::model::{Entry, ReforgeBlock, SoundingsBlock, Timestamp, UNKNOWN_PHASE};
use cost::rollup;

/// One renderable phase of the timeline.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PhaseGroup {
    pub phase_name: String,
    /// Main-flow entries rendered flat (block-owned entries removed).
    pub messages: Vec<Entry>,
    /// The phase has a soundings block (attached here or on an earlier group).
    pub has_soundings: bool,
    pub has_reforge: bool,
    /// The soundings block, present only on the first group of the phase.
    pub soundings: Option<SoundingsBlock>,
    pub reforge: Option<ReforgeBlock>,
    pub aggregated_cost: f64,
    /// Input tokens across messages and attached blocks.
    pub aggregated_tokens: u64,
    pub aggregated_tokens_out: u64,
    /// Rendered messages plus block-owned entries attached here.
    pub message_count: usize,
    /// The group has no main-flow run; it exists only to host a block.
    pub synthesized: bool,
}

impl PhaseGroup {
    /// Entries logged outside any phase render without a phase wrapper.
    pub fn is_unknown(&self) -> bool {
        self.phase_name == UNKNOWN_PHASE
    }

    pub fn shows_soundings(&self) -> bool {
        self.soundings.is_some()
    }

    pub fn shows_reforge(&self) -> bool {
        self.reforge.is_some()
    }
}

/// A group before finalization: the raw run of entries (or none, for a
/// synthesized group) and the timestamp it is ordered by.
struct Slot<'a> {
    phase: &'a str,
    entries: &'a [Entry],
    anchor: Timestamp,
    synthesized: bool,
}

/// Phases whose blocks have already been attached to a group.
#[derive(Default)]
struct Attached<'a> {
    soundings: HashSet<&'a str>,
    reforge: HashSet<&'a str>,
}

/// Reconstruct the grouped timeline.
pub fn reconstruct(
    main_flow: &[Entry],
    soundings_by_phase: &[SoundingsBlock],
    reforge_by_phase: &[ReforgeBlock],
) -> Vec<PhaseGroup> {
    let soundings = index_by_phase(soundings_by_phase, |b| b.phase_name.as_str());
    let reforge = index_by_phase(reforge_by_phase, |b| b.phase_name.as_str());

    let mut slots = split_runs(main_flow);
    insert_orphans(&mut slots, soundings_by_phase, reforge_by_phase);

    let (groups, _) = slots.into_iter().fold(
        (Vec::new(), Attached::default()),
        |(mut groups, attached), slot| {
            let (group, attached) = finalize(slot, &soundings, &reforge, attached);
            groups.push(group);
            (groups, attached)
        },
    );
    groups
}

/// First block per phase wins if the backend ever sends duplicates.
fn index_by_phase<'a, B>(blocks: &'a [B], phase: impl Fn(&B) -> &str) -> HashMap<&'a str, &'a B> {
    let mut map = HashMap::new();
    for block in blocks {
        map.entry(phase(block)).or_insert(block);
    }
    map
}

fn split_runs(main_flow: &[Entry]) -> Vec<Slot<'_>> {
    main_flow
        .chunk_by(|a, b| a.phase_key() == b.phase_key())
        .map(|run| Slot {
            phase: run[0].phase_key(),
            entries: run,
            anchor: run[0].timestamp,
            synthesized: false,
        })
        .collect()
}

/// Insert an empty slot for every block phase that has no main-flow run.
///
/// Each orphan goes before the first slot whose anchor is later than the
/// block's first timestamp, or at the end. Orphans are placed in timestamp
/// order so earlier orphans are already in place when later ones are sited.
fn insert_orphans<'a>(
    slots: &mut Vec<Slot<'a>>,
    soundings_by_phase: &'a [SoundingsBlock],
    reforge_by_phase: &'a [ReforgeBlock],
) {
    let present: HashSet<&str> = slots.iter().map(|s| s.phase).collect();

    let mut orphans: Vec<(&'a str, Timestamp)> = Vec::new();
    let candidates = soundings_by_phase
        .iter()
        .map(|b| (b.phase_name.as_str(), b.first_timestamp))
        .chain(
            reforge_by_phase
                .iter()
                .map(|b| (b.phase_name.as_str(), b.first_timestamp)),
        );
    for (phase, first) in candidates {
        if present.contains(phase) {
            continue;
        }
        match orphans.iter_mut().find(|(p, _)| *p == phase) {
            Some((_, anchor)) => {
                if first.total_cmp(anchor).is_lt() {
                    *anchor = first;
                }
            }
            None => orphans.push((phase, first)),
        }
    }
    orphans.sort_by(|a, b| a.1.total_cmp(&b.1));

    for (phase, anchor) in orphans {
        let position = slots
            .iter()
            .position(|s| s.anchor.total_cmp(&anchor).is_gt())
            .unwrap_or(slots.len());
        slots.insert(
            position,
            Slot {
                phase,
                entries: &[],
                anchor,
                synthesized: true,
            },
        );
    }
}

fn finalize<'a>(
    slot: Slot<'a>,
    soundings: &HashMap<&'a str, &'a SoundingsBlock>,
    reforge: &HashMap<&'a str, &'a ReforgeBlock>,
    mut attached: Attached<'a>,
) -> (PhaseGroup, Attached<'a>) {
    let sounding_block = soundings.get(slot.phase).copied();
    let reforge_block = reforge.get(slot.phase).copied();

    let messages: Vec<Entry> = slot
        .entries
        .iter()
        .filter(|e| !(e.in_sounding() && sounding_block.is_some()))
        .filter(|e| !(e.in_reforge() && reforge_block.is_some()))
        .cloned()
        .collect();

    let show_soundings = sounding_block.filter(|_| attached.soundings.insert(slot.phase));
    let show_reforge = reforge_block.filter(|_| attached.reforge.insert(slot.phase));

    let totals = rollup(&messages, show_soundings, show_reforge);

    let group = PhaseGroup {
        phase_name: slot.phase.to_string(),
        messages,
        has_soundings: sounding_block.is_some(),
        has_reforge: reforge_block.is_some(),
        soundings: show_soundings.cloned(),
        reforge: show_reforge.cloned(),
        aggregated_cost: totals.cost,
        aggregated_tokens: totals.tokens_in,
        aggregated_tokens_out: totals.tokens_out,
        message_count: totals.entries,
        synthesized: slot.synthesized,
    };
    (group, attached)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ReforgeStep, Sounding};
    use crate::timeline::cost::CostSummary;

    fn entry(phase: Option<&str>, ts: f64, content: &str) -> Entry {
        Entry {
            timestamp: Timestamp(ts),
            phase_name: phase.map(ToString::to_string),
            role: "assistant".into(),
            content: serde_json::Value::String(content.into()),
            cost: 0.01,
            tokens_in: 10,
            ..Default::default()
        }
    }

    fn sounding_entry(phase: &str, ts: f64, index: u32, content: &str) -> Entry {
        Entry {
            sounding_index: Some(index),
            ..entry(Some(phase), ts, content)
        }
    }

    fn reforge_entry(phase: &str, ts: f64, step: u32, content: &str) -> Entry {
        Entry {
            reforge_step: Some(step),
            ..entry(Some(phase), ts, content)
        }
    }

    fn soundings_block(phase: &str, first: f64, attempts: Vec<Vec<Entry>>) -> SoundingsBlock {
        SoundingsBlock {
            phase_name: phase.into(),
            first_timestamp: Timestamp(first),
            soundings: attempts
                .into_iter()
                .enumerate()
                .map(|(i, messages)| Sounding {
                    index: i as u32,
                    messages,
                    is_winner: false,
                })
                .collect(),
            evaluator: None,
            winner_index: None,
        }
    }

    fn contents(group: &PhaseGroup) -> Vec<String> {
        group.messages.iter().map(|e| e.content_text()).collect()
    }

    #[test]
    fn test_scenario_two_phases_with_soundings() {
        let main_flow = vec![
            entry(Some("phase1"), 1.0, "A"),
            entry(Some("phase1"), 2.0, "B"),
            entry(Some("phase2"), 6.0, "C"),
        ];
        let soundings = vec![soundings_block(
            "phase2",
            5.0,
            vec![vec![sounding_entry("phase2", 5.0, 0, "S0")]],
        )];

        let groups = reconstruct(&main_flow, &soundings, &[]);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].phase_name, "phase1");
        assert_eq!(contents(&groups[0]), vec!["A", "B"]);
        assert!(!groups[0].has_soundings);
        assert_eq!(groups[1].phase_name, "phase2");
        assert_eq!(contents(&groups[1]), vec!["C"]);
        assert!(groups[1].has_soundings);
        assert!(groups[1].shows_soundings());
    }

    #[test]
    fn test_unphased_entries_group_as_unknown() {
        let main_flow = vec![
            entry(None, 0.5, "boot"),
            entry(Some("phase1"), 1.0, "A"),
        ];
        let groups = reconstruct(&main_flow, &[], &[]);
        assert_eq!(groups.len(), 2);
        assert!(groups[0].is_unknown());
        assert_eq!(groups[0].phase_name, UNKNOWN_PHASE);
        assert!(!groups[1].is_unknown());
    }

    #[test]
    fn test_non_contiguous_unphased_entries_form_separate_unknown_groups() {
        let main_flow = vec![
            entry(None, 0.5, "boot"),
            entry(Some("phase1"), 1.0, "A"),
            entry(None, 2.0, "stray"),
        ];
        let groups = reconstruct(&main_flow, &[], &[]);
        let names: Vec<&str> = groups.iter().map(|g| g.phase_name.as_str()).collect();
        assert_eq!(names, vec![UNKNOWN_PHASE, "phase1", UNKNOWN_PHASE]);
        assert_eq!(contents(&groups[0]), vec!["boot"]);
        assert_eq!(contents(&groups[2]), vec!["stray"]);
    }

    #[test]
    fn test_recurring_phase_yields_separate_runs() {
        let main_flow = vec![
            entry(Some("plan"), 1.0, "A"),
            entry(Some("act"), 2.0, "B"),
            entry(Some("plan"), 3.0, "C"),
        ];
        let groups = reconstruct(&main_flow, &[], &[]);
        let names: Vec<&str> = groups.iter().map(|g| g.phase_name.as_str()).collect();
        assert_eq!(names, vec!["plan", "act", "plan"]);
    }

    #[test]
    fn test_block_attaches_to_first_group_of_phase_only() {
        let main_flow = vec![
            entry(Some("plan"), 1.0, "A"),
            entry(Some("act"), 2.0, "B"),
            entry(Some("plan"), 3.0, "C"),
        ];
        let soundings = vec![soundings_block(
            "plan",
            0.9,
            vec![vec![sounding_entry("plan", 0.9, 0, "S")]],
        )];
        let groups = reconstruct(&main_flow, &soundings, &[]);
        assert!(groups[0].shows_soundings());
        assert!(groups[0].has_soundings);
        assert!(!groups[2].shows_soundings());
        assert!(groups[2].has_soundings);
        assert!((groups[0].aggregated_cost - 0.02).abs() < 1e-9);
        assert!((groups[2].aggregated_cost - 0.01).abs() < 1e-9);
    }

    #[test]
    fn test_orphan_block_inserted_by_timestamp() {
        let main_flow = vec![
            entry(Some("phase1"), 1.0, "A"),
            entry(Some("phase3"), 10.0, "C"),
        ];
        let soundings = vec![soundings_block(
            "phase2",
            5.0,
            vec![vec![sounding_entry("phase2", 5.0, 0, "failed")]],
        )];
        let groups = reconstruct(&main_flow, &soundings, &[]);
        let names: Vec<&str> = groups.iter().map(|g| g.phase_name.as_str()).collect();
        assert_eq!(names, vec!["phase1", "phase2", "phase3"]);
        assert!(groups[1].synthesized);
        assert!(groups[1].messages.is_empty());
        assert!(groups[1].shows_soundings());
    }

    #[test]
    fn test_orphan_earlier_than_everything_goes_first() {
        let main_flow = vec![entry(Some("phase1"), 10.0, "A")];
        let soundings = vec![soundings_block("early", 1.0, vec![vec![]])];
        let groups = reconstruct(&main_flow, &soundings, &[]);
        assert_eq!(groups[0].phase_name, "early");
        assert_eq!(groups[1].phase_name, "phase1");
    }

    #[test]
    fn test_orphan_later_than_everything_goes_last() {
        let main_flow = vec![entry(Some("phase1"), 1.0, "A")];
        let reforge = vec![ReforgeBlock {
            phase_name: "late".into(),
            first_timestamp: Timestamp(50.0),
            reforge_steps: vec![],
            winner_step: None,
        }];
        let groups = reconstruct(&main_flow, &[], &reforge);
        assert_eq!(groups.last().unwrap().phase_name, "late");
        assert!(groups.last().unwrap().has_reforge);
    }

    #[test]
    fn test_orphan_with_both_blocks_synthesizes_one_group() {
        let soundings = vec![soundings_block("solo", 3.0, vec![vec![]])];
        let reforge = vec![ReforgeBlock {
            phase_name: "solo".into(),
            first_timestamp: Timestamp(2.0),
            ..Default::default()
        }];
        let groups = reconstruct(&[], &soundings, &reforge);
        assert_eq!(groups.len(), 1);
        assert!(groups[0].shows_soundings());
        assert!(groups[0].shows_reforge());
    }

    #[test]
    fn test_block_owned_entries_not_rendered_flat() {
        let main_flow = vec![
            entry(Some("draft"), 1.0, "intro"),
            sounding_entry("draft", 2.0, 1, "winner text"),
            reforge_entry("draft", 3.0, 0, "refined"),
        ];
        let soundings = vec![soundings_block(
            "draft",
            2.0,
            vec![
                vec![sounding_entry("draft", 2.0, 0, "loser text")],
                vec![sounding_entry("draft", 2.0, 1, "winner text")],
            ],
        )];
        let reforge = vec![ReforgeBlock {
            phase_name: "draft".into(),
            first_timestamp: Timestamp(3.0),
            reforge_steps: vec![ReforgeStep {
                step: 0,
                messages: vec![reforge_entry("draft", 3.0, 0, "refined")],
                is_winner: true,
            }],
            winner_step: Some(0),
        }];

        let groups = reconstruct(&main_flow, &soundings, &reforge);
        assert_eq!(groups.len(), 1);
        assert_eq!(contents(&groups[0]), vec!["intro"]);
        assert_eq!(groups[0].message_count, 4);
    }

    #[test]
    fn test_indexed_entry_without_block_stays_flat() {
        let main_flow = vec![sounding_entry("draft", 1.0, 0, "kept")];
        let groups = reconstruct(&main_flow, &[], &[]);
        assert_eq!(contents(&groups[0]), vec!["kept"]);
    }

    #[test]
    fn test_block_without_winner_renders() {
        let main_flow = vec![entry(Some("draft"), 1.0, "A")];
        let soundings = vec![soundings_block(
            "draft",
            1.0,
            vec![
                vec![sounding_entry("draft", 1.0, 0, "x")],
                vec![sounding_entry("draft", 1.0, 1, "y")],
            ],
        )];
        let groups = reconstruct(&main_flow, &soundings, &[]);
        let block = groups[0].soundings.as_ref().unwrap();
        assert!(block.winner().is_none());
    }

    #[test]
    fn test_reconstruct_is_idempotent() {
        let main_flow = vec![
            entry(None, 0.0, "boot"),
            entry(Some("phase1"), 1.0, "A"),
            sounding_entry("phase1", 2.0, 0, "S"),
            entry(Some("phase2"), 3.0, "B"),
        ];
        let soundings = vec![
            soundings_block("phase1", 2.0, vec![vec![sounding_entry("phase1", 2.0, 0, "S")]]),
            soundings_block("ghost", 2.5, vec![vec![]]),
        ];
        let first = reconstruct(&main_flow, &soundings, &[]);
        let second = reconstruct(&main_flow, &soundings, &[]);
        assert_eq!(first, second);
    }

    #[test]
    fn test_every_entry_rendered_exactly_once() {
        let s0 = sounding_entry("draft", 2.0, 0, "s0");
        let s1 = sounding_entry("draft", 2.1, 1, "s1");
        let eval = entry(Some("draft"), 2.5, "eval");
        let r0 = reforge_entry("draft", 3.0, 0, "r0");
        let orphan = sounding_entry("lost", 4.0, 0, "lost0");
        let main_flow = vec![
            entry(None, 0.0, "boot"),
            entry(Some("draft"), 1.0, "intro"),
            s1.clone(),
            r0.clone(),
            entry(Some("review"), 5.0, "done"),
            entry(Some("draft"), 6.0, "again"),
        ];
        let soundings = vec![
            SoundingsBlock {
                evaluator: Some(eval.clone()),
                winner_index: Some(1),
                ..soundings_block("draft", 2.0, vec![vec![s0.clone()], vec![s1.clone()]])
            },
            soundings_block("lost", 4.0, vec![vec![orphan.clone()]]),
        ];
        let reforge = vec![ReforgeBlock {
            phase_name: "draft".into(),
            first_timestamp: Timestamp(3.0),
            reforge_steps: vec![ReforgeStep {
                step: 0,
                messages: vec![r0.clone()],
                is_winner: true,
            }],
            winner_step: Some(0),
        }];

        let groups = reconstruct(&main_flow, &soundings, &reforge);

        let mut rendered: Vec<String> = Vec::new();
        for group in &groups {
            rendered.extend(group.messages.iter().map(|e| e.content_text()));
            if let Some(block) = &group.soundings {
                rendered.extend(block.entries().map(|e| e.content_text()));
            }
            if let Some(block) = &group.reforge {
                rendered.extend(block.entries().map(|e| e.content_text()));
            }
        }
        rendered.sort();

        let mut expected: Vec<String> = [
            "boot", "intro", "s0", "s1", "eval", "r0", "lost0", "done", "again",
        ]
        .iter()
        .map(ToString::to_string)
        .collect();
        expected.sort();
        assert_eq!(rendered, expected);
    }

    #[test]
    fn test_cost_is_conserved_across_groups() {
        let s0 = sounding_entry("draft", 2.0, 0, "s0");
        let s1 = sounding_entry("draft", 2.1, 1, "s1");
        let main_flow = vec![
            entry(Some("plan"), 1.0, "plan"),
            s1.clone(),
            entry(Some("ship"), 3.0, "ship"),
        ];
        let soundings = vec![soundings_block(
            "draft",
            2.0,
            vec![vec![s0.clone()], vec![s1.clone()]],
        )];
        let all_messages = vec![
            main_flow[0].clone(),
            s0,
            s1,
            main_flow[2].clone(),
        ];

        let groups = reconstruct(&main_flow, &soundings, &[]);
        let summary = CostSummary::from_entries(&all_messages);
        let total: f64 = groups.iter().map(|g| g.aggregated_cost).sum();
        assert!((total - summary.total_cost).abs() < 1e-9);
        let tokens: u64 = groups.iter().map(|g| g.aggregated_tokens).sum();
        assert_eq!(tokens, summary.total_tokens_in);
    }

    #[test]
    fn test_empty_inputs() {
        assert!(reconstruct(&[], &[], &[]).is_empty());
    }
}

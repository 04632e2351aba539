mod common;

use std::collections::HashSet;

use common::{frames, init_logging, log_dist, wavy_script, ScriptedScorer};
use rnnt_engine_lib::asr::decoder::{retain_top_k, BeamSet, DecoderSession, Hypothesis};
use rnnt_engine_lib::asr::{decode_utterance, AsrError, LengthNorm, SearchConfig};

fn beam_config(beam_size: usize, expand_beam: usize) -> SearchConfig {
    SearchConfig {
        beam_size,
        expand_beam,
        force_beam: true,
        ..Default::default()
    }
}

#[test]
fn always_blank_emits_single_placeholder() {
    init_logging();
    let mut scorer = ScriptedScorer::new(5, |_, _| log_dist(&[0.0, 0.0, 0.0, 0.0, 1.0]));

    let transcript = decode_utterance(&mut scorer, frames(3).view(), &SearchConfig::greedy())
        .expect("greedy decode");

    assert_eq!(transcript.labels, vec![4]);
    assert_eq!(transcript.frame_count, 1);
    assert!(transcript.timestamps.is_empty());
    assert!(transcript.is_placeholder(4));
    assert!(!transcript.truncated);
}

#[test]
fn always_blank_beam_also_emits_placeholder() {
    let mut scorer = ScriptedScorer::new(5, |_, _| log_dist(&[0.0, 0.0, 0.0, 0.0, 1.0]));

    let transcript =
        decode_utterance(&mut scorer, frames(3).view(), &beam_config(4, 5)).expect("beam decode");

    assert_eq!(transcript.labels, vec![4]);
    assert_eq!(transcript.frame_count, 1);
    assert_eq!(transcript.nbest.len(), 1);
    assert!(transcript.nbest[0].labels.is_empty());
}

#[test]
fn greedy_emits_label_then_moves_on() {
    let mut scorer = ScriptedScorer::new(5, |t, prefix| {
        if t == 0 && prefix.is_empty() {
            log_dist(&[0.05, 0.05, 0.7, 0.05, 0.15])
        } else {
            log_dist(&[0.05, 0.05, 0.1, 0.05, 0.75])
        }
    });

    let transcript = decode_utterance(&mut scorer, frames(2).view(), &SearchConfig::greedy())
        .expect("greedy decode");

    assert_eq!(transcript.labels, vec![2]);
    assert_eq!(transcript.timestamps, vec![0]);
    assert_eq!(transcript.frame_count, 1);
    // Prefixes [] and [2]; frame 1 reuses the cached [2] output.
    assert_eq!(scorer.decoder_calls, 2);
    assert_eq!(scorer.joint_calls, 3);
}

#[test]
fn greedy_can_emit_several_labels_on_one_frame() {
    let mut scorer = ScriptedScorer::new(4, |t, prefix| match (t, prefix.len()) {
        (0, 0) => log_dist(&[0.8, 0.1, 0.0, 0.1]),
        (0, 1) => log_dist(&[0.1, 0.8, 0.0, 0.1]),
        _ => log_dist(&[0.1, 0.1, 0.0, 0.8]),
    });

    let transcript = decode_utterance(&mut scorer, frames(3).view(), &SearchConfig::greedy())
        .expect("greedy decode");

    assert_eq!(transcript.labels, vec![0, 1]);
    assert_eq!(transcript.timestamps, vec![0, 0]);
}

#[test]
fn prune_keeps_best_within_beam() {
    let make = || {
        vec![
            Hypothesis::new(vec![2, 1], -0.3),
            Hypothesis::new(vec![1, 2], -0.1),
        ]
    };

    let mut both = make();
    retain_top_k(&mut both, 2);
    assert_eq!(both.len(), 2);
    assert_eq!(both[0].tokens, vec![1, 2]);
    assert_eq!(both[1].tokens, vec![2, 1]);

    let mut one = make();
    retain_top_k(&mut one, 1);
    assert_eq!(one.len(), 1);
    assert_eq!(one[0].tokens, vec![1, 2]);
}

#[test]
fn beam_set_pruning_keeps_global_best() {
    let mut set = BeamSet::new();
    for (tokens, score) in [
        (vec![3], -2.0),
        (vec![1, 2], -0.1),
        (vec![4], -5.0),
        (vec![2, 1], -0.3),
        (vec![0], -1.0),
    ] {
        set.insert_or_merge(Hypothesis::new(tokens, score));
    }

    let kept = set.into_pruned(3);
    let scores: Vec<f32> = kept.iter().map(|h| h.score).collect();
    assert_eq!(scores, vec![-0.1, -0.3, -1.0]);
}

#[test]
fn merged_paths_sum_probability_mass() {
    // One label at most per utterance prefix, after which only blank remains.
    let mut scorer = ScriptedScorer::new(3, |_, prefix| {
        if prefix.is_empty() {
            log_dist(&[0.3, 0.2, 0.5])
        } else {
            log_dist(&[0.0, 0.0, 1.0])
        }
    });
    let config = SearchConfig {
        length_norm: LengthNorm::None,
        ..beam_config(10, 3)
    };

    let transcript = decode_utterance(&mut scorer, frames(2).view(), &config).expect("beam decode");

    // [0] is reached on frame 0 (0.3 * 1.0) or frame 1 (0.5 * 0.3): 0.45 total.
    assert_eq!(transcript.labels, vec![0]);
    assert!((transcript.score.exp() - 0.45).abs() < 1e-5);

    let probs: Vec<(Vec<i32>, f32)> = transcript
        .nbest
        .iter()
        .map(|e| (e.labels.clone(), e.score.exp()))
        .collect();
    assert_eq!(probs.len(), 3);
    let find = |labels: &[i32]| {
        probs
            .iter()
            .find(|(l, _)| l.as_slice() == labels)
            .map(|(_, p)| *p)
            .expect("hypothesis present")
    };
    assert!((find(&[1]) - 0.3).abs() < 1e-5);
    assert!((find(&[]) - 0.25).abs() < 1e-5);
}

#[test]
fn survivors_have_distinct_labels_and_respect_beam() {
    let mut scorer = ScriptedScorer::new(6, wavy_script(6));

    let transcript =
        decode_utterance(&mut scorer, frames(8).view(), &beam_config(3, 4)).expect("beam decode");

    assert!(transcript.nbest.len() <= 3);
    let unique: HashSet<&Vec<i32>> = transcript.nbest.iter().map(|e| &e.labels).collect();
    assert_eq!(unique.len(), transcript.nbest.len());
    for pair in transcript.nbest.windows(2) {
        assert!(pair[0].score >= pair[1].score);
    }
}

#[test]
fn greedy_matches_single_beam_argmax() {
    for frames_len in [1, 4, 9] {
        let mut greedy_scorer = ScriptedScorer::new(7, wavy_script(7));
        let mut beam_scorer = ScriptedScorer::new(7, wavy_script(7));

        let greedy = decode_utterance(
            &mut greedy_scorer,
            frames(frames_len).view(),
            &SearchConfig::greedy(),
        )
        .expect("greedy decode");
        let beam = decode_utterance(
            &mut beam_scorer,
            frames(frames_len).view(),
            &beam_config(1, 1),
        )
        .expect("beam decode");

        assert_eq!(greedy.labels, beam.labels, "frames={frames_len}");
        assert_eq!(greedy.timestamps, beam.timestamps, "frames={frames_len}");
        assert!((greedy.score - beam.score).abs() < 1e-5);
    }
}

#[test]
fn decoder_cache_is_reused_for_unchanged_prefix() {
    let mut scorer = ScriptedScorer::new(3, |_, _| log_dist(&[0.2, 0.2, 0.6]));
    let mut session = DecoderSession::new(&scorer).expect("session");
    let mut hyp = Hypothesis::initial();

    session
        .ensure_decoder_output(&mut scorer, &mut hyp)
        .expect("first step");
    let first = hyp.decoder_output().cloned().expect("cache filled");
    session
        .ensure_decoder_output(&mut scorer, &mut hyp)
        .expect("second step");

    assert_eq!(scorer.decoder_calls, 1);
    assert_eq!(hyp.decoder_output(), Some(&first));
    assert_eq!(session.stats().decoder_steps, 1);
    assert_eq!(session.stats().cache_hits, 1);

    let mut child = hyp.extend(1, -1.0, 0);
    assert!(!child.has_current_cache());
    session
        .ensure_decoder_output(&mut scorer, &mut child)
        .expect("child step");
    assert_eq!(scorer.decoder_calls, 2);
    assert_eq!(scorer.decoded_prefixes(), &[vec![], vec![1]]);
}

#[test]
fn beam_evaluates_each_prefix_once_per_hypothesis() {
    let mut scorer = ScriptedScorer::new(5, |_, _| log_dist(&[0.0, 0.0, 0.0, 0.0, 1.0]));

    decode_utterance(&mut scorer, frames(6).view(), &beam_config(4, 5)).expect("beam decode");

    // The empty hypothesis survives every frame with its cache intact.
    assert_eq!(scorer.decoder_calls, 1);
    assert_eq!(scorer.joint_calls, 6);
    assert_eq!(scorer.encode_calls, 1);
}

#[test]
fn greedy_step_cap_truncates() {
    let mut scorer = ScriptedScorer::new(3, |_, _| log_dist(&[0.9, 0.1, 0.0]));
    let config = SearchConfig {
        max_decode_steps: 5,
        ..SearchConfig::greedy()
    };

    let transcript = decode_utterance(&mut scorer, frames(4).view(), &config).expect("decode");

    assert!(transcript.truncated);
    assert_eq!(transcript.labels, vec![0; 5]);
}

#[test]
fn beam_expansion_cap_keeps_best_so_far() {
    let mut scorer = ScriptedScorer::new(3, |_, _| log_dist(&[0.6, 0.4, 0.0]));
    let config = SearchConfig {
        max_expansions_per_frame: 4,
        ..beam_config(2, 3)
    };

    let transcript = decode_utterance(&mut scorer, frames(3).view(), &config).expect("decode");

    assert!(transcript.truncated);
    assert!(!transcript.labels.is_empty());
    assert!(transcript.nbest.len() <= 2);
}

#[test]
fn non_finite_scores_are_scoring_failures() {
    let mut scorer = ScriptedScorer::new(3, |_, _| vec![f32::NAN, -1.0, -1.0]);

    let err = decode_utterance(&mut scorer, frames(2).view(), &SearchConfig::greedy())
        .expect_err("NaN must fail");

    assert!(matches!(err, AsrError::ScoringFailure(_)));
}

#[test]
fn vocabulary_mismatch_is_invalid_input() {
    let mut scorer = ScriptedScorer::new(4, |_, _| log_dist(&[0.5, 0.5]));

    let err = decode_utterance(&mut scorer, frames(2).view(), &beam_config(2, 2))
        .expect_err("short score vector must fail");

    assert!(matches!(err, AsrError::InvalidInput(_)));
}

#[test]
fn empty_utterance_is_invalid_input() {
    let mut scorer = ScriptedScorer::new(4, |_, _| log_dist(&[0.1, 0.1, 0.1, 0.7]));

    let err = decode_utterance(&mut scorer, frames(0).view(), &SearchConfig::default())
        .expect_err("no frames");

    assert!(matches!(err, AsrError::InvalidInput(_)));
    assert_eq!(scorer.encode_calls, 0);
}

#[test]
fn nbest_limit_is_honoured() {
    let mut scorer = ScriptedScorer::new(6, wavy_script(6));
    let config = SearchConfig {
        nbest: 2,
        ..beam_config(5, 6)
    };

    let transcript = decode_utterance(&mut scorer, frames(5).view(), &config).expect("decode");

    assert!(transcript.nbest.len() <= 2);
    assert_eq!(
        transcript.nbest[0].labels.is_empty(),
        transcript.is_placeholder(5)
    );
}

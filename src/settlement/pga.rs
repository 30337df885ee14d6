//! PGA-family aggregation, ranking, and payout allocation (spec §4.5.1-3).
//!
//! Pure functions over owned data, no hidden state. This is the only
//! settlement strategy given a concrete body; other sports are registered
//! in `settlement::strategy_for` but return `CoreError::UnsupportedSport`
//! until a scoring-rule plugin is supplied (scoring-rule definition per
//! sport is a Non-goal).

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

/// Parses the provider snapshot payload's `participants` map and aggregates
/// each listed participant's score. Participants with no entry in the
/// payload score zero rather than erroring — absence of golfer data for a
/// joined-but-unscored participant is not itself an invariant violation.
///
/// Expected shape: `{"participants": {"<user_id>": [{"golfer_id", "round",
/// "hole_points", "finish_bonus"}, ...]}}`.
pub fn aggregate_scores_from_payload(
    payload: &Value,
    participant_ids: &[Uuid],
) -> anyhow::Result<Vec<(Uuid, i64)>> {
    #[derive(Deserialize)]
    struct RawEntry {
        golfer_id: String,
        #[serde(default)]
        hole_points: i64,
        #[serde(default)]
        finish_bonus: i64,
    }

    let participants_obj = payload.get("participants").and_then(Value::as_object);

    let mut scores = Vec::with_capacity(participant_ids.len());
    for user_id in participant_ids {
        let score = match participants_obj.and_then(|m| m.get(&user_id.to_string())) {
            Some(entries_value) => {
                let raw: Vec<RawEntry> = serde_json::from_value(entries_value.clone())?;
                let entries: Vec<GolferRoundEntry> = raw
                    .into_iter()
                    .map(|r| GolferRoundEntry {
                        golfer_id: r.golfer_id,
                        hole_points: r.hole_points,
                        finish_bonus: r.finish_bonus,
                    })
                    .collect();
                aggregate_participant_score(&entries)
            }
            None => 0,
        };
        scores.push((*user_id, score));
    }
    Ok(scores)
}

/// One golfer's score contribution for a single round.
#[derive(Debug, Clone)]
pub struct GolferRoundEntry {
    pub golfer_id: String,
    pub hole_points: i64,
    pub finish_bonus: i64,
}

/// Sum `hole_points + finish_bonus` per golfer across rounds; with >= 7
/// golfers, drop exactly the single lowest-total golfer before summing.
///
/// Assumes every entry passed in is for a fully-scored golfer; mid-round
/// (partial) data is not filtered here, per spec §9 Open Questions — that
/// filter, if needed, belongs to the ingestion layer's FINAL flag.
pub fn aggregate_participant_score(entries: &[GolferRoundEntry]) -> i64 {
    let mut totals: BTreeMap<&str, i64> = BTreeMap::new();
    for e in entries {
        *totals.entry(e.golfer_id.as_str()).or_insert(0) += e.hole_points + e.finish_bonus;
    }
    let mut values: Vec<i64> = totals.into_values().collect();
    if values.len() >= 7 {
        if let Some((min_idx, _)) = values.iter().enumerate().min_by_key(|(_, v)| **v) {
            values.remove(min_idx);
        }
    }
    values.into_iter().sum()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankedParticipant {
    pub user_id: Uuid,
    pub rank: i64,
    pub score: i64,
}

/// Sort by `(score DESC, user_id ASC)` and assign competition ranks: ties
/// share a rank, the next distinct score skips by the number of ties
/// (100,100,90 -> 1,1,3).
pub fn rank_participants(scores: &[(Uuid, i64)]) -> Vec<RankedParticipant> {
    let mut sorted: Vec<(Uuid, i64)> = scores.to_vec();
    sorted.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

    sorted
        .iter()
        .map(|(user_id, score)| {
            let rank = 1 + sorted.iter().filter(|(_, s)| *s > *score).count() as i64;
            RankedParticipant {
                user_id: *user_id,
                rank,
                score: *score,
            }
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payout {
    pub user_id: Uuid,
    pub rank: i64,
    pub amount_cents: i64,
}

/// Allocate `pool_cents` across ranked positions per `payout_structure`
/// (percentage keyed by 1-based position string). Positions sharing a rank
/// pool their combined share and split it equally with floor division;
/// remainder cents are discarded, never redistributed.
pub fn allocate_payouts(
    ranked: &[RankedParticipant],
    payout_structure: &BTreeMap<String, i64>,
    pool_cents: i64,
) -> Vec<Payout> {
    let n = ranked.len();
    let mut payouts = Vec::with_capacity(n);
    let mut i = 0;
    while i < n {
        let rank = ranked[i].rank;
        let mut j = i;
        while j < n && ranked[j].rank == rank {
            j += 1;
        }

        let mut combined = 0i64;
        for position in (i + 1)..=j {
            let pct = payout_structure.get(&position.to_string()).copied().unwrap_or(0);
            combined += (pool_cents * pct) / 100;
        }
        let group_size = (j - i) as i64;
        let share = combined / group_size;

        for entry in &ranked[i..j] {
            payouts.push(Payout {
                user_id: entry.user_id,
                rank: entry.rank,
                amount_cents: share,
            });
        }
        i = j;
    }
    payouts
}

#[cfg(test)]
mod tests {
    use super::*;

    fn golfer(id: &str, score: i64) -> GolferRoundEntry {
        GolferRoundEntry {
            golfer_id: id.to_string(),
            hole_points: score,
            finish_bonus: 0,
        }
    }

    #[test]
    fn test_drop_lowest_with_seven_golfers() {
        let entries: Vec<GolferRoundEntry> = [50, 60, 70, 80, 90, 100, 110]
            .iter()
            .enumerate()
            .map(|(i, s)| golfer(&format!("g{i}"), *s))
            .collect();
        assert_eq!(aggregate_participant_score(&entries), 510);
    }

    #[test]
    fn test_six_golfers_keeps_all() {
        let entries: Vec<GolferRoundEntry> = [10, 20, 30, 40, 50, 60]
            .iter()
            .enumerate()
            .map(|(i, s)| golfer(&format!("g{i}"), *s))
            .collect();
        assert_eq!(aggregate_participant_score(&entries), 210);
    }

    #[test]
    fn test_multi_round_sums_per_golfer_before_drop() {
        // g0 totals 50 (30+20), the rest total 60 each across 2 rounds; 7 golfers -> drop g0.
        let mut entries = vec![golfer("g0", 30), golfer("g0", 20)];
        for i in 1..7 {
            entries.push(golfer(&format!("g{i}"), 30));
            entries.push(golfer(&format!("g{i}"), 30));
        }
        assert_eq!(aggregate_participant_score(&entries), 60 * 6);
    }

    #[test]
    fn test_tie_ranking() {
        let u1 = Uuid::new_v4();
        let u2 = Uuid::new_v4();
        let u3 = Uuid::new_v4();
        let (u1, u2) = if u1 < u2 { (u1, u2) } else { (u2, u1) };
        let ranked = rank_participants(&[(u1, 100), (u2, 100), (u3, 90)]);
        let ranks: Vec<i64> = ranked.iter().map(|r| r.rank).collect();
        assert_eq!(ranks, vec![1, 1, 3]);
    }

    #[test]
    fn test_tie_payout_split() {
        let u1 = Uuid::new_v4();
        let u2 = Uuid::new_v4();
        let u3 = Uuid::new_v4();
        let (low, high) = if u1 < u2 { (u1, u2) } else { (u2, u1) };
        let ranked = rank_participants(&[(low, 600), (high, 600), (u3, 500)]);

        let mut structure = BTreeMap::new();
        structure.insert("1".to_string(), 60);
        structure.insert("2".to_string(), 20);
        structure.insert("3".to_string(), 20);

        let payouts = allocate_payouts(&ranked, &structure, 30_000);
        let tied: Vec<i64> = payouts
            .iter()
            .filter(|p| p.rank == 1)
            .map(|p| p.amount_cents)
            .collect();
        assert_eq!(tied, vec![12_000, 12_000]);
        let third = payouts.iter().find(|p| p.rank == 3).unwrap();
        assert_eq!(third.amount_cents, 6_000);
    }

    #[test]
    fn test_total_payouts_never_exceed_pool() {
        let u1 = Uuid::new_v4();
        let u2 = Uuid::new_v4();
        let u3 = Uuid::new_v4();
        let ranked = rank_participants(&[(u1, 300), (u2, 200), (u3, 100)]);
        let mut structure = BTreeMap::new();
        structure.insert("1".to_string(), 50);
        structure.insert("2".to_string(), 30);
        structure.insert("3".to_string(), 20);
        let payouts = allocate_payouts(&ranked, &structure, 999);
        let total: i64 = payouts.iter().map(|p| p.amount_cents).sum();
        assert!(total <= 999);
    }
}
